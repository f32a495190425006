pub mod auth_client;
mod config;
mod interceptor;
mod jwt;
mod session;
mod singleflight;
mod token_storage;
mod transport;

pub use auth_client::SessionApi;
pub use config::Settings;
pub use interceptor::AuthenticatingTransport;
pub use jwt::decode_expiry;
pub use session::{SessionManager, SessionPhase, FETCH_PROFILE_KEY, REFRESH_SESSION_KEY};
pub use singleflight::{Flight, SingleFlight};
pub use token_storage::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, ACCESS_CREDENTIAL,
    REFRESH_CREDENTIAL,
};
pub use transport::{ApiRequest, ApiResponse, HttpBackend, ReqwestBackend, RETRY_MARKER};

use crate::common::{Credentials, UserProfile};
use crate::error::AuthError;
use std::io::Write;
use std::sync::Arc;

/// Wire the session stack for `settings`: reqwest backend, file credential
/// store, session manager and the authenticating transport over them.
pub fn connect(settings: &Settings) -> Result<AuthenticatingTransport, AuthError> {
    settings.validate().map_err(AuthError::Configuration)?;

    let backend: Arc<dyn HttpBackend> = Arc::new(ReqwestBackend::new(
        settings.server_url.clone(),
        settings.request_timeout(),
    )?);
    let store: Arc<dyn CredentialStore> = match &settings.credentials_path {
        Some(path) => Arc::new(FileCredentialStore::at(path)?),
        None => Arc::new(FileCredentialStore::new()?),
    };

    let session =
        SessionManager::with_refresh_ttl(backend.clone(), store, settings.refresh_credential_ttl());
    Ok(AuthenticatingTransport::new(session, backend))
}

/// Restore the persisted session, or sign in interactively
pub async fn authenticate(session: &SessionManager) -> Result<UserProfile, AuthError> {
    match session.initialize().await {
        Ok(true) => {
            if let Some(profile) = session.profile() {
                return Ok(profile);
            }
        }
        Ok(false) => {}
        Err(e) => {
            eprintln!("Stored session could not be restored: {}", e);
        }
    }

    println!("\n=== Habitat Sign-in ===\n");
    let username = prompt("Username: ")?;
    let password = prompt("Password: ")?;

    let profile = session.create(Credentials::new(username, password)).await?;
    println!("✓ Signed in as {}\n", profile.display_name());

    Ok(profile)
}

fn prompt(label: &str) -> Result<String, AuthError> {
    print!("{}", label);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}
