// Session models shared by the client pieces
pub mod common;

mod client;
mod error;

pub use client::{
    auth_client, authenticate, connect, decode_expiry, ApiRequest, ApiResponse,
    AuthenticatingTransport, CredentialStore, FileCredentialStore, Flight, HttpBackend,
    MemoryCredentialStore, ReqwestBackend, SessionApi, SessionManager, SessionPhase, Settings,
    SingleFlight, ACCESS_CREDENTIAL, FETCH_PROFILE_KEY, REFRESH_CREDENTIAL, REFRESH_SESSION_KEY,
    RETRY_MARKER,
};
pub use common::{Credentials, TokenPair, TokenPairDto, UserProfile};
pub use error::AuthError;

// Always expose testing module (integration tests need it)
pub mod testing;
