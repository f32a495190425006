//! The authentication session.
//!
//! [`SessionManager`] is the single authority over the token pair and the
//! signed-in profile. Every clone of a manager shares the same state; nothing
//! outside this module writes to it.
//!
//! ```text
//! Empty ──initialize()──→ Initializing ──→ SignedIn | SignedOut
//!                                │
//! SignedIn ──refresh()──→ Refreshing ──→ SignedIn | SignedOut
//!
//! SignedOut ──create()──→ Creating ──→ SignedIn | SignedOut
//!
//! any ──clear()──→ SignedOut
//! ```

use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::auth_client::SessionApi;
use crate::client::jwt;
use crate::client::singleflight::SingleFlight;
use crate::client::token_storage::{CredentialStore, ACCESS_CREDENTIAL, REFRESH_CREDENTIAL};
use crate::client::transport::HttpBackend;
use crate::common::{Credentials, TokenPair, UserProfile, BEARER_SCHEME};
use crate::error::AuthError;

/// Singleflight key for session refreshes
pub const REFRESH_SESSION_KEY: &str = "refresh-session";
/// Singleflight key for profile fetches
pub const FETCH_PROFILE_KEY: &str = "fetch-profile";

pub const DEFAULT_REFRESH_TTL_DAYS: i64 = 30;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Empty,
    Initializing,
    SignedOut,
    SignedIn,
    Refreshing,
    Creating,
}

impl SessionPhase {
    /// An operation owns the session while in a busy phase
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            SessionPhase::Initializing | SessionPhase::Refreshing | SessionPhase::Creating
        )
    }
}

#[derive(Debug, Default)]
struct SessionState {
    token_pair: Option<TokenPair>,
    profile: Option<UserProfile>,
    phase: SessionPhase,
    /// Bumped by every `clear()`; token pairs obtained under an older epoch
    /// are not adopted
    epoch: u64,
}

impl SessionState {
    fn is_signed_in(&self) -> bool {
        self.token_pair.is_some() && self.profile.is_some()
    }

    fn settled_phase(&self) -> SessionPhase {
        if self.is_signed_in() {
            SessionPhase::SignedIn
        } else {
            SessionPhase::SignedOut
        }
    }

    fn settle_if_idle(&mut self) {
        if !self.phase.is_busy() {
            self.phase = self.settled_phase();
        }
    }
}

struct SessionInner {
    api: SessionApi,
    store: Arc<dyn CredentialStore>,
    refresh_ttl: Duration,
    state: Mutex<SessionState>,
    refresh_flight: SingleFlight<&'static str, bool>,
    profile_flight: SingleFlight<&'static str, Result<UserProfile, AuthError>>,
}

/// Holds a busy phase; settles the phase when dropped.
///
/// A refresh entered from `Initializing` hands the phase back to the
/// initializer instead of settling it.
struct PhaseGuard {
    inner: Arc<SessionInner>,
    resume: SessionPhase,
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        state.phase = match self.resume {
            SessionPhase::Initializing => SessionPhase::Initializing,
            _ => state.settled_phase(),
        };
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(self: &Arc<Self>, phase: SessionPhase) -> Result<PhaseGuard, AuthError> {
        let mut state = self.lock();

        let conflict = match state.phase {
            SessionPhase::Refreshing => Some(AuthError::AlreadyRefreshing),
            SessionPhase::Creating => Some(AuthError::AlreadyCreating),
            SessionPhase::Initializing if phase != SessionPhase::Refreshing => {
                Some(AuthError::AlreadyInitializing)
            }
            _ => None,
        };
        if let Some(err) = conflict {
            tracing::debug!(current = ?state.phase, requested = ?phase, "Session busy");
            return Err(err);
        }

        let resume = state.phase;
        state.phase = phase;
        Ok(PhaseGuard {
            inner: Arc::clone(self),
            resume,
        })
    }

    fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Install `pair` in memory and persist both credentials, unless the
    /// session was cleared since `epoch`. Returns whether it was adopted.
    ///
    /// The state lock is held across the store writes so a concurrent
    /// `clear()` cannot interleave with them.
    fn adopt(&self, pair: TokenPair, epoch: u64) -> Result<bool, AuthError> {
        let mut state = self.lock();
        if state.epoch != epoch {
            tracing::debug!("Session cleared while signing in, dropping token pair");
            return Ok(false);
        }

        self.store
            .set(ACCESS_CREDENTIAL, &pair.access_token, Some(pair.expires_at))?;
        self.store.set(
            REFRESH_CREDENTIAL,
            &pair.refresh_token,
            Some(Utc::now() + self.refresh_ttl),
        )?;

        state.token_pair = Some(pair);
        state.settle_if_idle();
        Ok(true)
    }

    async fn refresh_once(self: Arc<Self>) -> bool {
        let _phase = match self.enter(SessionPhase::Refreshing) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(error = %e, "Refresh rejected");
                return false;
            }
        };

        let epoch = self.epoch();

        // The persisted credential is authoritative; memory may already be stale
        let refresh_token = match self.store.get(REFRESH_CREDENTIAL) {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!("No refresh credential stored, skipping refresh");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read refresh credential");
                return false;
            }
        };

        match self.api.refresh(&refresh_token).await {
            Ok(pair) => match self.adopt(pair, epoch) {
                Ok(true) => {
                    tracing::info!("Session refreshed");
                    true
                }
                Ok(false) => false,
                Err(e) => {
                    tracing::warn!(error = %e, "Refreshed tokens could not be persisted");
                    false
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Session refresh failed");
                if let Err(e) = self.store.remove(REFRESH_CREDENTIAL) {
                    tracing::warn!(error = %e, "Failed to remove refresh credential");
                }
                false
            }
        }
    }

    async fn fetch_profile(self: Arc<Self>) -> Result<UserProfile, AuthError> {
        let authorization = self
            .lock()
            .token_pair
            .as_ref()
            .map(TokenPair::authorization)
            .ok_or(AuthError::NotSignedIn)?;

        let profile = self.api.profile(&authorization).await.inspect_err(|e| {
            tracing::warn!(error = %e, "Profile fetch failed");
        })?;

        let mut state = self.lock();
        // Signed out while the request was in flight
        if state.token_pair.is_none() {
            return Err(AuthError::NotSignedIn);
        }
        state.profile = Some(profile.clone());
        state.settle_if_idle();
        Ok(profile)
    }
}

/// Owner of the authentication session
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn HttpBackend>, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_refresh_ttl(backend, store, Duration::days(DEFAULT_REFRESH_TTL_DAYS))
    }

    /// `refresh_ttl` is how long the persisted refresh credential is kept
    pub fn with_refresh_ttl(
        backend: Arc<dyn HttpBackend>,
        store: Arc<dyn CredentialStore>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                api: SessionApi::new(backend),
                store,
                refresh_ttl,
                state: Mutex::new(SessionState::default()),
                refresh_flight: SingleFlight::new(),
                profile_flight: SingleFlight::new(),
            }),
        }
    }

    /// Restore the session from the credential store.
    ///
    /// Returns `Ok(false)` when there is nothing to restore. Every failure is
    /// returned wrapped in [`AuthError::Initialization`]. Failures of the
    /// restore itself also clear the session; a rejection because another
    /// operation owns the session leaves that operation's state alone.
    pub async fn initialize(&self) -> Result<bool, AuthError> {
        let phase = self
            .inner
            .enter(SessionPhase::Initializing)
            .map_err(|e| AuthError::Initialization(Box::new(e)))?;

        let result = self.restore().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Session initialization failed");
            self.clear();
        }
        drop(phase);

        result.map_err(|e| AuthError::Initialization(Box::new(e)))
    }

    async fn restore(&self) -> Result<bool, AuthError> {
        let Some(refresh_token) = self.inner.store.get(REFRESH_CREDENTIAL)? else {
            tracing::info!("No stored session");
            self.clear();
            return Ok(false);
        };

        let now = Utc::now();
        let restored = self
            .inner
            .store
            .get(ACCESS_CREDENTIAL)?
            .and_then(|access_token| {
                let expires_at = jwt::decode_expiry(&access_token)?;
                (now < expires_at).then(|| TokenPair {
                    access_token,
                    refresh_token,
                    expires_at,
                    scheme: BEARER_SCHEME.to_string(),
                })
            });

        match restored {
            Some(pair) => {
                tracing::debug!(expires_at = %pair.expires_at, "Restored access credential");
                self.inner.lock().token_pair = Some(pair);
            }
            None => {
                tracing::debug!("Access credential missing or expired, refreshing");
                if !self.refresh().await {
                    return Err(AuthError::RefreshFailed);
                }
            }
        }

        let has_profile = self.inner.lock().profile.is_some();
        if !has_profile {
            self.get().await?;
        }

        tracing::info!("Session restored");
        Ok(true)
    }

    /// Fetch the signed-in user's profile.
    ///
    /// Concurrent callers share one request.
    pub async fn get(&self) -> Result<UserProfile, AuthError> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .profile_flight
            .execute(FETCH_PROFILE_KEY, move || inner.fetch_profile())
            .await
    }

    /// Interactive sign-in.
    ///
    /// Not deduplicated: a second call while one is running fails with
    /// [`AuthError::AlreadyCreating`].
    pub async fn create(&self, credentials: Credentials) -> Result<UserProfile, AuthError> {
        credentials.validate()?;
        let _phase = self.inner.enter(SessionPhase::Creating)?;
        let epoch = self.inner.epoch();

        tracing::info!(username = %credentials.username, "Signing in");
        let pair = self.inner.api.login(&credentials).await?;

        let result = match self.inner.adopt(pair, epoch) {
            Ok(true) => self.get().await,
            Ok(false) => return Err(AuthError::NotSignedIn),
            Err(e) => Err(e),
        };

        match result {
            Ok(profile) => {
                tracing::info!(username = %profile.username, "Signed in");
                Ok(profile)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in could not be completed");
                self.clear();
                Err(e)
            }
        }
    }

    /// Exchange the persisted refresh credential for a new token pair.
    ///
    /// Concurrent callers share one request. Every failure is reported as
    /// `false`; a rejected refresh credential is removed from the store.
    pub async fn refresh(&self) -> bool {
        let inner = Arc::clone(&self.inner);
        self.inner
            .refresh_flight
            .execute(REFRESH_SESSION_KEY, move || inner.refresh_once())
            .await
    }

    /// Sign out locally. Never fails; storage errors are logged.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.token_pair = None;
        state.profile = None;
        state.epoch += 1;
        state.settle_if_idle();

        for name in [ACCESS_CREDENTIAL, REFRESH_CREDENTIAL] {
            if let Err(e) = self.inner.store.remove(name) {
                tracing::warn!(credential = name, error = %e, "Failed to remove credential");
            }
        }
        drop(state);

        tracing::info!("Session cleared");
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().phase
    }

    pub fn token_pair(&self) -> Option<TokenPair> {
        self.inner.lock().token_pair.clone()
    }

    pub fn has_token_pair(&self) -> bool {
        self.inner.lock().token_pair.is_some()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.inner.lock().profile.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .lock()
            .token_pair
            .as_ref()
            .map(|pair| pair.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .lock()
            .token_pair
            .as_ref()
            .map(|pair| pair.refresh_token.clone())
    }

    /// `Authorization` header value for the current token pair
    pub fn authorization(&self) -> Option<String> {
        self.inner
            .lock()
            .token_pair
            .as_ref()
            .map(TokenPair::authorization)
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.lock().is_signed_in()
    }

    /// False when there is no token pair at all; check [`Self::is_signed_in`]
    /// for that case.
    pub fn is_expired(&self) -> bool {
        self.inner
            .lock()
            .token_pair
            .as_ref()
            .is_some_and(TokenPair::is_expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::token_storage::MemoryCredentialStore;
    use crate::testing::MockBackend;

    fn manager() -> (SessionManager, Arc<MockBackend>, Arc<MemoryCredentialStore>) {
        let backend = Arc::new(MockBackend::new());
        let store = Arc::new(MemoryCredentialStore::new());
        let session = SessionManager::new(backend.clone(), store.clone());
        (session, backend, store)
    }

    #[test]
    fn test_new_session_is_empty() {
        let (session, _, _) = manager();

        assert_eq!(session.phase(), SessionPhase::Empty);
        assert!(!session.is_signed_in());
        assert!(!session.is_expired());
        assert_eq!(session.access_token(), None);
        assert_eq!(session.authorization(), None);
    }

    #[test]
    fn test_phase_guard_rejects_overlap() {
        let (session, _, _) = manager();

        let creating = session.inner.enter(SessionPhase::Creating).unwrap();
        assert_eq!(session.phase(), SessionPhase::Creating);
        assert_eq!(
            session.inner.enter(SessionPhase::Creating).err(),
            Some(AuthError::AlreadyCreating)
        );
        assert_eq!(
            session.inner.enter(SessionPhase::Refreshing).err(),
            Some(AuthError::AlreadyCreating)
        );

        drop(creating);
        assert_eq!(session.phase(), SessionPhase::SignedOut);
    }

    #[test]
    fn test_refresh_inside_initialize_resumes_initializing() {
        let (session, _, _) = manager();

        let initializing = session.inner.enter(SessionPhase::Initializing).unwrap();
        let refreshing = session.inner.enter(SessionPhase::Refreshing).unwrap();
        assert_eq!(session.phase(), SessionPhase::Refreshing);
        assert_eq!(
            session.inner.enter(SessionPhase::Refreshing).err(),
            Some(AuthError::AlreadyRefreshing)
        );

        drop(refreshing);
        assert_eq!(session.phase(), SessionPhase::Initializing);
        assert_eq!(
            session.inner.enter(SessionPhase::Creating).err(),
            Some(AuthError::AlreadyInitializing)
        );

        drop(initializing);
        assert_eq!(session.phase(), SessionPhase::SignedOut);
    }

    #[test]
    fn test_clear_is_safe_mid_operation() {
        let (session, _, store) = manager();
        store.set(REFRESH_CREDENTIAL, "r", None).unwrap();

        let refreshing = session.inner.enter(SessionPhase::Refreshing).unwrap();
        session.clear();
        assert_eq!(session.phase(), SessionPhase::Refreshing);
        assert_eq!(store.get(REFRESH_CREDENTIAL).unwrap(), None);

        drop(refreshing);
        assert_eq!(session.phase(), SessionPhase::SignedOut);
    }
}
