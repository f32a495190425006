use thiserror::Error;

/// Errors raised by the session layer.
///
/// `Clone` so a single outcome can be handed to every caller sharing a
/// deduplicated flight.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("API error ({status}): {reason}")]
    Api { status: u16, reason: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("A session refresh is already in progress")]
    AlreadyRefreshing,

    #[error("A sign-in is already in progress")]
    AlreadyCreating,

    #[error("The session is already being initialized")]
    AlreadyInitializing,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("The session could not be refreshed")]
    RefreshFailed,

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session initialization failed: {0}")]
    Initialization(#[source] Box<AuthError>),
}

impl AuthError {
    /// True for the reentrancy rejections raised by the session phase guard.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            AuthError::AlreadyRefreshing | AuthError::AlreadyCreating | AuthError::AlreadyInitializing
        )
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Network(err.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for AuthError {
    fn from(err: config::ConfigError) -> Self {
        AuthError::Configuration(err.to_string())
    }
}
