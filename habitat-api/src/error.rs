use habitat_auth::AuthError;
use reqwest::StatusCode;

#[derive(Debug, Clone)]
pub enum HabitatApiError {
    /// Non-2xx answer from a resource endpoint
    Api { status: StatusCode, reason: String },
    /// Body that does not decode into the endpoint's response type
    Validation(String),
    Transport(AuthError),
}

impl From<AuthError> for HabitatApiError {
    fn from(value: AuthError) -> Self {
        HabitatApiError::Transport(value)
    }
}

impl HabitatApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HabitatApiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for HabitatApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HabitatApiError::Api { status, reason } => write!(f, "({}) {}", status, reason),
            HabitatApiError::Validation(e) => write!(f, "Invalid response: {}", e),
            HabitatApiError::Transport(e) => write!(f, "Transport error: {}", e),
        }
    }
}

impl std::error::Error for HabitatApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HabitatApiError::Transport(e) => Some(e),
            _ => None,
        }
    }
}
