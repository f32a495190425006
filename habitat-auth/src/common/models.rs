use chrono::{serde::ts_seconds, DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

pub const BEARER_SCHEME: &str = "Bearer";

/// Access/refresh token pair held by the session.
///
/// Replaced as a whole on every refresh, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "ts_seconds")]
    pub expires_at: DateTime<Utc>,
    pub scheme: String,
}

impl TokenPair {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("{} {}", self.scheme, self.access_token)
    }
}

/// Token pair as returned by `/auth/login` and `/auth/refresh`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPairDto {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(rename = "type", default = "default_scheme")]
    pub token_type: String,
    #[serde(with = "ts_seconds")]
    pub expiration: DateTime<Utc>,
}

fn default_scheme() -> String {
    BEARER_SCHEME.to_string()
}

impl TryFrom<TokenPairDto> for TokenPair {
    type Error = AuthError;

    fn try_from(dto: TokenPairDto) -> Result<Self, Self::Error> {
        if dto.access_token.is_empty() {
            return Err(AuthError::Validation("token response has an empty access_token".into()));
        }
        if dto.refresh_token.is_empty() {
            return Err(AuthError::Validation("token response has an empty refresh_token".into()));
        }
        let scheme = if dto.token_type.is_empty() {
            default_scheme()
        } else {
            dto.token_type
        };

        Ok(Self {
            access_token: dto.access_token,
            refresh_token: dto.refresh_token,
            expires_at: dto.expiration,
            scheme,
        })
    }
}

/// Profile of the signed-in user (`GET /auth/profile`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }
}

/// Interactive sign-in credentials
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.username.trim().is_empty() {
            return Err(AuthError::Validation("username is required".into()));
        }
        if self.password.expose_secret().is_empty() {
            return Err(AuthError::Validation("password is required".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
