mod models;

use crate::client::transport::{ApiRequest, HttpBackend};
use crate::common::{Credentials, TokenPair, TokenPairDto, UserProfile};
use crate::error::AuthError;
use models::*;
use secrecy::ExposeSecret;
use std::sync::Arc;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const PROFILE_PATH: &str = "/auth/profile";

/// Calls to the session endpoints.
///
/// Goes straight to the backend: these requests must never pass through the
/// refresh-and-retry interceptor, which itself depends on them.
#[derive(Clone)]
pub struct SessionApi {
    backend: Arc<dyn HttpBackend>,
}

impl SessionApi {
    pub fn new(backend: Arc<dyn HttpBackend>) -> Self {
        Self { backend }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<TokenPair, AuthError> {
        let req = ApiRequest::post(LOGIN_PATH).json(&LoginRequest {
            username: &credentials.username,
            password: credentials.password.expose_secret(),
        })?;

        let dto = self
            .backend
            .send(req)
            .await?
            .error_for_status()?
            .json::<TokenPairDto>()?;

        TokenPair::try_from(dto)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let req = ApiRequest::post(REFRESH_PATH).json(&RefreshRequest {
            token: refresh_token,
        })?;

        let dto = self
            .backend
            .send(req)
            .await?
            .error_for_status()?
            .json::<TokenPairDto>()?;

        TokenPair::try_from(dto)
    }

    /// `authorization` is the full header value, scheme included
    pub async fn profile(&self, authorization: &str) -> Result<UserProfile, AuthError> {
        let req = ApiRequest::get(PROFILE_PATH).with_authorization(authorization)?;

        self.backend
            .send(req)
            .await?
            .error_for_status()?
            .json::<UserProfile>()
    }
}
