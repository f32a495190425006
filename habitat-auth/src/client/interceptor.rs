use futures::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;
use std::sync::Arc;

use crate::client::session::SessionManager;
use crate::client::transport::{ApiRequest, ApiResponse, HttpBackend};
use crate::error::AuthError;

/// What to do with a `401` response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnauthorizedAction {
    Propagate,
    RefreshAndRetry,
}

/// Decision table for a `401`, first match wins
fn on_unauthorized(request: &ApiRequest, has_token_pair: bool, is_expired: bool) -> UnauthorizedAction {
    if request.is_retry() {
        // Already the one permitted retry
        UnauthorizedAction::Propagate
    } else if has_token_pair && is_expired {
        UnauthorizedAction::RefreshAndRetry
    } else if request.has_authorization() {
        // Sent with a live credential: a real authorization failure
        UnauthorizedAction::Propagate
    } else if !has_token_pair {
        UnauthorizedAction::Propagate
    } else {
        UnauthorizedAction::RefreshAndRetry
    }
}

/// Attaches bearer credentials to requests and retries once through a
/// session refresh when the server answers `401`.
#[derive(Clone)]
pub struct AuthenticatingTransport {
    session: SessionManager,
    backend: Arc<dyn HttpBackend>,
}

impl AuthenticatingTransport {
    pub fn new(session: SessionManager, backend: Arc<dyn HttpBackend>) -> Self {
        Self { session, backend }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Send `request`, returning the final response.
    ///
    /// A `401` that cannot be recovered is returned as a response, not an
    /// error, so callers handle it like any other status.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, AuthError> {
        let request = self.prepare(request).await?;
        let response = self.backend.send(request.clone()).await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let action = on_unauthorized(
            &request,
            self.session.has_token_pair(),
            self.session.is_expired(),
        );
        tracing::debug!(path = %request.path, action = ?action, "Request unauthorized");

        match action {
            UnauthorizedAction::Propagate => Ok(response),
            UnauthorizedAction::RefreshAndRetry => self.refresh_and_retry(request, response).await,
        }
    }

    /// Refresh an expired session and attach the bearer credential
    async fn prepare(&self, request: ApiRequest) -> Result<ApiRequest, AuthError> {
        if self.session.has_token_pair() && self.session.is_expired() {
            tracing::debug!(path = %request.path, "Access token expired, refreshing before request");
            if !self.session.refresh().await {
                // Sent unauthenticated; the server's 401 is handled like any other
                self.session.clear();
            }
        }

        match self.session.authorization() {
            Some(authorization) => request.with_authorization(&authorization),
            None => Ok(request),
        }
    }

    async fn refresh_and_retry(
        &self,
        request: ApiRequest,
        unauthorized: ApiResponse,
    ) -> Result<ApiResponse, AuthError> {
        if !self.session.refresh().await {
            tracing::warn!(path = %request.path, "Refresh failed, signing out");
            self.session.clear();
            return Ok(unauthorized);
        }

        let Some(authorization) = self.session.authorization() else {
            return Ok(unauthorized);
        };

        tracing::debug!(path = %request.path, "Retrying request with refreshed token");
        let retry = request
            .with_authorization(&authorization)?
            .with_retry_marker();
        self.backend.send(retry).await
    }
}

impl HttpBackend for AuthenticatingTransport {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, AuthError>> {
        AuthenticatingTransport::send(self, request).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_marker_always_propagates() {
        let request = ApiRequest::get("/x").with_retry_marker();
        for (has_pair, expired) in [(true, true), (true, false), (false, false)] {
            assert_eq!(
                on_unauthorized(&request, has_pair, expired),
                UnauthorizedAction::Propagate
            );
        }
    }

    #[test]
    fn test_expired_pair_refreshes_even_when_authenticated() {
        let request = ApiRequest::get("/x")
            .with_authorization("Bearer old")
            .unwrap();
        assert_eq!(
            on_unauthorized(&request, true, true),
            UnauthorizedAction::RefreshAndRetry
        );
    }

    #[test]
    fn test_live_credential_is_a_real_denial() {
        let request = ApiRequest::get("/x")
            .with_authorization("Bearer live")
            .unwrap();
        assert_eq!(
            on_unauthorized(&request, true, false),
            UnauthorizedAction::Propagate
        );
    }

    #[test]
    fn test_unauthenticated_request() {
        let request = ApiRequest::get("/x");
        assert_eq!(
            on_unauthorized(&request, false, false),
            UnauthorizedAction::Propagate
        );
        assert_eq!(
            on_unauthorized(&request, true, false),
            UnauthorizedAction::RefreshAndRetry
        );
    }
}
