pub mod endpoints;
mod error;
pub mod repositories;

pub use crate::error::HabitatApiError;
use endpoints::Endpoint;
use habitat_auth::{ApiRequest, AuthenticatingTransport, SessionManager};
use repositories::*;

/// Typed resource client over the authenticating transport
#[derive(Clone)]
pub struct Client {
    transport: AuthenticatingTransport,
}

impl Client {
    pub fn new(transport: AuthenticatingTransport) -> Self {
        Self { transport }
    }

    pub fn session(&self) -> &SessionManager {
        self.transport.session()
    }

    pub async fn send<R>(&self, request: R) -> Result<R::Response, HabitatApiError>
    where
        R: Endpoint,
    {
        let path = request.endpoint().into_owned();
        tracing::debug!("{} {}", request.method(), path);

        let response = self
            .transport
            .send(ApiRequest::new(request.method(), path))
            .await?;

        if !response.is_success() {
            return Err(HabitatApiError::Api {
                status: response.status,
                reason: response.error_reason(),
            });
        }

        response
            .json()
            .map_err(|e| HabitatApiError::Validation(e.to_string()))
    }
}

pub struct Request;

impl Request {
    pub fn climate() -> ClimateRepository {
        ClimateRepository::new()
    }

    pub fn lighting() -> LightingRepository {
        LightingRepository::new()
    }

    pub fn undo() -> UndoRepository {
        UndoRepository::new()
    }
}
