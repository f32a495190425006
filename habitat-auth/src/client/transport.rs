use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::error::AuthError;

/// Header set on the single permitted retry of a request
pub const RETRY_MARKER: HeaderName = HeaderName::from_static("x-retried");

/// Outgoing request, relative to the API base URL
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json<T: serde::Serialize>(mut self, body: &T) -> Result<Self, AuthError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Set the `Authorization` header, e.g. `"Bearer <token>"`
    pub fn with_authorization(mut self, value: &str) -> Result<Self, AuthError> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| AuthError::Validation(format!("Invalid authorization header: {}", e)))?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    pub fn with_retry_marker(mut self) -> Self {
        self.headers
            .insert(RETRY_MARKER, HeaderValue::from_static("1"));
        self
    }

    pub fn is_retry(&self) -> bool {
        self.headers.contains_key(RETRY_MARKER)
    }

    pub fn has_authorization(&self) -> bool {
        self.headers.contains_key(AUTHORIZATION)
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AuthError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Human-readable reason for a failed response.
    ///
    /// Prefers `message`, then `detail`, then `error` from a JSON body, then a
    /// short plain-text body, then the canonical status text.
    pub fn error_reason(&self) -> String {
        if let Ok(body) = serde_json::from_slice::<ErrorBody>(&self.body) {
            if let Some(reason) = body.message.or(body.detail).or(body.error) {
                return reason;
            }
        }

        let text = String::from_utf8_lossy(&self.body);
        let text = text.trim();
        if !text.is_empty() && text.len() <= 200 && !text.starts_with('{') {
            return text.to_string();
        }

        self.status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    }

    /// `Ok(self)` for 2xx, otherwise [`AuthError::Api`] with the body's reason
    pub fn error_for_status(self) -> Result<Self, AuthError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AuthError::Api {
                status: self.status.as_u16(),
                reason: self.error_reason(),
            })
        }
    }
}

/// The raw HTTP exchange underneath the session layer
pub trait HttpBackend: Send + Sync {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, AuthError>>;
}

/// [`HttpBackend`] over a `reqwest` client
pub struct ReqwestBackend {
    http_client: Client,
    base_url: String,
}

impl ReqwestBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, AuthError> {
        let url = format!("{}{}", self.base_url, request.path);
        tracing::debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .http_client
            .request(request.method, &url)
            .headers(request.headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?.to_vec();

        tracing::debug!(status = %status, url = %url, "Received response");
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

impl HttpBackend for ReqwestBackend {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, AuthError>> {
        self.execute(request).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reason_prefers_message() {
        let resp = ApiResponse::new(
            StatusCode::BAD_REQUEST,
            r#"{"message":"Invalid credentials","detail":"ignored"}"#,
        );
        assert_eq!(resp.error_reason(), "Invalid credentials");

        let resp = ApiResponse::new(StatusCode::FORBIDDEN, r#"{"detail":"Not allowed"}"#);
        assert_eq!(resp.error_reason(), "Not allowed");
    }

    #[test]
    fn test_error_reason_falls_back_to_status() {
        let resp = ApiResponse::new(StatusCode::BAD_GATEWAY, "");
        assert_eq!(resp.error_reason(), "Bad Gateway");

        let resp = ApiResponse::new(StatusCode::SERVICE_UNAVAILABLE, "maintenance");
        assert_eq!(resp.error_reason(), "maintenance");
    }

    #[test]
    fn test_error_for_status() {
        let err = ApiResponse::new(StatusCode::UNAUTHORIZED, r#"{"error":"expired"}"#)
            .error_for_status()
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::Api {
                status: 401,
                reason: "expired".into()
            }
        );
        assert!(ApiResponse::new(StatusCode::OK, "{}").error_for_status().is_ok());
    }

    #[test]
    fn test_retry_marker() {
        let request = ApiRequest::get("/auth/profile");
        assert!(!request.is_retry());
        let request = request.with_retry_marker();
        assert!(request.is_retry());
        assert_eq!(request.headers.get("X-Retried").unwrap(), "1");
    }
}
