//! Test doubles for the session layer.
//!
//! Always compiled: integration tests in this and downstream crates need them.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::future::{BoxFuture, FutureExt};
use reqwest::{Method, StatusCode};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;

use crate::client::{ApiRequest, ApiResponse, HttpBackend};
use crate::error::AuthError;

/// Unsigned JWT whose payload carries only `exp`
pub fn unsigned_jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, exp));
    format!("{}.{}.", header, payload)
}

/// Releases a held mock response
pub struct Gate(oneshot::Sender<()>);

impl Gate {
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

enum Reply {
    Respond(ApiResponse),
    Fail(AuthError),
}

struct Scripted {
    reply: Reply,
    hold: Option<oneshot::Receiver<()>>,
    served: bool,
}

impl Scripted {
    fn new(reply: Reply, hold: Option<oneshot::Receiver<()>>) -> Self {
        Self {
            reply,
            hold,
            served: false,
        }
    }
}

type Route = (Method, String);

/// Scripted [`HttpBackend`].
///
/// Replies are queued per `(method, path)` and consumed in order. The last
/// reply of a route keeps being served until a new one is queued behind it.
/// Every request is logged.
#[derive(Default)]
pub struct MockBackend {
    routes: Mutex<HashMap<Route, VecDeque<Scripted>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, scripted: Scripted) {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = routes.entry((method, path.to_string())).or_default();
        queue.retain(|queued| !queued.served);
        queue.push_back(scripted);
    }

    /// Queue a JSON reply
    pub fn respond(&self, method: Method, path: &str, status: u16, body: serde_json::Value) {
        self.push(
            method,
            path,
            Scripted::new(Reply::Respond(json_response(status, &body)), None),
        );
    }

    /// Queue a JSON reply that is withheld until the returned gate is released
    pub fn respond_held(
        &self,
        method: Method,
        path: &str,
        status: u16,
        body: serde_json::Value,
    ) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.push(
            method,
            path,
            Scripted::new(Reply::Respond(json_response(status, &body)), Some(rx)),
        );
        Gate(tx)
    }

    /// Queue a transport-level failure
    pub fn fail(&self, method: Method, path: &str, error: AuthError) {
        self.push(
            method,
            path,
            Scripted::new(Reply::Fail(error), None),
        );
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests sent to `path`, any method
    pub fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|request| request.path == path)
            .count()
    }

    fn next(&self, request: &ApiRequest) -> Option<Scripted> {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = routes.get_mut(&(request.method.clone(), request.path.clone()))?;

        if queue.len() > 1 {
            return queue.pop_front();
        }

        // Keep serving the last reply; a hold only applies once
        let last = queue.front_mut()?;
        last.served = true;
        let reply = match &last.reply {
            Reply::Respond(response) => Reply::Respond(response.clone()),
            Reply::Fail(error) => Reply::Fail(error.clone()),
        };
        Some(Scripted::new(reply, last.hold.take()))
    }
}

fn json_response(status: u16, body: &serde_json::Value) -> ApiResponse {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    ApiResponse::new(status, body.to_string())
}

impl HttpBackend for MockBackend {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, AuthError>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let scripted = self.next(&request);

        async move {
            let Some(scripted) = scripted else {
                return Err(AuthError::Network(format!(
                    "no scripted response for {} {}",
                    request.method, request.path
                )));
            };
            if let Some(hold) = scripted.hold {
                let _ = hold.await;
            }
            match scripted.reply {
                Reply::Respond(response) => Ok(response),
                Reply::Fail(error) => Err(error),
            }
        }
        .boxed()
    }
}
