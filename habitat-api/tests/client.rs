use chrono::{Duration, Utc};
use reqwest::{Method, StatusCode};
use serde_json::json;
use std::sync::Arc;

use habitat_api::endpoints::SpaceId;
use habitat_api::endpoints::climate::HvacMode;
use habitat_api::{Client, HabitatApiError, Request};
use habitat_auth::testing::MockBackend;
use habitat_auth::{AuthError, AuthenticatingTransport, MemoryCredentialStore, SessionManager};

const SPACE: &str = "3f2b8a5e-0000-4000-8000-000000000001";

fn client() -> (Client, Arc<MockBackend>) {
    let backend = Arc::new(MockBackend::new());
    let store = Arc::new(MemoryCredentialStore::new());
    let session = SessionManager::new(backend.clone(), store);
    let transport = AuthenticatingTransport::new(session, backend.clone());
    (Client::new(transport), backend)
}

fn space() -> SpaceId {
    SPACE.parse().unwrap()
}

fn path(subpath: &str) -> String {
    format!("/resource/{}/{}", SPACE, subpath)
}

#[tokio::test]
async fn test_get_climate() {
    let (client, backend) = client();
    backend.respond(
        Method::GET,
        &path("climate"),
        200,
        json!({ "temperature": 21.5, "humidity": 40.0, "mode": "heat" }),
    );

    let climate = client
        .send(Request::climate().with_space(space()).get())
        .await
        .unwrap();

    assert_eq!(climate.temperature, 21.5);
    assert_eq!(climate.mode, Some(HvacMode::Heat));
    assert_eq!(backend.count(&path("climate")), 1);
}

#[tokio::test]
async fn test_get_lighting_and_undo() {
    let (client, backend) = client();
    backend.respond(
        Method::GET,
        &path("lighting"),
        200,
        json!({
            "zones": [
                { "name": "desk", "on": true, "brightness": 80 },
                { "name": "hall", "on": false }
            ],
            "scene": "focus"
        }),
    );
    backend.respond(
        Method::GET,
        &path("undo"),
        200,
        json!({ "can_undo": false, "can_redo": false, "last": null }),
    );

    let lighting = client
        .send(Request::lighting().with_space(space()).get())
        .await
        .unwrap();
    let undo = client
        .send(Request::undo().with_space(space()).get())
        .await
        .unwrap();

    assert_eq!(lighting.lit_zones().count(), 1);
    assert_eq!(lighting.scene.as_deref(), Some("focus"));
    assert!(!undo.can_undo);
    assert!(undo.last.is_none());
}

#[tokio::test]
async fn test_api_error_carries_reason() {
    let (client, backend) = client();
    backend.respond(
        Method::GET,
        &path("climate"),
        404,
        json!({ "detail": "Space not found" }),
    );

    let err = client
        .send(Request::climate().with_space(space()).get())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(err.to_string(), "(404 Not Found) Space not found");
}

#[tokio::test]
async fn test_undecodable_body_is_validation_error() {
    let (client, backend) = client();
    backend.respond(Method::GET, &path("undo"), 200, json!({ "can_undo": "maybe" }));

    let err = client
        .send(Request::undo().with_space(space()).get())
        .await
        .unwrap_err();

    assert!(matches!(err, HabitatApiError::Validation(_)));
}

#[tokio::test]
async fn test_transport_error_is_wrapped() {
    let (client, backend) = client();
    backend.fail(
        Method::GET,
        &path("lighting"),
        AuthError::Network("timed out".into()),
    );

    let err = client
        .send(Request::lighting().with_space(space()).get())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HabitatApiError::Transport(AuthError::Network(_))
    ));
}

#[tokio::test]
async fn test_expired_session_refreshed_for_resource_request() {
    let (client, backend) = client();
    let expired = (Utc::now() - Duration::minutes(5)).timestamp();
    let fresh = (Utc::now() + Duration::hours(1)).timestamp();
    backend.respond(
        Method::POST,
        "/auth/login",
        200,
        json!({ "access_token": "a0", "refresh_token": "r0", "type": "Bearer", "expiration": expired }),
    );
    backend.respond(Method::GET, "/auth/profile", 200, json!({ "username": "u" }));
    backend.respond(
        Method::POST,
        "/auth/refresh",
        200,
        json!({ "access_token": "a1", "refresh_token": "r1", "type": "Bearer", "expiration": fresh }),
    );
    backend.respond(Method::GET, &path("climate"), 200, json!({ "temperature": 19.0 }));

    client
        .session()
        .create(habitat_auth::Credentials::new("u", "p"))
        .await
        .unwrap();
    let climate = client
        .send(Request::climate().with_space(space()).get())
        .await
        .unwrap();

    assert_eq!(climate.temperature, 19.0);
    assert_eq!(backend.count("/auth/refresh"), 1);
    assert_eq!(client.session().access_token().as_deref(), Some("a1"));
}
