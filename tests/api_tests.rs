// SPDX-License-Identifier: MIT

//! Integration tests for the authenticated API: manual sync and connection
//! management.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use common::{create_test_app, seed_connection, session_token};
use serde_json::json;
use terra_sync::db::Store;
use terra_sync::models::{Connection, ConnectionState, QueuedPayload};
use tower::ServiceExt;

fn authed_request(method: &str, uri: &str, token: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token));

    match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&b).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_sync_requires_authentication() {
    let (app, _state, _store, _provider) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sync")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sync_rejects_garbage_token() {
    let (app, _state, _store, _provider) = create_test_app();

    let response = app
        .oneshot(authed_request("POST", "/api/sync", "not-a-jwt", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_manual_sync_returns_counts() {
    let (app, _state, store, provider) = create_test_app();

    seed_connection(&store, "ext-1", "u-1").await;
    provider.add_payload("p-ok", json!({ "sport": "running" }));
    provider.fail_payload("p-bad");
    for id in ["p-ok", "p-bad"] {
        store
            .enqueue_payload(&QueuedPayload::new(
                "ext-1".into(),
                id.into(),
                "activity".into(),
                None,
                None,
            ))
            .await
            .unwrap();
    }

    let response = app
        .oneshot(authed_request(
            "POST",
            "/api/sync",
            &session_token("u-1"),
            None,
        ))
        .await
        .unwrap();

    // Partial success is still a successful call
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["processed"], 1);
    assert_eq!(body["errors"], 1);
}

#[tokio::test]
async fn test_manual_sync_surfaces_configuration_error() {
    let (app, _state, _store, provider) = create_test_app();
    provider.set_unconfigured();

    let response = app
        .oneshot(authed_request(
            "POST",
            "/api/sync",
            &session_token("u-1"),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "configuration_error");
}

#[tokio::test]
async fn test_connect_returns_authorization_url() {
    let (app, _state, _store, _provider) = create_test_app();

    let response = app
        .oneshot(authed_request(
            "POST",
            "/api/connection",
            &session_token("u-1"),
            Some(json!({ "return_origin": "https://app.example.com/settings" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "pending_authorization");
    let url = body["authorization_url"].as_str().unwrap();
    assert!(url.contains("reference_id=u-1"));
}

#[tokio::test]
async fn test_connect_when_already_connected() {
    let (app, _state, store, _provider) = create_test_app();
    seed_connection(&store, "ext-1", "u-1").await;

    let response = app
        .oneshot(authed_request(
            "POST",
            "/api/connection",
            &session_token("u-1"),
            Some(json!({ "return_origin": "https://app.example.com/settings" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "already_connected");
    assert!(body.get("authorization_url").is_none());
}

#[tokio::test]
async fn test_connect_rejects_invalid_return_origin() {
    let (app, _state, _store, _provider) = create_test_app();

    let response = app
        .oneshot(authed_request(
            "POST",
            "/api/connection",
            &session_token("u-1"),
            Some(json!({ "return_origin": "not a url" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_disconnect_revokes_and_is_idempotent() {
    let (app, _state, store, provider) = create_test_app();
    seed_connection(&store, "ext-1", "u-1").await;

    let response = app
        .clone()
        .oneshot(authed_request(
            "DELETE",
            "/api/connection",
            &session_token("u-1"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "disconnected");
    assert!(provider.revoked.contains("ext-1"));
    assert!(store
        .get_connection_by_external("ext-1")
        .await
        .unwrap()
        .is_none());

    // Second disconnect: still success, not an error
    let response = app
        .oneshot(authed_request(
            "DELETE",
            "/api/connection",
            &session_token("u-1"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "not_connected");
}

#[tokio::test]
async fn test_connection_status_reflects_store() {
    let (app, _state, store, _provider) = create_test_app();

    let response = app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/api/connection",
            &session_token("u-1"),
            None,
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["connected"], false);

    seed_connection(&store, "ext-1", "u-1").await;

    let response = app
        .oneshot(authed_request(
            "GET",
            "/api/connection",
            &session_token("u-1"),
            None,
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["connected"], true);
    assert_eq!(body["provider"], "garmin");
}

#[tokio::test]
async fn test_list_activities_most_recent_first() {
    let (app, _state, store, provider) = create_test_app();

    seed_connection(&store, "ext-1", "u-1").await;
    provider.add_payload(
        "p-old",
        json!({ "summary_id": "a-1", "sport": "running", "start_time": "2026-01-01T08:00:00Z" }),
    );
    provider.add_payload(
        "p-new",
        json!({ "summary_id": "a-2", "sport": "cycling", "start_time": "2026-02-01T08:00:00Z" }),
    );
    for id in ["p-old", "p-new"] {
        store
            .enqueue_payload(&QueuedPayload::new(
                "ext-1".into(),
                id.into(),
                "activity".into(),
                None,
                None,
            ))
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(authed_request("POST", "/api/sync", &session_token("u-1"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/api/activities",
            &session_token("u-1"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["activities"][0]["external_id"], "a-2");
    assert_eq!(body["activities"][1]["external_id"], "a-1");

    // Limit caps the page
    let response = app
        .oneshot(authed_request(
            "GET",
            "/api/activities?limit=1",
            &session_token("u-1"),
            None,
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["activities"][0]["external_id"], "a-2");
}

async fn seed_revoked_connection(store: &terra_sync::db::MemoryStore) {
    store
        .upsert_connection(&Connection {
            external_user_id: "ext-1".to_string(),
            local_user_id: "u-1".to_string(),
            provider: "garmin".to_string(),
            scopes: vec!["activity".to_string()],
            state: ConnectionState::Revoked,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_revoked_connection_reads_as_disconnected() {
    let (app, _state, store, _provider) = create_test_app();
    seed_revoked_connection(&store).await;

    let response = app
        .oneshot(authed_request(
            "GET",
            "/api/connection",
            &session_token("u-1"),
            None,
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["connected"], false);
}

#[tokio::test]
async fn test_connect_after_revocation_reissues_url() {
    let (app, _state, store, _provider) = create_test_app();
    seed_revoked_connection(&store).await;

    let response = app
        .oneshot(authed_request(
            "POST",
            "/api/connection",
            &session_token("u-1"),
            Some(json!({ "return_origin": "https://app.example.com/settings" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "pending_authorization");
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _state, _store, _provider) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}
