// SPDX-License-Identifier: MIT

//! Webhook route for provider push notifications.
//!
//! Pure intake: the handler verifies the signature, records what arrived,
//! and acknowledges. Acknowledging receipt is not acknowledging ingestion —
//! processing happens in a background batch spawned after the response is
//! already decided.

use crate::models::{Connection, ConnectionState, QueuedPayload};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", post(handle_notification))
}

/// Provider notification payload.
#[derive(Deserialize, Debug)]
struct Notification {
    /// Notification kind: "auth", "deauth", or a data type like "activity"
    #[serde(rename = "type")]
    kind: String,
    user: Option<NotificationUser>,
    /// Opaque reference to the announced payload (data notifications)
    payload_id: Option<String>,
    /// Optional time-window hints for the announced payload
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug)]
struct NotificationUser {
    user_id: String,
    provider: Option<String>,
    /// Echo of the reference we passed into the widget session; carries the
    /// local user ID on auth notifications
    reference_id: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
}

/// Receipt acknowledgment body.
#[derive(Serialize)]
struct ReceiptResponse {
    accepted: bool,
}

/// Handle an incoming provider notification (POST).
async fn handle_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(secret) = &state.config.terra_signing_secret {
        let signature = headers
            .get("terra-signature")
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();

        if !verify_signature(secret.as_bytes(), signature, &body) {
            tracing::warn!("Webhook signature verification failed");
            return (StatusCode::UNAUTHORIZED, Json(ReceiptResponse { accepted: false }));
        }
    }

    let notification: Notification = match serde_json::from_slice(&body) {
        Ok(n) => n,
        Err(e) => {
            // Acknowledge anyway so the provider does not retry-storm over
            // a body we will never be able to parse.
            tracing::error!(error = %e, "Failed to parse webhook notification");
            return (StatusCode::OK, Json(ReceiptResponse { accepted: false }));
        }
    };

    tracing::info!(kind = %notification.kind, "Webhook notification received");

    match notification.kind.as_str() {
        "auth" => handle_auth(&state, &notification).await,
        "deauth" => handle_deauth(&state, &notification).await,
        "activity" => handle_activity(&state, &notification).await,
        _ => {
            tracing::debug!(kind = %notification.kind, "Ignoring unhandled notification type");
        }
    }

    (StatusCode::OK, Json(ReceiptResponse { accepted: true }))
}

/// Provider confirmed an authorization: create the Connection Record.
async fn handle_auth(state: &AppState, notification: &Notification) {
    let Some(user) = &notification.user else {
        tracing::warn!("Auth notification without user block");
        return;
    };
    let Some(reference_id) = &user.reference_id else {
        tracing::warn!(
            external_user_id = %user.user_id,
            "Auth notification without reference_id, cannot attribute"
        );
        return;
    };

    let connection = Connection {
        external_user_id: user.user_id.clone(),
        local_user_id: reference_id.clone(),
        provider: user
            .provider
            .as_deref()
            .unwrap_or(crate::services::connection::PROVIDER_NAME)
            .to_lowercase(),
        scopes: user.scopes.clone(),
        state: ConnectionState::Active,
        created_at: Utc::now(),
    };

    match state.store.upsert_connection(&connection).await {
        Ok(()) => tracing::info!(
            local_user_id = %connection.local_user_id,
            external_user_id = %connection.external_user_id,
            "Connection established"
        ),
        Err(e) => tracing::error!(error = %e, "Failed to store connection"),
    }
}

/// Provider reported the grant is gone: mark the Connection Record revoked.
/// The record stays around for audit; only an explicit disconnect deletes it.
async fn handle_deauth(state: &AppState, notification: &Notification) {
    let Some(user) = &notification.user else {
        tracing::warn!("Deauth notification without user block");
        return;
    };

    let connection = match state.store.get_connection_by_external(&user.user_id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            tracing::debug!(external_user_id = %user.user_id, "Deauth for unknown connection");
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load connection for deauth");
            return;
        }
    };

    let revoked = Connection {
        state: ConnectionState::Revoked,
        ..connection
    };
    match state.store.upsert_connection(&revoked).await {
        Ok(()) => tracing::info!(external_user_id = %user.user_id, "Connection revoked"),
        Err(e) => tracing::error!(error = %e, "Failed to revoke connection"),
    }
}

/// New activity data announced: enqueue the reference and kick a batch.
async fn handle_activity(state: &AppState, notification: &Notification) {
    let Some(user) = &notification.user else {
        tracing::warn!("Activity notification without user block");
        return;
    };
    let Some(payload_id) = &notification.payload_id else {
        tracing::warn!(
            external_user_id = %user.user_id,
            "Activity notification without payload_id"
        );
        return;
    };

    let payload = QueuedPayload::new(
        user.user_id.clone(),
        payload_id.clone(),
        notification.kind.clone(),
        notification.start_time,
        notification.end_time,
    );

    match state.store.enqueue_payload(&payload).await {
        Ok(true) => {
            tracing::info!(
                external_user_id = %user.user_id,
                payload_id = %payload_id,
                "Payload reference enqueued"
            );

            // Drain in the background; the webhook response must not wait
            // on provider fetches.
            let sync = state.sync.clone();
            tokio::spawn(async move {
                if let Err(e) = sync.run_batch("webhook").await {
                    tracing::error!(error = %e, "Webhook-triggered batch failed");
                }
            });
        }
        Ok(false) => {
            tracing::debug!(
                external_user_id = %user.user_id,
                payload_id = %payload_id,
                "Duplicate notification, reference already queued"
            );
        }
        Err(e) => tracing::error!(error = %e, "Failed to enqueue payload reference"),
    }
}

/// Verify a `t=<unix_ts>,v1=<hex>` signature header: HMAC-SHA256 of
/// `"{t}.{body}"` under the shared signing secret, compared in constant
/// time.
fn verify_signature(secret: &[u8], header: &str, body: &[u8]) -> bool {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v),
            Some(("v1", v)) => signature = Some(v),
            _ => {}
        }
    }

    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return false;
    };
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };

    let mut mac = match Hmac::<Sha256>::new_from_slice(secret) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    computed.ct_eq(&expected).into()
}

/// Build a signature header for a body. Test helper for webhook callers.
pub fn sign_body(secret: &[u8], timestamp: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        let secret = b"test_signing_secret";
        let body = br#"{"type":"activity"}"#;
        let header = sign_body(secret, "1700000000", body);
        assert!(verify_signature(secret, &header, body));
    }

    #[test]
    fn test_signature_rejects_tampered_body() {
        let secret = b"test_signing_secret";
        let header = sign_body(secret, "1700000000", b"original");
        assert!(!verify_signature(secret, &header, b"tampered"));
    }

    #[test]
    fn test_signature_rejects_wrong_secret() {
        let header = sign_body(b"secret-a", "1700000000", b"body");
        assert!(!verify_signature(b"secret-b", &header, b"body"));
    }

    #[test]
    fn test_signature_rejects_malformed_header() {
        assert!(!verify_signature(b"secret", "", b"body"));
        assert!(!verify_signature(b"secret", "v1=deadbeef", b"body"));
        assert!(!verify_signature(b"secret", "t=123,v1=nothex", b"body"));
    }
}
