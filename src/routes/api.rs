// SPDX-License-Identifier: MIT

//! Authenticated API routes: manual sync, activity listing, and connection
//! management.
//!
//! Every handler takes the caller identity from the verified [`AuthUser`]
//! extension and passes it explicitly into the services.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::ActivityRecord;
use crate::services::{ConnectOutcome, DisconnectOutcome};
use crate::AppState;
use axum::{
    extract::{Extension, Json, Query, State},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Authenticated API routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sync", post(run_sync))
        .route("/api/activities", get(get_activities))
        .route(
            "/api/connection",
            get(connection_status).post(connect).delete(disconnect),
        )
}

/// Trigger a sync batch for all queued payload references.
///
/// Partial success is still success: the response is 2xx with the counts
/// even when `errors > 0`. Only configuration or internal failure surfaces
/// as an error status.
async fn run_sync(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<crate::services::BatchSummary>> {
    tracing::info!(local_user_id = %user.local_user_id, "Manual sync requested");
    let summary = state.sync.run_batch("manual").await?;
    Ok(Json(summary))
}

/// Connection status response.
#[derive(Serialize)]
struct ConnectionStatusResponse {
    connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    connected_at: Option<DateTime<Utc>>,
}

/// Report whether the caller has a live provider connection.
async fn connection_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ConnectionStatusResponse>> {
    let connection = state
        .store
        .get_connection_by_local(
            &user.local_user_id,
            crate::services::connection::PROVIDER_NAME,
        )
        .await?;

    // A revoked record reads as "not connected"; the grant is gone even
    // though the audit record remains.
    Ok(Json(match connection {
        Some(c) if c.is_active() => ConnectionStatusResponse {
            connected: true,
            provider: Some(c.provider),
            connected_at: Some(c.created_at),
        },
        _ => ConnectionStatusResponse {
            connected: false,
            provider: None,
            connected_at: None,
        },
    }))
}

/// Activities list query parameters.
#[derive(Deserialize)]
struct ActivitiesQuery {
    limit: Option<u32>,
}

/// Activities list response.
#[derive(Serialize)]
struct ActivitiesResponse {
    activities: Vec<ActivityRecord>,
    count: usize,
}

const DEFAULT_ACTIVITIES_LIMIT: u32 = 20;
const MAX_ACTIVITIES_LIMIT: u32 = 100;

/// List the caller's canonical activity records, most recent first.
async fn get_activities(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ActivitiesQuery>,
) -> Result<Json<ActivitiesResponse>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_ACTIVITIES_LIMIT)
        .min(MAX_ACTIVITIES_LIMIT);

    let activities = state
        .store
        .list_activities_for_user(&user.local_user_id, limit)
        .await?;

    Ok(Json(ActivitiesResponse {
        count: activities.len(),
        activities,
    }))
}

/// Connect request body.
#[derive(Deserialize, Validate)]
struct ConnectRequest {
    /// Where the provider should send the user after authorization
    #[validate(url)]
    return_origin: String,
}

/// Connect response body.
#[derive(Serialize)]
struct ConnectResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_url: Option<String>,
}

/// Start the provider authorization flow for the caller.
async fn connect(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let outcome = state
        .connections
        .connect(&user.local_user_id, &request.return_origin)
        .await?;

    Ok(Json(match outcome {
        ConnectOutcome::AlreadyConnected => ConnectResponse {
            status: "already_connected",
            authorization_url: None,
        },
        ConnectOutcome::AuthorizationUrl(url) => ConnectResponse {
            status: "pending_authorization",
            authorization_url: Some(url),
        },
    }))
}

/// Disconnect response body.
#[derive(Serialize)]
struct DisconnectResponse {
    status: &'static str,
}

/// Tear down the caller's provider connection. Idempotent.
async fn disconnect(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DisconnectResponse>> {
    let outcome = state.connections.disconnect(&user.local_user_id).await?;

    Ok(Json(DisconnectResponse {
        status: match outcome {
            DisconnectOutcome::Disconnected => "disconnected",
            DisconnectOutcome::NotConnected => "not_connected",
        },
    }))
}
