// SPDX-License-Identifier: MIT

//! Shared test fixtures: in-memory store, scripted provider, router setup.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use terra_sync::config::Config;
use terra_sync::db::MemoryStore;
use terra_sync::error::AppError;
use terra_sync::models::{Connection, ConnectionState};
use terra_sync::routes::create_router;
use terra_sync::services::terra::{ActivityProvider, FetchedPayload, ProviderActivity};
use terra_sync::AppState;

/// Scripted stand-in for the provider API.
#[derive(Default)]
pub struct FakeProvider {
    /// payload_id → activity body (the `data[0]` object)
    pub payloads: DashMap<String, serde_json::Value>,
    /// payload_ids that should fail with a provider error
    pub failing: DashSet<String>,
    /// When set, every call reports missing credentials
    pub unconfigured: AtomicBool,
    /// External user IDs whose grants were revoked
    pub revoked: DashSet<String>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a payload response for `payload_id`.
    pub fn add_payload(&self, payload_id: &str, activity: serde_json::Value) {
        self.payloads.insert(payload_id.to_string(), activity);
    }

    /// Make fetches of `payload_id` fail with a transient provider error.
    pub fn fail_payload(&self, payload_id: &str) {
        self.failing.insert(payload_id.to_string());
    }

    pub fn set_unconfigured(&self) {
        self.unconfigured.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ActivityProvider for FakeProvider {
    fn ensure_configured(&self) -> Result<(), AppError> {
        if self.unconfigured.load(Ordering::SeqCst) {
            return Err(AppError::Config("TERRA_API_KEY"));
        }
        Ok(())
    }

    async fn generate_auth_url(
        &self,
        reference_id: &str,
        _return_origin: &str,
    ) -> Result<String, AppError> {
        self.ensure_configured()?;
        Ok(format!(
            "https://widget.example.com/session?reference_id={}",
            reference_id
        ))
    }

    async fn fetch_payload(
        &self,
        _external_user_id: &str,
        payload_id: &str,
    ) -> Result<FetchedPayload, AppError> {
        self.ensure_configured()?;

        if self.failing.contains(payload_id) {
            return Err(AppError::Provider(format!(
                "HTTP 503: scripted failure for {}",
                payload_id
            )));
        }

        let Some(body) = self.payloads.get(payload_id) else {
            return Err(AppError::NoData(format!(
                "payload {} had no activity data",
                payload_id
            )));
        };

        let activity: ProviderActivity = serde_json::from_value(body.clone())
            .map_err(|e| AppError::Provider(format!("Malformed activity payload: {}", e)))?;

        Ok(FetchedPayload {
            activity,
            raw: serde_json::json!({ "data": [body.clone()] }),
        })
    }

    async fn deauthenticate(&self, external_user_id: &str) -> Result<(), AppError> {
        self.ensure_configured()?;
        self.revoked.insert(external_user_id.to_string());
        Ok(())
    }
}

/// Create a test app over an in-memory store and scripted provider.
/// Returns the router plus handles for seeding and assertions.
#[allow(dead_code)]
pub fn create_test_app() -> (
    axum::Router,
    Arc<AppState>,
    Arc<MemoryStore>,
    Arc<FakeProvider>,
) {
    let config = Config::test_default();
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(FakeProvider::new());

    let state = Arc::new(AppState::new(config, store.clone(), provider.clone()));

    (create_router(state.clone()), state, store, provider)
}

/// Seed an active connection linking `external_user_id` to `local_user_id`.
#[allow(dead_code)]
pub async fn seed_connection(store: &MemoryStore, external_user_id: &str, local_user_id: &str) {
    use terra_sync::db::Store;

    store
        .upsert_connection(&Connection {
            external_user_id: external_user_id.to_string(),
            local_user_id: local_user_id.to_string(),
            provider: "garmin".to_string(),
            scopes: vec!["activity".to_string()],
            state: ConnectionState::Active,
            created_at: Utc::now(),
        })
        .await
        .expect("seed connection");
}

/// Session token for a local user, signed with the test config key.
#[allow(dead_code)]
pub fn session_token(local_user_id: &str) -> String {
    terra_sync::middleware::auth::create_jwt(
        local_user_id,
        &Config::test_default().jwt_signing_key,
    )
    .expect("create test JWT")
}
