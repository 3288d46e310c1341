// SPDX-License-Identifier: MIT

//! Terra API client for the wearable data aggregator.
//!
//! Handles:
//! - Widget session creation (authorization URL for connect)
//! - Full payload retrieval for queued references
//! - Grant revocation on disconnect
//!
//! All calls carry the developer ID and API key headers; a missing key is a
//! configuration error, not a provider error, so the orchestrator can abort
//! a whole batch instead of spinning on every item.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Bound on every provider call. Timeouts are transient errors: the queue
/// entry stays put and the next batch retries it.
const PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Activity fields extracted from a provider payload. Everything is
/// optional; the schema mapper owns the defaulting policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderActivity {
    /// Provider's own activity identifier
    pub summary_id: Option<String>,
    /// Raw sport/movement string (provider vocabulary)
    pub sport: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub distance_metres: Option<f64>,
    pub total_calories: Option<f64>,
    pub active_calories: Option<f64>,
    pub steps: Option<u64>,
    pub avg_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub elevation_gain_metres: Option<f64>,
    pub elevation_loss_metres: Option<f64>,
}

/// A fully fetched payload: the extracted activity plus the verbatim
/// response body kept for the audit field.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub activity: ProviderActivity,
    pub raw: serde_json::Value,
}

/// Seam between the pipeline and the external provider, so tests can script
/// provider behavior without a network.
#[async_trait]
pub trait ActivityProvider: Send + Sync {
    /// Fail fast when provider credentials are not configured.
    fn ensure_configured(&self) -> Result<(), AppError>;

    /// Request an authorization URL for the given local user. The
    /// `reference_id` is echoed back by the provider in the auth webhook
    /// and is how the connection gets attributed to a local user.
    async fn generate_auth_url(
        &self,
        reference_id: &str,
        return_origin: &str,
    ) -> Result<String, AppError>;

    /// Fetch the full payload for a queued reference.
    async fn fetch_payload(
        &self,
        external_user_id: &str,
        payload_id: &str,
    ) -> Result<FetchedPayload, AppError>;

    /// Revoke the grant for an external user.
    async fn deauthenticate(&self, external_user_id: &str) -> Result<(), AppError>;
}

/// Terra API client.
#[derive(Clone)]
pub struct TerraClient {
    http: reqwest::Client,
    base_url: String,
    dev_id: Option<String>,
    api_key: Option<String>,
}

impl TerraClient {
    /// Create a new Terra client. Credentials may be absent; calls will
    /// return a configuration error until they are set.
    pub fn new(dev_id: Option<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            base_url: "https://api.tryterra.co/v2".to_string(),
            dev_id,
            api_key,
        }
    }

    /// Override the base URL (tests against a local server).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn credentials(&self) -> Result<(&str, &str), AppError> {
        let dev_id = self.dev_id.as_deref().ok_or(AppError::Config("TERRA_DEV_ID"))?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AppError::Config("TERRA_API_KEY"))?;
        Ok((dev_id, api_key))
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Terra rate limit hit (429)");
            }

            return Err(AppError::Provider(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("JSON parse error: {}", e)))
    }
}

/// Widget session response from Terra.
#[derive(Debug, Deserialize)]
struct WidgetSessionResponse {
    url: String,
}

#[async_trait]
impl ActivityProvider for TerraClient {
    fn ensure_configured(&self) -> Result<(), AppError> {
        self.credentials().map(|_| ())
    }

    async fn generate_auth_url(
        &self,
        reference_id: &str,
        return_origin: &str,
    ) -> Result<String, AppError> {
        let (dev_id, api_key) = self.credentials()?;
        let url = format!("{}/auth/generateWidgetSession", self.base_url);

        let body = serde_json::json!({
            "reference_id": reference_id,
            "providers": "GARMIN",
            "language": "en",
            "auth_success_redirect_url": return_origin,
            "auth_failure_redirect_url": return_origin,
        });

        let response = self
            .http
            .post(&url)
            .header("dev-id", dev_id)
            .header("x-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Widget session request failed: {}", e)))?;

        let session: WidgetSessionResponse = self.check_response_json(response).await?;
        Ok(session.url)
    }

    async fn fetch_payload(
        &self,
        external_user_id: &str,
        payload_id: &str,
    ) -> Result<FetchedPayload, AppError> {
        let (dev_id, api_key) = self.credentials()?;
        let url = format!(
            "{}/activity/{}",
            self.base_url,
            urlencoding::encode(payload_id)
        );

        let response = self
            .http
            .get(&url)
            .header("dev-id", dev_id)
            .header("x-api-key", api_key)
            .query(&[("user_id", external_user_id)])
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Payload fetch failed: {}", e)))?;

        let raw: serde_json::Value = self.check_response_json(response).await?;
        extract_activity(raw, payload_id)
    }

    async fn deauthenticate(&self, external_user_id: &str) -> Result<(), AppError> {
        let (dev_id, api_key) = self.credentials()?;
        let url = format!("{}/auth/deauthenticateUser", self.base_url);

        let response = self
            .http
            .delete(&url)
            .header("dev-id", dev_id)
            .header("x-api-key", api_key)
            .query(&[("user_id", external_user_id)])
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Deauthentication request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!("HTTP {}: {}", status, body)));
        }

        tracing::info!(external_user_id, "Provider grant revoked");
        Ok(())
    }
}

/// Pull the first activity out of a payload response body, keeping the body
/// verbatim for audit. An empty `data` array is the provider's
/// eventual-consistency gap, reported as `NoData` so the reference is
/// retried rather than dropped.
fn extract_activity(raw: serde_json::Value, payload_id: &str) -> Result<FetchedPayload, AppError> {
    let first = raw
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|a| a.first());

    let Some(first) = first else {
        return Err(AppError::NoData(format!(
            "payload {} had no activity data",
            payload_id
        )));
    };

    let activity: ProviderActivity = serde_json::from_value(first.clone())
        .map_err(|e| AppError::Provider(format!("Malformed activity payload: {}", e)))?;

    Ok(FetchedPayload { activity, raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_activity_empty_data_is_no_data() {
        let raw = serde_json::json!({ "data": [] });
        let err = extract_activity(raw, "p-1").unwrap_err();
        assert!(matches!(err, AppError::NoData(_)));
    }

    #[test]
    fn test_extract_activity_missing_data_is_no_data() {
        let raw = serde_json::json!({ "status": "processing" });
        let err = extract_activity(raw, "p-1").unwrap_err();
        assert!(matches!(err, AppError::NoData(_)));
    }

    #[test]
    fn test_extract_activity_preserves_raw_body() {
        let raw = serde_json::json!({
            "data": [{ "sport": "running", "distance_metres": 5000.0, "vendor_extra": "kept" }],
            "user": { "user_id": "ext-1" }
        });
        let fetched = extract_activity(raw.clone(), "p-1").unwrap();
        assert_eq!(fetched.activity.sport.as_deref(), Some("running"));
        assert_eq!(fetched.raw, raw);
        // Unrecognized fields survive in the audit copy
        assert_eq!(fetched.raw["data"][0]["vendor_extra"], "kept");
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let client = TerraClient::new(None, None);
        assert!(matches!(
            client.ensure_configured(),
            Err(AppError::Config(_))
        ));
    }
}
