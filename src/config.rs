// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! Provider credentials are optional at startup: their absence is surfaced
//! as a configuration error at call time so the rest of the service (intake,
//! health, auth) keeps working while credentials are being rotated.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL for CORS and post-authorization redirects
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,

    /// Terra developer ID (public)
    pub terra_dev_id: Option<String>,
    /// Terra API key (secret)
    pub terra_api_key: Option<String>,
    /// Terra webhook signing secret; signature checks are skipped when unset
    /// (local development only)
    pub terra_signing_secret: Option<String>,
    /// JWT signing key for session token verification (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let config = Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            terra_dev_id: env::var("TERRA_DEV_ID")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            terra_api_key: env::var("TERRA_API_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            terra_signing_secret: env::var("TERRA_SIGNING_SECRET")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        };

        if config.terra_api_key.is_none() {
            tracing::warn!("TERRA_API_KEY not set; provider calls will fail until configured");
        }
        if config.terra_signing_secret.is_none() {
            tracing::warn!("TERRA_SIGNING_SECRET not set; webhook signatures will not be checked");
        }

        Ok(config)
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            terra_dev_id: Some("test-dev-id".to_string()),
            terra_api_key: Some("test-api-key".to_string()),
            terra_signing_secret: Some("test_signing_secret".to_string()),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("TERRA_DEV_ID", "dev-1");
        env::set_var("TERRA_API_KEY", "key-1");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.terra_dev_id.as_deref(), Some("dev-1"));
        assert_eq!(config.terra_api_key.as_deref(), Some("key-1"));
        assert_eq!(config.port, 8080);
    }
}
