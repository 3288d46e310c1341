// SPDX-License-Identifier: MIT

//! Provider connection model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Active,
    Revoked,
}

/// Link between a local user and the wearable provider.
///
/// Created when the provider confirms authorization (auth webhook). A
/// deauth webhook flips the state to `Revoked` but keeps the record for
/// audit; only an explicit disconnect deletes it. At most one active
/// connection per (local user, provider) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// Provider-issued opaque user ID (also used as document ID)
    pub external_user_id: String,
    /// Local user that owns this connection
    pub local_user_id: String,
    /// Provider name (e.g. "garmin")
    pub provider: String,
    /// Granted permission scopes
    pub scopes: Vec<String>,
    /// Connection state
    pub state: ConnectionState,
    /// When the connection was established
    pub created_at: DateTime<Utc>,
}

impl Connection {
    /// Whether payloads from this connection may still be attributed.
    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }
}
