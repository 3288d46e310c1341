// SPDX-License-Identifier: MIT

//! Canonical activity record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical activity vocabulary.
///
/// Provider sport strings are normalized into this enum by the schema
/// mapper; anything unrecognized becomes `Other`. Adding a provider string
/// is a change to the mapper's vocabulary table, not to this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Running,
    Walking,
    Hiking,
    Cycling,
    Swimming,
    Rowing,
    Elliptical,
    StrengthTraining,
    Yoga,
    Pilates,
    Soccer,
    Tennis,
    Other,
}

/// Normalized representation of one physical activity session.
///
/// Written exactly once per successfully processed queue entry; this
/// pipeline never updates a record in place. `distance_km` and
/// `pace_min_per_km` are derived values, never independently entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Local user that owns this record
    pub local_user_id: String,
    /// Provider name (e.g. "garmin")
    pub provider: String,
    /// Provider-issued user ID, retained for audit
    pub external_user_id: String,
    /// Provider's own activity identifier, when available. Natural dedup key.
    pub external_id: Option<String>,
    /// Canonical activity type
    pub activity_type: ActivityType,
    /// Session start. Always populated: payload value, else the queue hint,
    /// else the processing timestamp.
    pub start_time: DateTime<Utc>,
    /// Session end, when the provider reported one
    pub end_time: Option<DateTime<Utc>>,
    /// Duration in seconds
    pub duration_seconds: Option<u32>,
    /// Distance in kilometres, rounded to 2 decimal places. Absent when the
    /// provider reported no distance; zero means "recorded as zero".
    pub distance_km: Option<f64>,
    /// Energy expenditure (total preferred over active)
    pub calories: Option<f64>,
    /// Step count
    pub steps: Option<u64>,
    /// Average heart rate (bpm)
    pub avg_heart_rate: Option<f64>,
    /// Maximum heart rate (bpm)
    pub max_heart_rate: Option<f64>,
    /// Elevation gained (metres)
    pub elevation_gain_m: Option<f64>,
    /// Elevation lost (metres)
    pub elevation_loss_m: Option<f64>,
    /// Minutes per kilometre, derived from duration and distance
    pub pace_min_per_km: Option<f64>,
    /// Full provider response, preserved verbatim for audit
    pub raw_payload: serde_json::Value,
    /// When this record was processed
    pub processed_at: DateTime<Utc>,
}
