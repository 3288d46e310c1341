// SPDX-License-Identifier: MIT

//! Schema mapping from provider vocabulary to the canonical domain model.
//!
//! All defaulting policy lives here:
//! - sport strings map through a vocabulary table with an `other` fallback
//! - start_time falls back payload → queue hint → processing time
//! - distance is converted to km and rounded; absent stays absent
//! - total calories win over active calories
//! - pace is derived only when duration and nonzero distance exist

use crate::models::{ActivityRecord, ActivityType, Connection, QueuedPayload};
use crate::services::terra::FetchedPayload;
use chrono::{DateTime, Utc};

/// Provider sport string → canonical type. Lookup happens on the normalized
/// form (lowercase, separators collapsed to underscores), so adding a
/// provider spelling is one new row here.
const SPORT_VOCABULARY: &[(&str, ActivityType)] = &[
    ("running", ActivityType::Running),
    ("run", ActivityType::Running),
    ("trail_running", ActivityType::Running),
    ("treadmill_running", ActivityType::Running),
    ("indoor_running", ActivityType::Running),
    ("walking", ActivityType::Walking),
    ("walk", ActivityType::Walking),
    ("casual_walking", ActivityType::Walking),
    ("speed_walking", ActivityType::Walking),
    ("hiking", ActivityType::Hiking),
    ("hike", ActivityType::Hiking),
    ("cycling", ActivityType::Cycling),
    ("biking", ActivityType::Cycling),
    ("road_biking", ActivityType::Cycling),
    ("mountain_biking", ActivityType::Cycling),
    ("indoor_cycling", ActivityType::Cycling),
    ("virtual_ride", ActivityType::Cycling),
    ("swimming", ActivityType::Swimming),
    ("lap_swimming", ActivityType::Swimming),
    ("open_water_swimming", ActivityType::Swimming),
    ("rowing", ActivityType::Rowing),
    ("indoor_rowing", ActivityType::Rowing),
    ("elliptical", ActivityType::Elliptical),
    ("strength_training", ActivityType::StrengthTraining),
    ("weight_training", ActivityType::StrengthTraining),
    ("gym", ActivityType::StrengthTraining),
    ("yoga", ActivityType::Yoga),
    ("pilates", ActivityType::Pilates),
    ("soccer", ActivityType::Soccer),
    ("football", ActivityType::Soccer),
    ("tennis", ActivityType::Tennis),
];

/// Map a raw provider sport string to the canonical vocabulary.
/// Unrecognized strings (and absent ones) become `Other`, never an error.
pub fn canonical_activity_type(raw: Option<&str>) -> ActivityType {
    let Some(raw) = raw else {
        return ActivityType::Other;
    };

    let normalized: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect();

    SPORT_VOCABULARY
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, t)| *t)
        .unwrap_or(ActivityType::Other)
}

/// Build the canonical record draft from a fetched payload and its queue
/// entry. `now` is the processing timestamp, used as the start-time fallback
/// of last resort.
pub fn build_activity(
    connection: &Connection,
    queued: &QueuedPayload,
    fetched: &FetchedPayload,
    now: DateTime<Utc>,
) -> ActivityRecord {
    let activity = &fetched.activity;

    let start_time = activity
        .start_time
        .or(queued.start_time)
        .unwrap_or(now);

    let duration_seconds = activity.duration_seconds.map(|d| d.round() as u32);

    // Absent distance stays absent: zero would mean "recorded as zero".
    let distance_km = activity.distance_metres.map(|m| round2(m / 1000.0));

    let pace_min_per_km = match (duration_seconds, distance_km) {
        (Some(secs), Some(km)) if km > 0.0 => Some(round2(secs as f64 / 60.0 / km)),
        _ => None,
    };

    let calories = activity.total_calories.or(activity.active_calories);

    ActivityRecord {
        local_user_id: connection.local_user_id.clone(),
        provider: connection.provider.clone(),
        external_user_id: queued.external_user_id.clone(),
        external_id: activity.summary_id.clone(),
        activity_type: canonical_activity_type(activity.sport.as_deref()),
        start_time,
        end_time: activity.end_time.or(queued.end_time),
        duration_seconds,
        distance_km,
        calories,
        steps: activity.steps,
        avg_heart_rate: activity.avg_heart_rate,
        max_heart_rate: activity.max_heart_rate,
        elevation_gain_m: activity.elevation_gain_metres,
        elevation_loss_m: activity.elevation_loss_metres,
        pace_min_per_km,
        raw_payload: fetched.raw.clone(),
        processed_at: now,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
