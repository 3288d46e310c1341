// SPDX-License-Identifier: MIT

//! Queued payload reference model.
//!
//! A queue entry records that the provider announced new data; it is not the
//! data itself. The entry is removed only after the canonical record has
//! been durably written, which is what makes a batch retry safe: an entry
//! that still exists will be retried, one that is gone will not be
//! re-fetched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attempts before a reference is moved to the dead-letter state.
pub const MAX_ATTEMPTS: u32 = 10;

/// Seconds after which an unfinished claim expires and the reference
/// becomes eligible for another worker.
pub const CLAIM_LEASE_SECS: i64 = 300;

/// Queue entry processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadStatus {
    /// Waiting to be processed.
    Queued,
    /// Owned by a single in-flight worker (until the lease expires).
    Claimed,
    /// Retry budget exhausted; excluded from batches, kept for inspection.
    DeadLetter,
}

/// Reference to a provider payload that has been announced but not yet
/// ingested. Uniquely identified by (external_user_id, payload_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedPayload {
    /// Provider-issued user ID the payload belongs to
    pub external_user_id: String,
    /// Provider-issued opaque payload ID
    pub payload_id: String,
    /// Data type announced by the provider (e.g. "activity")
    pub data_type: String,
    /// Optional start-time hint from the notification
    pub start_time: Option<DateTime<Utc>>,
    /// Optional end-time hint from the notification
    pub end_time: Option<DateTime<Utc>>,
    /// Processing state
    pub status: PayloadStatus,
    /// Worker currently holding the claim
    pub claimed_by: Option<String>,
    /// When the claim was taken (lease start)
    pub claimed_at: Option<DateTime<Utc>>,
    /// Transient failures so far
    pub retry_count: u32,
    /// When the notification was received
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedPayload {
    /// Create a fresh queue entry from a provider notification.
    pub fn new(
        external_user_id: String,
        payload_id: String,
        data_type: String,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            external_user_id,
            payload_id,
            data_type,
            start_time,
            end_time,
            status: PayloadStatus::Queued,
            claimed_by: None,
            claimed_at: None,
            retry_count: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// Composite key, also used as the document ID.
    ///
    /// Both components are opaque provider strings, so they are
    /// percent-encoded to keep the key unambiguous and path-safe.
    pub fn key(&self) -> String {
        payload_key(&self.external_user_id, &self.payload_id)
    }

    /// Whether this entry may be claimed at `now`: either queued, or claimed
    /// by a worker whose lease has expired.
    pub fn claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            PayloadStatus::Queued => true,
            PayloadStatus::Claimed => self
                .claimed_at
                .is_none_or(|t| now - t > chrono::Duration::seconds(CLAIM_LEASE_SECS)),
            PayloadStatus::DeadLetter => false,
        }
    }
}

/// Build the composite queue key for an (external user, payload) pair.
pub fn payload_key(external_user_id: &str, payload_id: &str) -> String {
    format!(
        "{}_{}",
        urlencoding::encode(external_user_id),
        urlencoding::encode(payload_id)
    )
}
