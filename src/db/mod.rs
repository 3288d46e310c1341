// SPDX-License-Identifier: MIT

//! Database layer.
//!
//! All persistence goes through the [`Store`] trait so the pipeline can run
//! against Firestore in production and an in-memory store in tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{ActivityRecord, Connection, QueuedPayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const CONNECTIONS: &str = "connections";
    pub const PAYLOAD_QUEUE: &str = "payload_queue";
    pub const ACTIVITIES: &str = "activities";
}

/// Durable state shared by the pipeline: connections, the payload queue, and
/// canonical activity records.
#[async_trait]
pub trait Store: Send + Sync {
    // ─── Connection Operations ───────────────────────────────────

    /// Look up a connection by the provider-issued user ID.
    async fn get_connection_by_external(
        &self,
        external_user_id: &str,
    ) -> Result<Option<Connection>, AppError>;

    /// Look up a connection by local user and provider.
    async fn get_connection_by_local(
        &self,
        local_user_id: &str,
        provider: &str,
    ) -> Result<Option<Connection>, AppError>;

    /// Create or replace a connection (keyed by external user ID).
    async fn upsert_connection(&self, connection: &Connection) -> Result<(), AppError>;

    /// Delete a connection by external user ID. Deleting a missing
    /// connection is a no-op.
    async fn delete_connection(&self, external_user_id: &str) -> Result<(), AppError>;

    // ─── Payload Queue Operations ────────────────────────────────

    /// Insert a queue entry unless one with the same key already exists.
    /// Returns `true` when the entry was inserted, `false` on duplicate.
    async fn enqueue_payload(&self, payload: &QueuedPayload) -> Result<bool, AppError>;

    /// All entries that may be claimed at `now` (queued, or claimed with an
    /// expired lease), oldest first. Dead-letter entries are excluded.
    async fn list_claimable_payloads(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueuedPayload>, AppError>;

    /// Compare-and-swap claim: transition the entry to `claimed` stamped
    /// with `worker_id`, but only if it is still claimable at `now`.
    /// Returns `false` when another worker owns it or it no longer exists.
    async fn claim_payload(
        &self,
        key: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Release a claim after a transient failure: increment the retry count
    /// and return the entry to `queued`, or to `dead_letter` once the retry
    /// budget is exhausted.
    async fn release_payload(&self, key: &str) -> Result<(), AppError>;

    /// Remove a queue entry. This is the acknowledgment that the canonical
    /// record was durably written.
    async fn delete_payload(&self, key: &str) -> Result<(), AppError>;

    // ─── Activity Operations ─────────────────────────────────────

    /// Insert a canonical activity record.
    async fn insert_activity(&self, record: &ActivityRecord) -> Result<(), AppError>;

    /// Find an existing record by (provider, external_id). Commit-time
    /// dedup key for reprocessed payloads.
    async fn find_activity_by_external_id(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<ActivityRecord>, AppError>;

    /// Activities owned by a local user, newest first.
    async fn list_activities_for_user(
        &self,
        local_user_id: &str,
        limit: u32,
    ) -> Result<Vec<ActivityRecord>, AppError>;
}
