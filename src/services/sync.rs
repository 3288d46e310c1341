// SPDX-License-Identifier: MIT

//! Batch sync orchestrator.
//!
//! Drives queued payload references through the pipeline: claim → resolve
//! identity → fetch → map → commit → dequeue. Items are independent; a
//! failure on one increments the error counter and the batch moves on. Only
//! configuration errors abort the run, since no item can succeed without
//! provider credentials.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{ActivityRecord, Connection, QueuedPayload};
use crate::services::mapper;
use crate::services::terra::ActivityProvider;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

/// Aggregate result of one batch run. Per-item detail is logged, not
/// returned.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchSummary {
    /// References committed and dequeued (or dequeued as already-committed
    /// duplicates)
    pub processed: u32,
    /// References attempted and left queued for retry
    pub errors: u32,
}

/// Orchestrates batch processing of queued payload references.
///
/// Webhook-triggered and manual syncs both run through `run_batch`; the
/// trigger only differs in logging.
#[derive(Clone)]
pub struct SyncService {
    store: Arc<dyn Store>,
    provider: Arc<dyn ActivityProvider>,
    /// Stamped on claims so a lease can be traced back to its worker.
    worker_id: String,
}

impl SyncService {
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn ActivityProvider>) -> Self {
        let worker_id = format!(
            "worker-{}-{}",
            std::process::id(),
            Utc::now().timestamp_millis()
        );
        Self {
            store,
            provider,
            worker_id,
        }
    }

    /// Process every claimable queue entry once, oldest first.
    pub async fn run_batch(&self, trigger: &str) -> Result<BatchSummary, AppError> {
        // No credentials, no batch. Retrying items individually would just
        // burn their retry budgets.
        self.provider.ensure_configured()?;

        let pending = self.store.list_claimable_payloads(Utc::now()).await?;
        tracing::info!(trigger, pending = pending.len(), "Starting sync batch");

        let mut summary = BatchSummary::default();

        for entry in pending {
            let key = entry.key();

            // Claim before any external call: at most one in-flight worker
            // owns a reference. Losing the race is not an error.
            if !self
                .store
                .claim_payload(&key, &self.worker_id, Utc::now())
                .await?
            {
                tracing::debug!(key, "Reference claimed elsewhere, skipping");
                continue;
            }

            match self.process_one(&entry).await {
                Ok(()) => {
                    summary.processed += 1;
                    // Dequeue is the acknowledgment. If it fails the entry
                    // is reprocessed next batch and commit-time dedup
                    // swallows the duplicate.
                    if let Err(e) = self.store.delete_payload(&key).await {
                        tracing::error!(key, error = %e, "Committed but failed to dequeue");
                    }
                }
                Err(e) if e.is_batch_fatal() => {
                    self.release(&key).await;
                    return Err(e);
                }
                Err(AppError::NotFound(msg)) => {
                    // Identity miss: expected after a disconnect or
                    // revocation, or for an unrecognized external ID. Skip,
                    // keep for retry.
                    tracing::info!(key, %msg, "No local identity for payload, skipping");
                    summary.errors += 1;
                    self.release(&key).await;
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "Transient failure, reference retained");
                    summary.errors += 1;
                    self.release(&key).await;
                }
            }
        }

        tracing::info!(
            trigger,
            processed = summary.processed,
            errors = summary.errors,
            "Sync batch finished"
        );
        Ok(summary)
    }

    /// Run a single reference through identity → fetch → map → commit.
    async fn process_one(&self, entry: &QueuedPayload) -> Result<(), AppError> {
        let connection = self
            .store
            .get_connection_by_external(&entry.external_user_id)
            .await?
            .filter(Connection::is_active)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "active connection for external user {}",
                    entry.external_user_id
                ))
            })?;

        let fetched = self
            .provider
            .fetch_payload(&entry.external_user_id, &entry.payload_id)
            .await?;

        let record = mapper::build_activity(&connection, entry, &fetched, Utc::now());
        self.commit(&record).await
    }

    /// Write the canonical record, skipping the write when a record with
    /// the same (provider, external_id) already exists. The skip closes the
    /// duplicate window left by the non-atomic commit-then-dequeue pair.
    async fn commit(&self, record: &ActivityRecord) -> Result<(), AppError> {
        if let Some(external_id) = &record.external_id {
            if self
                .store
                .find_activity_by_external_id(&record.provider, external_id)
                .await?
                .is_some()
            {
                tracing::debug!(
                    external_id,
                    "Activity already committed, dequeuing without a second write"
                );
                return Ok(());
            }
        }

        self.store.insert_activity(record).await?;
        tracing::info!(
            local_user_id = %record.local_user_id,
            activity_type = ?record.activity_type,
            "Canonical activity committed"
        );
        Ok(())
    }

    /// Return a claimed reference to the queue (or dead-letter it once the
    /// retry budget runs out). Release failures only get logged: the lease
    /// timeout reclaims the entry eventually.
    async fn release(&self, key: &str) {
        if let Err(e) = self.store.release_payload(key).await {
            tracing::error!(key, error = %e, "Failed to release claim");
        }
    }
}
