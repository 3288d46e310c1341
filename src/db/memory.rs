// SPDX-License-Identifier: MIT

//! In-memory store for tests and local development.
//!
//! Semantics mirror the Firestore implementation; the claim CAS runs under
//! the map shard lock via `get_mut`, so two workers racing on the same key
//! cannot both win.

use crate::db::Store;
use crate::error::AppError;
use crate::models::payload::MAX_ATTEMPTS;
use crate::models::{ActivityRecord, Connection, PayloadStatus, QueuedPayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory implementation of [`Store`], backed by concurrent maps.
#[derive(Default)]
pub struct MemoryStore {
    connections: DashMap<String, Connection>,
    payloads: DashMap<String, QueuedPayload>,
    activities: DashMap<String, ActivityRecord>,
    next_activity_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently in the payload queue (any status).
    /// Test helper.
    pub fn queue_len(&self) -> usize {
        self.payloads.len()
    }

    /// Fetch a queue entry by key. Test helper.
    pub fn get_payload(&self, key: &str) -> Option<QueuedPayload> {
        self.payloads.get(key).map(|p| p.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_connection_by_external(
        &self,
        external_user_id: &str,
    ) -> Result<Option<Connection>, AppError> {
        Ok(self.connections.get(external_user_id).map(|c| c.clone()))
    }

    async fn get_connection_by_local(
        &self,
        local_user_id: &str,
        provider: &str,
    ) -> Result<Option<Connection>, AppError> {
        Ok(self
            .connections
            .iter()
            .find(|c| c.local_user_id == local_user_id && c.provider == provider)
            .map(|c| c.clone()))
    }

    async fn upsert_connection(&self, connection: &Connection) -> Result<(), AppError> {
        self.connections
            .insert(connection.external_user_id.clone(), connection.clone());
        Ok(())
    }

    async fn delete_connection(&self, external_user_id: &str) -> Result<(), AppError> {
        self.connections.remove(external_user_id);
        Ok(())
    }

    async fn enqueue_payload(&self, payload: &QueuedPayload) -> Result<bool, AppError> {
        match self.payloads.entry(payload.key()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(payload.clone());
                Ok(true)
            }
        }
    }

    async fn list_claimable_payloads(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueuedPayload>, AppError> {
        let mut items: Vec<QueuedPayload> = self
            .payloads
            .iter()
            .filter(|p| p.claimable(now))
            .map(|p| p.clone())
            .collect();
        items.sort_by_key(|p| p.enqueued_at);
        Ok(items)
    }

    async fn claim_payload(
        &self,
        key: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        match self.payloads.get_mut(key) {
            Some(mut entry) => {
                if !entry.claimable(now) {
                    return Ok(false);
                }
                entry.status = PayloadStatus::Claimed;
                entry.claimed_by = Some(worker_id.to_string());
                entry.claimed_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release_payload(&self, key: &str) -> Result<(), AppError> {
        if let Some(mut entry) = self.payloads.get_mut(key) {
            entry.retry_count += 1;
            entry.claimed_by = None;
            entry.claimed_at = None;
            entry.status = if entry.retry_count >= MAX_ATTEMPTS {
                PayloadStatus::DeadLetter
            } else {
                PayloadStatus::Queued
            };
        }
        Ok(())
    }

    async fn delete_payload(&self, key: &str) -> Result<(), AppError> {
        self.payloads.remove(key);
        Ok(())
    }

    async fn insert_activity(&self, record: &ActivityRecord) -> Result<(), AppError> {
        let doc_id = match &record.external_id {
            Some(id) => format!("{}_{}", record.provider, urlencoding::encode(id)),
            None => format!(
                "anon_{}",
                self.next_activity_id.fetch_add(1, Ordering::Relaxed)
            ),
        };
        self.activities.insert(doc_id, record.clone());
        Ok(())
    }

    async fn find_activity_by_external_id(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<ActivityRecord>, AppError> {
        Ok(self
            .activities
            .iter()
            .find(|a| a.provider == provider && a.external_id.as_deref() == Some(external_id))
            .map(|a| a.clone()))
    }

    async fn list_activities_for_user(
        &self,
        local_user_id: &str,
        limit: u32,
    ) -> Result<Vec<ActivityRecord>, AppError> {
        let mut items: Vec<ActivityRecord> = self
            .activities
            .iter()
            .filter(|a| a.local_user_id == local_user_id)
            .map(|a| a.clone())
            .collect();
        items.sort_by_key(|a| std::cmp::Reverse(a.start_time));
        items.truncate(limit as usize);
        Ok(items)
    }
}
