// SPDX-License-Identifier: MIT

//! Firestore-backed [`Store`] implementation.
//!
//! Collections:
//! - `connections` (keyed by external user ID)
//! - `payload_queue` (keyed by the composite payload key)
//! - `activities` (keyed by provider + external activity ID)
//!
//! Timestamps are stored as RFC 3339 strings, which sort lexicographically,
//! so range filters and ordering work on them directly.

use crate::db::{collections, Store};
use crate::error::AppError;
use crate::models::payload::{CLAIM_LEASE_SECS, MAX_ATTEMPTS};
use crate::models::{ActivityRecord, Connection, PayloadStatus, QueuedPayload};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures_util::try_join;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated
        // connection to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a disconnected client for offline tests; every operation
    /// returns a database error.
    pub fn new_offline() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Document ID for an activity record: provider plus external activity
    /// ID when the provider supplied one, otherwise a timestamp-derived ID.
    fn activity_doc_id(record: &ActivityRecord) -> String {
        match &record.external_id {
            Some(id) => format!("{}_{}", record.provider, urlencoding::encode(id)),
            None => format!(
                "{}_{}_{}",
                record.provider,
                urlencoding::encode(&record.external_user_id),
                record.processed_at.timestamp_millis()
            ),
        }
    }
}

#[async_trait]
impl Store for FirestoreStore {
    // ─── Connection Operations ───────────────────────────────────

    async fn get_connection_by_external(
        &self,
        external_user_id: &str,
    ) -> Result<Option<Connection>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CONNECTIONS)
            .obj()
            .one(external_user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_connection_by_local(
        &self,
        local_user_id: &str,
        provider: &str,
    ) -> Result<Option<Connection>, AppError> {
        let local_user_id = local_user_id.to_string();
        let provider = provider.to_string();
        let mut matches: Vec<Connection> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::CONNECTIONS)
            .filter(move |q| {
                q.for_all([
                    q.field("local_user_id").eq(local_user_id.clone()),
                    q.field("provider").eq(provider.clone()),
                ])
            })
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(matches.pop())
    }

    async fn upsert_connection(&self, connection: &Connection) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::CONNECTIONS)
            .document_id(&connection.external_user_id)
            .object(connection)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_connection(&self, external_user_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::CONNECTIONS)
            .document_id(external_user_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Payload Queue Operations ────────────────────────────────

    async fn enqueue_payload(&self, payload: &QueuedPayload) -> Result<bool, AppError> {
        let key = payload.key();

        // Insert-if-absent: providers redeliver notifications, so a
        // duplicate key is a silent no-op, not an error.
        let existing: Option<QueuedPayload> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PAYLOAD_QUEUE)
            .obj()
            .one(&key)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if existing.is_some() {
            return Ok(false);
        }

        let _: () = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::PAYLOAD_QUEUE)
            .document_id(&key)
            .object(payload)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(true)
    }

    async fn list_claimable_payloads(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueuedPayload>, AppError> {
        // Firestore has no OR across fields, so this is two queries run
        // concurrently and merged: everything queued, plus claims whose
        // lease has expired.
        let client = self.get_client()?;
        let queued_query = client
            .fluent()
            .select()
            .from(collections::PAYLOAD_QUEUE)
            .filter(|q| q.field("status").eq("queued"))
            .obj()
            .query();

        let cutoff = (now - Duration::seconds(CLAIM_LEASE_SECS)).to_rfc3339();
        let expired_query = client
            .fluent()
            .select()
            .from(collections::PAYLOAD_QUEUE)
            .filter(move |q| {
                q.for_all([
                    q.field("status").eq("claimed"),
                    q.field("claimed_at").less_than(cutoff.clone()),
                ])
            })
            .obj()
            .query();

        let (queued, expired): (Vec<QueuedPayload>, Vec<QueuedPayload>) =
            try_join!(queued_query, expired_query)
                .map_err(|e| AppError::Database(e.to_string()))?;

        let mut items: Vec<QueuedPayload> = queued.into_iter().chain(expired).collect();
        items.sort_by_key(|p| p.enqueued_at);
        Ok(items)
    }

    async fn claim_payload(
        &self,
        key: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let client = self.get_client()?;

        // Transaction gives us the compare-and-swap. The read below carries
        // the transaction's consistency selector, so it joins the
        // transaction's read set; a concurrent claim then invalidates the
        // read and the commit fails instead of silently double-claiming.
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let txn_client = client.clone_with_consistency_selector(
            firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ),
        );

        let entry: Option<QueuedPayload> = txn_client
            .fluent()
            .select()
            .by_id_in(collections::PAYLOAD_QUEUE)
            .obj()
            .one(key)
            .await
            .map_err(|e| AppError::Database(format!("Failed to read queue entry: {}", e)))?;

        let Some(mut entry) = entry else {
            let _ = transaction.rollback().await;
            return Ok(false);
        };

        if !entry.claimable(now) {
            let _ = transaction.rollback().await;
            return Ok(false);
        }

        entry.status = PayloadStatus::Claimed;
        entry.claimed_by = Some(worker_id.to_string());
        entry.claimed_at = Some(now);

        client
            .fluent()
            .update()
            .in_col(collections::PAYLOAD_QUEUE)
            .document_id(key)
            .object(&entry)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add claim to transaction: {}", e)))?;

        match transaction.commit().await {
            Ok(_) => Ok(true),
            Err(e) => {
                // Lost the race to another worker.
                tracing::debug!(key, worker_id, error = %e, "Claim transaction contended");
                Ok(false)
            }
        }
    }

    async fn release_payload(&self, key: &str) -> Result<(), AppError> {
        let entry: Option<QueuedPayload> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PAYLOAD_QUEUE)
            .obj()
            .one(key)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let Some(mut entry) = entry else {
            return Ok(());
        };

        entry.retry_count += 1;
        entry.claimed_by = None;
        entry.claimed_at = None;
        entry.status = if entry.retry_count >= MAX_ATTEMPTS {
            tracing::warn!(
                key,
                retry_count = entry.retry_count,
                "Retry budget exhausted, moving to dead letter"
            );
            PayloadStatus::DeadLetter
        } else {
            PayloadStatus::Queued
        };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PAYLOAD_QUEUE)
            .document_id(key)
            .object(&entry)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_payload(&self, key: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::PAYLOAD_QUEUE)
            .document_id(key)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Activity Operations ─────────────────────────────────────

    async fn insert_activity(&self, record: &ActivityRecord) -> Result<(), AppError> {
        let doc_id = Self::activity_doc_id(record);
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ACTIVITIES)
            .document_id(&doc_id)
            .object(record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn find_activity_by_external_id(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<ActivityRecord>, AppError> {
        let provider = provider.to_string();
        let external_id = external_id.to_string();
        let mut matches: Vec<ActivityRecord> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| {
                q.for_all([
                    q.field("provider").eq(provider.clone()),
                    q.field("external_id").eq(external_id.clone()),
                ])
            })
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(matches.pop())
    }

    async fn list_activities_for_user(
        &self,
        local_user_id: &str,
        limit: u32,
    ) -> Result<Vec<ActivityRecord>, AppError> {
        let local_user_id = local_user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| q.field("local_user_id").eq(local_user_id.clone()))
            .order_by([(
                "start_time",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
