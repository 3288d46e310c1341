// SPDX-License-Identifier: MIT

//! terra-sync: wearable activity ingestion for the life-management app
//!
//! This crate provides the backend service that receives provider webhook
//! notifications, queues payload references, and reconciles fetched
//! activity payloads into the canonical activity store.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::Store;
use services::{ActivityProvider, ConnectionService, SyncService};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub provider: Arc<dyn ActivityProvider>,
    pub connections: ConnectionService,
    pub sync: SyncService,
}

impl AppState {
    /// Wire up the service graph over a store and provider.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        provider: Arc<dyn ActivityProvider>,
    ) -> Self {
        let connections = ConnectionService::new(store.clone(), provider.clone());
        let sync = SyncService::new(store.clone(), provider.clone());
        Self {
            config,
            store,
            provider,
            connections,
            sync,
        }
    }
}
