// SPDX-License-Identifier: MIT

//! terra-sync API server
//!
//! Ingests third-party wearable activity data by receiving provider
//! webhooks, queuing payload references, and reconciling them into the
//! canonical activity store.

use std::sync::Arc;
use terra_sync::{config::Config, db::FirestoreStore, services::TerraClient, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting terra-sync API");

    // Initialize Firestore database
    let store = FirestoreStore::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Initialize provider client
    let provider = TerraClient::new(config.terra_dev_id.clone(), config.terra_api_key.clone());

    // Build shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(store),
        Arc::new(provider),
    ));

    // Build router
    let app = terra_sync::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("terra_sync=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
