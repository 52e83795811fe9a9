// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout-Tracker API Server
//!
//! Serves the session API and realtime session streams.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use workout_tracker::{
    config::{Config, StorageBackend},
    db::{FirestoreDb, MemoryDb, SessionRepository, TemplateStore},
    services::{retention, CatalogService},
    time_utils::SystemClock,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        storage = config.storage_backend.as_str(),
        "Starting Workout-Tracker API"
    );

    // Storage backend
    let (repo, templates): (Arc<dyn SessionRepository>, Arc<dyn TemplateStore>) =
        match config.storage_backend {
            StorageBackend::Firestore => {
                let db = Arc::new(FirestoreDb::new(&config.gcp_project_id).await?);
                (db.clone() as Arc<dyn SessionRepository>, db as Arc<dyn TemplateStore>)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                let db = Arc::new(MemoryDb::new());
                (db.clone() as Arc<dyn SessionRepository>, db as Arc<dyn TemplateStore>)
            }
        };

    // Load exercise catalog
    tracing::info!(path = %config.catalog_path, "Loading exercise catalog");
    let catalog = Arc::new(CatalogService::load_from_file(&config.catalog_path)?);
    tracing::info!(count = catalog.len(), "Exercise catalog loaded");

    let state = Arc::new(AppState::new(
        config.clone(),
        catalog,
        repo,
        templates,
        Arc::new(SystemClock),
    ));

    let _sweeper = retention::spawn_sweeper(
        state.sessions.clone(),
        config.retention_days,
        config.retention_sweep_interval_secs,
    );

    // Build router
    let app = workout_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("workout_tracker=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
