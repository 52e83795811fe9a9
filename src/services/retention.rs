// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic purge of old discarded sessions.

use crate::services::session::SessionEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawn the background sweeper. Returns `None` when `interval_secs` is 0.
pub fn spawn_sweeper(
    engine: Arc<SessionEngine>,
    retention_days: i64,
    interval_secs: u64,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        tracing::info!("Retention sweeper disabled");
        return None;
    }

    tracing::info!(retention_days, interval_secs, "Starting retention sweeper");
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = engine.purge_discarded(retention_days).await {
                tracing::error!(error = %e, "Retention sweep failed");
            }
        }
    }))
}
