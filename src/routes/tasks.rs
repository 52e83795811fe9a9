// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Maintenance task routes.
//!
//! These endpoints are called by a scheduler, not directly by users. They are
//! guarded by the `x-tasks-token` shared secret (see `middleware::tasks_auth`).

use crate::config::MAX_RETENTION_DAYS;
use crate::error::{AppError, Result};
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Task handler routes. The token middleware is applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/tasks/purge-discarded", post(purge_discarded))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeDiscardedPayload {
    /// Overrides the configured retention period
    pub retention_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PurgeDiscardedResponse {
    pub removed: usize,
}

/// Hard-delete discarded sessions past retention.
async fn purge_discarded(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<PurgeDiscardedPayload>>,
) -> Result<Json<PurgeDiscardedResponse>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let retention_days = payload.retention_days.unwrap_or(state.config.retention_days);
    if !(0..=MAX_RETENTION_DAYS).contains(&retention_days) {
        return Err(AppError::ValidationFailed(format!(
            "'retentionDays' must be between 0 and {}",
            MAX_RETENTION_DAYS
        )));
    }

    tracing::info!(retention_days, "Purge discarded sessions task received");
    let removed = state.sessions.purge_discarded(retention_days).await?;
    Ok(Json(PurgeDiscardedResponse { removed }))
}
