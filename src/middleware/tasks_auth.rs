// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared-secret authentication for maintenance task routes.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Header carrying the task token.
pub const TASKS_TOKEN_HEADER: &str = "x-tasks-token";

/// Require a matching `x-tasks-token` header for `/tasks/*` routes.
pub async fn require_tasks_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = request
        .headers()
        .get(TASKS_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok());

    let Some(presented) = presented else {
        tracing::warn!("Blocked tasks request without token header");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let expected = state.config.tasks_auth_token.as_bytes();
    if expected.is_empty() || !bool::from(presented.trim().as_bytes().ct_eq(expected)) {
        tracing::warn!("Blocked tasks request with invalid token");
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
