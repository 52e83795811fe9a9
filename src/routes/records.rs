// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Personal record routes.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::views::RecordView;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/records", get(list_records))
        .route("/api/records/{activity_id}", get(get_record))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RecordsResponse {
    pub records: Vec<RecordView>,
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RecordsResponse>> {
    let records = state.sessions.list_records(user.user_id).await?;
    Ok(Json(RecordsResponse {
        records: records.iter().map(RecordView::from).collect(),
    }))
}

async fn get_record(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(activity_id): Path<String>,
) -> Result<Json<RecordView>> {
    let record = state.sessions.get_record(user.user_id, &activity_id).await?;
    Ok(Json(RecordView::from(&record)))
}
