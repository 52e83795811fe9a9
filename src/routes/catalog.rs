// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exercise catalog routes (read-only).

use crate::error::{AppError, Result};
use crate::models::CatalogActivity;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/catalog/activities", get(search_activities))
        .route("/api/catalog/activities/{id}", get(get_activity))
}

/// Catalog data only changes on deploy.
const CATALOG_CACHE_CONTROL: &str = "private, max-age=3600";

#[derive(Deserialize)]
struct CatalogQuery {
    keyword: Option<String>,
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_page() -> u32 {
    1
}
fn default_limit() -> u32 {
    50
}

const MAX_LIMIT: u32 = 100;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CatalogActivityView {
    pub id: String,
    pub name: String,
    pub category: String,
    pub equipment: Option<String>,
    pub level: Option<String>,
    pub primary_muscles: Vec<String>,
    pub secondary_muscles: Vec<String>,
}

impl From<&CatalogActivity> for CatalogActivityView {
    fn from(a: &CatalogActivity) -> Self {
        Self {
            id: a.id.clone(),
            name: a.name.clone(),
            category: a.category.clone(),
            equipment: a.equipment.clone(),
            level: a.level.clone(),
            primary_muscles: a.primary_muscles.clone(),
            secondary_muscles: a.secondary_muscles.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CatalogResponse {
    pub activities: Vec<CatalogActivityView>,
    pub page: u32,
    pub limit: u32,
    pub total: u32,
}

async fn search_activities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CatalogQuery>,
) -> Result<impl IntoResponse> {
    if params.page == 0 || params.limit == 0 {
        return Err(AppError::ValidationFailed(
            "'page' and 'limit' must be at least 1".to_string(),
        ));
    }
    let limit = params.limit.min(MAX_LIMIT);
    let (activities, total) =
        state
            .catalog
            .search(params.keyword.as_deref(), params.page as usize, limit as usize);

    let body = CatalogResponse {
        activities: activities.into_iter().map(CatalogActivityView::from).collect(),
        page: params.page,
        limit,
        total: total as u32,
    };
    Ok(([(header::CACHE_CONTROL, CATALOG_CACHE_CONTROL)], Json(body)))
}

async fn get_activity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let activity = state.catalog.require(&id)?;
    Ok((
        [(header::CACHE_CONTROL, CATALOG_CACHE_CONTROL)],
        Json(CatalogActivityView::from(activity)),
    ))
}
