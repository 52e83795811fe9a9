// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session, activity and set routes for authenticated users.

use crate::db::{SessionCursor, SessionFilter};
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::events::SetPerformance;
use crate::models::views::{ActivityView, SessionSummary, SessionView, SetView};
use crate::models::{SessionStatus, SetType, TemplateSet};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use uuid::Uuid;
use validator::Validate;

/// Session routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/finish", post(finish_session))
        .route("/api/sessions/{id}/discard", post(discard_session))
        .route("/api/sessions/{id}/detach", post(detach_session))
        .route("/api/sessions/{id}/activities", post(add_activity))
        .route(
            "/api/sessions/{id}/activities/{sa_id}",
            delete(remove_activity),
        )
        .route(
            "/api/sessions/{id}/activities/{sa_id}/start",
            post(start_activity),
        )
        .route("/api/sessions/{id}/activities/{sa_id}/sets", post(add_set))
        .route("/api/sets/{set_id}/start", post(start_set))
        .route("/api/sets/{set_id}/complete", post(complete_set))
}

// ─── Lifecycle ───────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub template_id: Option<Uuid>,
    #[validate(length(max = 100))]
    pub name: Option<String>,
}

/// Start a session, empty or from a template.
async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>)> {
    body.validate()?;
    let snapshot = state
        .sessions
        .start_session(user.user_id, body.template_id, body.name)
        .await?;
    Ok((StatusCode::CREATED, Json(SessionView::from(&snapshot))))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>> {
    let snapshot = state.sessions.get_session(user.user_id, id).await?;
    Ok(Json(SessionView::from(&snapshot)))
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FinishSessionRequest {
    #[validate(range(min = 20.0, max = 400.0))]
    pub body_weight_kg: Option<f64>,
}

/// Finish an active session. The body is optional.
async fn finish_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    body: Option<Json<FinishSessionRequest>>,
) -> Result<Json<SessionView>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate()?;
    let snapshot = state
        .sessions
        .finish_session(user.user_id, id, body.body_weight_kg)
        .await?;
    Ok(Json(SessionView::from(&snapshot)))
}

async fn discard_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>> {
    let snapshot = state.sessions.discard_session(user.user_id, id).await?;
    Ok(Json(SessionView::from(&snapshot)))
}

async fn detach_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>> {
    let snapshot = state
        .sessions
        .detach_from_template(user.user_id, id)
        .await?;
    Ok(Json(SessionView::from(&snapshot)))
}

// ─── Listing ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct SessionsQuery {
    /// Filter by status (draft, active, finished, discarded)
    status: Option<String>,
    /// Cursor for forward pagination (opaque token).
    cursor: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    50
}

const MAX_LIMIT: u32 = 100;
const CURSOR_PARTS: usize = 3;

fn parse_cursor(cursor: Option<&str>) -> Result<Option<SessionCursor>> {
    cursor
        .map(|raw| {
            let invalid_cursor =
                || AppError::ValidationFailed("Invalid 'cursor' parameter".to_string());

            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            let decoded_str = std::str::from_utf8(&decoded).map_err(|_| invalid_cursor())?;

            let parts: Vec<&str> = decoded_str.split(':').collect();
            if parts.len() != CURSOR_PARTS {
                return Err(invalid_cursor());
            }

            let seconds = parts[0].parse::<i64>().map_err(|_| invalid_cursor())?;
            let nanos = parts[1].parse::<u32>().map_err(|_| invalid_cursor())?;
            let id = parts[2].parse::<Uuid>().map_err(|_| invalid_cursor())?;
            let started_at =
                chrono::DateTime::from_timestamp(seconds, nanos).ok_or_else(invalid_cursor)?;

            Ok(SessionCursor { started_at, id })
        })
        .transpose()
}

fn encode_cursor(cursor: SessionCursor) -> String {
    let payload = format!(
        "{}:{}:{}",
        cursor.started_at.timestamp(),
        cursor.started_at.timestamp_subsec_nanos(),
        cursor.id
    );
    URL_SAFE_NO_PAD.encode(payload)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
    pub next_cursor: Option<String>,
}

/// List the caller's sessions, newest first.
async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<SessionsQuery>,
) -> Result<Json<SessionsResponse>> {
    tracing::debug!(
        user_id = %user.user_id,
        status = ?params.status,
        cursor = ?params.cursor,
        limit = params.limit,
        "Listing sessions"
    );

    if params.limit == 0 {
        return Err(AppError::ValidationFailed(
            "'limit' must be at least 1".to_string(),
        ));
    }
    let limit = params.limit.min(MAX_LIMIT) as usize;
    let status = params
        .status
        .as_deref()
        .map(str::parse::<SessionStatus>)
        .transpose()?;
    let filter = SessionFilter {
        status,
        cursor: parse_cursor(params.cursor.as_deref())?,
    };

    // One extra row tells us whether another page exists.
    let mut sessions = state
        .sessions
        .list_sessions(user.user_id, &filter, limit + 1)
        .await?;
    let next_cursor = if sessions.len() > limit {
        sessions.truncate(limit);
        sessions.last().map(|s| encode_cursor(SessionCursor::of(s)))
    } else {
        None
    };

    Ok(Json(SessionsResponse {
        sessions: sessions.iter().map(SessionSummary::from).collect(),
        next_cursor,
    }))
}

// ─── Activities ──────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddActivityRequest {
    #[validate(length(min = 1, max = 100))]
    pub activity_id: String,
    /// Number of blank sets to create with the activity
    #[serde(default)]
    #[validate(range(max = 50))]
    pub sets: u32,
}

async fn add_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<AddActivityRequest>,
) -> Result<(StatusCode, Json<ActivityView>)> {
    body.validate()?;
    let view = state
        .sessions
        .add_activity(user.user_id, id, &body.activity_id, body.sets)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn start_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((id, sa_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ActivityView>> {
    let view = state
        .sessions
        .start_activity(user.user_id, id, sa_id)
        .await?;
    Ok(Json(view))
}

async fn remove_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((id, sa_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state
        .sessions
        .remove_activity(user.user_id, id, sa_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Sets ────────────────────────────────────────────────────

/// Planned values for a new set.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddSetRequest {
    #[serde(default)]
    pub set_type: SetType,
    #[validate(range(max = 10_000))]
    pub reps: Option<u32>,
    #[validate(range(min = 0.0, max = 2_000.0))]
    pub weight: Option<f64>,
    #[validate(range(min = 0.0))]
    pub duration_secs: Option<f64>,
    #[validate(range(min = 6.0, max = 10.0))]
    pub rpe: Option<f64>,
    #[validate(range(min = 0.0))]
    pub pace: Option<f64>,
    #[validate(range(min = 20, max = 250))]
    pub heart_rate: Option<u32>,
    #[serde(default)]
    pub is_warmup: bool,
    #[serde(default)]
    pub is_cooldown: bool,
    #[validate(range(max = 3_600))]
    pub rest_after_set: Option<u32>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

impl From<AddSetRequest> for TemplateSet {
    fn from(req: AddSetRequest) -> Self {
        TemplateSet {
            set_type: req.set_type,
            reps: req.reps,
            weight: req.weight,
            duration_secs: req.duration_secs,
            rpe: req.rpe,
            pace: req.pace,
            heart_rate: req.heart_rate,
            is_warmup: req.is_warmup,
            is_cooldown: req.is_cooldown,
            rest_after_set: req.rest_after_set,
            notes: req.notes,
            ..TemplateSet::default()
        }
    }
}

async fn add_set(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((id, sa_id)): Path<(Uuid, Uuid)>,
    body: Option<Json<AddSetRequest>>,
) -> Result<(StatusCode, Json<SetView>)> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate()?;
    let view = state
        .sessions
        .add_set(user.user_id, id, sa_id, body.into())
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn start_set(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(set_id): Path<Uuid>,
) -> Result<Json<SetView>> {
    let view = state.sessions.start_set(user.user_id, set_id).await?;
    Ok(Json(view))
}

async fn complete_set(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(set_id): Path<Uuid>,
    body: Option<Json<SetPerformance>>,
) -> Result<Json<SetView>> {
    let performance = body.map(|Json(p)| p).unwrap_or_default();
    performance.validate()?;
    let view = state
        .sessions
        .complete_set(user.user_id, set_id, performance)
        .await?;
    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_round_trip() {
        let cursor = SessionCursor {
            started_at: chrono::DateTime::from_timestamp(1_700_000_000, 123_000_000).unwrap(),
            id: Uuid::new_v4(),
        };
        let encoded = encode_cursor(cursor);
        assert_eq!(parse_cursor(Some(&encoded)).unwrap(), Some(cursor));
    }

    #[test]
    fn test_cursor_rejects_garbage() {
        let err = parse_cursor(Some("not-a-cursor")).unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));

        let two_parts = URL_SAFE_NO_PAD.encode("1700000000:0");
        assert!(parse_cursor(Some(&two_parts)).is_err());

        let bad_id = URL_SAFE_NO_PAD.encode("1700000000:0:42");
        assert!(parse_cursor(Some(&bad_id)).is_err());
    }

    #[test]
    fn test_add_set_request_defaults() {
        let req: AddSetRequest = serde_json::from_str(r#"{"reps": 8, "weight": 60}"#).unwrap();
        let plan = TemplateSet::from(req);
        assert_eq!(plan.reps, Some(8));
        assert_eq!(plan.weight, Some(60.0));
        assert_eq!(plan.set_type, SetType::Normal);
        assert!(!plan.is_warmup);
        assert_eq!(plan.pace, None);
    }

    #[test]
    fn test_add_set_request_carries_pace_and_heart_rate() {
        let req: AddSetRequest =
            serde_json::from_str(r#"{"durationSecs": 600, "pace": 5.5, "heartRate": 150}"#)
                .unwrap();
        assert!(req.validate().is_ok());

        let plan = TemplateSet::from(req);
        assert_eq!(plan.pace, Some(5.5));
        assert_eq!(plan.heart_rate, Some(150));
        assert_eq!(plan.duration_secs, Some(600.0));
    }

    #[test]
    fn test_add_set_request_rejects_bad_heart_rate() {
        let req: AddSetRequest = serde_json::from_str(r#"{"heartRate": 400}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
