// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API response shapes (camelCase JSON). Also used as realtime event payloads.

use crate::models::{
    ActivityRecord, ActivitySet, Session, SessionActivity, SessionSnapshot, SessionStatus, SetType,
};
use crate::time_utils::format_utc_rfc3339;
use serde::Serialize;
use uuid::Uuid;

#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Session with its activities and their sets.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub template_id: Option<Uuid>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub status: SessionStatus,
    pub name: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub paused_duration_secs: f64,
    pub calories_burnt: Option<f64>,
    pub activities: Vec<ActivityView>,
}

/// List entry without nested activities.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub template_id: Option<Uuid>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub status: SessionStatus,
    pub name: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub calories_burnt: Option<f64>,
    pub activity_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct ActivityView {
    pub id: Uuid,
    pub session_id: Uuid,
    pub activity_id: String,
    pub order: u32,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub notes: Option<String>,
    pub rest_periods: Vec<f64>,
    pub sets: Vec<SetView>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct SetView {
    pub id: Uuid,
    pub session_activity_id: Uuid,
    pub set_number: u32,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub set_type: SetType,
    pub reps: Option<u32>,
    pub weight: Option<f64>,
    pub duration_secs: Option<f64>,
    pub rpe: Option<f64>,
    pub pace: Option<f64>,
    pub heart_rate: Option<u32>,
    pub is_active: bool,
    pub is_warmup: bool,
    pub is_cooldown: bool,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub rest_after_set: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    pub activity_id: String,
    pub max_weight: Option<f64>,
    pub max_reps: Option<u32>,
    pub max_duration: Option<f64>,
    pub max_rpe: Option<f64>,
    pub max_heart_rate: Option<u32>,
    pub max_pace: Option<f64>,
    pub times_performed: u32,
    pub recorded_at: String,
}

/// Payload of `activity_removed`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedActivity {
    pub id: Uuid,
    pub session_id: Uuid,
    pub order: u32,
}

impl From<&ActivitySet> for SetView {
    fn from(set: &ActivitySet) -> Self {
        Self {
            id: set.id,
            session_activity_id: set.session_activity_id,
            set_number: set.set_number,
            set_type: set.set_type,
            reps: set.reps,
            weight: set.weight,
            duration_secs: set.duration_secs,
            rpe: set.rpe,
            pace: set.pace,
            heart_rate: set.heart_rate,
            is_active: set.is_active,
            is_warmup: set.is_warmup,
            is_cooldown: set.is_cooldown,
            started_at: set.started_at.map(format_utc_rfc3339),
            ended_at: set.ended_at.map(format_utc_rfc3339),
            rest_after_set: set.rest_after_set,
            notes: set.notes.clone(),
        }
    }
}

impl ActivityView {
    pub fn build(activity: &SessionActivity, snapshot: &SessionSnapshot) -> Self {
        Self {
            id: activity.id,
            session_id: activity.session_id,
            activity_id: activity.activity_id.clone(),
            order: activity.order,
            started_at: activity.started_at.map(format_utc_rfc3339),
            ended_at: activity.ended_at.map(format_utc_rfc3339),
            notes: activity.notes.clone(),
            rest_periods: activity.rest_periods.clone(),
            sets: snapshot.sets_for(activity.id).map(SetView::from).collect(),
        }
    }
}

impl From<&SessionSnapshot> for SessionView {
    fn from(snapshot: &SessionSnapshot) -> Self {
        let s = &snapshot.session;
        Self {
            id: s.id,
            user_id: s.user_id,
            template_id: s.template_id,
            status: s.status,
            name: s.name.clone(),
            started_at: format_utc_rfc3339(s.started_at),
            ended_at: s.ended_at.map(format_utc_rfc3339),
            paused_duration_secs: s.paused_duration_secs,
            calories_burnt: s.calories_burnt,
            activities: snapshot
                .activities
                .iter()
                .map(|a| ActivityView::build(a, snapshot))
                .collect(),
        }
    }
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id,
            template_id: s.template_id,
            status: s.status,
            name: s.name.clone(),
            started_at: format_utc_rfc3339(s.started_at),
            ended_at: s.ended_at.map(format_utc_rfc3339),
            calories_burnt: s.calories_burnt,
            activity_count: s.activity_count,
        }
    }
}

impl From<&ActivityRecord> for RecordView {
    fn from(r: &ActivityRecord) -> Self {
        Self {
            activity_id: r.activity_id.clone(),
            max_weight: r.max_weight,
            max_reps: r.max_reps,
            max_duration: r.max_duration,
            max_rpe: r.max_rpe,
            max_heart_rate: r.max_heart_rate,
            max_pace: r.max_pace,
            times_performed: r.times_performed,
            recorded_at: format_utc_rfc3339(r.recorded_at),
        }
    }
}
