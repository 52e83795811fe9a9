// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout session, session-activity and set records.
//!
//! A session owns its activities and their sets. Storage keeps them as flat
//! rows addressed by id; [`SessionSnapshot`] is the loaded aggregate the
//! state machine works on.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a workout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Draft,
    Active,
    Finished,
    Discarded,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Draft => "draft",
            SessionStatus::Active => "active",
            SessionStatus::Finished => "finished",
            SessionStatus::Discarded => "discarded",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Finished | SessionStatus::Discarded)
    }

    /// Legal lifecycle edges. `Active -> Active` covers nested mutations.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Draft, Active)
                | (Active, Active)
                | (Active, Finished)
                | (Draft, Discarded)
                | (Active, Discarded)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(SessionStatus::Draft),
            "active" => Ok(SessionStatus::Active),
            "finished" => Ok(SessionStatus::Finished),
            "discarded" => Ok(SessionStatus::Discarded),
            other => Err(AppError::ValidationFailed(format!(
                "Unknown session status '{}'",
                other
            ))),
        }
    }
}

/// Kind of set, carried over from templates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetType {
    #[default]
    Normal,
    Drop,
    Super,
}

/// One workout instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    /// Owner
    pub user_id: Uuid,
    pub template_id: Option<Uuid>,
    pub status: SessionStatus,
    pub name: String,
    pub started_at: DateTime<Utc>,
    /// Set iff status is terminal
    pub ended_at: Option<DateTime<Utc>>,
    pub paused_duration_secs: f64,
    /// Set iff status is `finished`
    pub calories_burnt: Option<f64>,
    /// Highest `order` ever handed out; orders are never reused.
    pub last_activity_order: u32,
    pub activity_count: u32,
    /// Bumped on every committed write (optimistic concurrency).
    pub version: u64,
}

impl Session {
    pub fn new(
        user_id: Uuid,
        name: String,
        template_id: Option<Uuid>,
        status: SessionStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            template_id,
            status,
            name,
            started_at: now,
            ended_at: None,
            paused_duration_secs: 0.0,
            calories_burnt: None,
            last_activity_order: 0,
            activity_count: 0,
            version: 0,
        }
    }

    /// Reject mutations once the session reached a terminal state.
    pub fn ensure_mutable(&self) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Session {} is {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Move to `next`, stamping `ended_at` when the new state is terminal.
    pub fn transition(&mut self, next: SessionStatus, now: DateTime<Utc>) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidState(format!(
                "Session {} cannot go from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        if next.is_terminal() {
            self.ended_at = Some(now);
        }
        Ok(())
    }

    /// Reserve the next activity order.
    pub fn next_activity_order(&mut self) -> u32 {
        self.last_activity_order += 1;
        self.last_activity_order
    }
}

/// One exercise performed within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionActivity {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Catalog activity id
    pub activity_id: String,
    /// Unique within the session, starts at 1
    pub order: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Rest before each set (seconds), indexed by `set_number - 2`.
    #[serde(default)]
    pub rest_periods: Vec<f64>,
}

impl SessionActivity {
    pub fn new(session_id: Uuid, activity_id: String, order: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            activity_id,
            order,
            started_at: None,
            ended_at: None,
            notes: None,
            rest_periods: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.started_at.is_some() && self.ended_at.is_none()
    }
}

/// One discrete effort within a session-activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySet {
    pub id: Uuid,
    pub session_id: Uuid,
    pub session_activity_id: Uuid,
    /// 1-based, sequential within the activity
    pub set_number: u32,
    #[serde(default)]
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
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Suggested rest before this set, derived from the previous set (seconds).
    pub rest_after_set: Option<u32>,
    pub notes: Option<String>,
}

impl ActivitySet {
    pub fn blank(session_id: Uuid, session_activity_id: Uuid, set_number: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            session_activity_id,
            set_number,
            set_type: SetType::Normal,
            reps: None,
            weight: None,
            duration_secs: None,
            rpe: None,
            pace: None,
            heart_rate: None,
            is_active: false,
            is_warmup: false,
            is_cooldown: false,
            started_at: None,
            ended_at: None,
            rest_after_set: None,
            notes: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// A session with all of its activities and sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: Session,
    pub activities: Vec<SessionActivity>,
    pub sets: Vec<ActivitySet>,
}

impl SessionSnapshot {
    /// Build a snapshot with activities ordered by `order` and sets grouped
    /// by activity, then by `set_number`.
    pub fn new(session: Session, mut activities: Vec<SessionActivity>, sets: Vec<ActivitySet>) -> Self {
        activities.sort_by_key(|a| a.order);
        let mut snapshot = Self {
            session,
            activities,
            sets,
        };
        snapshot.sort_sets();
        snapshot
    }

    fn sort_sets(&mut self) {
        let activities = &self.activities;
        let order_of = |sa_id: Uuid| {
            activities
                .iter()
                .find(|a| a.id == sa_id)
                .map_or(u32::MAX, |a| a.order)
        };
        self.sets
            .sort_by_key(|s| (order_of(s.session_activity_id), s.set_number, s.id));
    }

    pub fn activity(&self, id: Uuid) -> Option<&SessionActivity> {
        self.activities.iter().find(|a| a.id == id)
    }

    pub fn activity_mut(&mut self, id: Uuid) -> Option<&mut SessionActivity> {
        self.activities.iter_mut().find(|a| a.id == id)
    }

    pub fn set(&self, id: Uuid) -> Option<&ActivitySet> {
        self.sets.iter().find(|s| s.id == id)
    }

    pub fn set_mut(&mut self, id: Uuid) -> Option<&mut ActivitySet> {
        self.sets.iter_mut().find(|s| s.id == id)
    }

    /// Sets of one session-activity, in `set_number` order.
    pub fn sets_for(&self, session_activity_id: Uuid) -> impl Iterator<Item = &ActivitySet> {
        self.sets
            .iter()
            .filter(move |s| s.session_activity_id == session_activity_id)
    }

    pub fn set_by_number(&self, session_activity_id: Uuid, set_number: u32) -> Option<&ActivitySet> {
        self.sets_for(session_activity_id)
            .find(|s| s.set_number == set_number)
    }

    pub fn next_set_number(&self, session_activity_id: Uuid) -> u32 {
        self.sets_for(session_activity_id)
            .map(|s| s.set_number)
            .max()
            .unwrap_or(0)
            + 1
    }

    pub fn active_set(&self) -> Option<&ActivitySet> {
        self.sets.iter().find(|s| s.is_active)
    }

    pub fn active_set_count(&self) -> usize {
        self.sets.iter().filter(|s| s.is_active).count()
    }

    /// The current activity: highest order whose end timestamp is unset.
    pub fn current_activity(&self) -> Option<&SessionActivity> {
        self.activities
            .iter()
            .filter(|a| a.ended_at.is_none())
            .max_by_key(|a| a.order)
    }

    pub fn push_set(&mut self, set: ActivitySet) {
        self.sets.push(set);
        self.sort_sets();
    }
}
