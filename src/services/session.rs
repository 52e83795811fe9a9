// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live workout session engine.
//!
//! Every mutating operation follows the same shape:
//! 1. take the per-session lock
//! 2. load the owner's snapshot
//! 3. validate and mutate a working copy
//! 4. commit the row diff (plus personal records on finish) in one write
//! 5. publish the resulting events while still holding the lock
//!
//! Holding the lock across commit and publish makes broadcast order equal to
//! commit order for each session.

use crate::db::{SessionFilter, SessionRepository, SessionWrite, TemplateStore};
use crate::error::AppError;
use crate::models::events::{EventKind, SetPerformance};
use crate::models::views::{ActivityView, RemovedActivity, SessionView, SetView};
use crate::models::{
    ActivityRecord, ActivitySet, RecordObservation, Session, SessionActivity, SessionEvent,
    SessionSnapshot, SessionStatus, TemplateSet, WorkoutTemplate,
};
use crate::services::broadcaster::Broadcaster;
use crate::services::catalog::CatalogService;
use crate::services::metrics;
use crate::time_utils::{seconds_between, Clock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Result of one mutation on a working snapshot.
struct Change<T> {
    value: T,
    records: Vec<RecordObservation>,
}

/// Per-operation context: who acts, when, and which events to publish.
struct Ctx {
    actor: Uuid,
    now: DateTime<Utc>,
    events: Vec<SessionEvent>,
}

impl Ctx {
    fn emit<P: Serialize>(&mut self, kind: EventKind, payload: &P) -> Result<(), AppError> {
        self.events
            .push(SessionEvent::new(kind, payload, self.actor, self.now)?);
        Ok(())
    }
}

/// The session state machine and its collaborators.
pub struct SessionEngine {
    repo: Arc<dyn SessionRepository>,
    templates: Arc<dyn TemplateStore>,
    catalog: Arc<CatalogService>,
    broadcaster: Broadcaster,
    clock: Arc<dyn Clock>,
    default_body_weight_kg: f64,
}

impl SessionEngine {
    pub fn new(
        repo: Arc<dyn SessionRepository>,
        templates: Arc<dyn TemplateStore>,
        catalog: Arc<CatalogService>,
        broadcaster: Broadcaster,
        clock: Arc<dyn Clock>,
        default_body_weight_kg: f64,
    ) -> Self {
        Self {
            repo,
            templates,
            catalog,
            broadcaster,
            clock,
            default_body_weight_kg,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ─── Reads ─────────────────────────────────────────────────────

    /// Live snapshot of a session owned by `user_id`.
    pub async fn get_session(&self, user_id: Uuid, session_id: Uuid) -> Result<SessionSnapshot, AppError> {
        load_owned(self.repo.as_ref(), user_id, session_id).await
    }

    /// Owner of a session, used by the realtime stream.
    pub async fn session_owner(&self, session_id: Uuid) -> Result<Uuid, AppError> {
        self.repo
            .get_by_id(session_id)
            .await?
            .map(|s| s.session.user_id)
            .ok_or_else(|| AppError::NotFound(format!("Session {}", session_id)))
    }

    /// Session that holds `set_id`.
    pub async fn session_of_set(&self, set_id: Uuid) -> Result<Uuid, AppError> {
        self.repo
            .locate_set(set_id)
            .await?
            .map(|loc| loc.session_id)
            .ok_or_else(|| AppError::NotFound(format!("Set {}", set_id)))
    }

    pub async fn list_sessions(
        &self,
        user_id: Uuid,
        filter: &SessionFilter,
        limit: usize,
    ) -> Result<Vec<Session>, AppError> {
        self.repo.list_by_user(user_id, filter, limit).await
    }

    pub async fn list_records(&self, user_id: Uuid) -> Result<Vec<ActivityRecord>, AppError> {
        self.repo.list_records(user_id).await
    }

    pub async fn get_record(&self, user_id: Uuid, activity_id: &str) -> Result<ActivityRecord, AppError> {
        self.repo
            .get_record(user_id, activity_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No record for activity '{}'", activity_id)))
    }

    // ─── Lifecycle ─────────────────────────────────────────────────

    /// Create a session, empty (draft) or copied from a template (active).
    pub async fn start_session(
        &self,
        user_id: Uuid,
        template_id: Option<Uuid>,
        name: Option<String>,
    ) -> Result<SessionSnapshot, AppError> {
        let now = self.clock.now();

        let snapshot = match template_id {
            Some(template_id) => {
                let template = self
                    .templates
                    .get_template(template_id, user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Template {}", template_id)))?;
                snapshot_from_template(user_id, &template, now)
            }
            None => {
                let name = name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| default_session_name(now));
                let session = Session::new(user_id, name, None, SessionStatus::Draft, now);
                SessionSnapshot::new(session, Vec::new(), Vec::new())
            }
        };

        self.repo.create(&snapshot).await?;

        let mut ctx = Ctx {
            actor: user_id,
            now,
            events: Vec::new(),
        };
        ctx.emit(EventKind::SessionStarted, &SessionView::from(&snapshot))?;
        self.publish(snapshot.session.id, ctx.events);

        tracing::info!(
            session_id = %snapshot.session.id,
            user_id = %user_id,
            template_id = ?template_id,
            status = %snapshot.session.status,
            activities = snapshot.activities.len(),
            sets = snapshot.sets.len(),
            "Session started"
        );
        Ok(snapshot)
    }

    /// Finish an active session: close it, compute calories, merge records.
    pub async fn finish_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        body_weight_kg: Option<f64>,
    ) -> Result<SessionSnapshot, AppError> {
        let weight = body_weight_kg.unwrap_or(self.default_body_weight_kg);
        let catalog = self.catalog.clone();

        let snapshot = self
            .mutate(user_id, session_id, move |s, ctx| {
                if s.session.status != SessionStatus::Active {
                    return Err(AppError::InvalidState(format!(
                        "Only active sessions can be finished (session is {})",
                        s.session.status
                    )));
                }

                // An in-progress set is abandoned, not completed.
                for set in s.sets.iter_mut().filter(|set| set.is_active) {
                    set.is_active = false;
                }
                for activity in s.activities.iter_mut().filter(|a| a.is_open()) {
                    activity.ended_at = Some(ctx.now);
                }

                let calories =
                    metrics::calories_burnt(s, |id| catalog.kcal_per_minute(id, weight));
                s.session.calories_burnt = Some(round_kcal(calories));
                s.session.transition(SessionStatus::Finished, ctx.now)?;

                let records = metrics::record_observations(s);
                ctx.emit(EventKind::SessionFinished, &SessionView::from(&*s))?;
                Ok(Change {
                    value: s.clone(),
                    records,
                })
            })
            .await?;

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            calories = snapshot.session.calories_burnt,
            "Session finished"
        );
        Ok(snapshot)
    }

    /// Abandon a draft or active session. No metrics are computed.
    pub async fn discard_session(&self, user_id: Uuid, session_id: Uuid) -> Result<SessionSnapshot, AppError> {
        let snapshot = self
            .mutate(user_id, session_id, |s, ctx| {
                s.session.transition(SessionStatus::Discarded, ctx.now)?;
                for set in s.sets.iter_mut().filter(|set| set.is_active) {
                    set.is_active = false;
                }
                ctx.emit(EventKind::SessionDiscarded, &SessionView::from(&*s))?;
                Ok(Change {
                    value: s.clone(),
                    records: Vec::new(),
                })
            })
            .await?;

        tracing::info!(session_id = %session_id, user_id = %user_id, "Session discarded");
        Ok(snapshot)
    }

    /// Drop the template link; a draft becomes active.
    pub async fn detach_from_template(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<SessionSnapshot, AppError> {
        let snapshot = self
            .mutate(user_id, session_id, |s, ctx| {
                s.session.ensure_mutable()?;
                if s.session.template_id.is_none() {
                    return Err(AppError::InvalidState(format!(
                        "Session {} has no template",
                        s.session.id
                    )));
                }
                s.session.template_id = None;
                s.session.transition(SessionStatus::Active, ctx.now)?;
                ctx.emit(EventKind::SessionDetached, &SessionView::from(&*s))?;
                Ok(Change {
                    value: s.clone(),
                    records: Vec::new(),
                })
            })
            .await?;

        tracing::info!(session_id = %session_id, user_id = %user_id, "Session detached from template");
        Ok(snapshot)
    }

    // ─── Activities ────────────────────────────────────────────────

    /// Append a catalog activity, optionally with `initial_sets` blank sets.
    pub async fn add_activity(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        activity_id: &str,
        initial_sets: u32,
    ) -> Result<ActivityView, AppError> {
        self.catalog.require(activity_id)?;
        let activity_id = activity_id.to_string();

        let view = self
            .mutate(user_id, session_id, move |s, ctx| {
                s.session.ensure_mutable()?;
                let sa_id = append_activity(s, activity_id, initial_sets);
                let view = activity_view(s, sa_id)?;
                ctx.emit(EventKind::ActivityAdded, &view)?;
                Ok(Change {
                    value: view,
                    records: Vec::new(),
                })
            })
            .await?;

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            session_activity_id = %view.id,
            activity_id = %view.activity_id,
            order = view.order,
            "Activity added"
        );
        Ok(view)
    }

    /// Mark a session-activity started, closing any other open one.
    pub async fn start_activity(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        session_activity_id: Uuid,
    ) -> Result<ActivityView, AppError> {
        let view = self
            .mutate(user_id, session_id, move |s, ctx| {
                s.session.ensure_mutable()?;
                require_activity(s, session_activity_id)?;
                open_activity(s, session_activity_id, ctx.now);
                let view = activity_view(s, session_activity_id)?;
                ctx.emit(EventKind::ActivityStarted, &view)?;
                Ok(Change {
                    value: view,
                    records: Vec::new(),
                })
            })
            .await?;

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            session_activity_id = %session_activity_id,
            "Activity started"
        );
        Ok(view)
    }

    /// Append a catalog activity and start it in one write (`exercise_start`).
    pub async fn exercise_start(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        activity_id: &str,
    ) -> Result<ActivityView, AppError> {
        self.catalog.require(activity_id)?;
        let activity_id = activity_id.to_string();

        let view = self
            .mutate(user_id, session_id, move |s, ctx| {
                s.session.ensure_mutable()?;
                let sa_id = append_activity(s, activity_id, 0);
                let added = activity_view(s, sa_id)?;
                ctx.emit(EventKind::ActivityAdded, &added)?;
                open_activity(s, sa_id, ctx.now);
                let view = activity_view(s, sa_id)?;
                ctx.emit(EventKind::ActivityStarted, &view)?;
                Ok(Change {
                    value: view,
                    records: Vec::new(),
                })
            })
            .await?;

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            session_activity_id = %view.id,
            activity_id = %view.activity_id,
            "Exercise started"
        );
        Ok(view)
    }

    /// Delete a session-activity and its sets. Its order is never handed out again.
    pub async fn remove_activity(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        session_activity_id: Uuid,
    ) -> Result<(), AppError> {
        self.mutate(user_id, session_id, move |s, ctx| {
            s.session.ensure_mutable()?;
            let order = require_activity(s, session_activity_id)?.order;
            if s.sets_for(session_activity_id).any(|set| set.is_active) {
                return Err(AppError::Conflict(
                    "Activity has a set in progress".to_string(),
                ));
            }

            s.activities.retain(|a| a.id != session_activity_id);
            s.sets.retain(|set| set.session_activity_id != session_activity_id);
            s.session.activity_count = s.session.activity_count.saturating_sub(1);

            ctx.emit(
                EventKind::ActivityRemoved,
                &RemovedActivity {
                    id: session_activity_id,
                    session_id: s.session.id,
                    order,
                },
            )?;
            Ok(Change {
                value: (),
                records: Vec::new(),
            })
        })
        .await?;

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            session_activity_id = %session_activity_id,
            "Activity removed"
        );
        Ok(())
    }

    // ─── Sets ──────────────────────────────────────────────────────

    /// Append a planned set with the next `set_number`.
    pub async fn add_set(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        session_activity_id: Uuid,
        plan: TemplateSet,
    ) -> Result<SetView, AppError> {
        let view = self
            .mutate(user_id, session_id, move |s, ctx| {
                s.session.ensure_mutable()?;
                require_activity(s, session_activity_id)?;
                let set_id = append_set(s, session_activity_id, &plan);
                let view = set_view(s, set_id)?;
                ctx.emit(EventKind::SetAdded, &view)?;
                Ok(Change {
                    value: view,
                    records: Vec::new(),
                })
            })
            .await?;

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            set_id = %view.id,
            set_number = view.set_number,
            "Set added"
        );
        Ok(view)
    }

    /// Activate a set. Any other active set in the session is deactivated.
    ///
    /// Starting a set in a draft session promotes it to active.
    pub async fn start_set(&self, user_id: Uuid, set_id: Uuid) -> Result<SetView, AppError> {
        let session_id = self.session_of_set(set_id).await?;
        let view = self
            .mutate(user_id, session_id, move |s, ctx| {
                activate_set(s, set_id, ctx)?;
                Ok(Change {
                    value: set_view(s, set_id)?,
                    records: Vec::new(),
                })
            })
            .await?;

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            set_id = %set_id,
            "Set started"
        );
        Ok(view)
    }

    /// Append a set to the current activity and start it (`set_start` without a set id).
    pub async fn start_next_set(&self, user_id: Uuid, session_id: Uuid) -> Result<SetView, AppError> {
        let view = self
            .mutate(user_id, session_id, |s, ctx| {
                s.session.ensure_mutable()?;
                let sa_id = s
                    .current_activity()
                    .map(|a| a.id)
                    .ok_or_else(|| AppError::InvalidState("No activity in progress".to_string()))?;
                let set_id = append_set(s, sa_id, &TemplateSet::default());
                ctx.emit(EventKind::SetAdded, &set_view(s, set_id)?)?;
                activate_set(s, set_id, ctx)?;
                Ok(Change {
                    value: set_view(s, set_id)?,
                    records: Vec::new(),
                })
            })
            .await?;

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            set_id = %view.id,
            set_number = view.set_number,
            "Next set started"
        );
        Ok(view)
    }

    /// Complete an active set, recording performance and derived rest.
    pub async fn complete_set(
        &self,
        user_id: Uuid,
        set_id: Uuid,
        performance: SetPerformance,
    ) -> Result<SetView, AppError> {
        let session_id = self.session_of_set(set_id).await?;
        let view = self
            .mutate(user_id, session_id, move |s, ctx| {
                finish_set(s, set_id, &performance, ctx)?;
                Ok(Change {
                    value: set_view(s, set_id)?,
                    records: Vec::new(),
                })
            })
            .await?;

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            set_id = %set_id,
            duration_secs = view.duration_secs,
            "Set completed"
        );
        Ok(view)
    }

    /// Complete whichever set is currently active (`set_complete` without a set id).
    pub async fn complete_active_set(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        performance: SetPerformance,
    ) -> Result<SetView, AppError> {
        let view = self
            .mutate(user_id, session_id, move |s, ctx| {
                s.session.ensure_mutable()?;
                let set_id = s
                    .active_set()
                    .map(|set| set.id)
                    .ok_or_else(|| AppError::Conflict("No set in progress".to_string()))?;
                finish_set(s, set_id, &performance, ctx)?;
                Ok(Change {
                    value: set_view(s, set_id)?,
                    records: Vec::new(),
                })
            })
            .await?;

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            set_id = %view.id,
            "Active set completed"
        );
        Ok(view)
    }

    // ─── Retention ─────────────────────────────────────────────────

    /// Hard-delete discarded sessions older than `retention_days`.
    pub async fn purge_discarded(&self, retention_days: i64) -> Result<usize, AppError> {
        let cutoff = chrono::Duration::try_days(retention_days)
            .and_then(|retention| self.clock.now().checked_sub_signed(retention))
            .ok_or_else(|| {
                AppError::ValidationFailed(format!(
                    "Retention of {} days is out of range",
                    retention_days
                ))
            })?;
        let removed = self.repo.delete_discarded_before(cutoff).await?;
        tracing::info!(
            retention_days,
            cutoff = %cutoff,
            removed,
            "Purged discarded sessions"
        );
        Ok(removed)
    }

    // ─── Internals ─────────────────────────────────────────────────

    /// Lock, load, apply `op` to a working copy, commit the diff, publish.
    ///
    /// Nothing is written or published when `op` fails. An `op` that leaves
    /// the snapshot unchanged writes nothing and publishes nothing.
    async fn mutate<T, F>(&self, user_id: Uuid, session_id: Uuid, op: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut SessionSnapshot, &mut Ctx) -> Result<Change<T>, AppError>,
    {
        let guard = self.repo.lock_session(session_id).await;
        let before = load_owned(self.repo.as_ref(), user_id, session_id).await?;

        let mut ctx = Ctx {
            actor: user_id,
            now: self.clock.now(),
            events: Vec::new(),
        };
        let mut after = before.clone();
        let change = op(&mut after, &mut ctx)?;

        if after == before && change.records.is_empty() {
            return Ok(change.value);
        }

        let write = SessionWrite::diff(&before, &after, ctx.now).with_records(change.records);
        self.repo.commit(write).await.inspect_err(|e| {
            tracing::error!(session_id = %session_id, error = %e, "Session write failed");
        })?;

        self.publish(session_id, ctx.events);
        drop(guard);
        Ok(change.value)
    }

    fn publish(&self, session_id: Uuid, events: Vec<SessionEvent>) {
        for event in &events {
            let delivered = self.broadcaster.publish(session_id, event);
            tracing::debug!(session_id = %session_id, kind = ?event.kind, delivered, "Event published");
        }
    }
}

// ─── Snapshot Transitions ──────────────────────────────────────────

async fn load_owned(
    repo: &dyn SessionRepository,
    user_id: Uuid,
    session_id: Uuid,
) -> Result<SessionSnapshot, AppError> {
    repo.get_by_id(session_id)
        .await?
        .filter(|s| s.session.user_id == user_id)
        .ok_or_else(|| AppError::NotFound(format!("Session {}", session_id)))
}

fn default_session_name(now: DateTime<Utc>) -> String {
    format!("Workout {}", now.format("%m/%d"))
}

fn round_kcal(kcal: f64) -> f64 {
    (kcal * 100.0).round() / 100.0
}

/// Copy a template into a new active session. Orders and set numbers are
/// renumbered from 1 in template order; planned values are kept.
fn snapshot_from_template(
    user_id: Uuid,
    template: &WorkoutTemplate,
    now: DateTime<Utc>,
) -> SessionSnapshot {
    let mut session = Session::new(
        user_id,
        template.name.clone(),
        Some(template.id),
        SessionStatus::Active,
        now,
    );

    let mut planned: Vec<_> = template.activities.iter().collect();
    planned.sort_by_key(|a| a.order);

    let mut activities = Vec::with_capacity(planned.len());
    let mut sets = Vec::new();
    for planned_activity in planned {
        let order = session.next_activity_order();
        let mut activity =
            SessionActivity::new(session.id, planned_activity.activity_id.clone(), order);
        activity.notes = planned_activity.notes.clone();

        let mut planned_sets: Vec<&TemplateSet> = planned_activity.sets.iter().collect();
        planned_sets.sort_by_key(|s| s.set_number);
        for (i, plan) in planned_sets.into_iter().enumerate() {
            sets.push(set_from_plan(session.id, activity.id, i as u32 + 1, plan));
        }
        activities.push(activity);
    }
    session.activity_count = activities.len() as u32;

    SessionSnapshot::new(session, activities, sets)
}

fn set_from_plan(session_id: Uuid, sa_id: Uuid, set_number: u32, plan: &TemplateSet) -> ActivitySet {
    let mut set = ActivitySet::blank(session_id, sa_id, set_number);
    set.set_type = plan.set_type;
    set.reps = plan.reps;
    set.weight = plan.weight;
    set.duration_secs = plan.duration_secs;
    set.rpe = plan.rpe;
    set.pace = plan.pace;
    set.heart_rate = plan.heart_rate;
    set.is_warmup = plan.is_warmup;
    set.is_cooldown = plan.is_cooldown;
    set.rest_after_set = plan.rest_after_set;
    set.notes = plan.notes.clone();
    set
}

fn require_activity(s: &SessionSnapshot, sa_id: Uuid) -> Result<&SessionActivity, AppError> {
    s.activity(sa_id)
        .ok_or_else(|| AppError::NotFound(format!("Session activity {}", sa_id)))
}

fn activity_view(s: &SessionSnapshot, sa_id: Uuid) -> Result<ActivityView, AppError> {
    Ok(ActivityView::build(require_activity(s, sa_id)?, s))
}

fn set_view(s: &SessionSnapshot, set_id: Uuid) -> Result<SetView, AppError> {
    s.set(set_id)
        .map(SetView::from)
        .ok_or_else(|| AppError::NotFound(format!("Set {}", set_id)))
}

fn append_activity(s: &mut SessionSnapshot, activity_id: String, initial_sets: u32) -> Uuid {
    let order = s.session.next_activity_order();
    s.session.activity_count += 1;
    let activity = SessionActivity::new(s.session.id, activity_id, order);
    let sa_id = activity.id;
    s.activities.push(activity);
    for n in 1..=initial_sets {
        s.push_set(ActivitySet::blank(s.session.id, sa_id, n));
    }
    sa_id
}

fn append_set(s: &mut SessionSnapshot, sa_id: Uuid, plan: &TemplateSet) -> Uuid {
    let set_number = s.next_set_number(sa_id);
    let mut set = set_from_plan(s.session.id, sa_id, set_number, plan);
    if set.rest_after_set.is_none() {
        set.rest_after_set = s
            .set_by_number(sa_id, set_number - 1)
            .and_then(|prev| prev.duration_secs.filter(|_| prev.is_completed()))
            .map(metrics::suggested_rest_secs);
    }
    let set_id = set.id;
    s.push_set(set);
    set_id
}

/// Start (or reopen) an activity and close every other open one.
fn open_activity(s: &mut SessionSnapshot, sa_id: Uuid, now: DateTime<Utc>) {
    for activity in s.activities.iter_mut() {
        if activity.id == sa_id {
            activity.ended_at = None;
            if activity.started_at.is_none() {
                activity.started_at = Some(now);
            }
        } else if activity.is_open() {
            activity.ended_at = Some(now);
        }
    }
}

fn activate_set(s: &mut SessionSnapshot, set_id: Uuid, ctx: &mut Ctx) -> Result<(), AppError> {
    s.session.ensure_mutable()?;
    let set = s
        .set(set_id)
        .ok_or_else(|| AppError::NotFound(format!("Set {}", set_id)))?;
    if set.is_completed() {
        return Err(AppError::Conflict(format!("Set {} already completed", set_id)));
    }
    if set.is_active {
        return Ok(());
    }
    let sa_id = set.session_activity_id;

    if s.session.status == SessionStatus::Draft {
        s.session.transition(SessionStatus::Active, ctx.now)?;
        ctx.emit(EventKind::SessionActivated, &SessionView::from(&*s))?;
    }

    // Preempted sets keep their start time and stay incomplete.
    for other in s.sets.iter_mut().filter(|o| o.is_active) {
        other.is_active = false;
    }

    let activity_was_open = s.activity(sa_id).is_some_and(|a| a.is_open());
    open_activity(s, sa_id, ctx.now);
    if !activity_was_open {
        ctx.emit(EventKind::ActivityStarted, &activity_view(s, sa_id)?)?;
    }

    if let Some(set) = s.set_mut(set_id) {
        set.is_active = true;
        set.started_at = Some(ctx.now);
    }
    ctx.emit(EventKind::SetStarted, &set_view(s, set_id)?)?;
    Ok(())
}

fn finish_set(
    s: &mut SessionSnapshot,
    set_id: Uuid,
    performance: &SetPerformance,
    ctx: &mut Ctx,
) -> Result<(), AppError> {
    s.session.ensure_mutable()?;
    let set = s
        .set(set_id)
        .ok_or_else(|| AppError::NotFound(format!("Set {}", set_id)))?;
    if set.is_completed() {
        return Err(AppError::Conflict(format!("Set {} already completed", set_id)));
    }
    if !set.is_active {
        return Err(AppError::Conflict(format!("Set {} was not started", set_id)));
    }
    let sa_id = set.session_activity_id;
    let set_number = set.set_number;
    let started_at = set.started_at.unwrap_or(ctx.now);
    let duration = seconds_between(started_at, ctx.now).max(0.0);

    let rest = metrics::rest_between(s.set_by_number(sa_id, set_number - 1), started_at);

    if let Some(set) = s.set_mut(set_id) {
        set.ended_at = Some(ctx.now);
        set.is_active = false;
        set.duration_secs = Some(duration);
        if performance.reps.is_some() {
            set.reps = performance.reps;
        }
        if performance.weight.is_some() {
            set.weight = performance.weight;
        }
        if performance.rpe.is_some() {
            set.rpe = performance.rpe;
        }
        if performance.notes.is_some() {
            set.notes = performance.notes.clone();
        }
        if performance.heart_rate.is_some() {
            set.heart_rate = performance.heart_rate;
        }
        if performance.pace.is_some() {
            set.pace = performance.pace;
        }
    }

    let next_id = s.set_by_number(sa_id, set_number + 1).map(|n| n.id);
    if let Some(next) = next_id.and_then(|id| s.set_mut(id)) {
        next.rest_after_set = Some(metrics::suggested_rest_secs(duration));
    }

    if let Some(activity) = s.activity_mut(sa_id) {
        metrics::record_rest_period(activity, set_number, rest);
    }

    ctx.emit(EventKind::SetCompleted, &set_view(s, set_id)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TemplateActivity;

    #[test]
    fn test_default_session_name() {
        let now = DateTime::from_timestamp(1_709_287_200, 0).unwrap(); // 2024-03-01
        assert_eq!(default_session_name(now), "Workout 03/01");
    }

    #[test]
    fn test_template_copy_renumbers_and_resets() {
        let user = Uuid::new_v4();
        let template = WorkoutTemplate {
            id: Uuid::new_v4(),
            user_id: user,
            name: "Pull".into(),
            description: None,
            activities: vec![
                TemplateActivity {
                    activity_id: "pull_up".into(),
                    order: 5,
                    notes: None,
                    sets: vec![TemplateSet {
                        set_number: 3,
                        reps: Some(8),
                        ..Default::default()
                    }],
                },
                TemplateActivity {
                    activity_id: "deadlift".into(),
                    order: 2,
                    notes: Some("belt".into()),
                    sets: vec![],
                },
            ],
        };
        let snap = snapshot_from_template(user, &template, Utc::now());

        assert_eq!(snap.session.status, SessionStatus::Active);
        assert_eq!(snap.session.name, "Pull");
        assert_eq!(snap.session.last_activity_order, 2);
        assert_eq!(snap.activities[0].activity_id, "deadlift");
        assert_eq!(snap.activities[0].order, 1);
        assert_eq!(snap.activities[1].order, 2);
        assert_eq!(snap.sets[0].set_number, 1);
        assert_eq!(snap.sets[0].reps, Some(8));
        assert!(!snap.sets[0].is_active);
        assert!(snap.sets[0].started_at.is_none());
    }

    #[test]
    fn test_round_kcal() {
        assert_eq!(round_kcal(16.00000001), 16.0);
        assert_eq!(round_kcal(12.346), 12.35);
    }
}
