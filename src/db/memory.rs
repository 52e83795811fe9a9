// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process storage backend.
//!
//! Used by tests and by `STORAGE_BACKEND=memory`. A single mutex guards all
//! rows, so each commit is trivially atomic.

use crate::db::{
    SessionFilter, SessionGuard, SessionLocks, SessionRepository, SessionWrite, SetLocation,
    TemplateStore,
};
use crate::error::AppError;
use crate::models::record::apply_observation;
use crate::models::{
    ActivityRecord, ActivitySet, Session, SessionActivity, SessionSnapshot, SessionStatus,
    WorkoutTemplate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<Uuid, Session>,
    activities: HashMap<Uuid, SessionActivity>,
    sets: HashMap<Uuid, ActivitySet>,
    records: HashMap<String, ActivityRecord>,
    templates: HashMap<Uuid, WorkoutTemplate>,
}

impl MemoryState {
    fn snapshot(&self, session_id: Uuid) -> Option<SessionSnapshot> {
        let session = self.sessions.get(&session_id)?.clone();
        let activities = self
            .activities
            .values()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect();
        let sets = self
            .sets
            .values()
            .filter(|s| s.session_id == session_id)
            .cloned()
            .collect();
        Some(SessionSnapshot::new(session, activities, sets))
    }

    fn remove_session(&mut self, session_id: Uuid) -> bool {
        self.sets.retain(|_, s| s.session_id != session_id);
        self.activities.retain(|_, a| a.session_id != session_id);
        self.sessions.remove(&session_id).is_some()
    }
}

/// In-memory session repository and template store.
#[derive(Clone, Default)]
pub struct MemoryDb {
    state: Arc<Mutex<MemoryState>>,
    locks: SessionLocks,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` fail with a storage error and write nothing.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of session-lock entries currently held in the lock map.
    pub fn lock_entries(&self) -> usize {
        self.locks.len()
    }

    /// Seed a session as-is, bypassing the state machine.
    pub async fn insert_snapshot(&self, snapshot: SessionSnapshot) {
        let mut state = self.state.lock().await;
        for activity in snapshot.activities {
            state.activities.insert(activity.id, activity);
        }
        for set in snapshot.sets {
            state.sets.insert(set.id, set);
        }
        state.sessions.insert(snapshot.session.id, snapshot.session);
    }
}

#[async_trait]
impl SessionRepository for MemoryDb {
    async fn lock_session(&self, session_id: Uuid) -> SessionGuard {
        self.locks.acquire(session_id).await
    }

    async fn create(&self, snapshot: &SessionSnapshot) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if state.sessions.contains_key(&snapshot.session.id) {
            return Err(AppError::Conflict(format!(
                "Session {} already exists",
                snapshot.session.id
            )));
        }
        for activity in &snapshot.activities {
            state.activities.insert(activity.id, activity.clone());
        }
        for set in &snapshot.sets {
            state.sets.insert(set.id, set.clone());
        }
        state
            .sessions
            .insert(snapshot.session.id, snapshot.session.clone());
        Ok(())
    }

    async fn get_by_id(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>, AppError> {
        Ok(self.state.lock().await.snapshot(session_id))
    }

    async fn locate_set(&self, set_id: Uuid) -> Result<Option<SetLocation>, AppError> {
        Ok(self.state.lock().await.sets.get(&set_id).map(|s| SetLocation {
            session_id: s.session_id,
            session_activity_id: s.session_activity_id,
        }))
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        filter: &SessionFilter,
        limit: usize,
    ) -> Result<Vec<Session>, AppError> {
        let state = self.state.lock().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .filter(|s| filter.status.is_none_or(|status| s.status == status))
            .filter(|s| filter.cursor.is_none_or(|c| c.precedes(s)))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| (b.started_at, b.id).cmp(&(a.started_at, a.id)));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn commit(&self, write: SessionWrite) -> Result<(), AppError> {
        let mut state = self.state.lock().await;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(AppError::Storage("injected commit failure".to_string()));
        }

        let session_id = write.session.id;
        let current = state
            .sessions
            .get(&session_id)
            .ok_or_else(|| AppError::NotFound(format!("Session {}", session_id)))?;
        if current.version != write.expected_version {
            return Err(AppError::Conflict(format!(
                "Session {} was modified concurrently",
                session_id
            )));
        }

        // Compute merged records before touching any row.
        let user_id = write.session.user_id;
        let merged: Vec<ActivityRecord> = write
            .records
            .iter()
            .map(|obs| {
                let key = ActivityRecord::doc_id(user_id, &obs.activity_id);
                let existing = state.records.get(&key).cloned();
                apply_observation(existing, user_id, obs, write.recorded_at)
            })
            .collect();

        for id in &write.removed_sets {
            state.sets.remove(id);
        }
        for id in &write.removed_activities {
            state.activities.remove(id);
        }
        for activity in write.upsert_activities {
            state.activities.insert(activity.id, activity);
        }
        for set in write.upsert_sets {
            state.sets.insert(set.id, set);
        }
        for record in merged {
            let key = ActivityRecord::doc_id(record.user_id, &record.activity_id);
            state.records.insert(key, record);
        }
        state.sessions.insert(session_id, write.session);
        Ok(())
    }

    async fn get_record(
        &self,
        user_id: Uuid,
        activity_id: &str,
    ) -> Result<Option<ActivityRecord>, AppError> {
        let key = ActivityRecord::doc_id(user_id, activity_id);
        Ok(self.state.lock().await.records.get(&key).cloned())
    }

    async fn list_records(&self, user_id: Uuid) -> Result<Vec<ActivityRecord>, AppError> {
        let state = self.state.lock().await;
        let mut records: Vec<ActivityRecord> = state
            .records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.activity_id.cmp(&b.activity_id));
        Ok(records)
    }

    async fn hard_delete(&self, session_id: Uuid) -> Result<bool, AppError> {
        let removed = self.state.lock().await.remove_session(session_id);
        Ok(removed)
    }

    async fn delete_discarded_before(&self, cutoff: DateTime<Utc>) -> Result<usize, AppError> {
        let mut state = self.state.lock().await;
        let expired: Vec<Uuid> = state
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Discarded)
            .filter(|s| s.ended_at.is_some_and(|ended| ended < cutoff))
            .map(|s| s.id)
            .collect();
        for id in &expired {
            state.remove_session(*id);
        }
        Ok(expired.len())
    }
}

#[async_trait]
impl TemplateStore for MemoryDb {
    async fn get_template(
        &self,
        template_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<WorkoutTemplate>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .templates
            .get(&template_id)
            .filter(|t| t.user_id == owner_id)
            .cloned())
    }

    async fn put_template(&self, template: &WorkoutTemplate) -> Result<(), AppError> {
        self.state
            .lock()
            .await
            .templates
            .insert(template.id, template.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordObservation;

    fn snapshot(user_id: Uuid) -> SessionSnapshot {
        let session = Session::new(user_id, "s".into(), None, SessionStatus::Active, Utc::now());
        let activity = SessionActivity::new(session.id, "deadlift".into(), 1);
        let set = ActivitySet::blank(session.id, activity.id, 1);
        SessionSnapshot::new(session, vec![activity], vec![set])
    }

    #[tokio::test]
    async fn test_stale_version_conflicts_and_writes_nothing() {
        let db = MemoryDb::new();
        let before = snapshot(Uuid::new_v4());
        db.create(&before).await.unwrap();

        let mut after = before.clone();
        after.session.name = "renamed".into();
        db.commit(SessionWrite::diff(&before, &after, Utc::now()))
            .await
            .unwrap();

        // Same base version again
        let mut stale = before.clone();
        stale.session.name = "stale".into();
        let err = db
            .commit(SessionWrite::diff(&before, &stale, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stored = db.get_by_id(before.session.id).await.unwrap().unwrap();
        assert_eq!(stored.session.name, "renamed");
        assert_eq!(stored.session.version, 1);
    }

    #[tokio::test]
    async fn test_injected_failure_leaves_records_untouched() {
        let db = MemoryDb::new();
        let user = Uuid::new_v4();
        let before = snapshot(user);
        db.create(&before).await.unwrap();

        let mut after = before.clone();
        after.session.status = SessionStatus::Finished;
        let write = SessionWrite::diff(&before, &after, Utc::now()).with_records(vec![
            RecordObservation {
                activity_id: "deadlift".into(),
                max_weight: Some(140.0),
                ..Default::default()
            },
        ]);

        db.fail_next_commit();
        assert!(matches!(
            db.commit(write.clone()).await,
            Err(AppError::Storage(_))
        ));
        assert!(db.get_record(user, "deadlift").await.unwrap().is_none());
        let stored = db.get_by_id(before.session.id).await.unwrap().unwrap();
        assert_eq!(stored.session.status, SessionStatus::Active);

        db.commit(write).await.unwrap();
        let record = db.get_record(user, "deadlift").await.unwrap().unwrap();
        assert_eq!(record.max_weight, Some(140.0));
    }

    #[tokio::test]
    async fn test_hard_delete_cascades() {
        let db = MemoryDb::new();
        let snap = snapshot(Uuid::new_v4());
        let set_id = snap.sets[0].id;
        db.create(&snap).await.unwrap();

        assert!(db.hard_delete(snap.session.id).await.unwrap());
        assert!(db.get_by_id(snap.session.id).await.unwrap().is_none());
        assert!(db.locate_set(set_id).await.unwrap().is_none());
        assert!(!db.hard_delete(snap.session.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_template_owner_scoped() {
        let db = MemoryDb::new();
        let owner = Uuid::new_v4();
        let template = WorkoutTemplate {
            id: Uuid::new_v4(),
            user_id: owner,
            name: "Push".into(),
            description: None,
            activities: vec![],
        };
        db.put_template(&template).await.unwrap();

        assert!(db
            .get_template(template.id, owner)
            .await
            .unwrap()
            .is_some());
        assert!(db
            .get_template(template.id, Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }
}
