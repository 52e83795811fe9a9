// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer: repository traits plus Firestore and in-memory backends.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{
    ActivityRecord, ActivitySet, RecordObservation, Session, SessionActivity, SessionSnapshot,
    SessionStatus, WorkoutTemplate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Collection names as constants.
pub mod collections {
    pub const SESSIONS: &str = "sessions";
    pub const SESSION_ACTIVITIES: &str = "session_activities";
    pub const ACTIVITY_SETS: &str = "activity_sets";
    /// Personal records (keyed by `{user_id}_{activity_id}`)
    pub const ACTIVITY_RECORDS: &str = "activity_records";
    pub const WORKOUT_TEMPLATES: &str = "workout_templates";
}

type LockTable = DashMap<Uuid, Arc<Mutex<()>>>;

/// Held while a state-machine operation runs on one session.
///
/// Dropping the last holder removes the session's entry from the lock table,
/// so the table only holds sessions with an operation in flight.
pub struct SessionGuard {
    session_id: Uuid,
    table: Arc<LockTable>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the mutex, so the entry survives them.
        self.table
            .remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Per-session exclusive locks.
///
/// Operations on one session queue behind each other; different sessions
/// never contend.
#[derive(Clone, Default)]
pub struct SessionLocks {
    table: Arc<LockTable>,
}

impl SessionLocks {
    pub async fn acquire(&self, session_id: Uuid) -> SessionGuard {
        let lock = self
            .table
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        SessionGuard {
            session_id,
            table: self.table.clone(),
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Where a set lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetLocation {
    pub session_id: Uuid,
    pub session_activity_id: Uuid,
}

/// Keyset position for session listing (`started_at` desc, then id desc).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCursor {
    pub started_at: DateTime<Utc>,
    pub id: Uuid,
}

impl SessionCursor {
    pub fn of(session: &Session) -> Self {
        Self {
            started_at: session.started_at,
            id: session.id,
        }
    }

    /// True if `session` sorts strictly after this cursor.
    pub fn precedes(&self, session: &Session) -> bool {
        (session.started_at, session.id) < (self.started_at, self.id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub cursor: Option<SessionCursor>,
}

/// One atomic change to a session aggregate.
#[derive(Debug, Clone)]
pub struct SessionWrite {
    /// Version the change was computed against
    pub expected_version: u64,
    /// New session row (its `version` is `expected_version + 1`)
    pub session: Session,
    pub upsert_activities: Vec<SessionActivity>,
    pub upsert_sets: Vec<ActivitySet>,
    /// Removed session-activities; their sets are listed in `removed_sets`
    pub removed_activities: Vec<Uuid>,
    pub removed_sets: Vec<Uuid>,
    /// Personal-record observations merged in the same write
    pub records: Vec<RecordObservation>,
    pub recorded_at: DateTime<Utc>,
}

impl SessionWrite {
    /// Compute the rows that differ between two versions of one aggregate.
    pub fn diff(before: &SessionSnapshot, after: &SessionSnapshot, now: DateTime<Utc>) -> Self {
        let mut session = after.session.clone();
        session.version = before.session.version + 1;

        let upsert_activities = after
            .activities
            .iter()
            .filter(|a| before.activity(a.id) != Some(a))
            .cloned()
            .collect();
        let upsert_sets = after
            .sets
            .iter()
            .filter(|s| before.set(s.id) != Some(s))
            .cloned()
            .collect();
        let removed_activities = before
            .activities
            .iter()
            .filter(|a| after.activity(a.id).is_none())
            .map(|a| a.id)
            .collect();
        let removed_sets = before
            .sets
            .iter()
            .filter(|s| after.set(s.id).is_none())
            .map(|s| s.id)
            .collect();

        Self {
            expected_version: before.session.version,
            session,
            upsert_activities,
            upsert_sets,
            removed_activities,
            removed_sets,
            records: Vec::new(),
            recorded_at: now,
        }
    }

    pub fn with_records(mut self, records: Vec<RecordObservation>) -> Self {
        self.records = records;
        self
    }
}

/// Durable storage for sessions, their activities and sets, and personal records.
///
/// Every write goes through [`SessionRepository::commit`], which applies the
/// whole change or nothing.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Exclusive lock for read-modify-commit on one session.
    async fn lock_session(&self, session_id: Uuid) -> SessionGuard;

    /// Insert a new aggregate atomically.
    async fn create(&self, snapshot: &SessionSnapshot) -> Result<(), AppError>;

    async fn get_by_id(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>, AppError>;

    async fn locate_set(&self, set_id: Uuid) -> Result<Option<SetLocation>, AppError>;

    /// A user's sessions, newest first, at most `limit`.
    async fn list_by_user(
        &self,
        user_id: Uuid,
        filter: &SessionFilter,
        limit: usize,
    ) -> Result<Vec<Session>, AppError>;

    /// Apply a write, failing with `Conflict` if the stored version moved.
    async fn commit(&self, write: SessionWrite) -> Result<(), AppError>;

    async fn get_record(
        &self,
        user_id: Uuid,
        activity_id: &str,
    ) -> Result<Option<ActivityRecord>, AppError>;

    async fn list_records(&self, user_id: Uuid) -> Result<Vec<ActivityRecord>, AppError>;

    /// Delete a session with its activities and sets. Returns false if absent.
    async fn hard_delete(&self, session_id: Uuid) -> Result<bool, AppError>;

    /// Hard-delete discarded sessions that ended before `cutoff`.
    async fn delete_discarded_before(&self, cutoff: DateTime<Utc>) -> Result<usize, AppError>;
}

/// Owner-scoped template lookup.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// `None` if the template is absent or not owned by `owner_id`.
    async fn get_template(
        &self,
        template_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<WorkoutTemplate>, AppError>;

    async fn put_template(&self, template: &WorkoutTemplate) -> Result<(), AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionStatus;

    fn snapshot() -> SessionSnapshot {
        let now = Utc::now();
        let session = Session::new(Uuid::new_v4(), "s".into(), None, SessionStatus::Active, now);
        let activity = SessionActivity::new(session.id, "plank".into(), 1);
        let set = ActivitySet::blank(session.id, activity.id, 1);
        SessionSnapshot::new(session, vec![activity], vec![set])
    }

    #[test]
    fn test_diff_only_changed_rows() {
        let before = snapshot();
        let mut after = before.clone();
        let set_id = after.sets[0].id;
        after.set_mut(set_id).unwrap().is_active = true;

        let write = SessionWrite::diff(&before, &after, Utc::now());

        assert_eq!(write.expected_version, 0);
        assert_eq!(write.session.version, 1);
        assert!(write.upsert_activities.is_empty());
        assert_eq!(write.upsert_sets.len(), 1);
        assert!(write.removed_sets.is_empty());
    }

    #[test]
    fn test_diff_removal_lists_sets() {
        let before = snapshot();
        let mut after = before.clone();
        after.activities.clear();
        after.sets.clear();

        let write = SessionWrite::diff(&before, &after, Utc::now());

        assert_eq!(write.removed_activities, vec![before.activities[0].id]);
        assert_eq!(write.removed_sets, vec![before.sets[0].id]);
    }

    #[test]
    fn test_cursor_precedes() {
        let now = Utc::now();
        let older = Session::new(
            Uuid::new_v4(),
            "a".into(),
            None,
            SessionStatus::Draft,
            now - chrono::Duration::minutes(5),
        );
        let newer = Session::new(Uuid::new_v4(), "b".into(), None, SessionStatus::Draft, now);
        let cursor = SessionCursor::of(&newer);
        assert!(cursor.precedes(&older));
        assert!(!cursor.precedes(&newer));
    }

    #[tokio::test]
    async fn test_session_locks_serialize_same_session() {
        let locks = SessionLocks::default();
        let id = Uuid::new_v4();
        let guard = locks.acquire(id).await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.acquire(id).await;
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();

        // A different session never waits.
        let a = locks.acquire(id).await;
        let b = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.len(), 2);

        drop(a);
        drop(b);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_lock_entry_kept_while_waiter_queued() {
        let locks = SessionLocks::default();
        let id = Uuid::new_v4();
        let guard = locks.acquire(id).await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move { other.acquire(id).await });
        tokio::task::yield_now().await;

        drop(guard);
        assert_eq!(locks.len(), 1);

        let second = waiter.await.unwrap();
        assert_eq!(locks.len(), 1);
        drop(second);
        assert!(locks.is_empty());
    }
}
