// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Sessions (one document per session, version-checked on every commit)
//! - Session activities and sets (flat collections keyed by id)
//! - Activity records (personal bests, merged inside the finish transaction)
//! - Workout templates

use crate::db::{
    collections, SessionFilter, SessionGuard, SessionLocks, SessionRepository, SessionWrite,
    SetLocation, TemplateStore,
};
use crate::error::AppError;
use crate::models::record::apply_observation;
use crate::models::{
    ActivityRecord, ActivitySet, Session, SessionActivity, SessionSnapshot, SessionStatus,
    WorkoutTemplate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use firestore::{FirestoreConsistencySelector, FirestoreResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

// Attempts per session write before a contended transaction is a conflict.
const MAX_COMMIT_ATTEMPTS: usize = 5;

/// Stored form of a session.
///
/// Millisecond copies of the timestamps give the listing and retention
/// queries a sortable integer field.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionDoc {
    id: Uuid,
    user_id: Uuid,
    template_id: Option<Uuid>,
    status: SessionStatus,
    name: String,
    started_at: DateTime<Utc>,
    started_at_ms: i64,
    ended_at: Option<DateTime<Utc>>,
    ended_at_ms: Option<i64>,
    #[serde(default)]
    paused_duration_secs: f64,
    calories_burnt: Option<f64>,
    #[serde(default)]
    last_activity_order: u32,
    #[serde(default)]
    activity_count: u32,
    #[serde(default)]
    version: u64,
}

impl From<&Session> for SessionDoc {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            template_id: s.template_id,
            status: s.status,
            name: s.name.clone(),
            started_at: s.started_at,
            started_at_ms: s.started_at.timestamp_millis(),
            ended_at: s.ended_at,
            ended_at_ms: s.ended_at.map(|t| t.timestamp_millis()),
            paused_duration_secs: s.paused_duration_secs,
            calories_burnt: s.calories_burnt,
            last_activity_order: s.last_activity_order,
            activity_count: s.activity_count,
            version: s.version,
        }
    }
}

impl From<SessionDoc> for Session {
    fn from(d: SessionDoc) -> Self {
        Self {
            id: d.id,
            user_id: d.user_id,
            template_id: d.template_id,
            status: d.status,
            name: d.name,
            started_at: d.started_at,
            ended_at: d.ended_at,
            paused_duration_secs: d.paused_duration_secs,
            calories_burnt: d.calories_burnt,
            last_activity_order: d.last_activity_order,
            activity_count: d.activity_count,
            version: d.version,
        }
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
    locks: SessionLocks,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator takes an unauthenticated connection.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
            locks: SessionLocks::default(),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Storage(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
            locks: SessionLocks::default(),
        })
    }

    /// Create an offline client. Every storage call fails with `Storage`.
    pub fn new_mock() -> Self {
        Self {
            client: None,
            locks: SessionLocks::default(),
        }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Storage("Database not connected (offline mode)".to_string()))
    }

    // ─── Row Reads ─────────────────────────────────────────────────

    async fn get_session_doc(&self, session_id: Uuid) -> Result<Option<SessionDoc>, AppError> {
        read_session_doc(self.get_client()?, session_id)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    async fn activities_of(&self, session_id: Uuid) -> Result<Vec<SessionActivity>, AppError> {
        let session_id = session_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::SESSION_ACTIVITIES)
            .filter(move |q| q.for_all([q.field("session_id").eq(session_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    async fn sets_of(&self, session_id: Uuid) -> Result<Vec<ActivitySet>, AppError> {
        let session_id = session_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITY_SETS)
            .filter(move |q| q.for_all([q.field("session_id").eq(session_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    // ─── Helper Methods ────────────────────────────────────────────

    /// One commit attempt. Returns the number of records written.
    async fn try_commit(&self, write: &SessionWrite) -> Result<usize, CommitError> {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| classify("Failed to begin transaction", e))?;

        let reader = client.clone_with_consistency_selector(
            FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
        );
        let merged = match merged_records(&reader, write).await {
            Ok(merged) => merged,
            Err(e) => {
                let _ = transaction.rollback().await;
                return Err(e);
            }
        };

        // Row writes
        for id in &write.removed_sets {
            client
                .fluent()
                .delete()
                .from(collections::ACTIVITY_SETS)
                .document_id(id.to_string())
                .add_to_transaction(&mut transaction)
                .map_err(|e| classify("Failed to add set deletion to transaction", e))?;
        }
        for id in &write.removed_activities {
            client
                .fluent()
                .delete()
                .from(collections::SESSION_ACTIVITIES)
                .document_id(id.to_string())
                .add_to_transaction(&mut transaction)
                .map_err(|e| classify("Failed to add activity deletion to transaction", e))?;
        }
        for activity in &write.upsert_activities {
            client
                .fluent()
                .update()
                .in_col(collections::SESSION_ACTIVITIES)
                .document_id(activity.id.to_string())
                .object(activity)
                .add_to_transaction(&mut transaction)
                .map_err(|e| classify("Failed to add activity to transaction", e))?;
        }
        for set in &write.upsert_sets {
            client
                .fluent()
                .update()
                .in_col(collections::ACTIVITY_SETS)
                .document_id(set.id.to_string())
                .object(set)
                .add_to_transaction(&mut transaction)
                .map_err(|e| classify("Failed to add set to transaction", e))?;
        }
        for record in &merged {
            client
                .fluent()
                .update()
                .in_col(collections::ACTIVITY_RECORDS)
                .document_id(ActivityRecord::doc_id(record.user_id, &record.activity_id))
                .object(record)
                .add_to_transaction(&mut transaction)
                .map_err(|e| classify("Failed to add record to transaction", e))?;
        }

        // Session row last
        let doc = SessionDoc::from(&write.session);
        client
            .fluent()
            .update()
            .in_col(collections::SESSIONS)
            .document_id(write.session.id.to_string())
            .object(&doc)
            .add_to_transaction(&mut transaction)
            .map_err(|e| classify("Failed to add session to transaction", e))?;

        transaction
            .commit()
            .await
            .map_err(|e| classify("Transaction commit failed", e))?;
        Ok(merged.len())
    }


    /// Helper to batch delete documents using transactions.
    async fn batch_delete<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Storage(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Storage(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Why a commit attempt did not land.
enum CommitError {
    /// Firestore aborted the transaction; the attempt may be retried.
    Contended(String),
    Failed(AppError),
}

impl From<AppError> for CommitError {
    fn from(e: AppError) -> Self {
        CommitError::Failed(e)
    }
}

fn classify(context: &str, e: FirestoreError) -> CommitError {
    match &e {
        FirestoreError::DatabaseError(db_err) if db_err.retry_possible => {
            CommitError::Contended(format!("{}: {}", context, e))
        }
        _ => CommitError::Failed(AppError::Storage(format!("{}: {}", context, e))),
    }
}

async fn read_session_doc(
    db: &firestore::FirestoreDb,
    session_id: Uuid,
) -> FirestoreResult<Option<SessionDoc>> {
    db.fluent()
        .select()
        .by_id_in(collections::SESSIONS)
        .obj()
        .one(&session_id.to_string())
        .await
}

async fn read_record(
    db: &firestore::FirestoreDb,
    user_id: Uuid,
    activity_id: &str,
) -> FirestoreResult<Option<ActivityRecord>> {
    db.fluent()
        .select()
        .by_id_in(collections::ACTIVITY_RECORDS)
        .obj()
        .one(&ActivityRecord::doc_id(user_id, activity_id))
        .await
}

/// Check the stored version and merge personal records, reading through
/// `reader` (a transaction-bound client).
async fn merged_records(
    reader: &firestore::FirestoreDb,
    write: &SessionWrite,
) -> Result<Vec<ActivityRecord>, CommitError> {
    let session_id = write.session.id;
    let user_id = write.session.user_id;

    let current = read_session_doc(reader, session_id)
        .await
        .map_err(|e| classify("Failed to read session", e))?
        .ok_or_else(|| AppError::NotFound(format!("Session {}", session_id)))?;
    if current.version != write.expected_version {
        return Err(CommitError::Failed(AppError::Conflict(format!(
            "Session {} was modified concurrently",
            session_id
        ))));
    }

    let mut merged = Vec::with_capacity(write.records.len());
    for obs in &write.records {
        let existing = read_record(reader, user_id, &obs.activity_id)
            .await
            .map_err(|e| classify("Failed to read record", e))?;
        merged.push(apply_observation(existing, user_id, obs, write.recorded_at));
    }
    Ok(merged)
}

#[async_trait]
impl SessionRepository for FirestoreDb {
    async fn lock_session(&self, session_id: Uuid) -> SessionGuard {
        self.locks.acquire(session_id).await
    }

    async fn create(&self, snapshot: &SessionSnapshot) -> Result<(), AppError> {
        let client = self.get_client()?;
        let row_count = 1 + snapshot.activities.len() + snapshot.sets.len();
        if row_count > BATCH_SIZE {
            return Err(AppError::ValidationFailed(format!(
                "Session has too many rows to create atomically ({})",
                row_count
            )));
        }

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

        let doc = SessionDoc::from(&snapshot.session);
        client
            .fluent()
            .update()
            .in_col(collections::SESSIONS)
            .document_id(snapshot.session.id.to_string())
            .object(&doc)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Storage(format!("Failed to add session to transaction: {}", e)))?;

        for activity in &snapshot.activities {
            client
                .fluent()
                .update()
                .in_col(collections::SESSION_ACTIVITIES)
                .document_id(activity.id.to_string())
                .object(activity)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Storage(format!("Failed to add activity to transaction: {}", e))
                })?;
        }

        for set in &snapshot.sets {
            client
                .fluent()
                .update()
                .in_col(collections::ACTIVITY_SETS)
                .document_id(set.id.to_string())
                .object(set)
                .add_to_transaction(&mut transaction)
                .map_err(|e| AppError::Storage(format!("Failed to add set to transaction: {}", e)))?;
        }

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Storage(format!("Transaction commit failed: {}", e)))?;

        tracing::debug!(
            session_id = %snapshot.session.id,
            activities = snapshot.activities.len(),
            sets = snapshot.sets.len(),
            "Session created"
        );
        Ok(())
    }

    async fn get_by_id(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>, AppError> {
        let Some(doc) = self.get_session_doc(session_id).await? else {
            return Ok(None);
        };
        let activities = self.activities_of(session_id).await?;
        let sets = self.sets_of(session_id).await?;
        Ok(Some(SessionSnapshot::new(doc.into(), activities, sets)))
    }

    async fn locate_set(&self, set_id: Uuid) -> Result<Option<SetLocation>, AppError> {
        let set: Option<ActivitySet> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ACTIVITY_SETS)
            .obj()
            .one(&set_id.to_string())
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(set.map(|s| SetLocation {
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
        let user = user_id.to_string();
        let status = filter.status.map(|s| s.as_str().to_string());
        let cursor_ms = filter.cursor.map(|c| c.started_at.timestamp_millis());

        // Rows sharing the cursor's millisecond are re-read and filtered below.
        let docs: Vec<SessionDoc> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SESSIONS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user.clone()),
                    status
                        .clone()
                        .and_then(|status| q.field("status").eq(status)),
                    cursor_ms.and_then(|ms| q.field("started_at_ms").less_than_or_equal(ms)),
                ])
            })
            .order_by([
                ("started_at_ms", firestore::FirestoreQueryDirection::Descending),
                ("id", firestore::FirestoreQueryDirection::Descending),
            ])
            .limit((limit + 1) as u32 * 2)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let mut sessions: Vec<Session> = docs
            .into_iter()
            .map(Session::from)
            .filter(|s| filter.cursor.is_none_or(|c| c.precedes(s)))
            .collect();
        sessions.sort_by(|a, b| (b.started_at, b.id).cmp(&(a.started_at, a.id)));
        sessions.truncate(limit);
        Ok(sessions)
    }

    /// Apply one session write atomically.
    ///
    /// The version check and the personal-record reads run inside the write
    /// transaction, so Firestore locks those documents until commit. A
    /// transaction aborted under contention is retried from the reads.
    async fn commit(&self, write: SessionWrite) -> Result<(), AppError> {
        let session_id = write.session.id;
        let mut attempt = 1;
        loop {
            match self.try_commit(&write).await {
                Ok(records) => {
                    tracing::debug!(
                        session_id = %session_id,
                        version = write.session.version,
                        records,
                        attempt,
                        "Session write committed"
                    );
                    return Ok(());
                }
                Err(CommitError::Contended(reason)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::warn!(
                        session_id = %session_id,
                        attempt,
                        reason = %reason,
                        "Session write contended, retrying"
                    );
                    attempt += 1;
                }
                Err(CommitError::Contended(reason)) => {
                    return Err(AppError::Conflict(format!(
                        "Session {} write kept contending: {}",
                        session_id, reason
                    )));
                }
                Err(CommitError::Failed(e)) => return Err(e),
            }
        }
    }

    async fn get_record(
        &self,
        user_id: Uuid,
        activity_id: &str,
    ) -> Result<Option<ActivityRecord>, AppError> {
        read_record(self.get_client()?, user_id, activity_id)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    async fn list_records(&self, user_id: Uuid) -> Result<Vec<ActivityRecord>, AppError> {
        let user = user_id.to_string();
        let mut records: Vec<ActivityRecord> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITY_RECORDS)
            .filter(move |q| q.for_all([q.field("user_id").eq(user.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        records.sort_by(|a, b| a.activity_id.cmp(&b.activity_id));
        Ok(records)
    }

    async fn hard_delete(&self, session_id: Uuid) -> Result<bool, AppError> {
        if self.get_session_doc(session_id).await?.is_none() {
            return Ok(false);
        }

        // Children before parent
        let sets = self.sets_of(session_id).await?;
        self.batch_delete(&sets, collections::ACTIVITY_SETS, |s: &ActivitySet| {
            s.id.to_string()
        })
        .await?;

        let activities = self.activities_of(session_id).await?;
        self.batch_delete(
            &activities,
            collections::SESSION_ACTIVITIES,
            |a: &SessionActivity| a.id.to_string(),
        )
        .await?;

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::SESSIONS)
            .document_id(session_id.to_string())
            .execute()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        tracing::debug!(
            session_id = %session_id,
            sets = sets.len(),
            activities = activities.len(),
            "Session hard-deleted"
        );
        Ok(true)
    }

    async fn delete_discarded_before(&self, cutoff: DateTime<Utc>) -> Result<usize, AppError> {
        let cutoff_ms = cutoff.timestamp_millis();
        let expired: Vec<SessionDoc> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SESSIONS)
            .filter(move |q| {
                q.for_all([
                    q.field("status").eq(SessionStatus::Discarded.as_str()),
                    q.field("ended_at_ms").less_than(cutoff_ms),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let mut deleted = 0;
        for doc in &expired {
            if self.hard_delete(doc.id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl TemplateStore for FirestoreDb {
    async fn get_template(
        &self,
        template_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<WorkoutTemplate>, AppError> {
        let template: Option<WorkoutTemplate> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::WORKOUT_TEMPLATES)
            .obj()
            .one(&template_id.to_string())
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(template.filter(|t| t.user_id == owner_id))
    }

    async fn put_template(&self, template: &WorkoutTemplate) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::WORKOUT_TEMPLATES)
            .document_id(template.id.to_string())
            .object(template)
            .execute()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(())
    }
}
