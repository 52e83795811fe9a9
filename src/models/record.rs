// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Personal records: per (user, catalog activity) best values.
//!
//! Stored at: `activity_records/{user_id}_{activity_id}`
//!
//! Updated inside the same write that finishes a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Best observed values for one catalog activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub user_id: Uuid,
    pub activity_id: String,
    pub max_weight: Option<f64>,
    pub max_reps: Option<u32>,
    pub max_duration: Option<f64>,
    pub max_rpe: Option<f64>,
    pub max_heart_rate: Option<u32>,
    pub max_pace: Option<f64>,
    /// Number of finished sessions that included this activity
    #[serde(default)]
    pub times_performed: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Maxima observed in a single finished session for one catalog activity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordObservation {
    pub activity_id: String,
    pub max_weight: Option<f64>,
    pub max_reps: Option<u32>,
    pub max_duration: Option<f64>,
    pub max_rpe: Option<f64>,
    pub max_heart_rate: Option<u32>,
    pub max_pace: Option<f64>,
}

impl ActivityRecord {
    /// Storage document id.
    pub fn doc_id(user_id: Uuid, activity_id: &str) -> String {
        format!("{}_{}", user_id, activity_id)
    }

    /// First record for an activity the user never finished before.
    pub fn first(user_id: Uuid, obs: &RecordObservation, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            activity_id: obs.activity_id.clone(),
            max_weight: obs.max_weight,
            max_reps: obs.max_reps,
            max_duration: obs.max_duration,
            max_rpe: obs.max_rpe,
            max_heart_rate: obs.max_heart_rate,
            max_pace: obs.max_pace,
            times_performed: 1,
            recorded_at: now,
        }
    }

    /// Fold one session's observation into the stored record.
    ///
    /// Each field only ever grows; an absent observation keeps the stored value.
    pub fn merge(&mut self, obs: &RecordObservation, now: DateTime<Utc>) {
        self.max_weight = max_opt(self.max_weight, obs.max_weight);
        self.max_reps = max_opt(self.max_reps, obs.max_reps);
        self.max_duration = max_opt(self.max_duration, obs.max_duration);
        self.max_rpe = max_opt(self.max_rpe, obs.max_rpe);
        self.max_heart_rate = max_opt(self.max_heart_rate, obs.max_heart_rate);
        self.max_pace = max_opt(self.max_pace, obs.max_pace);
        self.times_performed += 1;
        self.recorded_at = now;
    }
}

/// Apply an observation to an optional existing record.
pub fn apply_observation(
    existing: Option<ActivityRecord>,
    user_id: Uuid,
    obs: &RecordObservation,
    now: DateTime<Utc>,
) -> ActivityRecord {
    match existing {
        Some(mut record) => {
            record.merge(obs, now);
            record
        }
        None => ActivityRecord::first(user_id, obs, now),
    }
}

fn max_opt<T: PartialOrd + Copy>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(x), Some(y)) => Some(if y > x { y } else { x }),
        (x, None) => x,
        (None, y) => y,
    }
}
