// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Derived workout metrics: rest periods, calorie burn and personal-record
//! observations.
//!
//! Everything here is pure; the session engine feeds it snapshots and
//! catalog lookups.

use crate::models::{ActivitySet, RecordObservation, SessionActivity, SessionSnapshot};
use crate::time_utils::seconds_between;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Upper bound on the suggested rest after a set (seconds).
pub const MAX_SUGGESTED_REST_SECS: u32 = 300;

/// Fraction of a set's duration suggested as rest before the next set.
pub const REST_FRACTION: f64 = 0.3;

/// Suggested rest for the set following one that lasted `duration_secs`:
/// `min(300, floor(0.3 * duration))`.
pub fn suggested_rest_secs(duration_secs: f64) -> u32 {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return 0;
    }
    let rest = (REST_FRACTION * duration_secs).floor();
    if rest >= MAX_SUGGESTED_REST_SECS as f64 {
        MAX_SUGGESTED_REST_SECS
    } else {
        rest as u32
    }
}

/// Rest taken before a set that started at `started_at`, given the set before it.
///
/// Zero when there is no previous set, it never ended, or the clocks overlap.
pub fn rest_between(previous: Option<&ActivitySet>, started_at: DateTime<Utc>) -> f64 {
    previous
        .and_then(|p| p.ended_at)
        .map(|ended| seconds_between(ended, started_at).max(0.0))
        .unwrap_or(0.0)
}

/// Store `rest_secs` as the rest before set `set_number`.
///
/// The list is indexed by `set_number - 2` and padded with zeros, so
/// recomputing the same set overwrites its slot.
pub fn record_rest_period(activity: &mut SessionActivity, set_number: u32, rest_secs: f64) {
    if set_number < 2 {
        return;
    }
    let index = (set_number - 2) as usize;
    if activity.rest_periods.len() <= index {
        activity.rest_periods.resize(index + 1, 0.0);
    }
    activity.rest_periods[index] = rest_secs;
}

/// Total calories for a session.
///
/// `kcal_per_minute` resolves a catalog activity id to its coefficient for the
/// caller's weight bracket. Activities without one contribute nothing.
pub fn calories_burnt<F>(snapshot: &SessionSnapshot, kcal_per_minute: F) -> f64
where
    F: Fn(&str) -> Option<f64>,
{
    let mut total = 0.0;
    for activity in &snapshot.activities {
        let Some(coefficient) = kcal_per_minute(&activity.activity_id) else {
            continue;
        };
        let seconds: f64 = snapshot
            .sets_for(activity.id)
            .filter(|s| s.is_completed())
            .filter_map(|s| s.duration_secs)
            .sum();
        total += coefficient * seconds / 60.0;
    }
    total
}

/// Largest observed value, ignoring absent ones. `None` if nothing was observed.
pub fn max_observed<T, I>(values: I) -> Option<T>
where
    T: PartialOrd + Copy,
    I: IntoIterator<Item = Option<T>>,
{
    values.into_iter().flatten().fold(None, |best, v| match best {
        Some(b) if b >= v => Some(b),
        _ => Some(v),
    })
}

/// Session-local maxima per catalog activity, over completed sets only.
///
/// A catalog activity performed in several session-activities yields one
/// observation. Activities with no completed set yield none.
pub fn record_observations(snapshot: &SessionSnapshot) -> Vec<RecordObservation> {
    let mut by_activity: BTreeMap<&str, Vec<&ActivitySet>> = BTreeMap::new();
    for activity in &snapshot.activities {
        let completed: Vec<&ActivitySet> = snapshot
            .sets_for(activity.id)
            .filter(|s| s.is_completed())
            .collect();
        if !completed.is_empty() {
            by_activity
                .entry(activity.activity_id.as_str())
                .or_default()
                .extend(completed);
        }
    }

    by_activity
        .into_iter()
        .map(|(activity_id, sets)| RecordObservation {
            activity_id: activity_id.to_string(),
            max_weight: max_observed(sets.iter().map(|s| s.weight)),
            max_reps: max_observed(sets.iter().map(|s| s.reps)),
            max_duration: max_observed(sets.iter().map(|s| s.duration_secs)),
            max_rpe: max_observed(sets.iter().map(|s| s.rpe)),
            max_heart_rate: max_observed(sets.iter().map(|s| s.heart_rate)),
            max_pace: max_observed(sets.iter().map(|s| s.pace)),
        })
        .collect()
}
