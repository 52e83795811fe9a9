// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout templates. Sessions started from a template copy its structure.

use crate::models::session::SetType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutTemplate {
    pub id: Uuid,
    /// Owner
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub activities: Vec<TemplateActivity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateActivity {
    /// Catalog activity id
    pub activity_id: String,
    pub order: u32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub sets: Vec<TemplateSet>,
}

/// Planned values for one set. Copied verbatim into the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSet {
    pub set_number: u32,
    pub set_type: SetType,
    pub reps: Option<u32>,
    pub weight: Option<f64>,
    pub duration_secs: Option<f64>,
    pub rpe: Option<f64>,
    pub pace: Option<f64>,
    pub heart_rate: Option<u32>,
    pub is_warmup: bool,
    pub is_cooldown: bool,
    pub rest_after_set: Option<u32>,
    pub notes: Option<String>,
}
