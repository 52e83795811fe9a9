// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exercise catalog entries (read-only reference data).

use serde::{Deserialize, Serialize};

/// Calories per minute for bodies up to `max_body_weight_kg`.
/// A bracket with no upper bound matches any weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalorieBracket {
    pub max_body_weight_kg: Option<f64>,
    pub kcal_per_minute: f64,
}

/// One exercise definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogActivity {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub primary_muscles: Vec<String>,
    #[serde(default)]
    pub secondary_muscles: Vec<String>,
    #[serde(default)]
    pub calorie_coefficients: Vec<CalorieBracket>,
}

impl CatalogActivity {
    /// kcal/minute for the given body weight, from the tightest matching bracket.
    pub fn kcal_per_minute(&self, body_weight_kg: f64) -> Option<f64> {
        let mut brackets: Vec<&CalorieBracket> = self.calorie_coefficients.iter().collect();
        // Bounded brackets first, smallest bound first; the open bracket last.
        brackets.sort_by(|a, b| match (a.max_body_weight_kg, b.max_body_weight_kg) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        brackets
            .into_iter()
            .find(|b| b.max_body_weight_kg.is_none_or(|max| body_weight_kg <= max))
            .map(|b| b.kcal_per_minute)
    }
}

/// On-disk catalog file layout.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub activities: Vec<CatalogActivity>,
}
