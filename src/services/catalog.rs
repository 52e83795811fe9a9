// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exercise catalog loading and lookup.

use crate::error::AppError;
use crate::models::catalog::{CatalogActivity, CatalogFile};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Read-only catalog, loaded once at startup.
#[derive(Debug, Default, Clone)]
pub struct CatalogService {
    activities: Vec<CatalogActivity>,
    by_id: HashMap<String, usize>,
}

impl CatalogService {
    /// Load the catalog from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| CatalogError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load the catalog from a JSON string.
    pub fn load_from_json(json_data: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(json_data).map_err(|e| CatalogError::ParseError(e.to_string()))?;

        let mut activities = file.activities;
        activities.sort_by(|a, b| a.name.cmp(&b.name));

        let mut by_id = HashMap::with_capacity(activities.len());
        for (index, activity) in activities.iter().enumerate() {
            if by_id.insert(activity.id.clone(), index).is_some() {
                return Err(CatalogError::DuplicateId(activity.id.clone()));
            }
        }

        tracing::info!(count = activities.len(), "Loaded exercise catalog");
        Ok(Self { activities, by_id })
    }

    pub fn get(&self, activity_id: &str) -> Option<&CatalogActivity> {
        self.by_id.get(activity_id).map(|&i| &self.activities[i])
    }

    /// Catalog lookup for the session engine.
    pub fn require(&self, activity_id: &str) -> Result<&CatalogActivity, AppError> {
        self.get(activity_id)
            .ok_or_else(|| AppError::NotFound(format!("Activity '{}'", activity_id)))
    }

    /// kcal/minute for an activity at a body weight; `None` if unknown.
    pub fn kcal_per_minute(&self, activity_id: &str, body_weight_kg: f64) -> Option<f64> {
        self.get(activity_id)?.kcal_per_minute(body_weight_kg)
    }

    /// Case-insensitive keyword search over name, category, equipment and muscles.
    /// Returns one page plus the total match count.
    pub fn search(
        &self,
        keyword: Option<&str>,
        page: usize,
        limit: usize,
    ) -> (Vec<&CatalogActivity>, usize) {
        let needle = keyword
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty());

        let matches: Vec<&CatalogActivity> = self
            .activities
            .iter()
            .filter(|a| match &needle {
                Some(n) => matches_keyword(a, n),
                None => true,
            })
            .collect();
        let total = matches.len();
        let start = page.saturating_sub(1).saturating_mul(limit);
        let page_items = matches.into_iter().skip(start).take(limit).collect();
        (page_items, total)
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

fn matches_keyword(activity: &CatalogActivity, needle: &str) -> bool {
    let hit = |s: &str| s.to_lowercase().contains(needle);
    hit(&activity.name)
        || hit(&activity.category)
        || activity.equipment.as_deref().is_some_and(hit)
        || activity.primary_muscles.iter().any(|m| hit(m))
        || activity.secondary_muscles.iter().any(|m| hit(m))
}

/// Catalog loading errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Duplicate activity id: {0}")]
    DuplicateId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "activities": [
            {"id": "plank", "name": "Plank", "category": "strength",
             "primary_muscles": ["abdominals"],
             "calorie_coefficients": [{"max_body_weight_kg": null, "kcal_per_minute": 3.0}]},
            {"id": "barbell_squat", "name": "Barbell Squat", "category": "strength",
             "equipment": "barbell", "primary_muscles": ["quadriceps"],
             "calorie_coefficients": [
                {"max_body_weight_kg": 80.0, "kcal_per_minute": 8.0},
                {"max_body_weight_kg": null, "kcal_per_minute": 9.5}]},
            {"id": "treadmill_run", "name": "Treadmill Run", "category": "cardio"}
        ]
    }"#;

    #[test]
    fn test_load_and_lookup() {
        let catalog = CatalogService::load_from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get("plank").unwrap().name, "Plank");
        assert!(catalog.get("burpee").is_none());
        assert!(matches!(
            catalog.require("burpee"),
            Err(AppError::NotFound(_))
        ));
        assert_eq!(catalog.kcal_per_minute("barbell_squat", 90.0), Some(9.5));
        assert_eq!(catalog.kcal_per_minute("treadmill_run", 90.0), None);
    }

    #[test]
    fn test_search_and_paging() {
        let catalog = CatalogService::load_from_json(CATALOG).unwrap();

        let (hits, total) = catalog.search(Some("BARBELL"), 1, 10);
        assert_eq!(total, 1);
        assert_eq!(hits[0].id, "barbell_squat");

        let (hits, total) = catalog.search(None, 2, 2);
        assert_eq!(total, 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Treadmill Run");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let json = r#"{"activities": [
            {"id": "a", "name": "A", "category": "x"},
            {"id": "a", "name": "B", "category": "x"}]}"#;
        assert!(matches!(
            CatalogService::load_from_json(json),
            Err(CatalogError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_bundled_catalog_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/catalog.json");
        let catalog = CatalogService::load_from_file(path).unwrap();
        assert!(catalog.get("barbell_bench_press").is_some());
    }
}
