// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use workout_tracker::config::Config;
use workout_tracker::db::{FirestoreDb, MemoryDb};
use workout_tracker::routes::create_router;
use workout_tracker::services::CatalogService;
use workout_tracker::time_utils::ManualClock;
use workout_tracker::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Fixed starting instant for the manual clock.
#[allow(dead_code)]
pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_261_600, 0).unwrap() // 2026-01-01T10:00:00Z
}

/// The catalog bundled with the crate.
#[allow(dead_code)]
pub fn test_catalog() -> Arc<CatalogService> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/catalog.json");
    Arc::new(CatalogService::load_from_file(path).expect("bundled catalog loads"))
}

/// A router over in-memory storage and a manual clock.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub db: Arc<MemoryDb>,
    pub clock: Arc<ManualClock>,
}

/// Create a test app with in-memory storage.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> TestApp {
    let db = Arc::new(MemoryDb::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let state = Arc::new(AppState::new(
        config,
        test_catalog(),
        db.clone(),
        db.clone(),
        clock.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        clock,
    }
}

/// Issue a valid access token for `user_id`.
#[allow(dead_code)]
pub fn create_test_jwt(state: &AppState, user_id: Uuid) -> String {
    state.tokens.issue(user_id).unwrap().access_token
}

/// Build a JSON request with a bearer token.
#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Send a request and decode the JSON body (`Value::Null` when empty).
#[allow(dead_code)]
pub async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}
