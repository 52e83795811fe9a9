// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use workout_tracker::error::AppError;

async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[test]
fn test_error_codes_and_statuses() {
    let cases = [
        (AppError::Unauthenticated, StatusCode::UNAUTHORIZED, "unauthenticated"),
        (AppError::Unauthorized("x".into()), StatusCode::FORBIDDEN, "forbidden"),
        (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "not_found"),
        (AppError::InvalidState("x".into()), StatusCode::CONFLICT, "invalid_state"),
        (AppError::Conflict("x".into()), StatusCode::CONFLICT, "conflict"),
        (AppError::ValidationFailed("x".into()), StatusCode::BAD_REQUEST, "validation_failed"),
        (AppError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
    ];
    for (err, status, code) in cases {
        assert_eq!(err.status(), status, "{}", code);
        assert_eq!(err.code(), code);
    }
}

#[tokio::test]
async fn test_client_errors_carry_details() {
    let (status, body) = body_of(AppError::InvalidState("Session abc is finished".into())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");
    assert_eq!(body["details"], "Session abc is finished");
}

#[tokio::test]
async fn test_server_errors_hide_details() {
    let (status, body) = body_of(AppError::Storage("connection reset by 10.0.0.7".into())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "storage_error");
    assert!(body.get("details").is_none());

    let (_, body) = body_of(AppError::Internal(anyhow::anyhow!("secret stack"))).await;
    assert_eq!(body["error"], "internal_error");
    assert!(body.get("details").is_none());
}
