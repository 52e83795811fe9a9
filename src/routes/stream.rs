// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Realtime session stream over WebSocket.
//!
//! The socket authenticates itself: a missing or bad credential, or a
//! session the caller does not own, gets a policy close frame instead of an
//! HTTP error. Accepted mutations reach every subscriber through the
//! broadcaster; rejections go back to the sending connection only.

use crate::error::AppError;
use crate::middleware::auth::extract_token;
use crate::models::events::{ClientMessage, InboundError, SetCompleteData, SetStartData};
use crate::models::SessionEvent;
use crate::AppState;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/sessions/{id}/stream", get(session_stream))
}

#[derive(Deserialize)]
struct StreamQuery {
    /// Browsers cannot set headers on WebSocket requests.
    token: Option<String>,
}

async fn session_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Response {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| extract_token(&jar, &headers));

    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, token))
}

/// Resolve the caller and check they own the session.
async fn authorize(
    state: &AppState,
    session_id: Uuid,
    token: Option<&str>,
) -> Result<Uuid, AppError> {
    let token = token.ok_or(AppError::Unauthenticated)?;
    let user_id = state.tokens.verify(token)?;
    let owner = state.sessions.session_owner(session_id).await?;
    if owner != user_id {
        return Err(AppError::Unauthorized(
            "Only the session owner may subscribe".to_string(),
        ));
    }
    Ok(user_id)
}

async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    session_id: Uuid,
    token: Option<String>,
) {
    let user_id = match authorize(&state, session_id, token.as_deref()).await {
        Ok(user_id) => user_id,
        Err(err) => {
            tracing::debug!(session_id = %session_id, error = %err, "Stream subscription refused");
            let frame = CloseFrame {
                code: close_code::POLICY,
                reason: Utf8Bytes::from_static(err.code()),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    let mut subscription = state.broadcaster.subscribe(session_id);
    let connection_id = subscription.connection_id;
    tracing::info!(
        session_id = %session_id,
        user_id = %user_id,
        connection_id,
        "Stream connected"
    );

    let (mut sink, mut inbound) = socket.split();

    // The writer owns the subscription; when it stops, the connection deregisters.
    let mut writer = tokio::spawn(async move {
        while let Some(text) = subscription.receiver.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = inbound.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(&state, session_id, user_id, connection_id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(session_id = %session_id, connection_id, error = %e, "Stream read failed");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    writer.abort();
    tracing::info!(session_id = %session_id, connection_id, "Stream disconnected");
}

/// Apply one inbound frame. Success is broadcast by the engine; failure is
/// reported to this connection only.
async fn handle_frame(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    connection_id: u64,
    text: &str,
) {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(InboundError {
            request_type,
            error,
        }) => {
            reject(state, session_id, user_id, connection_id, request_type.as_deref(), &error);
            return;
        }
    };

    let request_type = message.type_name();
    if let Err(err) = dispatch(state, session_id, user_id, message).await {
        reject(state, session_id, user_id, connection_id, Some(request_type), &err);
    }
}

async fn dispatch(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    message: ClientMessage,
) -> Result<(), AppError> {
    let engine = &state.sessions;
    match message {
        ClientMessage::SetStart(SetStartData { set_id: Some(set_id) }) => {
            ensure_set_in_session(state, session_id, set_id).await?;
            engine.start_set(user_id, set_id).await?;
        }
        ClientMessage::SetStart(SetStartData { set_id: None }) => {
            engine.start_next_set(user_id, session_id).await?;
        }
        ClientMessage::SetComplete(SetCompleteData {
            set_id: Some(set_id),
            performance,
        }) => {
            ensure_set_in_session(state, session_id, set_id).await?;
            engine.complete_set(user_id, set_id, performance).await?;
        }
        ClientMessage::SetComplete(SetCompleteData {
            set_id: None,
            performance,
        }) => {
            engine
                .complete_active_set(user_id, session_id, performance)
                .await?;
        }
        ClientMessage::ExerciseStart(data) => {
            engine
                .exercise_start(user_id, session_id, &data.activity_id)
                .await?;
        }
    }
    Ok(())
}

/// A stream only drives sets of its own session.
async fn ensure_set_in_session(
    state: &AppState,
    session_id: Uuid,
    set_id: Uuid,
) -> Result<(), AppError> {
    if state.sessions.session_of_set(set_id).await? != session_id {
        return Err(AppError::NotFound(format!("Set {}", set_id)));
    }
    Ok(())
}

fn reject(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    connection_id: u64,
    request_type: Option<&str>,
    err: &AppError,
) {
    tracing::debug!(
        session_id = %session_id,
        user_id = %user_id,
        connection_id,
        request_type = ?request_type,
        code = err.code(),
        error = %err,
        "Stream request rejected"
    );
    let event = SessionEvent::rejected(err, request_type, user_id, state.sessions.now());
    if !state.broadcaster.send_to(session_id, connection_id, &event) {
        tracing::warn!(session_id = %session_id, connection_id, "Could not deliver rejection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::MemoryDb;
    use crate::services::CatalogService;
    use crate::time_utils::SystemClock;
    use serde_json::Value;

    const CATALOG: &str = r#"{"activities": [
        {"id": "pull_up", "name": "Pull-Up", "category": "strength",
         "calorie_coefficients": [{"max_body_weight_kg": null, "kcal_per_minute": 8.0}]}
    ]}"#;

    fn state() -> Arc<AppState> {
        let db = Arc::new(MemoryDb::new());
        let catalog = Arc::new(CatalogService::load_from_json(CATALOG).unwrap());
        Arc::new(AppState::new(
            Config::test_default(),
            catalog,
            db.clone(),
            db,
            Arc::new(SystemClock),
        ))
    }

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<String>) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(text) = rx.try_recv() {
            events.push(serde_json::from_str(&text).unwrap());
        }
        events
    }

    #[tokio::test]
    async fn test_authorize_checks_owner() {
        let state = state();
        let owner = Uuid::new_v4();
        let session = state.sessions.start_session(owner, None, None).await.unwrap();
        let id = session.session.id;

        let token = state.tokens.issue(owner).unwrap().access_token;
        assert_eq!(authorize(&state, id, Some(&token)).await.unwrap(), owner);

        let other = state.tokens.issue(Uuid::new_v4()).unwrap().access_token;
        let err = authorize(&state, id, Some(&other)).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = authorize(&state, id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));

        let err = authorize(&state, Uuid::new_v4(), Some(&token)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_accepted_frames_reach_every_subscriber() {
        let state = state();
        let user = Uuid::new_v4();
        let id = state.sessions.start_session(user, None, None).await.unwrap().session.id;
        let mut sender = state.broadcaster.subscribe(id);
        let mut watcher = state.broadcaster.subscribe(id);

        handle_frame(
            &state,
            id,
            user,
            sender.connection_id,
            r#"{"type": "exercise_start", "data": {"activityId": "pull_up"}}"#,
        )
        .await;
        handle_frame(&state, id, user, sender.connection_id, r#"{"type": "set_start"}"#).await;

        let kinds = |events: Vec<Value>| -> Vec<String> {
            events
                .iter()
                .map(|e| e["type"].as_str().unwrap().to_string())
                .collect()
        };
        let expected = vec![
            "activity_added",
            "activity_started",
            "set_added",
            "session_activated",
            "set_started",
        ];
        assert_eq!(kinds(drain(&mut sender.receiver)), expected);
        assert_eq!(kinds(drain(&mut watcher.receiver)), expected);
    }

    #[tokio::test]
    async fn test_rejection_goes_to_sender_only() {
        let state = state();
        let user = Uuid::new_v4();
        let id = state.sessions.start_session(user, None, None).await.unwrap().session.id;
        let mut sender = state.broadcaster.subscribe(id);
        let mut watcher = state.broadcaster.subscribe(id);

        handle_frame(
            &state,
            id,
            user,
            sender.connection_id,
            r#"{"type": "set_complete", "data": {"rpe": 4}}"#,
        )
        .await;

        let events = drain(&mut sender.receiver);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "rejected");
        assert_eq!(events[0]["payload"]["code"], "validation_failed");
        assert_eq!(events[0]["payload"]["requestType"], "set_complete");
        assert!(drain(&mut watcher.receiver).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_frames_rejected() {
        let state = state();
        let user = Uuid::new_v4();
        let id = state.sessions.start_session(user, None, None).await.unwrap().session.id;
        let mut sender = state.broadcaster.subscribe(id);

        handle_frame(&state, id, user, sender.connection_id, "not json").await;
        handle_frame(&state, id, user, sender.connection_id, r#"{"type": "teleport"}"#).await;
        handle_frame(&state, id, user, sender.connection_id, r#"{"type": "set_start"}"#).await;

        let events = drain(&mut sender.receiver);
        assert_eq!(events.len(), 3);
        assert!(events[0]["payload"]["requestType"].is_null());
        assert_eq!(events[1]["payload"]["requestType"], "teleport");
        // No activity in progress yet.
        assert_eq!(events[2]["payload"]["code"], "invalid_state");
    }

    #[tokio::test]
    async fn test_set_from_another_session_rejected() {
        let state = state();
        let user = Uuid::new_v4();
        let here = state.sessions.start_session(user, None, None).await.unwrap().session.id;
        let there = state.sessions.start_session(user, None, None).await.unwrap().session.id;
        let activity = state
            .sessions
            .add_activity(user, there, "pull_up", 1)
            .await
            .unwrap();
        let mut sender = state.broadcaster.subscribe(here);

        let frame = serde_json::json!({
            "type": "set_start",
            "data": { "setId": activity.sets[0].id }
        })
        .to_string();
        handle_frame(&state, here, user, sender.connection_id, &frame).await;

        let events = drain(&mut sender.receiver);
        assert_eq!(events[0]["payload"]["code"], "not_found");
        let there_now = state.sessions.get_session(user, there).await.unwrap();
        assert_eq!(there_now.active_set_count(), 0);
    }
}
