// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Realtime stream messages.
//!
//! Inbound frames are `{type, data}`; outbound frames are
//! `{type, payload, actorId, timestamp}`.

use crate::error::AppError;
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Kinds of outbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted,
    SessionActivated,
    ActivityAdded,
    ActivityStarted,
    ActivityRemoved,
    SetAdded,
    SetStarted,
    SetCompleted,
    SessionFinished,
    SessionDiscarded,
    SessionDetached,
    Rejected,
}

/// Outbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub actor_id: Uuid,
    pub timestamp: String,
}

impl SessionEvent {
    pub fn new<T: Serialize>(
        kind: EventKind,
        payload: &T,
        actor_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            kind,
            payload: serde_json::to_value(payload)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("event payload: {}", e)))?,
            actor_id,
            timestamp: format_utc_rfc3339(at),
        })
    }

    /// Rejection notice sent only to the connection that caused it.
    pub fn rejected(
        err: &AppError,
        request_type: Option<&str>,
        actor_id: Uuid,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EventKind::Rejected,
            payload: serde_json::json!({
                "code": err.code(),
                "message": err.public_details().unwrap_or_else(|| err.code().to_string()),
                "requestType": request_type,
            }),
            actor_id,
            timestamp: format_utc_rfc3339(at),
        }
    }
}

/// Performance fields reported when completing a set.
///
/// Only provided fields overwrite the stored values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetPerformance {
    #[validate(range(max = 10_000))]
    pub reps: Option<u32>,
    #[validate(range(min = 0.0, max = 2_000.0))]
    pub weight: Option<f64>,
    #[validate(range(min = 6.0, max = 10.0))]
    pub rpe: Option<f64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    #[validate(range(min = 20, max = 250))]
    pub heart_rate: Option<u32>,
    #[validate(range(min = 0.0))]
    pub pace: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetStartData {
    pub set_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetCompleteData {
    pub set_id: Option<Uuid>,
    #[serde(flatten)]
    #[validate(nested)]
    pub performance: SetPerformance,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExerciseStartData {
    #[validate(length(min = 1, max = 100))]
    pub activity_id: String,
}

/// A parsed, validated inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    SetStart(SetStartData),
    SetComplete(SetCompleteData),
    ExerciseStart(ExerciseStartData),
}

/// Why an inbound frame was refused, plus its `type` when one was readable.
#[derive(Debug)]
pub struct InboundError {
    pub request_type: Option<String>,
    pub error: AppError,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ClientMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::SetStart(_) => "set_start",
            ClientMessage::SetComplete(_) => "set_complete",
            ClientMessage::ExerciseStart(_) => "exercise_start",
        }
    }

    /// Parse and validate one text frame.
    pub fn parse(text: &str) -> Result<Self, InboundError> {
        let raw: RawFrame = serde_json::from_str(text).map_err(|e| InboundError {
            request_type: None,
            error: AppError::ValidationFailed(format!("Malformed message: {}", e)),
        })?;

        let fail = |error: AppError| InboundError {
            request_type: Some(raw.kind.clone()),
            error,
        };
        // Missing `data` is an empty object for types whose fields are all optional.
        let data = if raw.data.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            raw.data.clone()
        };

        match raw.kind.as_str() {
            "set_start" => {
                let data: SetStartData = decode(data).map_err(fail)?;
                Ok(ClientMessage::SetStart(data))
            }
            "set_complete" => {
                let data: SetCompleteData = decode(data).map_err(fail)?;
                Ok(ClientMessage::SetComplete(data))
            }
            "exercise_start" => {
                let data: ExerciseStartData = decode(data).map_err(fail)?;
                Ok(ClientMessage::ExerciseStart(data))
            }
            other => Err(fail(AppError::ValidationFailed(format!(
                "Unknown message type '{}'",
                other
            )))),
        }
    }
}

fn decode<T>(data: serde_json::Value) -> Result<T, AppError>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let parsed: T = serde_json::from_value(data)
        .map_err(|e| AppError::ValidationFailed(format!("Invalid payload: {}", e)))?;
    parsed.validate()?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_complete() {
        let id = Uuid::new_v4();
        let text = format!(
            r#"{{"type":"set_complete","data":{{"setId":"{}","reps":8,"weight":100.0,"rpe":8}}}}"#,
            id
        );
        let msg = ClientMessage::parse(&text).unwrap();
        match msg {
            ClientMessage::SetComplete(data) => {
                assert_eq!(data.set_id, Some(id));
                assert_eq!(data.performance.reps, Some(8));
                assert_eq!(data.performance.rpe, Some(8.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_set_start_without_data() {
        let msg = ClientMessage::parse(r#"{"type":"set_start"}"#).unwrap();
        assert_eq!(msg, ClientMessage::SetStart(SetStartData { set_id: None }));
    }

    #[test]
    fn test_unknown_type_keeps_request_type() {
        let err = ClientMessage::parse(r#"{"type":"jump","data":{}}"#).unwrap_err();
        assert_eq!(err.request_type.as_deref(), Some("jump"));
        assert!(matches!(err.error, AppError::ValidationFailed(_)));
    }

    #[test]
    fn test_rpe_out_of_range_rejected() {
        let err =
            ClientMessage::parse(r#"{"type":"set_complete","data":{"rpe":11}}"#).unwrap_err();
        assert_eq!(err.request_type.as_deref(), Some("set_complete"));
        assert_eq!(err.error.code(), "validation_failed");
    }

    #[test]
    fn test_not_json() {
        let err = ClientMessage::parse("hello").unwrap_err();
        assert!(err.request_type.is_none());
    }

    #[test]
    fn test_rejected_envelope_shape() {
        let at = DateTime::from_timestamp(1_704_103_200, 0).unwrap();
        let event = SessionEvent::rejected(
            &AppError::Conflict("set already completed".to_string()),
            Some("set_complete"),
            Uuid::nil(),
            at,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "rejected");
        assert_eq!(json["payload"]["code"], "conflict");
        assert_eq!(json["payload"]["requestType"], "set_complete");
        assert_eq!(json["timestamp"], "2024-01-01T10:00:00.000Z");
    }
}
