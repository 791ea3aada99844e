use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, warn};

use super::AppState;
use crate::model::Message;
use crate::prompt::FormatStyle;
use crate::session::ensure_system_message;

#[derive(Debug, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub messages: Value,
    #[serde(default)]
    pub format_style: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn parse_messages(raw: Value) -> Result<Vec<Message>, String> {
    match raw {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| {
                serde_json::from_value::<Message>(item)
                    .map_err(|err| format!("messages[{idx}] is not a valid message: {err}"))
            })
            .collect(),
        _ => Err("messages must be a list".to_string()),
    }
}

/// Chat endpoint: completes the posted conversation and echoes it back with
/// the assistant turn appended.
pub async fn chat(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload: ChatPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "rejecting chat request with invalid JSON body");
            return error_response(StatusCode::BAD_REQUEST, "Invalid JSON body");
        }
    };

    let mut messages = match parse_messages(payload.messages) {
        Ok(messages) => messages,
        Err(message) => {
            warn!(reason = %message, "rejecting chat request with invalid messages");
            return error_response(StatusCode::BAD_REQUEST, message);
        }
    };

    let style = FormatStyle::parse(payload.format_style.as_deref().unwrap_or_default());
    ensure_system_message(&mut messages, style);

    if messages.iter().all(Message::is_system) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "messages must contain at least one user turn",
        );
    }

    match state.client.send(&messages, Default::default()).await {
        Ok(reply) => {
            messages.push(Message::assistant(reply.clone()));
            (StatusCode::OK, Json(ChatReply { reply, messages })).into_response()
        }
        Err(err) => {
            error!(code = err.code(), error = %err, "error in /api/chat");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
