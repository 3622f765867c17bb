use super::ErrorResponse;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use parley::{errors::AgentError, session::StoredMessage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveMessageRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    message: Option<Value>,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

async fn save_message(
    State(state): State<AppState>,
    Json(request): Json<SaveMessageRequest>,
) -> Response {
    let (Some(session_id), Some(agent_id), Some(message)) =
        (request.session_id, request.agent_id, request.message)
    else {
        return error_response(StatusCode::BAD_REQUEST, "Missing required fields");
    };
    if session_id.is_empty() || agent_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing required fields");
    }

    let message: StoredMessage = match serde_json::from_value(message) {
        Ok(message) => message,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, format!("Invalid message: {}", e))
        }
    };

    match state
        .sessions
        .append_message(&session_id, &agent_id, message)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(AgentError::RequestValidation(reason)) => {
            error_response(StatusCode::BAD_REQUEST, reason)
        }
        Err(e) => {
            tracing::warn!(session_id = %session_id, "Failed to save message: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save message")
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/sessions/save-message", post(save_message))
        .with_state(state)
}
