use super::Rejection;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use parley::{agent::Agent, errors::AgentError, models::message::Message, protocol::Frame};
use serde::Deserialize;
use serde_json::Value;
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest {
    #[serde(default)]
    messages: Value,
    #[serde(default)]
    agent_id: String,
    #[serde(default)]
    session_id: Option<String>,
}

/// Event-stream response fed by the task driving the conversation loop
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            Body::from_stream(self),
        )
            .into_response()
    }
}

/// The conversation history, if it is a non-empty array of well-formed messages
fn parse_messages(value: Value) -> Option<Vec<Message>> {
    match &value {
        Value::Array(items) if !items.is_empty() => serde_json::from_value(value).ok(),
        _ => None,
    }
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<ReplyRequest>,
) -> Result<SseResponse, Rejection> {
    let messages = parse_messages(request.messages).ok_or_else(|| {
        AgentError::RequestValidation("Invalid messages format".to_string())
    })?;

    let profile = state
        .agents
        .lookup(&request.agent_id)
        .await
        .ok_or_else(|| AgentError::AgentNotFound(request.agent_id.clone()))?;

    tracing::info!(
        agent_id = %profile.id,
        session_id = request.session_id.as_deref().unwrap_or("-"),
        enabled_tools = ?profile.tools,
        messages = messages.len(),
        "reply requested"
    );

    let (tx, rx) = mpsc::channel(100);
    let agent = Agent::new(state.provider.clone(), profile).with_max_rounds(state.max_rounds);

    tokio::spawn(async move {
        let mut stream = agent.reply(&messages);

        loop {
            tokio::select! {
                event = stream.next() => {
                    let Some(event) = event else { break };
                    let Some(frame) = Frame::from_event(&event) else { continue };
                    if tx.send(frame.encode()).await.is_err() {
                        tracing::info!(agent_id = %agent.profile().id, "client disconnected");
                        break;
                    }
                    if frame.is_terminal() {
                        break;
                    }
                }
                // Stop consuming the provider as soon as nobody is listening
                _ = tx.closed() => {
                    tracing::info!(agent_id = %agent.profile().id, "client disconnected");
                    break;
                }
            }
        }
    });

    Ok(SseResponse::new(ReceiverStream::new(rx)))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/reply", post(handler))
        .with_state(state)
}
