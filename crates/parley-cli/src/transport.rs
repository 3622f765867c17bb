use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{BoxStream, StreamExt};
use parley::models::message::Message;
use parley::protocol::Frame;
use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::errors::ChatError;

pub type FrameStream = BoxStream<'static, Result<Frame, ChatError>>;

/// Body of `POST /reply`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    pub messages: Vec<Message>,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Opens the frame stream for one reply.
///
/// The token covers both the request and the read loop. Once it is cancelled the
/// stream yields a single `ChatError::Cancelled` and ends.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(
        &self,
        request: ReplyRequest,
        cancel: CancellationToken,
    ) -> Result<FrameStream, ChatError>;
}

pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(
        &self,
        request: ReplyRequest,
        cancel: CancellationToken,
    ) -> Result<FrameStream, ChatError> {
        let url = format!("{}/reply", self.base_url);
        let pending = self.client.post(&url).json(&request).send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            response = pending => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let mut message = format!("HTTP error! status: {}", status.as_u16());
            if !body.trim().is_empty() {
                message.push_str(&format!(" ({})", body.trim()));
            }
            return Err(ChatError::Transport(message));
        }

        let mut events = response.bytes_stream().eventsource();
        Ok(Box::pin(async_stream::stream! {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = events.next() => Some(next),
                };
                match next {
                    None => {
                        tracing::info!("reply stream cancelled");
                        yield Err(ChatError::Cancelled);
                        break;
                    }
                    Some(None) => break,
                    Some(Some(Ok(event))) => {
                        if event.data.is_empty() {
                            continue;
                        }
                        yield Frame::decode(&event.data)
                            .map_err(|e| ChatError::Transport(format!("Invalid frame: {}", e)));
                    }
                    Some(Some(Err(e))) => {
                        yield Err(ChatError::Transport(e.to_string()));
                        break;
                    }
                }
            }
        }))
    }
}
