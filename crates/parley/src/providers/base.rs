use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::Tool;

/// Everything a provider needs for one streaming round
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

/// The kind of content block the provider is opening
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub message: String,
}

/// Raw streaming events as a provider delivers them, before demultiplexing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    MessageStart,
    ContentBlockStart {
        index: usize,
        content_block: BlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaBody,
    },
    MessageStop,
    Ping,
    Error {
        error: ErrorBody,
    },
    #[serde(other)]
    Unknown,
}

impl ProviderEvent {
    pub fn text_start(index: usize) -> Self {
        ProviderEvent::ContentBlockStart {
            index,
            content_block: BlockStart::Text {
                text: String::new(),
            },
        }
    }

    pub fn text<S: Into<String>>(index: usize, text: S) -> Self {
        ProviderEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::TextDelta { text: text.into() },
        }
    }

    pub fn tool_start<I: Into<String>, N: Into<String>>(index: usize, id: I, name: N) -> Self {
        ProviderEvent::ContentBlockStart {
            index,
            content_block: BlockStart::ToolUse {
                id: id.into(),
                name: name.into(),
            },
        }
    }

    pub fn input_json<S: Into<String>>(index: usize, partial_json: S) -> Self {
        ProviderEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::InputJsonDelta {
                partial_json: partial_json.into(),
            },
        }
    }

    pub fn block_stop(index: usize) -> Self {
        ProviderEvent::ContentBlockStop { index }
    }

    pub fn stop_reason<S: Into<String>>(reason: S) -> Self {
        ProviderEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(reason.into()),
            },
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        ProviderEvent::Error {
            error: ErrorBody {
                kind: "api_error".to_string(),
                message: message.into(),
            },
        }
    }
}

pub type ProviderEventStream = BoxStream<'static, Result<ProviderEvent>>;

/// Base trait for streaming model providers
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start one streaming completion round.
    ///
    /// The returned stream is finite and not restartable; dropping it abandons
    /// the round.
    async fn stream(&self, request: &CompletionRequest) -> Result<ProviderEventStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_anthropic_stream_payloads() -> Result<()> {
        let start: ProviderEvent = serde_json::from_value(json!({
            "type": "message_start",
            "message": {"id": "msg_1", "role": "assistant", "model": "claude", "content": []}
        }))?;
        assert_eq!(start, ProviderEvent::MessageStart);

        let tool: ProviderEvent = serde_json::from_value(json!({
            "type": "content_block_start",
            "index": 1,
            "content_block": {"type": "tool_use", "id": "toolu_1", "name": "generate_seo_content", "input": {}}
        }))?;
        assert_eq!(tool, ProviderEvent::tool_start(1, "toolu_1", "generate_seo_content"));

        let delta: ProviderEvent = serde_json::from_value(json!({
            "type": "content_block_delta",
            "index": 1,
            "delta": {"type": "input_json_delta", "partial_json": "{\"in"}
        }))?;
        assert_eq!(delta, ProviderEvent::input_json(1, "{\"in"));

        let stop: ProviderEvent = serde_json::from_value(json!({
            "type": "message_delta",
            "delta": {"stop_reason": "tool_use", "stop_sequence": null},
            "usage": {"output_tokens": 12}
        }))?;
        assert_eq!(stop, ProviderEvent::stop_reason("tool_use"));
        Ok(())
    }

    #[test]
    fn test_unknown_shapes_are_tolerated() -> Result<()> {
        let unknown: ProviderEvent =
            serde_json::from_value(json!({"type": "content_block_fancy", "index": 0}))?;
        assert_eq!(unknown, ProviderEvent::Unknown);

        let thinking: ProviderEvent = serde_json::from_value(json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "thinking_delta", "thinking": "hmm"}
        }))?;
        assert_eq!(
            thinking,
            ProviderEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::Other
            }
        );
        Ok(())
    }
}
