//! The wire protocol between the reply route and its clients.
//!
//! Each frame is one JSON object sent as an event-stream `data:` field and
//! terminated by a blank line. Frames arrive in the order the conversation loop
//! produced them; `continuing` marks a round boundary and exactly one `done` or
//! `error` frame closes the stream.
use serde::{Deserialize, Serialize};

use crate::models::event::{NormalizedEvent, ReplyEvent};
use crate::models::tool::ToolInvocation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Start,
    Text { content: String },
    ToolUseStart { tool_name: String, tool_id: String },
    ToolUseComplete { tool_use: ToolInvocation },
    Continuing,
    Done,
    Error { error: String },
}

impl Frame {
    /// The frame a reply event is sent as, if it is sent at all.
    ///
    /// Tool input fragments and per-round completion stay server side.
    pub fn from_event(event: &ReplyEvent) -> Option<Frame> {
        match event {
            ReplyEvent::Model(model) => match model {
                NormalizedEvent::Start => Some(Frame::Start),
                NormalizedEvent::TextDelta(text) if !text.is_empty() => Some(Frame::Text {
                    content: text.clone(),
                }),
                NormalizedEvent::ToolStart { id, name } => Some(Frame::ToolUseStart {
                    tool_name: name.clone(),
                    tool_id: id.clone(),
                }),
                NormalizedEvent::ToolComplete(invocation) => Some(Frame::ToolUseComplete {
                    tool_use: invocation.clone(),
                }),
                NormalizedEvent::Error(message) => Some(Frame::Error {
                    error: message.clone(),
                }),
                NormalizedEvent::TextDelta(_)
                | NormalizedEvent::ToolDelta { .. }
                | NormalizedEvent::TurnComplete { .. } => None,
            },
            ReplyEvent::Continuing => Some(Frame::Continuing),
            ReplyEvent::Done => Some(Frame::Done),
            ReplyEvent::Failed(err) => Some(Frame::Error {
                error: err.to_string(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Done | Frame::Error { .. })
    }

    /// Encode as one event-stream record
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to encode frame: {}", e);
            r#"{"type":"error","error":"failed to encode frame"}"#.to_string()
        });
        format!("data: {}\n\n", json)
    }

    /// Decode the payload of one `data:` field
    pub fn decode(data: &str) -> Result<Frame, serde_json::Error> {
        serde_json::from_str(data)
    }
}
