use super::tool::ToolInvocation;
use crate::errors::AgentError;

/// Provider-agnostic streaming events produced by the demultiplexer for one round.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedEvent {
    Start,
    TextDelta(String),
    ToolStart { id: String, name: String },
    ToolDelta { id: String, fragment: String },
    ToolComplete(ToolInvocation),
    TurnComplete { stop_reason: Option<String> },
    Error(String),
}

/// Everything the conversation loop reports while answering one request.
///
/// Model events of every round are forwarded in order; `Continuing` separates
/// rounds and exactly one of `Done` or `Failed` ends the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyEvent {
    Model(NormalizedEvent),
    Continuing,
    Done,
    Failed(AgentError),
}

impl ReplyEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplyEvent::Done | ReplyEvent::Failed(_))
    }
}
