use crate::assembler::ToolCallAssembler;
use crate::errors::AgentError;
use crate::models::event::NormalizedEvent;
use crate::models::tool::ToolInvocation;
use crate::providers::base::{BlockDelta, BlockStart, ProviderEvent};

/// Per-round demultiplexer state.
///
/// Holds the round's text, at most one tool call being assembled, and the tool
/// calls finished so far. A fresh value is created for every provider round.
#[derive(Debug, Default)]
pub struct RoundState {
    text: String,
    open_tool: Option<(usize, ToolCallAssembler)>,
    invocations: Vec<ToolInvocation>,
    warnings: Vec<AgentError>,
    stop_reason: Option<String>,
    finished: bool,
}

/// What one completed round produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    pub text: String,
    pub invocations: Vec<ToolInvocation>,
    pub stop_reason: Option<String>,
    pub warnings: Vec<AgentError>,
}

impl RoundState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one provider event into zero or more normalized events.
    pub fn process(&mut self, event: ProviderEvent) -> Vec<NormalizedEvent> {
        match event {
            ProviderEvent::MessageStart => vec![NormalizedEvent::Start],
            ProviderEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                BlockStart::Text { text } if !text.is_empty() => {
                    self.text.push_str(&text);
                    vec![NormalizedEvent::TextDelta(text)]
                }
                BlockStart::ToolUse { id, name } => {
                    // A new tool block while one is still open means the provider skipped
                    // the stop event; close the old one rather than losing it.
                    let mut events: Vec<NormalizedEvent> = self.close_tool().into_iter().collect();
                    // Each invocation gets exactly one tool_result, so ids must stay unique
                    if self.invocations.iter().any(|invocation| invocation.id == id) {
                        tracing::warn!(
                            tool_id = %id,
                            tool = %name,
                            "duplicate tool_use id in round, ignoring block"
                        );
                        return events;
                    }
                    events.push(NormalizedEvent::ToolStart {
                        id: id.clone(),
                        name: name.clone(),
                    });
                    self.open_tool = Some((index, ToolCallAssembler::open(id, name)));
                    events
                }
                _ => Vec::new(),
            },
            ProviderEvent::ContentBlockDelta { delta, .. } => match delta {
                BlockDelta::TextDelta { text } => {
                    self.text.push_str(&text);
                    vec![NormalizedEvent::TextDelta(text)]
                }
                BlockDelta::InputJsonDelta { partial_json } => match self.open_tool.as_mut() {
                    Some((_, assembler)) => {
                        assembler.push(&partial_json);
                        vec![NormalizedEvent::ToolDelta {
                            id: assembler.id().to_string(),
                            fragment: partial_json,
                        }]
                    }
                    None => {
                        tracing::debug!("input_json_delta without an open tool block, ignoring");
                        Vec::new()
                    }
                },
                BlockDelta::Other => Vec::new(),
            },
            ProviderEvent::ContentBlockStop { index } => {
                let closes_tool =
                    matches!(&self.open_tool, Some((open_index, _)) if *open_index == index);
                if closes_tool {
                    self.close_tool().into_iter().collect()
                } else {
                    Vec::new()
                }
            }
            ProviderEvent::MessageDelta { delta } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
                Vec::new()
            }
            ProviderEvent::MessageStop => {
                let mut events: Vec<NormalizedEvent> = self.close_tool().into_iter().collect();
                self.finished = true;
                events.push(NormalizedEvent::TurnComplete {
                    stop_reason: self.stop_reason.clone(),
                });
                events
            }
            ProviderEvent::Error { error } => vec![NormalizedEvent::Error(error.message)],
            ProviderEvent::Ping | ProviderEvent::Unknown => Vec::new(),
        }
    }

    fn close_tool(&mut self) -> Option<NormalizedEvent> {
        let (_, assembler) = self.open_tool.take()?;
        let assembled = assembler.finish();
        if let Some(warning) = assembled.warning {
            self.warnings.push(warning);
        }
        self.invocations.push(assembled.invocation.clone());
        Some(NormalizedEvent::ToolComplete(assembled.invocation))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn invocations(&self) -> &[ToolInvocation] {
        &self.invocations
    }

    /// True once the provider has signalled the end of the round
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_outcome(self) -> RoundOutcome {
        RoundOutcome {
            text: self.text,
            invocations: self.invocations,
            stop_reason: self.stop_reason,
            warnings: self.warnings,
        }
    }
}
