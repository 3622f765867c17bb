use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

use crate::demux::RoundState;
use crate::errors::{AgentError, AgentResult};
use crate::models::event::{NormalizedEvent, ReplyEvent};
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolInvocation};
use crate::providers::base::{CompletionRequest, Provider};
use crate::registry::AgentProfile;
use crate::tools::{acknowledgement, ToolCatalog};

pub const DEFAULT_MAX_ROUNDS: usize = 8;

/// Counts down the provider rounds a single reply may use
#[derive(Debug)]
struct RoundBudget {
    limit: usize,
    used: usize,
}

impl RoundBudget {
    fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    /// Claim the next round, returning its 1-based number
    fn take(&mut self) -> AgentResult<usize> {
        if self.used >= self.limit {
            return Err(AgentError::RoundBudgetExceeded(self.limit));
        }
        self.used += 1;
        Ok(self.used)
    }
}

/// Agent drives the multi-round tool-use conversation for one request
pub struct Agent {
    provider: Arc<dyn Provider>,
    profile: AgentProfile,
    catalog: ToolCatalog,
    max_rounds: usize,
}

impl Agent {
    pub fn new(provider: Arc<dyn Provider>, profile: AgentProfile) -> Self {
        Self {
            provider,
            profile,
            catalog: ToolCatalog::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_catalog(mut self, catalog: ToolCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// The tool declarations offered to the provider
    pub fn tools(&self) -> Vec<Tool> {
        self.catalog.enabled(&self.profile.tools)
    }

    fn request(&self, messages: &[Message], tools: &[Tool]) -> CompletionRequest {
        CompletionRequest {
            system: self.profile.system_prompt.clone(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            temperature: Some(self.profile.config.temperature),
            max_tokens: self.profile.config.max_tokens,
        }
    }

    /// Stream every event of the reply to `messages`.
    ///
    /// Rounds run strictly one after another. A round that finishes with tool
    /// calls extends the history with the assistant turn and one acknowledgement
    /// per call, yields `Continuing`, and starts the next round. The stream starts
    /// with exactly one `Start` and ends with exactly one `Done` or `Failed`.
    /// Dropping the stream abandons the in-flight provider round.
    pub fn reply(&self, messages: &[Message]) -> BoxStream<'_, ReplyEvent> {
        let mut history = messages.to_vec();
        let tools = self.tools();
        tracing::info!(
            agent_id = %self.profile.id,
            tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "starting reply"
        );

        Box::pin(async_stream::stream! {
            let mut budget = RoundBudget::new(self.max_rounds);
            let mut started = false;

            loop {
                let round = match budget.take() {
                    Ok(round) => round,
                    Err(e) => {
                        tracing::error!(agent_id = %self.profile.id, "{}", e);
                        yield ReplyEvent::Failed(e);
                        break;
                    }
                };
                tracing::debug!(round, messages = history.len(), "starting round");

                let request = self.request(&history, &tools);
                let mut events = match self.provider.stream(&request).await {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::error!(round, "provider call failed: {}", e);
                        if !started {
                            yield ReplyEvent::Model(NormalizedEvent::Start);
                        }
                        yield ReplyEvent::Failed(AgentError::Provider(e.to_string()));
                        break;
                    }
                };

                let mut state = RoundState::new();
                let mut failure = None;
                while let Some(event) = events.next().await {
                    let event = match event {
                        Ok(event) => event,
                        Err(e) => {
                            failure = Some(AgentError::Provider(e.to_string()));
                            break;
                        }
                    };
                    for normalized in state.process(event) {
                        match normalized {
                            NormalizedEvent::Error(message) => {
                                failure = Some(AgentError::Provider(message));
                                break;
                            }
                            // Later rounds are announced by Continuing instead
                            NormalizedEvent::Start if started => {}
                            NormalizedEvent::Start => {
                                started = true;
                                yield ReplyEvent::Model(NormalizedEvent::Start);
                            }
                            other => {
                                if !started {
                                    started = true;
                                    yield ReplyEvent::Model(NormalizedEvent::Start);
                                }
                                yield ReplyEvent::Model(other);
                            }
                        }
                    }
                    if failure.is_some() || state.is_finished() {
                        break;
                    }
                }
                drop(events);

                if failure.is_none() && !state.is_finished() {
                    failure = Some(AgentError::Provider(
                        "stream closed before response completed".to_string(),
                    ));
                }
                if let Some(e) = failure {
                    tracing::error!(round, "provider stream failed: {}", e);
                    if !started {
                        yield ReplyEvent::Model(NormalizedEvent::Start);
                    }
                    yield ReplyEvent::Failed(e);
                    break;
                }

                let outcome = state.into_outcome();
                for warning in &outcome.warnings {
                    tracing::warn!(round, "{}", warning);
                }
                tracing::info!(
                    round,
                    stop_reason = ?outcome.stop_reason,
                    tool_calls = outcome.invocations.len(),
                    "round complete"
                );

                if outcome.invocations.is_empty() {
                    yield ReplyEvent::Done;
                    break;
                }

                let (assistant, results) = tool_turns(&outcome.text, &outcome.invocations);
                history.push(assistant);
                history.push(results);
                yield ReplyEvent::Continuing;
            }
        })
    }
}

/// The assistant turn recording a round's tool calls, and the user turn answering them
fn tool_turns(text: &str, invocations: &[ToolInvocation]) -> (Message, Message) {
    let mut assistant = Message::assistant();
    if !text.is_empty() {
        assistant = assistant.with_text(text);
    }
    let mut results = Message::user();
    for invocation in invocations {
        assistant = assistant.with_tool_use(invocation);
        results = results.with_tool_result(&invocation.id, acknowledgement(&invocation.name));
    }
    (assistant, results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::ContentBlock;
    use crate::models::role::Role;
    use crate::providers::base::ProviderEvent;
    use crate::providers::mock::{text_round, tool_round, MockProvider, MockRound};
    use crate::tools::{GENERATE_JOB_DESCRIPTION, GENERATE_SEO_CONTENT};
    use serde_json::json;

    fn profile(tools: &[&str]) -> AgentProfile {
        AgentProfile::new("job-description", "You write job descriptions.").with_tools(tools.to_vec())
    }

    async fn collect(agent: &Agent, messages: &[Message]) -> Vec<ReplyEvent> {
        agent.reply(messages).collect().await
    }

    fn hello() -> Vec<Message> {
        vec![Message::user().with_text("hello")]
    }

    fn text(s: &str) -> ReplyEvent {
        ReplyEvent::Model(NormalizedEvent::TextDelta(s.to_string()))
    }

    fn is_start(event: &ReplyEvent) -> bool {
        matches!(event, ReplyEvent::Model(NormalizedEvent::Start))
    }

    #[tokio::test]
    async fn test_simple_response() {
        let provider = Arc::new(MockProvider::new(vec![MockRound::Events(text_round(&[
            "Hi", " there",
        ]))]));
        let agent = Agent::new(provider.clone(), profile(&[]));

        let events = collect(&agent, &hello()).await;

        assert_eq!(
            events,
            vec![
                ReplyEvent::Model(NormalizedEvent::Start),
                text("Hi"),
                text(" there"),
                ReplyEvent::Model(NormalizedEvent::TurnComplete {
                    stop_reason: Some("end_turn".into())
                }),
                ReplyEvent::Done,
            ]
        );

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_empty());
        assert_eq!(requests[0].system, "You write job descriptions.");
        assert_eq!(requests[0].messages, hello());
        assert_eq!(requests[0].temperature, Some(1.0));
        assert_eq!(requests[0].max_tokens, 4096);
    }

    #[tokio::test]
    async fn test_tool_call_starts_second_round() {
        let provider = Arc::new(MockProvider::new(vec![
            MockRound::Events(tool_round(
                Some("On it."),
                "toolu_1",
                GENERATE_JOB_DESCRIPTION,
                &[r#"{"job_ti"#, r#"tle":"Eng"}"#],
            )),
            MockRound::Events(text_round(&["# Engineer"])),
        ]));
        let agent = Agent::new(provider.clone(), profile(&[GENERATE_JOB_DESCRIPTION]));

        let events = collect(&agent, &hello()).await;

        let expected_call =
            ToolInvocation::new("toolu_1", GENERATE_JOB_DESCRIPTION, json!({"job_title": "Eng"}));
        assert!(events.contains(&ReplyEvent::Model(NormalizedEvent::ToolComplete(
            expected_call.clone()
        ))));
        assert_eq!(events.iter().filter(|e| is_start(e)).count(), 1);
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == ReplyEvent::Continuing)
                .count(),
            1
        );
        assert_eq!(events.last(), Some(&ReplyEvent::Done));

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].tools[0].name, GENERATE_JOB_DESCRIPTION);

        let second = &requests[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role, Role::Assistant);
        assert_eq!(
            second[1].content,
            vec![
                ContentBlock::text("On it."),
                ContentBlock::tool_use(&expected_call)
            ]
        );
        assert_eq!(second[2].role, Role::User);
        assert_eq!(
            second[2].content,
            vec![ContentBlock::tool_result(
                "toolu_1",
                acknowledgement(GENERATE_JOB_DESCRIPTION)
            )]
        );
    }

    #[tokio::test]
    async fn test_unparseable_tool_input_still_continues() {
        let provider = Arc::new(MockProvider::new(vec![
            MockRound::Events(tool_round(None, "toolu_7", GENERATE_SEO_CONTENT, &[r#"{"a":"#])),
            MockRound::Events(text_round(&["done"])),
        ]));
        let agent = Agent::new(provider.clone(), profile(&[GENERATE_SEO_CONTENT]));

        let events = collect(&agent, &hello()).await;

        assert!(events.contains(&ReplyEvent::Model(NormalizedEvent::ToolComplete(
            ToolInvocation::new("toolu_7", GENERATE_SEO_CONTENT, json!({}))
        ))));
        assert_eq!(events.last(), Some(&ReplyEvent::Done));

        let second = &provider.requests()[1].messages;
        // No text in the tool round, so the assistant turn only holds the tool_use block
        assert_eq!(second[1].content.len(), 1);
        assert!(matches!(
            &second[2].content[0],
            ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "toolu_7"
        ));
    }

    #[tokio::test]
    async fn test_multiple_tool_calls_in_one_round() {
        let mut first = vec![
            ProviderEvent::MessageStart,
            ProviderEvent::tool_start(0, "a", GENERATE_JOB_DESCRIPTION),
            ProviderEvent::input_json(0, "{}"),
            ProviderEvent::block_stop(0),
            ProviderEvent::tool_start(1, "b", GENERATE_SEO_CONTENT),
            ProviderEvent::input_json(1, "{}"),
            ProviderEvent::block_stop(1),
        ];
        first.extend([ProviderEvent::stop_reason("tool_use"), ProviderEvent::MessageStop]);
        let provider = Arc::new(MockProvider::new(vec![
            MockRound::Events(first),
            MockRound::Events(text_round(&["ok"])),
        ]));
        let agent = Agent::new(
            provider.clone(),
            profile(&[GENERATE_JOB_DESCRIPTION, GENERATE_SEO_CONTENT]),
        );

        let _ = collect(&agent, &hello()).await;

        let second = &provider.requests()[1].messages;
        assert_eq!(second[1].content.len(), 2);
        let result_ids: Vec<&str> = second[2]
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(result_ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_round_budget_is_enforced() {
        let rounds = (0..5)
            .map(|i| {
                MockRound::Events(tool_round(
                    None,
                    &format!("toolu_{}", i),
                    GENERATE_JOB_DESCRIPTION,
                    &["{}"],
                ))
            })
            .collect();
        let provider = Arc::new(MockProvider::new(rounds));
        let agent =
            Agent::new(provider.clone(), profile(&[GENERATE_JOB_DESCRIPTION])).with_max_rounds(3);

        let events = collect(&agent, &hello()).await;

        assert_eq!(provider.calls(), 3);
        assert_eq!(
            events.last(),
            Some(&ReplyEvent::Failed(AgentError::RoundBudgetExceeded(3)))
        );
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(events.iter().filter(|e| is_start(e)).count(), 1);
    }

    #[tokio::test]
    async fn test_provider_error_before_stream() {
        let provider = Arc::new(MockProvider::new(vec![MockRound::Fail(
            "connection refused".into(),
        )]));
        let agent = Agent::new(provider.clone(), profile(&[]));

        let events = collect(&agent, &hello()).await;

        assert_eq!(
            events,
            vec![
                ReplyEvent::Model(NormalizedEvent::Start),
                ReplyEvent::Failed(AgentError::Provider("connection refused".into())),
            ]
        );
    }

    #[tokio::test]
    async fn test_provider_error_mid_stream_does_not_retry() {
        let provider = Arc::new(MockProvider::new(vec![
            MockRound::FailAfter(
                vec![
                    ProviderEvent::MessageStart,
                    ProviderEvent::text_start(0),
                    ProviderEvent::text(0, "partial"),
                ],
                "connection reset".into(),
            ),
            MockRound::Events(text_round(&["never"])),
        ]));
        let agent = Agent::new(provider.clone(), profile(&[]));

        let events = collect(&agent, &hello()).await;

        assert_eq!(provider.calls(), 1);
        assert_eq!(
            events.last(),
            Some(&ReplyEvent::Failed(AgentError::Provider(
                "connection reset".into()
            )))
        );
    }

    #[tokio::test]
    async fn test_error_event_fails_the_reply() {
        let provider = Arc::new(MockProvider::new(vec![MockRound::Events(vec![
            ProviderEvent::MessageStart,
            ProviderEvent::error("Overloaded"),
            ProviderEvent::MessageStop,
        ])]));
        let agent = Agent::new(provider, profile(&[]));

        let events = collect(&agent, &hello()).await;

        assert_eq!(
            events,
            vec![
                ReplyEvent::Model(NormalizedEvent::Start),
                ReplyEvent::Failed(AgentError::Provider("Overloaded".into())),
            ]
        );
    }

    #[tokio::test]
    async fn test_truncated_stream_is_a_provider_error() {
        let provider = Arc::new(MockProvider::new(vec![MockRound::Events(vec![
            ProviderEvent::MessageStart,
            ProviderEvent::text_start(0),
            ProviderEvent::text(0, "cut"),
        ])]));
        let agent = Agent::new(provider, profile(&[]));

        let events = collect(&agent, &hello()).await;

        assert!(matches!(
            events.last(),
            Some(ReplyEvent::Failed(AgentError::Provider(message))) if message.contains("closed")
        ));
    }

    #[tokio::test]
    async fn test_dropping_reply_drops_provider_stream() {
        let provider = Arc::new(MockProvider::new(vec![MockRound::Stall(vec![
            ProviderEvent::MessageStart,
            ProviderEvent::text_start(0),
            ProviderEvent::text(0, "thinking"),
        ])]));
        let agent = Agent::new(provider.clone(), profile(&[]));

        let mut stream = agent.reply(&hello());
        assert!(stream.next().await.map_or(false, |e| is_start(&e)));
        assert_eq!(stream.next().await, Some(text("thinking")));
        assert_eq!(provider.streams_dropped(), 0);

        drop(stream);
        assert_eq!(provider.streams_dropped(), 1);
    }

    #[test]
    fn test_round_budget() {
        let mut budget = RoundBudget::new(2);
        assert_eq!(budget.take(), Ok(1));
        assert_eq!(budget.take(), Ok(2));
        assert_eq!(budget.take(), Err(AgentError::RoundBudgetExceeded(2)));
    }
}
