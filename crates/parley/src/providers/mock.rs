use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::providers::base::{CompletionRequest, Provider, ProviderEvent, ProviderEventStream};

/// One scripted provider round
#[derive(Debug, Clone)]
pub enum MockRound {
    /// Yield these events, then end the stream
    Events(Vec<ProviderEvent>),
    /// Fail the call before any event is produced
    Fail(String),
    /// Yield these events, then fail mid-stream
    FailAfter(Vec<ProviderEvent>, String),
    /// Yield these events, then never finish
    Stall(Vec<ProviderEvent>),
}

/// Sets a counter when the stream holding it is dropped.
struct DropSignal(Arc<AtomicUsize>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A mock provider that plays back pre-configured rounds and records every request
#[derive(Clone, Default)]
pub struct MockProvider {
    rounds: Arc<Mutex<VecDeque<MockRound>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    dropped: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(rounds: Vec<MockRound>) -> Self {
        Self {
            rounds: Arc::new(Mutex::new(rounds.into())),
            ..Default::default()
        }
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of round streams that have been dropped
    pub fn streams_dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn stream(&self, request: &CompletionRequest) -> Result<ProviderEventStream> {
        self.requests.lock().unwrap().push(request.clone());
        let round = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("MockProvider: no more rounds configured"))?;

        let signal = DropSignal(self.dropped.clone());
        let events: ProviderEventStream = match round {
            MockRound::Events(events) => Box::pin(stream::iter(events.into_iter().map(Ok))),
            MockRound::Fail(message) => return Err(anyhow!(message)),
            MockRound::FailAfter(events, message) => Box::pin(
                stream::iter(events.into_iter().map(Ok))
                    .chain(stream::once(async move { Err(anyhow!(message)) })),
            ),
            MockRound::Stall(events) => Box::pin(
                stream::iter(events.into_iter().map(Ok)).chain(stream::pending()),
            ),
        };

        Ok(Box::pin(events.map(move |event| {
            let _keep = &signal;
            event
        })))
    }
}

/// Events for a round that streams `chunks` as one text block and ends the turn
pub fn text_round(chunks: &[&str]) -> Vec<ProviderEvent> {
    let mut events = vec![ProviderEvent::MessageStart, ProviderEvent::text_start(0)];
    events.extend(chunks.iter().map(|chunk| ProviderEvent::text(0, *chunk)));
    events.extend([
        ProviderEvent::block_stop(0),
        ProviderEvent::stop_reason("end_turn"),
        ProviderEvent::MessageStop,
    ]);
    events
}

/// Events for a round with optional leading text followed by one tool call
pub fn tool_round(text: Option<&str>, id: &str, name: &str, fragments: &[&str]) -> Vec<ProviderEvent> {
    let mut events = vec![ProviderEvent::MessageStart];
    let mut index = 0;
    if let Some(text) = text {
        events.extend([
            ProviderEvent::text_start(0),
            ProviderEvent::text(0, text),
            ProviderEvent::block_stop(0),
        ]);
        index = 1;
    }
    events.push(ProviderEvent::tool_start(index, id, name));
    events.extend(
        fragments
            .iter()
            .map(|fragment| ProviderEvent::input_json(index, *fragment)),
    );
    events.extend([
        ProviderEvent::block_stop(index),
        ProviderEvent::stop_reason("tool_use"),
        ProviderEvent::MessageStop,
    ]);
    events
}
