use parley::providers::base::Provider;
use parley::registry::AgentRegistry;
use parley::session::SessionStore;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn Provider>,
    pub agents: Arc<dyn AgentRegistry>,
    pub sessions: Arc<dyn SessionStore>,
    pub max_rounds: usize,
}
