use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct AgentSummary {
    id: String,
    name: String,
    tools: Vec<String>,
}

/// Enabled agents a client can start a conversation with
async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentSummary>> {
    let agents = state
        .agents
        .list()
        .await
        .into_iter()
        .map(|agent| AgentSummary {
            id: agent.id,
            name: agent.name,
            tools: agent.tools,
        })
        .collect();
    Json(agents)
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/agents", get(list_agents))
        .with_state(state)
}
