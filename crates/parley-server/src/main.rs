mod configuration;
mod error;
mod routes;
mod state;

use parley::providers::factory;
use parley::registry::{AgentRegistry, StaticAgentRegistry};
use parley::session::FileSessionStore;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let settings = configuration::Settings::new()?;

    let agents: Arc<dyn AgentRegistry> = match &settings.agents.path {
        Some(path) => {
            info!("loading agents from {}", path.display());
            Arc::new(StaticAgentRegistry::from_file(path)?)
        }
        None => Arc::new(StaticAgentRegistry::builtin()),
    };
    info!("sessions stored in {}", settings.sessions.dir.display());

    let addr = settings.server.socket_addr()?;
    let state = state::AppState {
        provider: factory::get_provider(settings.provider.into_config())?,
        agents,
        sessions: Arc::new(FileSessionStore::new(settings.sessions.dir)),
        max_rounds: settings.conversation.max_rounds,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
