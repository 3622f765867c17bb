use async_trait::async_trait;
use parley::errors::{AgentError, AgentResult};
use parley::session::{SessionStore, StoredMessage};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Saves are best-effort, so give up well before a user would notice
const SAVE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveMessageRequest<'a> {
    session_id: &'a str,
    agent_id: &'a str,
    message: &'a StoredMessage,
}

/// Session store backed by the server's save-message route
pub struct RemoteSessionStore {
    client: Client,
    base_url: String,
}

impl RemoteSessionStore {
    pub fn new<S: Into<String>>(base_url: S) -> reqwest::Result<Self> {
        Self::with_timeout(base_url, SAVE_TIMEOUT)
    }

    pub fn with_timeout<S: Into<String>>(base_url: S, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SessionStore for RemoteSessionStore {
    async fn append_message(
        &self,
        session_id: &str,
        agent_id: &str,
        message: StoredMessage,
    ) -> AgentResult<()> {
        let url = format!("{}/sessions/save-message", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SaveMessageRequest {
                session_id,
                agent_id,
                message: &message,
            })
            .send()
            .await
            .map_err(|e| AgentError::Persistence(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Persistence(format!(
                "save-message failed: {} - {}",
                status, body
            )));
        }
        Ok(())
    }
}
