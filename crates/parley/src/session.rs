use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::errors::{AgentError, AgentResult};
use crate::models::role::Role;

/// A finalized chat message as it is persisted for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Durable message history keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append one message, creating the session if it does not exist yet
    async fn append_message(
        &self,
        session_id: &str,
        agent_id: &str,
        message: StoredMessage,
    ) -> AgentResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHeader {
    pub agent_id: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub header: SessionHeader,
    pub messages: Vec<StoredMessage>,
}

/// Stores each session as a `<session_id>.jsonl` file: a header line followed by
/// one line per message.
pub struct FileSessionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_file(&self, session_id: &str) -> AgentResult<PathBuf> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AgentError::RequestValidation(format!(
                "Invalid session id '{}'",
                session_id
            )));
        }
        Ok(self.dir.join(format!("{}.jsonl", session_id)))
    }

    pub async fn load(&self, session_id: &str) -> AgentResult<Option<SessionRecord>> {
        let path = self.session_file(session_id)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(persistence(e)),
        };

        let mut lines = BufReader::new(file).lines();
        let header = match lines.next_line().await.map_err(persistence)? {
            Some(line) => serde_json::from_str::<SessionHeader>(&line).map_err(persistence)?,
            None => return Ok(None),
        };
        let mut messages = Vec::new();
        while let Some(line) = lines.next_line().await.map_err(persistence)? {
            if line.trim().is_empty() {
                continue;
            }
            messages.push(serde_json::from_str(&line).map_err(persistence)?);
        }

        Ok(Some(SessionRecord { header, messages }))
    }
}

fn persistence<E: std::fmt::Display>(err: E) -> AgentError {
    AgentError::Persistence(err.to_string())
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn append_message(
        &self,
        session_id: &str,
        agent_id: &str,
        message: StoredMessage,
    ) -> AgentResult<()> {
        let path = self.session_file(session_id)?;
        let _guard = self.write_lock.lock().await;

        fs::create_dir_all(&self.dir).await.map_err(persistence)?;
        let exists = fs::try_exists(&path).await.map_err(persistence)?;

        let mut buffer = Vec::new();
        if !exists {
            let header = SessionHeader {
                agent_id: agent_id.to_string(),
                created: Utc::now(),
            };
            serde_json::to_writer(&mut buffer, &header).map_err(persistence)?;
            buffer.push(b'\n');
            tracing::debug!(session_id, agent_id, "creating session");
        }
        serde_json::to_writer(&mut buffer, &message).map_err(persistence)?;
        buffer.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(persistence)?;
        file.write_all(&buffer).await.map_err(persistence)?;
        file.flush().await.map_err(persistence)?;
        Ok(())
    }
}
