use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("{0}")]
    RequestValidation(String),

    /// Carries the requested id; the message stays generic
    #[error("Agent not found")]
    AgentNotFound(String),

    #[error("{0}")]
    Provider(String),

    #[error("Failed to parse tool input for {tool}: {reason}")]
    ToolInputParse { tool: String, reason: String },

    #[error("Round budget of {0} exhausted while the model kept requesting tools")]
    RoundBudgetExceeded(usize),

    #[error("Failed to persist message: {0}")]
    Persistence(String),
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Provider(err.to_string())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
