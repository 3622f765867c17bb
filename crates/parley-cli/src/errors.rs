use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    #[error("A response is already in progress")]
    Busy,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("{0}")]
    Transport(String),

    /// The request was cancelled by the user. This is a clean stop, not a failure.
    #[error("Request cancelled")]
    Cancelled,
}

impl ChatError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatError::Cancelled)
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(err.to_string())
    }
}
