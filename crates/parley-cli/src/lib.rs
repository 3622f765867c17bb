//! Terminal client for a parley server: the chat state machine that turns a
//! stream of wire frames into finalized messages, plus its HTTP transport and
//! session persistence.
pub mod chat;
pub mod errors;
pub mod store;
pub mod transport;

pub use chat::{ChatMessage, ChatSession, Phase, SendOutcome};
pub use errors::ChatError;
