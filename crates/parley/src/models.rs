//! These models represent the objects passed around by the conversation loop
//!
//! There are several related formats we need to interact with:
//! - chat requests, sent from the client to the server
//! - anthropic messages/tools, sent from the server to the LLM
//! - provider stream events, sent from the LLM back to the server
//! - wire frames, sent from the server to the client (see `crate::protocol`)
//!
//! Conversation turns use the same block layout as the anthropic messages API, so
//! history can be forwarded to the provider without a lossy conversion step.
pub mod event;
pub mod message;
pub mod role;
pub mod tool;
