//! Promptgate - chat-completion relay with a rotating outbound proxy pool
//!
//! Inbound prompts are forwarded to an OpenAI-compatible backend. When a
//! proxy supply is configured, each call goes out through the currently
//! cached proxy; a call that fails at the proxy hop invalidates that proxy
//! and is retried through a fresh one, up to a configured bound.

pub mod completion;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod proxy;
pub mod server;
pub mod testing;

pub use error::PromptgateError;
