//! Chat-completion requests, failure taxonomy, and backend invocation

mod invoker;
mod types;

pub use invoker::{CompletionInvoker, OpenAiInvoker};
pub use types::{ChatMessage, CompletionError, CompletionRequest, CompletionResult, FailureKind};
