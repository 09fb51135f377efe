//! Completion request and failure types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Role/content pair in a chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Build a message from untyped JSON, reporting which field is wrong
    pub fn from_value(index: usize, value: &Value) -> Result<Self, CompletionError> {
        let object = value.as_object().ok_or_else(|| {
            CompletionError::Input(format!("messages[{index}] must be an object"))
        })?;

        let role = object
            .get("role")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CompletionError::Input(format!("messages[{index}] is missing a string 'role'"))
            })?;
        let content = object
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CompletionError::Input(format!(
                    "messages[{index}] is missing a string 'content'"
                ))
            })?;

        Ok(Self::new(role, content))
    }
}

/// A chat completion to perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
        }
    }

    /// Single user message
    pub fn from_prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(model, vec![ChatMessage::user(prompt)])
    }

    /// Check the request is well-formed before any network I/O
    pub fn validate(&self) -> Result<(), CompletionError> {
        if self.model.trim().is_empty() {
            return Err(CompletionError::Input("model cannot be empty".to_string()));
        }
        if self.messages.is_empty() {
            return Err(CompletionError::Input(
                "at least one message is required".to_string(),
            ));
        }
        if let Some(index) = self.messages.iter().position(|m| m.role.trim().is_empty()) {
            return Err(CompletionError::Input(format!(
                "messages[{index}] has an empty role"
            )));
        }
        Ok(())
    }
}

/// Failure category, used for retry decisions and status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Input,
    Proxy,
    Upstream,
    RetriesExhausted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Input => "input",
            FailureKind::Proxy => "proxy",
            FailureKind::Upstream => "upstream",
            FailureKind::RetriesExhausted => "retries_exhausted",
        }
    }
}

/// Classified completion failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompletionError {
    /// Malformed request; the caller must fix it
    #[error("Invalid input: {0}")]
    Input(String),

    /// The proxy hop failed (refused, timed out, blocked)
    #[error("Proxy failure: {0}")]
    Proxy(String),

    /// The backend answered with an error or without a usable choice
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Every attempt failed at the proxy hop
    #[error("Proxy pool exhausted after {attempts} attempt(s); last error: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<CompletionError>,
    },
}

impl CompletionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CompletionError::Input(_) => FailureKind::Input,
            CompletionError::Proxy(_) => FailureKind::Proxy,
            CompletionError::Upstream(_) => FailureKind::Upstream,
            CompletionError::RetriesExhausted { .. } => FailureKind::RetriesExhausted,
        }
    }

    /// Whether a fresh proxy could make the next attempt succeed
    pub fn is_proxy_recoverable(&self) -> bool {
        self.kind() == FailureKind::Proxy
    }
}

/// Completion text on success, classified failure otherwise
pub type CompletionResult = Result<String, CompletionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_prompt_builds_single_user_message() {
        let request = CompletionRequest::from_prompt("gpt-4o", "hi");
        assert_eq!(request.messages, vec![ChatMessage::user("hi")]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_messages() {
        let request = CompletionRequest::new("gpt-4o", vec![]);
        assert_eq!(request.validate().unwrap_err().kind(), FailureKind::Input);
    }

    #[test]
    fn test_validate_rejects_empty_model_and_role() {
        assert!(CompletionRequest::from_prompt(" ", "hi").validate().is_err());

        let request = CompletionRequest::new("gpt-4o", vec![ChatMessage::new("", "hi")]);
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("messages[0]"));
    }

    #[test]
    fn test_message_from_value() {
        let message =
            ChatMessage::from_value(0, &json!({"role": "system", "content": "be brief"})).unwrap();
        assert_eq!(message, ChatMessage::new("system", "be brief"));
    }

    #[test]
    fn test_message_from_value_missing_fields() {
        let err = ChatMessage::from_value(2, &json!({"content": "x"})).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Input);
        assert!(err.to_string().contains("messages[2]"));
        assert!(err.to_string().contains("role"));

        let err = ChatMessage::from_value(0, &json!({"role": "user", "content": 5})).unwrap_err();
        assert!(err.to_string().contains("content"));

        assert!(ChatMessage::from_value(0, &json!("hello")).is_err());
    }

    #[test]
    fn test_retries_exhausted_message_is_distinguishable() {
        let err = CompletionError::RetriesExhausted {
            attempts: 2,
            last: Box::new(CompletionError::Proxy("connection refused".to_string())),
        };
        let message = err.to_string();
        assert!(message.contains("Proxy pool exhausted after 2 attempt(s)"));
        assert!(message.contains("connection refused"));
        assert_eq!(err.kind(), FailureKind::RetriesExhausted);
        assert!(!err.is_proxy_recoverable());
    }

    #[test]
    fn test_only_proxy_failures_are_recoverable() {
        assert!(CompletionError::Proxy("x".into()).is_proxy_recoverable());
        assert!(!CompletionError::Upstream("x".into()).is_proxy_recoverable());
        assert!(!CompletionError::Input("x".into()).is_proxy_recoverable());
    }
}
