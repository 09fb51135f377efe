//! Error types for Promptgate

use thiserror::Error;

/// Main error type for process-level Promptgate operations
///
/// Per-request completion failures are modelled separately by
/// [`crate::completion::CompletionError`] so handlers can map them to
/// status codes without going through this type.
#[derive(Error, Debug)]
pub enum PromptgateError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors (bind, serve)
    #[error("Server error: {0}")]
    Server(String),

    /// Outbound HTTP client construction errors
    #[error("HTTP client error: {0}")]
    Client(String),

    /// Proxy acquisition errors surfaced outside a request (e.g. `check-proxy`)
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<crate::proxy::NoProxyAvailable> for PromptgateError {
    fn from(err: crate::proxy::NoProxyAvailable) -> Self {
        PromptgateError::Proxy(err.to_string())
    }
}

/// Result type alias for Promptgate operations
pub type Result<T> = std::result::Result<T, PromptgateError>;
