//! Chat-completion backend invocation
//!
//! Implements the CompletionInvoker trait for OpenAI-compatible APIs.
//! Failures are classified by where they happened: the proxy hop, the
//! backend, or the request itself. The invoker never touches the proxy
//! cache; deciding what to do about a bad proxy is the orchestrator's job.

use async_trait::async_trait;
use lru::LruCache;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::env;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::UpstreamConfig;
use crate::error::{PromptgateError, Result};
use crate::proxy::Proxy;

use super::types::{CompletionError, CompletionRequest, CompletionResult};

/// Proxied clients kept around for reuse
const PROXIED_CLIENT_CAPACITY: usize = 16;

/// Longest upstream error body echoed into a failure message
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Upper bound on establishing a connection, so a dead proxy fails fast
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for completion backends
#[async_trait]
pub trait CompletionInvoker: Send + Sync {
    /// Perform one completion call, through `proxy` if given
    async fn invoke(&self, request: &CompletionRequest, proxy: Option<&Proxy>) -> CompletionResult;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Option<Vec<Choice>>,
}

/// Choice in the chat completion response
#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

/// Message in the response choice
#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Invoker for OpenAI-compatible `/chat/completions` endpoints
pub struct OpenAiInvoker {
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    direct: Client,
    proxied: Mutex<LruCache<String, Client>>,
}

impl OpenAiInvoker {
    /// Create an invoker from the upstream configuration
    ///
    /// The API key is read from `config.api_key_env`; a missing key is
    /// allowed for backends that do not need one.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!(
                "API key env var '{}' not set, calling upstream without authorization",
                config.api_key_env
            );
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let direct = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(CONNECT_TIMEOUT))
            .no_proxy()
            .build()
            .map_err(|e| PromptgateError::Client(format!("Failed to create HTTP client: {e}")))?;

        let endpoint = format!(
            "{}/chat/completions",
            config.api_url.trim_end_matches('/')
        );
        info!("OpenAiInvoker initialized with endpoint: {endpoint}");

        Ok(Self {
            endpoint,
            api_key,
            timeout,
            direct,
            proxied: Mutex::new(LruCache::new(
                NonZeroUsize::new(PROXIED_CLIENT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
        })
    }

    /// Client routed through `proxy`, reusing one built earlier if possible
    fn proxied_client(&self, proxy: &Proxy) -> std::result::Result<Client, CompletionError> {
        let key = proxy.url();
        let mut clients = self.proxied.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = reqwest::Proxy::all(&key)
            .and_then(|p| {
                Client::builder()
                    .timeout(self.timeout)
                    .connect_timeout(self.timeout.min(CONNECT_TIMEOUT))
                    .proxy(p)
                    .build()
            })
            .map_err(|e| CompletionError::Proxy(format!("Cannot route through {key}: {e}")))?;
        clients.put(key, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl CompletionInvoker for OpenAiInvoker {
    async fn invoke(&self, request: &CompletionRequest, proxy: Option<&Proxy>) -> CompletionResult {
        request.validate()?;

        let client = match proxy {
            Some(proxy) => self.proxied_client(proxy)?,
            None => self.direct.clone(),
        };
        let proxied = proxy.is_some();

        debug!(
            "Calling {} with model {} via {}",
            self.endpoint,
            request.model,
            proxy.map_or_else(|| "direct connection".to_string(), Proxy::url)
        );

        let mut builder = client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_failure(&e, proxied))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_failure(&e, proxied))?;

        if !status.is_success() {
            return Err(status_failure(status, &body, proxied));
        }

        extract_completion(&body, proxied)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Classify a reqwest error raised while sending or reading the body
fn transport_failure(err: &reqwest::Error, proxied: bool) -> CompletionError {
    let what = if err.is_timeout() {
        "Request timed out"
    } else if err.is_connect() {
        "Failed to connect"
    } else {
        "Request failed"
    };
    let message = format!("{what}: {err}");

    if proxied {
        CompletionError::Proxy(message)
    } else {
        CompletionError::Upstream(message)
    }
}

/// Classify a non-success HTTP status
///
/// Through a proxy, 403 and 429 mean the provider is blocking or throttling
/// the proxy's address, so a different proxy may succeed. 407 comes from the
/// proxy itself. Without a proxy every status is the backend's.
fn status_failure(status: StatusCode, body: &str, proxied: bool) -> CompletionError {
    let message = format!("Upstream returned {status}: {}", truncate(body));

    let proxy_attributable = proxied
        && matches!(
            status,
            StatusCode::PROXY_AUTHENTICATION_REQUIRED
                | StatusCode::FORBIDDEN
                | StatusCode::TOO_MANY_REQUESTS
        );

    if proxy_attributable {
        CompletionError::Proxy(message)
    } else {
        CompletionError::Upstream(message)
    }
}

/// Pull the first choice's text out of a success body
///
/// A 2xx body that is not JSON at all through a proxy is most likely a page
/// injected by the proxy, so it counts against the proxy. Valid JSON without
/// a usable choice is the backend's answer and counts against the backend.
fn extract_completion(body: &str, proxied: bool) -> CompletionResult {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        let message = format!("Unparseable completion response: {e}");
        if proxied {
            CompletionError::Proxy(message)
        } else {
            CompletionError::Upstream(message)
        }
    })?;

    let completion: ChatCompletionResponse = serde_json::from_value(value).map_err(|e| {
        CompletionError::Upstream(format!("Malformed completion response: {e}"))
    })?;

    completion
        .choices
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::Upstream("Response contained no choices".to_string()))?
        .message
        .content
        .ok_or_else(|| CompletionError::Upstream("First choice has no content".to_string()))
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{cut}...")
    }
}
