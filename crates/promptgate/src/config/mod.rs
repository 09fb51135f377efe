use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{PromptgateError, Result};

/// Main configuration structure for Promptgate
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Inbound HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Chat-completion backend configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Outbound proxy supply configuration
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Read and parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PromptgateError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| PromptgateError::Config(format!("Failed to parse config: {e}")))
    }

    /// Check cross-field constraints that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        self.server
            .listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| PromptgateError::Config(format!("Invalid listen address: {e}")))?;

        url::Url::parse(&self.upstream.api_url)
            .map_err(|e| PromptgateError::Config(format!("Invalid upstream api_url: {e}")))?;

        if self.retry.max_attempts == 0 {
            return Err(PromptgateError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        match self.proxy.mode {
            ProxyMode::Direct => {}
            ProxyMode::Scraped => require_url("proxy.list_url", self.proxy.list_url.as_deref())?,
            ProxyMode::Pool => require_url("proxy.pool_url", self.proxy.pool_url.as_deref())?,
        }

        let worst_case = self.worst_case_request_secs();
        if self.server.request_timeout_secs < worst_case {
            return Err(PromptgateError::Config(format!(
                "server.request_timeout_secs ({}) is shorter than the worst-case retry time \
                 ({worst_case}s = retry.max_attempts x (proxy.acquire_timeout_secs + \
                 upstream.timeout_secs)); requests would be cut off before they can fail cleanly",
                self.server.request_timeout_secs
            )));
        }

        Ok(())
    }

    /// Longest a request can take when every attempt runs into its timeouts
    pub fn worst_case_request_secs(&self) -> u64 {
        let acquire = match self.proxy.mode {
            ProxyMode::Direct => 0,
            ProxyMode::Scraped | ProxyMode::Pool => self.proxy.acquire_timeout_secs,
        };
        u64::from(self.retry.max_attempts).saturating_mul(acquire + self.upstream.timeout_secs)
    }
}

fn require_url(field: &str, value: Option<&str>) -> Result<()> {
    let value = value.ok_or_else(|| {
        PromptgateError::Config(format!("{field} is required for the selected proxy mode"))
    })?;
    url::Url::parse(value)
        .map_err(|e| PromptgateError::Config(format!("Invalid {field} '{value}': {e}")))?;
    Ok(())
}

/// Inbound HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:5000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Upper bound on handling a single inbound request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    150
}

/// Chat-completion backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of an OpenAI-compatible API (`/chat/completions` is appended)
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable holding the API key (optional at runtime)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Model used when the inbound request does not name one
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Timeout for a single completion call, in seconds
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    60
}

/// Where outbound proxies come from
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// No proxy; connect to the backend directly
    #[default]
    Direct,
    /// Scrape a public plain-text proxy list
    Scraped,
    /// Ask a proxy-pool service for one proxy at a time
    Pool,
}

impl ProxyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMode::Direct => "direct",
            ProxyMode::Scraped => "scraped",
            ProxyMode::Pool => "pool",
        }
    }
}

/// Outbound proxy supply configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Proxy supply mode
    #[serde(default)]
    pub mode: ProxyMode,
    /// URL of the plain-text proxy list (scraped mode)
    #[serde(default)]
    pub list_url: Option<String>,
    /// URL of the proxy-pool "get one" endpoint (pool mode)
    #[serde(default)]
    pub pool_url: Option<String>,
    /// Timeout for one acquisition call, in seconds
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Pass-through filters forwarded to the proxy supply
    #[serde(default)]
    pub filters: ProxyFilters,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            mode: ProxyMode::default(),
            list_url: None,
            pool_url: None,
            acquire_timeout_secs: default_acquire_timeout_secs(),
            filters: ProxyFilters::default(),
        }
    }
}

fn default_acquire_timeout_secs() -> u64 {
    8
}

/// Filters forwarded verbatim to the proxy supply as query parameters
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ProxyFilters {
    /// Country code (e.g. "US")
    #[serde(default)]
    pub country: Option<String>,
    /// Protocol (e.g. "http", "https")
    #[serde(default)]
    pub protocol: Option<String>,
    /// Anonymity level (e.g. "elite", "anonymous")
    #[serde(default)]
    pub anonymity: Option<String>,
}

impl ProxyFilters {
    /// Filters as `(name, value)` query pairs, skipping unset ones
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("country", self.country.as_deref()),
            ("protocol", self.protocol.as_deref()),
            ("anonymity", self.anonymity.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Attempts per inbound request; bounds worst-case latency
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    2
}

/// Candidate config file locations, in lookup order
pub fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::home_dir().map(|h| h.join(".promptgate").join("config.toml")),
        dirs::config_dir().map(|c| c.join("promptgate").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}
