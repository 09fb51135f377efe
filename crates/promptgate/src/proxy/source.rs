//! Proxy source trait and configuration-driven construction
//!
//! Defines the ProxySource trait that abstracts the different places a
//! proxy can come from (scraped public list, pool service).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProxyConfig, ProxyMode};
use crate::error::{PromptgateError, Result};

use super::pool::PoolServiceSource;
use super::scraped::ScrapedListSource;
use super::types::{NoProxyAvailable, Proxy, ProxyScheme};

/// Trait for proxy supplies
///
/// Implementations perform a single acquisition attempt. Retrying is the
/// caller's job, and an empty supply is reported as [`NoProxyAvailable`]
/// exactly like a failing one.
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Obtain one currently-usable proxy
    async fn acquire(&self) -> std::result::Result<Proxy, NoProxyAvailable>;

    /// Source name for logging
    fn name(&self) -> &'static str;
}

/// Build the proxy source selected by `config.mode`
///
/// Returns `None` in direct mode, where no proxy is ever used.
pub fn build_source(config: &ProxyConfig) -> Result<Option<Arc<dyn ProxySource>>> {
    let timeout = Duration::from_secs(config.acquire_timeout_secs);

    let source: Arc<dyn ProxySource> = match config.mode {
        ProxyMode::Direct => return Ok(None),
        ProxyMode::Scraped => {
            let list_url = config.list_url.as_deref().ok_or_else(|| {
                PromptgateError::Config("proxy.list_url is required in scraped mode".to_string())
            })?;
            Arc::new(ScrapedListSource::new(
                list_url,
                config.filters.clone(),
                timeout,
            )?)
        }
        ProxyMode::Pool => {
            let pool_url = config.pool_url.as_deref().ok_or_else(|| {
                PromptgateError::Config("proxy.pool_url is required in pool mode".to_string())
            })?;
            Arc::new(PoolServiceSource::new(
                pool_url,
                config.filters.clone(),
                timeout,
            )?)
        }
    };

    tracing::info!(
        "Proxy source '{}' configured (acquire timeout {:?})",
        source.name(),
        timeout
    );
    Ok(Some(source))
}

/// HTTP client shared by the network-backed sources
pub(crate) fn supply_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .no_proxy()
        .build()
        .map_err(|e| PromptgateError::Client(format!("Failed to create proxy supply client: {e}")))
}

/// Scheme assumed for entries that do not carry one
///
/// Taken from the `protocol` filter when it names http or https.
pub(crate) fn default_scheme(protocol: Option<&str>) -> ProxyScheme {
    match protocol.map(str::parse::<ProxyScheme>) {
        Some(Ok(scheme)) => scheme,
        Some(Err(e)) => {
            tracing::warn!("Protocol filter not usable as proxy scheme ({e}), assuming http");
            ProxyScheme::Http
        }
        None => ProxyScheme::Http,
    }
}
