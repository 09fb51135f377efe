//! Proxy source backed by a public plain-text proxy list
//!
//! The list is fetched on every acquisition, so a refresh after
//! invalidation sees whatever the publisher currently offers. Entries are
//! handed out round-robin so two consecutive acquisitions against an
//! unchanged list never return the same endpoint (unless it has only one).

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::ProxyFilters;
use crate::error::{PromptgateError, Result};

use super::source::{ProxySource, default_scheme, supply_client};
use super::types::{NoProxyAvailable, Proxy, ProxyScheme};

const SOURCE_NAME: &str = "scraped";

/// Scraped public proxy list
#[derive(Debug)]
pub struct ScrapedListSource {
    client: reqwest::Client,
    list_url: Url,
    filters: ProxyFilters,
    default_scheme: ProxyScheme,
    cursor: AtomicUsize,
}

impl ScrapedListSource {
    /// Create a source for the list at `list_url`
    pub fn new(list_url: &str, filters: ProxyFilters, timeout: Duration) -> Result<Self> {
        let list_url = Url::parse(list_url)
            .map_err(|e| PromptgateError::Config(format!("Invalid proxy list URL: {e}")))?;
        let default_scheme = default_scheme(filters.protocol.as_deref());

        Ok(Self {
            client: supply_client(timeout)?,
            list_url,
            filters,
            default_scheme,
            cursor: AtomicUsize::new(0),
        })
    }

    async fn fetch_list(&self) -> std::result::Result<String, NoProxyAvailable> {
        let response = self
            .client
            .get(self.list_url.clone())
            .query(&self.filters.query_pairs())
            .send()
            .await
            .map_err(|e| NoProxyAvailable::new(SOURCE_NAME, format!("list fetch failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NoProxyAvailable::new(
                SOURCE_NAME,
                format!("list endpoint returned {status}"),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| NoProxyAvailable::new(SOURCE_NAME, format!("list read failed: {e}")))
    }
}

#[async_trait]
impl ProxySource for ScrapedListSource {
    async fn acquire(&self) -> std::result::Result<Proxy, NoProxyAvailable> {
        let body = self.fetch_list().await?;
        let mut proxies = parse_proxy_list(&body, self.default_scheme);

        if proxies.is_empty() {
            return Err(NoProxyAvailable::new(
                SOURCE_NAME,
                "list contained no usable entries",
            ));
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % proxies.len();
        let proxy = proxies.swap_remove(index);
        debug!(
            "Selected proxy {} (entry {} of {})",
            proxy,
            index + 1,
            proxies.len() + 1
        );
        Ok(proxy)
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }
}

/// Parse a plain-text proxy list
///
/// One `host:port` or `scheme://host:port` per line. Blank lines and `#`
/// comments are ignored; malformed entries are skipped with a warning.
pub fn parse_proxy_list(body: &str, default_scheme: ProxyScheme) -> Vec<Proxy> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match Proxy::parse(line, default_scheme) {
            Ok(proxy) => Some(proxy),
            Err(e) => {
                warn!("Skipping proxy list entry '{line}': {e}");
                None
            }
        })
        .collect()
}
