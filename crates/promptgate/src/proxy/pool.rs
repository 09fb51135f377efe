//! Proxy source backed by a proxy-pool service
//!
//! The service hands out one proxy per call as JSON, e.g.
//! `{"proxy": "203.0.113.7:8080", "protocol": "http"}`. Services that have
//! nothing to offer typically answer with an object lacking `proxy`; that
//! is reported as [`NoProxyAvailable`].

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ProxyFilters;
use crate::error::{PromptgateError, Result};

use super::source::{ProxySource, default_scheme, supply_client};
use super::types::{NoProxyAvailable, Proxy, ProxyScheme};

const SOURCE_NAME: &str = "pool";

/// Proxy-pool service client
#[derive(Debug)]
pub struct PoolServiceSource {
    client: reqwest::Client,
    pool_url: Url,
    filters: ProxyFilters,
    default_scheme: ProxyScheme,
}

/// Response body of the pool's "get one" endpoint
#[derive(Debug, Deserialize)]
struct PoolResponse {
    #[serde(default)]
    proxy: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
}

impl PoolServiceSource {
    /// Create a source for the pool endpoint at `pool_url`
    pub fn new(pool_url: &str, filters: ProxyFilters, timeout: Duration) -> Result<Self> {
        let pool_url = Url::parse(pool_url)
            .map_err(|e| PromptgateError::Config(format!("Invalid proxy pool URL: {e}")))?;
        let default_scheme = default_scheme(filters.protocol.as_deref());

        Ok(Self {
            client: supply_client(timeout)?,
            pool_url,
            filters,
            default_scheme,
        })
    }
}

#[async_trait]
impl ProxySource for PoolServiceSource {
    async fn acquire(&self) -> std::result::Result<Proxy, NoProxyAvailable> {
        let response = self
            .client
            .get(self.pool_url.clone())
            .query(&self.filters.query_pairs())
            .send()
            .await
            .map_err(|e| NoProxyAvailable::new(SOURCE_NAME, format!("pool request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NoProxyAvailable::new(
                SOURCE_NAME,
                format!("pool returned {status}"),
            ));
        }

        let body: PoolResponse = response.json().await.map_err(|e| {
            NoProxyAvailable::new(SOURCE_NAME, format!("unparseable pool response: {e}"))
        })?;

        let address = body
            .proxy
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| NoProxyAvailable::new(SOURCE_NAME, "pool has no proxies"))?;

        let scheme = match body.protocol.as_deref().map(str::parse::<ProxyScheme>) {
            Some(Ok(scheme)) => scheme,
            Some(Err(e)) => return Err(NoProxyAvailable::new(SOURCE_NAME, e.to_string())),
            None => self.default_scheme,
        };

        let proxy = Proxy::parse(&address, scheme)
            .map_err(|e| NoProxyAvailable::new(SOURCE_NAME, e.to_string()))?;
        debug!("Pool handed out proxy {proxy}");
        Ok(proxy)
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    fn source_for(server: &MockServer, filters: ProxyFilters) -> PoolServiceSource {
        PoolServiceSource::new(
            &format!("{}/get", server.uri()),
            filters,
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_acquire_parses_proxy() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "proxy": "203.0.113.7:8080",
                "protocol": "https"
            })))
            .mount(&server)
            .await;

        let proxy = source_for(&server, ProxyFilters::default())
            .acquire()
            .await
            .unwrap();
        assert_eq!(proxy.url(), "https://203.0.113.7:8080");
    }

    #[tokio::test]
    async fn test_acquire_forwards_filters() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/get"))
            .and(matchers::query_param("country", "US"))
            .and(matchers::query_param("anonymity", "elite"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"proxy": "203.0.113.7:8080"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let filters = ProxyFilters {
            country: Some("US".to_string()),
            protocol: None,
            anonymity: Some("elite".to_string()),
        };
        let proxy = source_for(&server, filters).acquire().await.unwrap();
        assert_eq!(proxy.scheme(), ProxyScheme::Http);
    }

    #[tokio::test]
    async fn test_empty_pool_is_no_proxy_available() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 0, "src": "no proxy"})),
            )
            .mount(&server)
            .await;

        let err = source_for(&server, ProxyFilters::default())
            .acquire()
            .await
            .unwrap_err();
        assert_eq!(err.supply, "pool");
        assert!(err.reason.contains("no proxies"));
    }

    #[tokio::test]
    async fn test_error_status_is_no_proxy_available() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = source_for(&server, ProxyFilters::default())
            .acquire()
            .await
            .unwrap_err();
        assert!(err.reason.contains("503"));
    }

    #[tokio::test]
    async fn test_malformed_entry_is_no_proxy_available() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"proxy": "nonsense"})),
            )
            .mount(&server)
            .await;

        assert!(
            source_for(&server, ProxyFilters::default())
                .acquire()
                .await
                .is_err()
        );
    }
}
