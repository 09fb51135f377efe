//! Proxy endpoint types
//!
//! A [`Proxy`] is validated once at construction and never mutated after;
//! a bad proxy is replaced wholesale by a fresh acquisition.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// Transport scheme used to reach the proxy itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProxyScheme {
    #[default]
    Http,
    Https,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
        }
    }
}

impl FromStr for ProxyScheme {
    type Err = ProxyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyScheme::Http),
            "https" => Ok(ProxyScheme::Https),
            other => Err(ProxyParseError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced when a proxy entry cannot be turned into a [`Proxy`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProxyParseError {
    /// Address is empty or whitespace
    #[error("Proxy address cannot be empty")]
    Empty,

    /// Scheme other than http/https
    #[error("Unsupported proxy scheme '{0}': only http and https are allowed")]
    UnsupportedScheme(String),

    /// Address is not a plain `host:port` endpoint
    #[error("Invalid proxy endpoint '{0}'")]
    InvalidEndpoint(String),
}

/// A usable outbound proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    scheme: ProxyScheme,
    address: String,
    acquired_at: DateTime<Utc>,
}

impl Proxy {
    /// Create a proxy from a scheme and a `host:port` address
    pub fn new(scheme: ProxyScheme, address: &str) -> Result<Self, ProxyParseError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ProxyParseError::Empty);
        }
        validate_endpoint(scheme, address)?;

        Ok(Self {
            scheme,
            address: address.to_string(),
            acquired_at: Utc::now(),
        })
    }

    /// Parse `host:port` or `scheme://host:port`
    ///
    /// `default_scheme` applies when the entry carries no scheme.
    pub fn parse(raw: &str, default_scheme: ProxyScheme) -> Result<Self, ProxyParseError> {
        let raw = raw.trim();
        match raw.split_once("://") {
            Some((scheme, address)) => Self::new(scheme.parse()?, address.trim_end_matches('/')),
            None => Self::new(default_scheme, raw),
        }
    }

    pub fn scheme(&self) -> ProxyScheme {
        self.scheme
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Proxy URL in the form reqwest expects (`http://host:port`)
    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme, self.address)
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Require a bare `host:port` with an explicit numeric port
fn validate_endpoint(scheme: ProxyScheme, address: &str) -> Result<(), ProxyParseError> {
    let invalid = || ProxyParseError::InvalidEndpoint(address.to_string());

    let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(invalid());
    }

    let url = Url::parse(&format!("{scheme}://{address}")).map_err(|_| invalid())?;
    let bare = url.host_str().is_some_and(|h| !h.is_empty())
        && url.username().is_empty()
        && url.password().is_none()
        && url.path() == "/"
        && url.query().is_none()
        && url.fragment().is_none();

    if bare { Ok(()) } else { Err(invalid()) }
}

/// Failure to obtain a proxy from a supply
///
/// An erroring supply and an empty one are reported the same way.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("No proxy available from {supply}: {reason}")]
pub struct NoProxyAvailable {
    /// Name of the supply that was asked
    pub supply: &'static str,
    /// Human-readable cause
    pub reason: String,
}

impl NoProxyAvailable {
    pub fn new(supply: &'static str, reason: impl Into<String>) -> Self {
        Self {
            supply,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_accepts_ipv4_endpoint() {
        let proxy = Proxy::new(ProxyScheme::Http, "203.0.113.7:8080").unwrap();
        assert_eq!(proxy.scheme(), ProxyScheme::Http);
        assert_eq!(proxy.address(), "203.0.113.7:8080");
        assert_eq!(proxy.url(), "http://203.0.113.7:8080");
    }

    #[test]
    fn test_new_accepts_hostname_and_ipv6() {
        assert!(Proxy::new(ProxyScheme::Https, "proxy.example.com:3128").is_ok());
        assert!(Proxy::new(ProxyScheme::Http, "[2001:db8::1]:8080").is_ok());
    }

    #[test]
    fn test_new_rejects_empty() {
        assert_eq!(
            Proxy::new(ProxyScheme::Http, "   ").unwrap_err(),
            ProxyParseError::Empty
        );
    }

    #[test]
    fn test_new_rejects_missing_or_bad_port() {
        assert!(Proxy::new(ProxyScheme::Http, "203.0.113.7").is_err());
        assert!(Proxy::new(ProxyScheme::Http, "203.0.113.7:").is_err());
        assert!(Proxy::new(ProxyScheme::Http, "203.0.113.7:99999").is_err());
        assert!(Proxy::new(ProxyScheme::Http, ":8080").is_err());
    }

    #[test]
    fn test_new_rejects_paths_and_userinfo() {
        assert!(Proxy::new(ProxyScheme::Http, "203.0.113.7:8080/path").is_err());
        assert!(Proxy::new(ProxyScheme::Http, "user:pass@203.0.113.7:8080").is_err());
    }

    #[test]
    fn test_parse_with_and_without_scheme() {
        let plain = Proxy::parse("198.51.100.2:3128", ProxyScheme::Https).unwrap();
        assert_eq!(plain.scheme(), ProxyScheme::Https);

        let explicit = Proxy::parse("http://198.51.100.2:3128/", ProxyScheme::Https).unwrap();
        assert_eq!(explicit.scheme(), ProxyScheme::Http);
        assert_eq!(explicit.address(), "198.51.100.2:3128");
    }

    #[test]
    fn test_parse_rejects_socks() {
        let err = Proxy::parse("socks5://198.51.100.2:1080", ProxyScheme::Http).unwrap_err();
        assert_eq!(err, ProxyParseError::UnsupportedScheme("socks5".to_string()));
    }

    #[test]
    fn test_scheme_from_str_is_case_insensitive() {
        assert_eq!("HTTPS".parse::<ProxyScheme>().unwrap(), ProxyScheme::Https);
        assert_eq!(" http ".parse::<ProxyScheme>().unwrap(), ProxyScheme::Http);
    }

    #[test]
    fn test_no_proxy_available_message() {
        let err = NoProxyAvailable::new("pool", "empty response");
        assert_eq!(err.to_string(), "No proxy available from pool: empty response");
    }
}
