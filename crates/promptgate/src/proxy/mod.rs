//! Outbound proxy acquisition
//!
//! - [`ProxySource`]: one-shot acquisition from a scraped list or a pool service
//! - [`ProxyCache`]: the single process-wide holder of the current proxy

mod cache;
mod pool;
mod scraped;
mod source;
mod types;

pub use cache::{CacheStats, ProxyCache};
pub use pool::PoolServiceSource;
pub use scraped::{ScrapedListSource, parse_proxy_list};
pub use source::{ProxySource, build_source};
pub use types::{NoProxyAvailable, Proxy, ProxyParseError, ProxyScheme};
