//! Process-wide cache of the current outbound proxy
//!
//! The async mutex is held across acquisition, so callers that arrive while
//! the cache is cold queue behind a single in-flight `acquire()` and share
//! its outcome instead of each hitting the proxy supply.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::source::ProxySource;
use super::types::{NoProxyAvailable, Proxy};

#[derive(Debug, Default)]
struct CachedProxyState {
    current: Option<Proxy>,
    valid: bool,
    /// Outcome of the most recent acquisition, if it failed
    last_failure: Option<NoProxyAvailable>,
}

impl CachedProxyState {
    fn valid_proxy(&self) -> Option<&Proxy> {
        if self.valid { self.current.as_ref() } else { None }
    }
}

/// Counters exposed for health reporting and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls made to the underlying source
    pub acquisitions: u64,
    /// Invalidation requests received
    pub invalidations: u64,
}

/// Holds the most recently acquired proxy
pub struct ProxyCache {
    source: Arc<dyn ProxySource>,
    acquire_timeout: Duration,
    state: Mutex<CachedProxyState>,
    /// Bumped under the lock each time an acquisition completes
    completed_acquisitions: AtomicU64,
    invalidations: AtomicU64,
}

impl ProxyCache {
    pub fn new(source: Arc<dyn ProxySource>, acquire_timeout: Duration) -> Self {
        Self {
            source,
            acquire_timeout,
            state: Mutex::new(CachedProxyState::default()),
            completed_acquisitions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Return the cached proxy, acquiring a fresh one if none is valid
    ///
    /// A caller that waited on the lock while another caller's acquisition
    /// failed receives that same failure rather than starting a new one.
    pub async fn get(&self) -> Result<Proxy, NoProxyAvailable> {
        let seen = self.completed_acquisitions.load(Ordering::Acquire);
        let mut state = self.state.lock().await;

        if let Some(proxy) = state.valid_proxy() {
            return Ok(proxy.clone());
        }

        if self.completed_acquisitions.load(Ordering::Acquire) != seen {
            if let Some(failure) = &state.last_failure {
                debug!("Sharing failed acquisition result with waiting caller");
                return Err(failure.clone());
            }
        }

        debug!("No valid proxy cached, acquiring from '{}'", self.source.name());
        let outcome = match tokio::time::timeout(self.acquire_timeout, self.source.acquire()).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(NoProxyAvailable::new(
                self.source.name(),
                format!("acquisition timed out after {:?}", self.acquire_timeout),
            )),
        };
        self.completed_acquisitions.fetch_add(1, Ordering::Release);

        match outcome {
            Ok(proxy) => {
                info!("Acquired proxy {proxy}");
                state.current = Some(proxy.clone());
                state.valid = true;
                state.last_failure = None;
                Ok(proxy)
            }
            Err(e) => {
                warn!("Proxy acquisition failed: {e}");
                state.last_failure = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Mark the cached proxy invalid; the next `get()` acquires afresh
    pub async fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().await;
        if state.valid {
            if let Some(proxy) = &state.current {
                info!("Invalidating cached proxy {proxy}");
            }
        }
        state.valid = false;
    }

    /// Invalidate only if `proxy` is still the cached one
    ///
    /// Returns whether the cache was changed. A caller holding a stale proxy
    /// leaves a newer proxy cached by another request untouched.
    pub async fn invalidate_if_current(&self, proxy: &Proxy) -> bool {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().await;
        if state.valid_proxy() == Some(proxy) {
            info!("Invalidating cached proxy {proxy}");
            state.valid = false;
            true
        } else {
            debug!("Proxy {proxy} already replaced, leaving cache as is");
            false
        }
    }

    /// Currently cached valid proxy, without acquiring
    pub async fn current(&self) -> Option<Proxy> {
        self.state.lock().await.valid_proxy().cloned()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            acquisitions: self.completed_acquisitions.load(Ordering::Acquire),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }
}
