//! Test utilities for promptgate - mock proxy sources and backends
//!
//! These stand in for the network-backed implementations so the retry
//! loop and the HTTP surface can be exercised deterministically.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::completion::{CompletionError, CompletionInvoker, CompletionRequest, CompletionResult};
use crate::proxy::{NoProxyAvailable, Proxy, ProxyScheme, ProxySource};

/// Mock proxy source that counts acquisitions.
/// A working source hands out a distinct endpoint on every call.
#[derive(Debug, Default)]
pub struct MockProxySource {
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockProxySource {
    pub fn working() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Sleep this long inside every `acquire()`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `acquire()` calls started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxySource for MockProxySource {
    async fn acquire(&self) -> Result<Proxy, NoProxyAvailable> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail {
            return Err(NoProxyAvailable::new("mock", "mock supply is empty"));
        }

        let address = format!("10.0.{}.{}:8080", n / 250, n % 250 + 1);
        Proxy::new(ProxyScheme::Http, &address)
            .map_err(|e| NoProxyAvailable::new("mock", e.to_string()))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Mock backend that replays a fixed script of outcomes.
/// Once the script runs out every call fails as an upstream error.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    script: Mutex<VecDeque<CompletionResult>>,
    seen_proxies: Mutex<Vec<Option<Proxy>>>,
}

impl ScriptedInvoker {
    pub fn new(script: Vec<CompletionResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen_proxies: Mutex::new(Vec::new()),
        }
    }

    /// Succeeds with `text` on every call
    pub fn always(text: &str, calls: usize) -> Self {
        Self::new((0..calls).map(|_| Ok(text.to_string())).collect())
    }

    /// Number of `invoke()` calls so far
    pub fn calls(&self) -> usize {
        self.seen_proxies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Proxy passed to each call, in order
    pub fn seen_proxies(&self) -> Vec<Option<Proxy>> {
        self.seen_proxies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl CompletionInvoker for ScriptedInvoker {
    async fn invoke(&self, _request: &CompletionRequest, proxy: Option<&Proxy>) -> CompletionResult {
        self.seen_proxies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(proxy.cloned());

        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::Upstream("script exhausted".to_string())))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
