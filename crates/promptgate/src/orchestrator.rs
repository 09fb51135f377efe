//! Proxy-aware retry loop around completion calls
//!
//! Per request: `Validating → Acquiring → Invoking → {Success, Retrying →
//! Acquiring, Failed}`. Only failures at the proxy hop are retried, each
//! time with a freshly acquired proxy; everything else is returned as-is.
//! In direct mode there is nothing to rotate, so nothing is retried.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::completion::{CompletionError, CompletionInvoker, CompletionRequest, CompletionResult};
use crate::proxy::{CacheStats, Proxy, ProxyCache};

/// Attempt bookkeeping for a single inbound request
#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub last_error: Option<CompletionError>,
}

impl RetryContext {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts_made: 0,
            max_attempts: max_attempts.max(1),
            last_error: None,
        }
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts_made < self.max_attempts
    }

    /// Record a proxy-attributable failure for the current attempt
    pub fn record_failure(&mut self, error: CompletionError) {
        self.attempts_made += 1;
        self.last_error = Some(error);
    }

    /// Final error once attempts are used up
    pub fn into_exhausted(self) -> CompletionError {
        CompletionError::RetriesExhausted {
            attempts: self.attempts_made,
            last: Box::new(
                self.last_error
                    .unwrap_or_else(|| CompletionError::Proxy("no attempt was made".to_string())),
            ),
        }
    }
}

/// Combines the proxy cache and the completion backend
pub struct RetryOrchestrator {
    /// `None` in direct mode
    cache: Option<Arc<ProxyCache>>,
    invoker: Arc<dyn CompletionInvoker>,
    max_attempts: u32,
}

impl RetryOrchestrator {
    pub fn new(
        cache: Option<Arc<ProxyCache>>,
        invoker: Arc<dyn CompletionInvoker>,
        max_attempts: u32,
    ) -> Self {
        Self {
            cache,
            invoker,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Cache counters, or `None` in direct mode
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }

    /// Run a completion with the configured attempt bound
    pub async fn complete(&self, request: &CompletionRequest) -> CompletionResult {
        self.complete_with(request, self.max_attempts).await
    }

    /// Run a completion with an explicit attempt bound (minimum 1)
    pub async fn complete_with(
        &self,
        request: &CompletionRequest,
        max_attempts: u32,
    ) -> CompletionResult {
        if let Err(e) = request.validate() {
            debug!("Rejecting invalid request before any I/O: {e}");
            return Err(e);
        }

        let mut ctx = RetryContext::new(max_attempts);

        while ctx.has_attempts_left() {
            let attempt = ctx.attempts_made + 1;

            let proxy = match self.acquire().await {
                Ok(proxy) => proxy,
                Err(e) => {
                    warn!(attempt, max_attempts = ctx.max_attempts, "{e}");
                    ctx.record_failure(e);
                    continue;
                }
            };

            debug!(
                attempt,
                max_attempts = ctx.max_attempts,
                proxy = ?proxy.as_ref().map(Proxy::url),
                "Invoking '{}'",
                self.invoker.name()
            );

            match self.invoker.invoke(request, proxy.as_ref()).await {
                Ok(text) => {
                    if attempt > 1 {
                        info!(attempt, "Completion succeeded after proxy rotation");
                    }
                    return Ok(text);
                }
                Err(e) if e.is_proxy_recoverable() && self.cache.is_some() => {
                    warn!(attempt, max_attempts = ctx.max_attempts, "{e}");
                    if let (Some(cache), Some(proxy)) = (&self.cache, &proxy) {
                        cache.invalidate_if_current(proxy).await;
                    }
                    ctx.record_failure(e);
                }
                Err(e) => {
                    debug!(attempt, kind = e.kind().as_str(), "Not retrying: {e}");
                    return Err(e);
                }
            }
        }

        warn!(
            attempts = ctx.attempts_made,
            "Giving up: every attempt failed at the proxy hop"
        );
        Err(ctx.into_exhausted())
    }

    /// Proxy for the next attempt; `Ok(None)` means connect directly
    ///
    /// An acquisition failure is reported as a proxy failure and the cache
    /// is invalidated, exactly as for a failed connection.
    async fn acquire(&self) -> Result<Option<Proxy>, CompletionError> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };

        match cache.get().await {
            Ok(proxy) => Ok(Some(proxy)),
            Err(e) => {
                cache.invalidate().await;
                Err(CompletionError::Proxy(e.to_string()))
            }
        }
    }
}
