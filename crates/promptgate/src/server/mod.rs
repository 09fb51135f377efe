//! Inbound HTTP surface
//!
//! Thin axum layer in front of [`RetryOrchestrator`]: it shapes JSON into
//! completion requests and maps classified failures to status codes.

mod handlers;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::completion::{CompletionInvoker, OpenAiInvoker};
use crate::config::{Config, ProxyMode};
use crate::error::{PromptgateError, Result};
use crate::orchestrator::RetryOrchestrator;
use crate::proxy::{ProxyCache, build_source};

pub use handlers::{GPT4O_MODEL, parse_inbound};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Proxy-aware completion pipeline
    pub orchestrator: Arc<RetryOrchestrator>,
    /// Model used when a request does not name one
    pub default_model: String,
    /// Configured proxy mode, reported by `/health`
    pub proxy_mode: ProxyMode,
}

impl AppState {
    /// Build the pipeline described by `config`
    ///
    /// This is the single place the proxy cache and backend client are
    /// constructed; everything downstream receives them through this state.
    pub fn from_config(config: &Config) -> Result<Self> {
        let invoker: Arc<dyn CompletionInvoker> = Arc::new(OpenAiInvoker::new(&config.upstream)?);

        let cache = build_source(&config.proxy)?.map(|source| {
            Arc::new(ProxyCache::new(
                source,
                Duration::from_secs(config.proxy.acquire_timeout_secs),
            ))
        });

        Ok(Self {
            orchestrator: Arc::new(RetryOrchestrator::new(
                cache,
                invoker,
                config.retry.max_attempts,
            )),
            default_model: config.upstream.default_model.clone(),
            proxy_mode: config.proxy.mode,
        })
    }
}

/// The HTTP server
pub struct Server {
    listen_addr: String,
    request_timeout: Duration,
    state: Arc<AppState>,
}

impl Server {
    pub fn new(config: &Config, state: AppState) -> Self {
        Self {
            listen_addr: config.server.listen_addr.clone(),
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            state: Arc::new(state),
        }
    }

    /// Router with the request timeout applied
    ///
    /// Config validation keeps the timeout above the worst-case retry time,
    /// so hitting it means something outside the retry loop stalled. It is
    /// reported as a 500 like every other server-side failure.
    pub fn app(&self) -> Router {
        create_router(self.state.clone()).layer(TimeoutLayer::with_status_code(
            StatusCode::INTERNAL_SERVER_ERROR,
            self.request_timeout,
        ))
    }

    /// Bind and serve until Ctrl+C or SIGTERM
    pub async fn serve(&self) -> Result<()> {
        let addr: SocketAddr = self
            .listen_addr
            .parse()
            .map_err(|e| PromptgateError::Config(format!("Invalid listen address: {e}")))?;

        let app = self.app();

        tracing::info!("Starting server on {addr}");
        tracing::info!(
            "Proxy mode: {}, max attempts per request: {}",
            self.state.proxy_mode.as_str(),
            self.state.orchestrator.max_attempts()
        );

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| PromptgateError::Server(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| PromptgateError::Server(format!("Server error: {e}")))?;

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index_handler))
        .route("/health", get(handlers::health_handler))
        .route("/gpt4o", get(handlers::gpt4o_handler))
        .route("/advance", post(handlers::advance_handler))
        .route("/v1/complete", post(handlers::complete_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
