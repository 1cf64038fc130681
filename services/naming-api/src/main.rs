//! Chemical naming API
//!
//! Single-binary service that resolves structure identifiers to systematic
//! names through a hybrid pipeline:
//! 1. Fast path: local snapshot, then remote structured-database lookup
//! 2. Slow path: batched model inference behind a bounded worker pool
//! 3. Both metered against a per-account two-currency credit ledger

mod admin;
mod api;
mod config;
mod error;
mod metrics;
mod usage;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledger::{CachedStore, CreditLedger, MemoryStore};
use metrics_exporter_prometheus::PrometheusHandle;
use pipeline::Orchestrator;
use resolver::{
    FastResolver, HttpInferenceEngine, LocalLookup, RemoteLookup, ResultCache, SlowResolver,
};

use crate::api::ResolveState;
use crate::config::Config;
use crate::usage::UsageLogger;

/// How long in-flight requests may drain after the shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Request counters surfaced by the health endpoint.
#[derive(Clone)]
struct ServiceMetrics {
    started_at: Instant,
    requests_total: Arc<AtomicU64>,
}

impl ServiceMetrics {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests_total: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    resolve: ResolveState,
    local: Arc<LocalLookup>,
    cache: Arc<ResultCache>,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// The admin routes are only mounted when a bearer token was configured;
/// without one the admin surface does not exist.
fn build_router(
    state: AppState,
    max_connections: usize,
    admin: Option<admin::AdminState>,
) -> Router {
    let mut router = Router::new()
        .route("/api/name", post(resolve_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    if let Some(admin_state) = admin {
        router = router.merge(admin::build_admin_router(admin_state));
    }

    router.layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting naming-api");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        engine_url = config.slow.engine_url.as_str(),
        remote_lookup = config.fast.remote_url.is_some(),
        cache_capacity = config.cache.capacity,
        pool_size = config.slow.pool_size,
        "configuration loaded"
    );

    let client = reqwest::Client::new();

    // Local snapshot loads in the background; lookups miss until it lands.
    let local = Arc::new(LocalLookup::new());
    if let Some(ref path) = config.fast.local_lookup_path {
        let _load = resolver::spawn_load_task(local.clone(), path.clone());
    } else {
        info!("no local lookup snapshot configured, fast path is remote-only");
    }

    let remote = config.fast.remote_url.clone().map(|base_url| RemoteLookup {
        base_url,
        timeout: Duration::from_secs(config.fast.remote_timeout_secs),
    });
    let fast = Arc::new(FastResolver::new(local.clone(), client.clone(), remote));

    let cache = Arc::new(ResultCache::new(config.cache.capacity));
    let engine = Arc::new(HttpInferenceEngine::new(
        client.clone(),
        config.slow.engine_url.clone(),
    ));
    let slow = Arc::new(SlowResolver::new(
        engine,
        cache.clone(),
        config.slow.pool_size,
    ));

    let store = Arc::new(CachedStore::new(MemoryStore::new()));
    let ledger = Arc::new(CreditLedger::new(store));

    let orchestrator = Arc::new(Orchestrator::new(
        ledger.clone(),
        fast,
        slow,
        config.fast.workers,
    ));

    let admin_state = match config.admin.token {
        Some(token) => Some(admin::AdminState::new(ledger.clone(), token)),
        None => {
            warn!("no admin token configured, admin API disabled");
            None
        }
    };

    let app_state = AppState {
        resolve: ResolveState {
            orchestrator,
            usage: Arc::new(UsageLogger::new(config.usage.sample_every)),
        },
        local,
        cache,
        metrics: ServiceMetrics::new(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections, admin_state);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests");

    // Graceful shutdown with drain timeout enforcement:
    // 1. shutdown_signal() fires on SIGTERM/SIGINT
    // 2. axum stops accepting new connections and drains in-flight requests
    // 3. DRAIN_TIMEOUT bounds the drain so a stuck inference batch cannot
    //    block process exit. The timer starts at signal receipt.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// POST /api/name — resolve a batch of identifiers for one account.
async fn resolve_handler(
    State(state): State<AppState>,
    axum::Json(request): axum::Json<api::NameRequest>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    match api::resolve(&state.resolve, request, &request_id).await {
        Ok(response) => {
            metrics::record_request(200);
            axum::Json(response).into_response()
        }
        Err(e) => {
            let response = e.into_response();
            metrics::record_request(response.status().as_u16());
            response
        }
    }
}

/// Health endpoint: component status, uptime, requests served. The service
/// is up even while the snapshot is still loading, so this is always 200.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "local_lookup_entries": state.local.len().await,
        "result_cache_entries": state.cache.len(),
        "uptime_seconds": state.metrics.started_at.elapsed().as_secs(),
        "requests_served": state.metrics.requests_total.load(Ordering::Relaxed),
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint — returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
