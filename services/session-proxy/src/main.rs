//! Session Proxy
//!
//! Single-binary Rust service that:
//! 1. Holds one upstream API session (access + refresh token)
//! 2. Listens for incoming requests
//! 3. Forwards them upstream with the session's access token
//! 4. Refreshes the session once when upstream reports it expired, replaying
//!    every request that hit the expiry

mod admin;
mod config;
mod metrics;
mod proxy;
mod service;
mod session;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use session_auth::{
    CredentialStore, FileCredentialStore, HttpRefresher, SessionCredentials, TokenPair,
};
use session_refresh::{AuthClient, FailureClassifier, RefreshCoordinator};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::ReqwestTransport;

use crate::admin::{AdminState, build_admin_router};
use crate::config::Config;
use crate::proxy::ProxyState;
use crate::service::{DRAIN_TIMEOUT, ServiceMetrics};
use crate::session::{SessionFlag, SignOut};

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    metrics: ServiceMetrics,
    session: SessionFlag,
    coordinator: RefreshCoordinator,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(proxy_handler)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Build the session's authenticated client from configuration.
fn build_client(
    config: &Config,
    store: Arc<dyn CredentialStore>,
    flag: SessionFlag,
) -> AuthClient {
    let http = reqwest::Client::new();
    let transport = ReqwestTransport::new(http.clone())
        .with_timeout(Duration::from_secs(config.proxy.timeout_secs));

    let mut refresher = HttpRefresher::new(http, config.session.refresh_url.clone());
    if let Some(client_id) = &config.session.client_id {
        refresher = refresher.with_client_id(client_id.clone());
    }

    AuthClient::new(
        Arc::new(transport),
        store,
        Arc::new(refresher),
        Arc::new(SignOut::new(flag)),
    )
    .with_classifier(FailureClassifier::new(&config.session.excluded_endpoints))
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

    info!("starting session-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder()?;

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
        listen_addr = %config.proxy.listen_addr,
        upstream_url = %config.proxy.upstream_url,
        refresh_url = %config.session.refresh_url,
        admin = config.admin.listen_addr.is_some(),
        "configuration loaded"
    );

    let credential_file = config.session.credential_file.clone();
    let store: Arc<dyn CredentialStore> = Arc::new(
        FileCredentialStore::load(credential_file.clone())
            .await
            .with_context(|| {
                format!("failed to open credential file {}", credential_file.display())
            })?,
    );
    let credentials = SessionCredentials::new(store.clone());

    if let Some(seed) = &config.seed {
        credentials
            .store(&TokenPair {
                access: seed.access.clone(),
                refresh: seed.refresh.clone(),
            })
            .await
            .context("failed to seed session tokens")?;
        info!("session tokens seeded from environment");
    }

    let flag = SessionFlag::new(credentials.is_signed_in().await);
    if !flag.is_signed_in() {
        warn!("no session tokens stored, forwarding unauthenticated until signed in");
    }

    let client = build_client(&config, store, flag.clone());
    info!(
        excluded = ?client.classifier().excluded(),
        "session client ready"
    );

    let metrics = ServiceMetrics::new();
    let coordinator = client.coordinator().clone();

    let app_state = AppState {
        proxy: ProxyState {
            client,
            upstream_url: config.proxy.upstream_url.clone(),
            requests_total: metrics.requests_total.clone(),
            errors_total: metrics.errors_total.clone(),
        },
        metrics,
        session: flag.clone(),
        coordinator: coordinator.clone(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.proxy.max_connections);

    let listen_addr = config.proxy.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    let admin_handle = match config.admin.listen_addr {
        Some(admin_addr) => {
            let admin_listener = TcpListener::bind(admin_addr)
                .await
                .with_context(|| format!("failed to bind admin API to {admin_addr}"))?;
            let admin_app =
                build_admin_router(AdminState::new(credentials, coordinator, flag));
            info!(addr = %admin_addr, "admin API listening");
            Some(tokio::spawn(async move {
                axum::serve(admin_listener, admin_app).await
            }))
        }
        None => None,
    };

    // Graceful shutdown: the drain timeout starts when the signal fires, not
    // when the server starts
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
    if let Some(handle) = admin_handle {
        handle.abort();
    }

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

/// Health endpoint: status, session state, refresh state, uptime, request counts.
///
/// Always 200; a signed-out session still forwards requests.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.metrics.started_at.elapsed().as_secs();
    let requests = state.metrics.requests_total.load(Ordering::Relaxed);
    let errors = state.metrics.errors_total.load(Ordering::Relaxed);

    let body = serde_json::json!({
        "status": if state.session.is_signed_in() { "healthy" } else { "degraded" },
        "session": state.session.label(),
        "refresh_state": state.coordinator.state().label(),
        "refresh_waiters": state.coordinator.waiting(),
        "uptime_seconds": uptime,
        "requests_served": requests,
        "errors_total": errors,
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
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

/// Catch-all handler that proxies all non-health requests to upstream.
async fn proxy_handler(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    proxy::proxy_request(&state.proxy, request, request_id).await
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
///
/// A signal handler that fails to install never fires; the other one still
/// can.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
