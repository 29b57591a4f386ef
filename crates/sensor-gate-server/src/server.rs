// crates/sensor-gate-server/src/server.rs
// ============================================================================
// Module: HTTP Server
// Description: Router assembly, request logging, and listener startup.
// Purpose: Serve the ingestion routes over plain HTTP or TLS.
// Dependencies: axum, axum-server, rustls, sensor-gate-config, tokio, tracing
// ============================================================================

//! ## Overview
//! [`build_router`] wires `POST /sensors` behind the auth middleware and an
//! unauthenticated `GET /sensors/_health`, with request logging on every
//! route. [`serve`] binds the configured address and serves over TLS when
//! certificate material is configured, otherwise over plain HTTP with a
//! warning. Both listeners stop accepting when the shutdown future resolves
//! and finish in-flight requests before returning.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::Request;
use axum::middleware;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use sensor_gate_config::ServerConfig;
use sensor_gate_config::TlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::auth::IdentityProvider;
use crate::auth::require_sensor_write;
use crate::gateway::GatewayState;
use crate::gateway::handle_sensor;
use crate::gateway::health;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Telemetry ingestion route.
pub const SENSORS_PATH: &str = "/sensors";
/// Liveness route.
pub const HEALTH_PATH: &str = "/sensors/_health";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server startup and transport errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid server configuration.
    #[error("server config error: {0}")]
    Config(String),
    /// Listener could not be bound.
    #[error("server bind failed: {0}")]
    Bind(String),
    /// TLS material could not be loaded.
    #[error("server tls error: {0}")]
    Tls(String),
    /// Server stopped with an I/O error.
    #[error("server transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the gateway router.
pub fn build_router(gateway: Arc<GatewayState>, identity: Arc<dyn IdentityProvider>) -> Router {
    let ingest = Router::new()
        .route(SENSORS_PATH, post(handle_sensor))
        .route_layer(middleware::from_fn_with_state(identity, require_sensor_write))
        .with_state(gateway);
    Router::new()
        .route(HEALTH_PATH, get(health))
        .merge(ingest)
        .layer(middleware::from_fn(request_logging))
}

/// Logs method, path, status, and latency for every request.
async fn request_logging(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    debug!(method = %method, path = %path, "incoming request");

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "request completed"
    );
    response
}

// ============================================================================
// SECTION: Serving
// ============================================================================

/// Serves the router until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`ServerError`] when binding, TLS setup, or serving fails.
pub async fn serve(
    router: Router,
    config: &ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let addr = config.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
    match &config.tls {
        Some(tls) => serve_tls(router, addr, tls, shutdown).await,
        None => {
            warn!("tls not configured; serving plaintext http");
            serve_plain(router, addr, shutdown).await
        }
    }
}

/// Serves plain HTTP with graceful shutdown.
async fn serve_plain(
    router: Router,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let listener =
        TcpListener::bind(addr).await.map_err(|err| ServerError::Bind(format!("{addr}: {err}")))?;
    info!(addr = %addr, "listening for http");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| ServerError::Transport(err.to_string()))
}

/// Serves HTTPS, draining in-flight requests once `shutdown` resolves.
async fn serve_tls(
    router: Router,
    addr: SocketAddr,
    tls: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|err| ServerError::Tls(err.to_string()))?;
    let handle = Handle::new();
    let drain = handle.clone();
    tokio::spawn(async move {
        shutdown.await;
        drain.graceful_shutdown(None);
    });
    info!(addr = %addr, "listening for https");
    axum_server::bind_rustls(addr, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .map_err(|err| ServerError::Transport(err.to_string()))
}
