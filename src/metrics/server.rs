//! TLS metrics scrape endpoint

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::outcome::OutcomeReporter;
use crate::certs::CanonicalCertificateLocation;
use crate::error::{Error, Result};
use crate::tls;

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Metrics endpoint handler
async fn metrics_handler(State(registry): State<Arc<Registry>>) -> Response {
    let mut buffer = String::new();
    match encode(&mut buffer, &registry) {
        Ok(()) => ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], buffer).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// Serve `/metrics` over TLS until the listener fails.
///
/// The certificate pair is read from the canonical location when this is
/// called, so it must only be called after certificates are prepared.
pub async fn run_metrics_server(
    addr: SocketAddr,
    location: CanonicalCertificateLocation,
    registry: Arc<Registry>,
) -> Result<()> {
    info!(%addr, "Starting metrics server with TLS");
    let tls_config = tls::load_server_config(&location).await?;

    axum_server::bind_rustls(addr, tls_config)
        .serve(router(registry).into_make_service())
        .await
        .map_err(|e| Error::ServerError(format!("metrics server on {addr}: {e}")))
}

/// Run the metrics server as a detached task that reports its terminal
/// outcome instead of propagating it.
pub fn spawn_metrics_server(
    addr: SocketAddr,
    location: CanonicalCertificateLocation,
    registry: Arc<Registry>,
    reporter: OutcomeReporter,
) {
    tokio::spawn(async move {
        let outcome = run_metrics_server(addr, location, registry).await;
        reporter.report(outcome);
    });
}
