//! TLS server hosting admission webhook routes

use std::net::SocketAddr;

use axum::routing::MethodRouter;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::certs::CanonicalCertificateLocation;
use crate::error::{Error, Result};
use crate::tls;

pub struct WebhookServer {
    port: u16,
    certificates: CanonicalCertificateLocation,
    router: Router,
    paths: Vec<String>,
}

impl WebhookServer {
    pub fn new(port: u16, certificates: CanonicalCertificateLocation) -> Self {
        Self {
            port,
            certificates,
            router: Router::new(),
            paths: Vec::new(),
        }
    }

    /// Mount an admission handler at `path`
    pub fn register(&mut self, path: &str, handler: MethodRouter) -> Result<()> {
        if !path.starts_with('/') {
            return Err(Error::RegistrationError(format!(
                "webhook path {path:?} must start with '/'"
            )));
        }
        if self.paths.iter().any(|p| p == path) {
            return Err(Error::RegistrationError(format!(
                "webhook path {path:?} is already registered"
            )));
        }

        let router = std::mem::take(&mut self.router);
        self.router = router.route(path, handler);
        self.paths.push(path.to_string());
        info!(path, "Registered webhook");
        Ok(())
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve registered routes over TLS using the canonical certificate pair
    pub async fn start(self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let tls_config = tls::load_server_config(&self.certificates).await?;

        info!(%addr, webhooks = self.paths.len(), "Starting webhook server");

        let app = self.router.layer(TraceLayer::new_for_http());
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .map_err(|e| Error::ServerError(format!("webhook server on {addr}: {e}")))
    }
}
