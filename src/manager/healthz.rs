//! Liveness and readiness checks, and the probe endpoint serving them

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// A named check; `Err` carries the reason it failed
pub type Checker = Arc<dyn Fn() -> std::result::Result<(), String> + Send + Sync>;

/// A check that always passes
pub fn ping() -> Checker {
    Arc::new(|| Ok(()))
}

/// An ordered set of uniquely named checks
#[derive(Clone, Default)]
pub struct Checks {
    checks: Vec<(String, Checker)>,
}

/// Result of running one check
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub error: Option<String>,
}

impl Checks {
    pub fn add(&mut self, name: &str, checker: Checker) -> Result<()> {
        if name.is_empty() {
            return Err(Error::RegistrationError(
                "check name must not be empty".to_string(),
            ));
        }
        if self.checks.iter().any(|(existing, _)| existing == name) {
            return Err(Error::RegistrationError(format!(
                "check {name:?} is already registered"
            )));
        }
        self.checks.push((name.to_string(), checker));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn run(&self) -> Vec<CheckResult> {
        self.checks
            .iter()
            .map(|(name, checker)| CheckResult {
                name: name.clone(),
                error: checker().err(),
            })
            .collect()
    }
}

/// Render check results as the probe body and status
fn render(endpoint: &str, results: &[CheckResult]) -> (StatusCode, String) {
    let mut body = String::new();
    let mut healthy = true;
    for result in results {
        match &result.error {
            None => body.push_str(&format!("[+]{} ok\n", result.name)),
            Some(reason) => {
                healthy = false;
                body.push_str(&format!("[-]{} failed: {}\n", result.name, reason));
            }
        }
    }

    if healthy {
        body.push_str(&format!("{endpoint} check passed\n"));
        (StatusCode::OK, body)
    } else {
        warn!(endpoint, "Probe check failed");
        body.push_str(&format!("{endpoint} check failed\n"));
        (StatusCode::INTERNAL_SERVER_ERROR, body)
    }
}

struct ProbeState {
    readyz: Checks,
    healthz: Checks,
}

async fn readyz_handler(State(state): State<Arc<ProbeState>>) -> (StatusCode, String) {
    render("readyz", &state.readyz.run())
}

async fn healthz_handler(State(state): State<Arc<ProbeState>>) -> (StatusCode, String) {
    render("healthz", &state.healthz.run())
}

pub fn probe_router(readyz: Checks, healthz: Checks) -> Router {
    Router::new()
        .route("/readyz", get(readyz_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(Arc::new(ProbeState { readyz, healthz }))
}

/// Serve probes on an already bound listener
pub async fn serve_probes(listener: TcpListener, readyz: Checks, healthz: Checks) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Health probe server listening");
    }
    axum::serve(listener, probe_router(readyz, healthz))
        .await
        .map_err(|e| Error::ServerError(format!("health probe server: {e}")))
}
