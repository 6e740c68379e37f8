//! Metrics serving
//!
//! The operator's metric families, the TLS scrape endpoint, and the
//! monitor that watches the endpoint's background task.

mod monitor;
mod outcome;
mod registry;
mod server;

pub use monitor::{FailureMonitor, POLL_INTERVAL};
pub use outcome::{outcome_channel, OutcomeReceiver, OutcomeReporter};
pub use registry::{ErrorLabels, OperatorMetrics, ReconcileLabels};
pub use server::{router, run_metrics_server, spawn_metrics_server};

/// Subsystem name used in log records about the metrics server task
pub const METRICS_SERVER: &str = "metrics-server";
