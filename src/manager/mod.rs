//! Primary manager
//!
//! Hosts the control loops, the admission webhook server and the health
//! probe endpoint, and coordinates leader election and shutdown.

pub mod healthz;
mod leader;
mod runtime;
mod signals;
mod webhook_server;

pub use healthz::{ping, Checker, Checks};
pub use leader::{holder_identity, lease_expired, LeaderElector, LEASE_DURATION_SECS};
pub use runtime::{Manager, ManagerOptions, Runnable};
pub use signals::shutdown_signal;
pub use webhook_server::WebhookServer;
