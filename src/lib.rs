//! SSP Operator: startup orchestration for the SSP controller manager
//!
//! Prepares the serving certificates, starts the TLS metrics endpoint with
//! its failure monitor, and runs the controller manager hosting the SSP
//! reconciler, the validating webhook and the health probes.

pub mod bootstrap;
pub mod certs;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod scheme;
pub mod telemetry;
pub mod tls;
pub mod webhook;

pub use crate::error::{Error, Result};
