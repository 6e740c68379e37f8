//! Logging and tracing setup
//!
//! Logs go to stdout through `tracing-subscriber`. When
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans are also exported over OTLP.

use opentelemetry_otlp::WithExportConfig;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Install the global subscriber. Must be called once, before any other
/// component logs.
pub fn init(json: bool) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let fmt_layer = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    match std::env::var(OTLP_ENDPOINT_ENV) {
        Ok(endpoint) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .install_batch(opentelemetry_sdk::runtime::Tokio)
                .map_err(|e| Error::TelemetryError(e.to_string()))?;

            registry
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .map_err(|e| Error::TelemetryError(e.to_string()))?;
            info!("OpenTelemetry tracing initialized");
        }
        Err(_) => {
            registry
                .try_init()
                .map_err(|e| Error::TelemetryError(e.to_string()))?;
            info!("OpenTelemetry tracing disabled ({} not set)", OTLP_ENDPOINT_ENV);
        }
    }

    Ok(())
}

/// Flush any remaining spans
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}
