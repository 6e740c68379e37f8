use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use k8s_openapi::api::coordination::v1::Lease;
use prometheus_client::registry::Registry;
use ssp_operator::{
    bootstrap::{Bootstrap, ManagerSetup},
    certs::CertificateLayout,
    config::{Args, LEADER_ELECTION_ID, WEBHOOK_PORT},
    controller::SspReconciler,
    crd::Ssp,
    manager::{self, Manager, ManagerOptions},
    metrics::OperatorMetrics,
    scheme::Scheme,
    telemetry, tls,
    webhook::SspValidator,
    Result,
};
use tracing::{error, info};

/// Wires the SSP control loop, admission webhook and readiness check
struct OperatorSetup {
    metrics: OperatorMetrics,
}

impl ManagerSetup for OperatorSetup {
    fn register_controllers(&self, mgr: &mut Manager) -> Result<()> {
        SspReconciler {
            client: mgr.client(),
            metrics: self.metrics.clone(),
        }
        .setup_with_manager(mgr)
    }

    fn register_webhooks(&self, mgr: &mut Manager) -> Result<()> {
        SspValidator::setup_webhook_with_manager(mgr)
    }

    fn register_readiness_checks(&self, mgr: &mut Manager) -> Result<()> {
        mgr.add_readyz_check("ready", manager::ping())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = telemetry::init(args.log_json) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }
    tls::install_crypto_provider();

    info!("Starting SSP Operator v{}", env!("CARGO_PKG_VERSION"));

    let mut registry = Registry::default();
    let metrics = OperatorMetrics::register(&mut registry);
    let registry = Arc::new(registry);

    let scheme = Arc::new(Scheme::new().with::<Ssp>().with::<Lease>());
    let layout = CertificateLayout::default();

    let options = ManagerOptions {
        health_probe_bind_address: args.ready_probe_addr,
        webhook_port: WEBHOOK_PORT,
        leader_election: args.enable_leader_election,
        leader_election_id: LEADER_ELECTION_ID.to_string(),
        leader_election_namespace: args.leader_election_namespace.clone(),
        certificates: layout.canonical.clone(),
    };

    let result = Bootstrap::new(layout, args.metrics_addr, registry)
        .with_webhooks(args.webhooks_enabled())
        .run(
            Manager::connect(scheme, options),
            &OperatorSetup { metrics },
            manager::shutdown_signal(),
        )
        .await;

    let code = match result {
        Ok(()) => {
            info!("Operator stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.step() {
                Some(step) => error!(%step, error = %e, "Startup failed"),
                None => error!(error = %e, "Operator failed"),
            }
            ExitCode::FAILURE
        }
    };

    telemetry::shutdown();
    code
}
