//! Reconciler for SSP resources
//!
//! Implements the controller pattern using kube-rs runtime.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use kube::{
    api::{Api, Patch, PatchParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::crd::{Ssp, SspStatus};
use crate::error::{Error, Result};
use crate::manager::{Manager, Runnable};
use crate::metrics::OperatorMetrics;

pub const CONTROLLER_NAME: &str = "ssp";
const FIELD_MANAGER: &str = "ssp-operator";

pub const PHASE_DEPLOYED: &str = "Deployed";

const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub metrics: OperatorMetrics,
}

/// Reconciles `SSP` resources once registered with a manager
pub struct SspReconciler {
    pub client: Client,
    pub metrics: OperatorMetrics,
}

impl SspReconciler {
    pub fn setup_with_manager(self, mgr: &mut Manager) -> Result<()> {
        mgr.add(SspController {
            state: Arc::new(ControllerState {
                client: self.client,
                metrics: self.metrics,
            }),
        })
    }
}

struct SspController {
    state: Arc<ControllerState>,
}

#[async_trait]
impl Runnable for SspController {
    fn name(&self) -> &str {
        CONTROLLER_NAME
    }

    async fn start(&self) -> Result<()> {
        run_controller(Arc::clone(&self.state)).await
    }
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let ssps: Api<Ssp> = Api::all(state.client.clone());

    info!("Starting SSP controller");

    // Verify CRD exists
    if let Err(e) = ssps.list(&Default::default()).await {
        error!("SSP CRD not found. Please install the CRD first: {:?}", e);
        return Err(Error::ConfigError("SSP CRD not installed".to_string()));
    }

    Controller::new(ssps, Config::default())
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => info!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// The status a reconciled resource should carry
pub fn desired_status(ssp: &Ssp) -> SspStatus {
    SspStatus {
        phase: PHASE_DEPLOYED.to_string(),
        observed_generation: ssp.metadata.generation,
    }
}

/// Whether the current status already reflects the latest spec
pub fn status_up_to_date(ssp: &Ssp) -> bool {
    ssp.status.as_ref() == Some(&desired_status(ssp))
}

#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = ?obj.namespace()))]
async fn reconcile(obj: Arc<Ssp>, ctx: Arc<ControllerState>) -> Result<Action> {
    let started = Instant::now();
    ctx.metrics.inc_reconcile(CONTROLLER_NAME);

    let result = apply_ssp(&ctx.client, &obj).await;

    ctx.metrics
        .observe_reconcile_duration_seconds(CONTROLLER_NAME, started.elapsed().as_secs_f64());
    result.map(|_| Action::requeue(RESYNC_INTERVAL))
}

async fn apply_ssp(client: &Client, ssp: &Ssp) -> Result<()> {
    if let Err(errors) = ssp.spec.validate() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        warn!("Skipping invalid SSP: {}", messages.join("; "));
        return Ok(());
    }

    if status_up_to_date(ssp) {
        return Ok(());
    }

    let namespace = ssp.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Ssp> = Api::namespaced(client.clone(), &namespace);
    let patch = serde_json::json!({ "status": desired_status(ssp) });

    api.patch_status(
        &ssp.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await
    .map_err(Error::KubeError)?;

    info!("SSP {}/{} is {}", namespace, ssp.name_any(), PHASE_DEPLOYED);
    Ok(())
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(ssp: Arc<Ssp>, error: &Error, ctx: Arc<ControllerState>) -> Action {
    error!("Reconciliation error for {}: {:?}", ssp.name_any(), error);
    ctx.metrics
        .inc_reconcile_error(CONTROLLER_NAME, error_kind(error));

    // Use shorter retry for retriable errors
    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}

pub(crate) fn error_kind(error: &Error) -> &'static str {
    match error {
        Error::KubeError(_) => "kube",
        Error::SerializationError(_) => "serialization",
        Error::ConfigError(_) => "config",
        _ => "unknown",
    }
}
