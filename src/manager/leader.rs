//! Lease-based leader election

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use kube::Client;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{Error, Result};

pub const LEASE_DURATION_SECS: i32 = 15;
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);
/// A leader that cannot renew for this long stops acting as leader
const RENEW_DEADLINE: Duration = Duration::from_secs(LEASE_DURATION_SECS as u64);

/// Identity written into the lease: `HOSTNAME`, else the system hostname
pub fn holder_identity() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string())
    })
}

/// Whether a lease held by someone else may be taken over at `now`
pub fn lease_expired(spec: Option<&LeaseSpec>, now: DateTime<Utc>) -> bool {
    spec.and_then(|s| s.renew_time.as_ref())
        .map(|renew| {
            let duration = spec
                .and_then(|s| s.lease_duration_seconds)
                .unwrap_or(LEASE_DURATION_SECS);
            now > renew.0 + chrono::Duration::seconds(duration as i64)
        })
        .unwrap_or(true)
}

pub struct LeaderElector {
    leases: Api<Lease>,
    namespace: String,
    lease_name: String,
    identity: String,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: &str, lease_name: &str, identity: &str) -> Self {
        Self {
            leases: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            lease_name: lease_name.to_string(),
            identity: identity.to_string(),
        }
    }

    /// Contend for the lease forever, publishing leadership on `is_leader`.
    /// Returns an error once leadership held earlier is lost.
    pub async fn run(self, is_leader: watch::Sender<bool>) -> Result<()> {
        info!(
            lease = %self.lease_name,
            identity = %self.identity,
            "Attempting to acquire leader lease"
        );

        let elector = &self;
        contend(
            &self.lease_name,
            move || elector.try_acquire_or_renew(),
            is_leader,
        )
        .await
    }

    async fn try_acquire_or_renew(&self) -> std::result::Result<bool, kube::Error> {
        let now = Utc::now();

        match self.leases.get(&self.lease_name).await {
            Ok(existing) => {
                let spec = existing.spec.as_ref();
                let current_holder = spec.and_then(|s| s.holder_identity.as_deref());

                if current_holder == Some(self.identity.as_str()) {
                    let patch = serde_json::json!({
                        "spec": {
                            "renewTime": MicroTime(now),
                            "leaseDurationSeconds": LEASE_DURATION_SECS,
                        }
                    });
                    self.leases
                        .patch(&self.lease_name, &PatchParams::default(), &Patch::Merge(&patch))
                        .await?;
                    return Ok(true);
                }

                if !lease_expired(spec, now) {
                    return Ok(false);
                }

                info!(
                    "Lease held by {:?} has expired, taking over",
                    current_holder
                );
                let patch = serde_json::json!({
                    "spec": {
                        "holderIdentity": self.identity,
                        "acquireTime": MicroTime(now),
                        "renewTime": MicroTime(now),
                        "leaseDurationSeconds": LEASE_DURATION_SECS,
                    }
                });
                self.leases
                    .patch(&self.lease_name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await?;
                Ok(true)
            }
            Err(kube::Error::Api(err)) if err.code == 404 => {
                let lease = Lease {
                    metadata: ObjectMeta {
                        name: Some(self.lease_name.clone()),
                        namespace: Some(self.namespace.clone()),
                        ..Default::default()
                    },
                    spec: Some(LeaseSpec {
                        holder_identity: Some(self.identity.clone()),
                        acquire_time: Some(MicroTime(now)),
                        renew_time: Some(MicroTime(now)),
                        lease_duration_seconds: Some(LEASE_DURATION_SECS),
                        ..Default::default()
                    }),
                };
                self.leases.create(&PostParams::default(), &lease).await?;
                info!("Created lease {} with holder {}", self.lease_name, self.identity);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }
}

/// Whether a leader whose last successful renewal was at `last_renew` has
/// to consider the lease gone at `now`
fn renew_deadline_passed(last_renew: Instant, now: Instant) -> bool {
    now.saturating_duration_since(last_renew) >= RENEW_DEADLINE
}

/// The election loop over a single acquire-or-renew `attempt`.
///
/// Failed attempts are retried. A leader only gives up when the lease is
/// held by someone else, or when it has gone a full lease duration without
/// a successful renewal.
async fn contend<F, Fut, E>(
    lease_name: &str,
    mut attempt: F,
    is_leader: watch::Sender<bool>,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<bool, E>>,
    E: fmt::Debug,
{
    let mut last_renew: Option<Instant> = None;

    loop {
        match attempt().await {
            Ok(true) => {
                if last_renew.is_none() {
                    info!("Acquired leadership for lease {}", lease_name);
                    is_leader.send_replace(true);
                }
                last_renew = Some(Instant::now());
                tokio::time::sleep(RENEW_INTERVAL).await;
            }
            Ok(false) => {
                if last_renew.is_some() {
                    return Err(lost(lease_name));
                }
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(e) => {
                warn!("Leader election error: {:?}", e);
                if let Some(renewed) = last_renew {
                    if renew_deadline_passed(renewed, Instant::now()) {
                        return Err(lost(lease_name));
                    }
                }
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }
}

fn lost(lease_name: &str) -> Error {
    warn!("Lost leadership for lease {}", lease_name);
    Error::LeaderElectionLost(lease_name.to_string())
}
