//! The primary manager: owns the Kubernetes client and runs everything
//! registered with it until shutdown.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use kube::Client;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::healthz::{self, Checker, Checks};
use super::leader::{holder_identity, LeaderElector};
use super::webhook_server::WebhookServer;
use crate::certs::CanonicalCertificateLocation;
use crate::config::BindAddress;
use crate::error::{Error, Result};
use crate::scheme::Scheme;

#[derive(Clone, Debug)]
pub struct ManagerOptions {
    pub health_probe_bind_address: BindAddress,
    pub webhook_port: u16,
    pub leader_election: bool,
    pub leader_election_id: String,
    pub leader_election_namespace: String,
    /// Where the webhook server reads its serving certificate from
    pub certificates: CanonicalCertificateLocation,
}

impl ManagerOptions {
    fn validate(&self) -> Result<()> {
        if self.webhook_port == 0 {
            return Err(Error::ConfigError("webhook port must not be 0".to_string()));
        }
        if self.leader_election && self.leader_election_id.is_empty() {
            return Err(Error::ConfigError(
                "leader election ID is required when leader election is enabled".to_string(),
            ));
        }
        if self.leader_election && self.leader_election_namespace.is_empty() {
            return Err(Error::ConfigError(
                "leader election namespace is required when leader election is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// A long-running unit of work started by the manager
#[async_trait]
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;

    /// Leader-gated runnables only start once this replica holds the lease
    fn needs_leader_election(&self) -> bool {
        true
    }

    async fn start(&self) -> Result<()>;
}

pub struct Manager {
    client: Client,
    scheme: Arc<Scheme>,
    options: ManagerOptions,
    runnables: Vec<Arc<dyn Runnable>>,
    webhook_server: WebhookServer,
    readyz: Checks,
    healthz: Checks,
}

impl Manager {
    /// Infer the cluster client configuration and build the manager
    pub async fn connect(scheme: Arc<Scheme>, options: ManagerOptions) -> Result<Self> {
        let client = Client::try_default().await.map_err(Error::KubeError)?;
        Self::new(client, scheme, options)
    }

    pub fn new(client: Client, scheme: Arc<Scheme>, options: ManagerOptions) -> Result<Self> {
        options.validate()?;
        let webhook_server = WebhookServer::new(options.webhook_port, options.certificates.clone());

        Ok(Self {
            client,
            scheme,
            options,
            runnables: Vec::new(),
            webhook_server,
            readyz: Checks::default(),
            healthz: Checks::default(),
        })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn scheme(&self) -> Arc<Scheme> {
        Arc::clone(&self.scheme)
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn add<R: Runnable + 'static>(&mut self, runnable: R) -> Result<()> {
        if self.runnables.iter().any(|r| r.name() == runnable.name()) {
            return Err(Error::RegistrationError(format!(
                "runnable {:?} is already registered",
                runnable.name()
            )));
        }
        debug!(name = runnable.name(), "Registered runnable");
        self.runnables.push(Arc::new(runnable));
        Ok(())
    }

    pub fn runnable_names(&self) -> Vec<&str> {
        self.runnables.iter().map(|r| r.name()).collect()
    }

    pub fn webhook_server(&mut self) -> &mut WebhookServer {
        &mut self.webhook_server
    }

    pub fn add_readyz_check(&mut self, name: &str, checker: Checker) -> Result<()> {
        self.readyz.add(name, checker)
    }

    pub fn add_healthz_check(&mut self, name: &str, checker: Checker) -> Result<()> {
        self.healthz.add(name, checker)
    }

    /// Run until `shutdown` resolves (`Ok`) or any component fails (`Err`)
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Manager {
            client,
            options,
            runnables,
            webhook_server,
            readyz,
            healthz,
            ..
        } = self;

        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        if let Some(addr) = options.health_probe_bind_address.socket_addr() {
            let listener = TcpListener::bind(addr).await.map_err(|e| {
                Error::ServerError(format!("failed to bind health probe on {addr}: {e}"))
            })?;
            tasks.spawn(healthz::serve_probes(listener, readyz, healthz));
        }

        if !webhook_server.is_empty() {
            tasks.spawn(webhook_server.start());
        }

        let (leader_gated, ungated): (Vec<_>, Vec<_>) = runnables
            .into_iter()
            .partition(|r| r.needs_leader_election());

        for runnable in ungated {
            tasks.spawn(async move { runnable.start().await });
        }

        if options.leader_election {
            let (is_leader_tx, mut is_leader_rx) = watch::channel(false);
            let elector = LeaderElector::new(
                client,
                &options.leader_election_namespace,
                &options.leader_election_id,
                &holder_identity(),
            );
            tasks.spawn(elector.run(is_leader_tx));
            tasks.spawn(async move {
                is_leader_rx
                    .wait_for(|leader| *leader)
                    .await
                    .map_err(|_| Error::LeaderElectionLost("elector stopped".to_string()))?;
                info!("Became leader, starting leader-gated runnables");
                run_all(leader_gated).await
            });
        } else {
            tasks.spawn(run_all(leader_gated));
        }

        info!("Manager started");

        tokio::pin!(shutdown);
        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stopping manager");
                    break Ok(());
                }
                Some(joined) = tasks.join_next() => match joined {
                    Ok(Ok(())) => continue,
                    Ok(Err(e)) => break Err(e),
                    Err(e) => break Err(Error::ServerError(format!("manager task failed: {e}"))),
                },
            }
        };

        tasks.shutdown().await;
        result
    }
}

async fn run_all(runnables: Vec<Arc<dyn Runnable>>) -> Result<()> {
    try_join_all(runnables.iter().map(|r| r.start())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn offline_client() -> Client {
        crate::tls::install_crypto_provider();
        let config = kube::Config::new("http://127.0.0.1:1".parse().unwrap());
        Client::try_from(config).unwrap()
    }

    fn options() -> ManagerOptions {
        ManagerOptions {
            health_probe_bind_address: BindAddress::disabled(),
            webhook_port: 9443,
            leader_election: false,
            leader_election_id: "test.example.com".to_string(),
            leader_election_namespace: "default".to_string(),
            certificates: CanonicalCertificateLocation::new("/nonexistent"),
        }
    }

    struct Counting {
        name: &'static str,
        starts: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Runnable for Counting {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::ServerError("boom".to_string()));
            }
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn manager() -> Manager {
        Manager::new(offline_client(), Arc::new(Scheme::new()), options()).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let mut opts = options();
        opts.webhook_port = 0;
        assert!(Manager::new(offline_client(), Arc::new(Scheme::new()), opts).is_err());

        let mut opts = options();
        opts.leader_election = true;
        opts.leader_election_id = String::new();
        assert!(Manager::new(offline_client(), Arc::new(Scheme::new()), opts).is_err());
    }

    #[tokio::test]
    async fn test_duplicate_runnable_rejected() {
        let mut mgr = manager();
        let starts = Arc::new(AtomicUsize::new(0));
        mgr.add(Counting {
            name: "a",
            starts: starts.clone(),
            fail: false,
        })
        .unwrap();

        let err = mgr
            .add(Counting {
                name: "a",
                starts,
                fail: false,
            })
            .unwrap_err();
        assert!(matches!(err, Error::RegistrationError(_)));
        assert_eq!(mgr.runnable_names(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_manager_cleanly() {
        let mut mgr = manager();
        let starts = Arc::new(AtomicUsize::new(0));
        mgr.add(Counting {
            name: "worker",
            starts: starts.clone(),
            fail: false,
        })
        .unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(mgr.start(async move {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_runnable_failure_fails_manager() {
        let mut mgr = manager();
        mgr.add(Counting {
            name: "broken",
            starts: Arc::new(AtomicUsize::new(0)),
            fail: true,
        })
        .unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            mgr.start(std::future::pending::<()>()),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(Error::ServerError(_))));
    }

    #[tokio::test]
    async fn test_probe_bind_failure_is_error() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut opts = options();
        opts.health_probe_bind_address = occupied.local_addr().unwrap().into();
        let mgr = Manager::new(offline_client(), Arc::new(Scheme::new()), opts).unwrap();

        let result = mgr.start(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(Error::ServerError(_))));
    }

    #[tokio::test]
    async fn test_readyz_served_while_running() {
        let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = free.local_addr().unwrap();
        drop(free);

        let mut opts = options();
        opts.health_probe_bind_address = addr.into();
        let mut mgr = Manager::new(offline_client(), Arc::new(Scheme::new()), opts).unwrap();
        mgr.add_readyz_check("ready", healthz::ping()).unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(mgr.start(async move {
            let _ = rx.await;
        }));

        let url = format!("http://{addr}/readyz");
        let mut status = None;
        for _ in 0..50 {
            if let Ok(resp) = reqwest::get(&url).await {
                status = Some(resp.status());
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, Some(reqwest::StatusCode::OK));

        tx.send(()).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }
}
