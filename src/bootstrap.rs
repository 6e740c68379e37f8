//! Process startup sequencing
//!
//! Certificates are prepared first. Only then are the metrics server and
//! its failure monitor started as detached tasks, after which the manager
//! is built, populated and run until a termination signal arrives.
//!
//! The metrics server and monitor take no part in shutdown; they are
//! abandoned when the process exits.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use prometheus_client::registry::Registry;
use tracing::{info, warn};

use crate::certs::{self, CertificateLayout, CertificateSource};
use crate::config::BindAddress;
use crate::error::{BootstrapStep, Result};
use crate::manager::Manager;
use crate::metrics::{self, outcome_channel, FailureMonitor, METRICS_SERVER};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Initializing,
    CertificatesReady,
    ServicesStarting,
    ServicesRunning,
    Terminating,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Called on every lifecycle transition
pub type LifecycleObserver = Arc<dyn Fn(LifecycleState) + Send + Sync>;

/// Registers the manager's control loops, webhooks and checks
pub trait ManagerSetup {
    fn register_controllers(&self, mgr: &mut Manager) -> Result<()>;

    fn register_webhooks(&self, mgr: &mut Manager) -> Result<()>;

    fn register_readiness_checks(&self, mgr: &mut Manager) -> Result<()>;
}

pub struct Bootstrap {
    layout: CertificateLayout,
    metrics_addr: BindAddress,
    registry: Arc<Registry>,
    enable_webhooks: bool,
    state: LifecycleState,
    observer: Option<LifecycleObserver>,
}

impl Bootstrap {
    pub fn new(
        layout: CertificateLayout,
        metrics_addr: BindAddress,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            layout,
            metrics_addr,
            registry,
            enable_webhooks: true,
            state: LifecycleState::Initializing,
            observer: None,
        }
    }

    pub fn with_webhooks(mut self, enabled: bool) -> Self {
        self.enable_webhooks = enabled;
        self
    }

    pub fn with_observer(mut self, observer: LifecycleObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    fn transition(&mut self, next: LifecycleState) {
        info!(from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
        if let Some(observer) = &self.observer {
            observer(next);
        }
    }

    /// Resolve the certificate source and copy the pair into place
    pub fn prepare_certificates(&mut self) -> Result<CertificateSource> {
        let source = certs::prepare_certificates(&self.layout)
            .map_err(|e| e.during(BootstrapStep::CopyCertificates))?;
        self.transition(LifecycleState::CertificatesReady);
        Ok(source)
    }

    /// Start the metrics server and its failure monitor as detached tasks.
    ///
    /// Only [`Bootstrap::run`] calls this, after the certificates are
    /// prepared: the server reads the canonical files as soon as it starts.
    fn start_background_services(&mut self) {
        self.transition(LifecycleState::ServicesStarting);

        let Some(addr) = self.metrics_addr.socket_addr() else {
            info!("Metrics server disabled");
            return;
        };

        let (reporter, receiver) = outcome_channel(METRICS_SERVER);
        metrics::spawn_metrics_server(
            addr,
            self.layout.canonical.clone(),
            Arc::clone(&self.registry),
            reporter,
        );
        FailureMonitor::new(receiver).spawn();
    }

    /// Build and populate the manager
    pub async fn build_manager<S: ManagerSetup>(
        &self,
        connect: impl Future<Output = Result<Manager>>,
        setup: &S,
    ) -> Result<Manager> {
        let mut mgr = connect
            .await
            .map_err(|e| e.during(BootstrapStep::CreateManager))?;

        setup
            .register_controllers(&mut mgr)
            .map_err(|e| e.during(BootstrapStep::RegisterController))?;

        if self.enable_webhooks {
            setup
                .register_webhooks(&mut mgr)
                .map_err(|e| e.during(BootstrapStep::RegisterWebhook))?;
        } else {
            info!("Webhooks disabled");
        }

        setup
            .register_readiness_checks(&mut mgr)
            .map_err(|e| e.during(BootstrapStep::RegisterReadinessCheck))?;

        Ok(mgr)
    }

    /// Run the manager until `shutdown` resolves or the manager fails
    pub async fn run_manager<F>(&mut self, mgr: Manager, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        self.transition(LifecycleState::ServicesRunning);
        info!("starting manager");

        let result = mgr
            .start(shutdown)
            .await
            .map_err(|e| e.during(BootstrapStep::RunManager));

        self.transition(LifecycleState::Terminating);
        if result.is_err() {
            warn!("Manager stopped with an error");
        }
        self.transition(LifecycleState::Stopped);
        result
    }

    /// The whole startup sequence, each failing step named in the error
    pub async fn run<S, C, F>(mut self, connect: C, setup: &S, shutdown: F) -> Result<()>
    where
        S: ManagerSetup,
        C: Future<Output = Result<Manager>>,
        F: Future<Output = ()> + Send,
    {
        self.prepare_certificates()?;
        self.start_background_services();
        let mgr = self.build_manager(connect, setup).await?;
        self.run_manager(mgr, shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::CanonicalCertificateLocation;
    use crate::error::Error;
    use crate::manager::{self, ManagerOptions};
    use crate::scheme::Scheme;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn recorder() -> (LifecycleObserver, Arc<Mutex<Vec<LifecycleState>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: LifecycleObserver = Arc::new(move |state| sink.lock().unwrap().push(state));
        (observer, seen)
    }

    fn bootstrap(layout: CertificateLayout) -> Bootstrap {
        Bootstrap::new(
            layout,
            BindAddress::disabled(),
            Arc::new(Registry::default()),
        )
    }

    fn offline_manager() -> Result<Manager> {
        crate::tls::install_crypto_provider();
        let config = kube::Config::new("http://127.0.0.1:1".parse().unwrap());
        let client = kube::Client::try_from(config).map_err(Error::KubeError)?;
        Manager::new(
            client,
            Arc::new(Scheme::new()),
            ManagerOptions {
                health_probe_bind_address: BindAddress::disabled(),
                webhook_port: 9443,
                leader_election: false,
                leader_election_id: "test".to_string(),
                leader_election_namespace: "default".to_string(),
                certificates: CanonicalCertificateLocation::new("/nonexistent"),
            },
        )
    }

    #[derive(Default)]
    struct Setup {
        fail_controller: bool,
        webhooks_registered: AtomicBool,
    }

    impl ManagerSetup for Setup {
        fn register_controllers(&self, _mgr: &mut Manager) -> Result<()> {
            if self.fail_controller {
                return Err(Error::RegistrationError("controller".into()));
            }
            Ok(())
        }

        fn register_webhooks(&self, _mgr: &mut Manager) -> Result<()> {
            self.webhooks_registered.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn register_readiness_checks(&self, mgr: &mut Manager) -> Result<()> {
            mgr.add_readyz_check("ready", manager::ping())
        }
    }

    #[test]
    fn test_certificate_failure_names_step() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = CertificateLayout::new(tmp.path().join("olm"), tmp.path().join("certs"));
        std::fs::create_dir(&layout.external_mount).unwrap();

        let (observer, seen) = recorder();
        let mut boot = bootstrap(layout).with_observer(observer);

        let err = boot.prepare_certificates().unwrap_err();
        assert_eq!(err.step(), Some(BootstrapStep::CopyCertificates));
        assert_eq!(boot.state(), LifecycleState::Initializing);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_states_in_order_with_metrics_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = CertificateLayout::new(tmp.path().join("olm"), tmp.path().join("certs"));
        let (observer, seen) = recorder();

        bootstrap(layout)
            .with_observer(observer)
            .run(async { offline_manager() }, &Setup::default(), async {})
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                LifecycleState::CertificatesReady,
                LifecycleState::ServicesStarting,
                LifecycleState::ServicesRunning,
                LifecycleState::Terminating,
                LifecycleState::Stopped,
            ]
        );
    }

    #[tokio::test]
    async fn test_registration_failure_names_step() {
        let tmp = tempfile::tempdir().unwrap();
        let boot = bootstrap(CertificateLayout::new(
            tmp.path().join("olm"),
            tmp.path().join("certs"),
        ));
        let setup = Setup {
            fail_controller: true,
            ..Default::default()
        };

        let err = boot
            .build_manager(async { offline_manager() }, &setup)
            .await
            .err()
            .expect("manager setup should fail");
        assert_eq!(err.step(), Some(BootstrapStep::RegisterController));
    }

    #[tokio::test]
    async fn test_manager_construction_failure_names_step() {
        let tmp = tempfile::tempdir().unwrap();
        let boot = bootstrap(CertificateLayout::new(
            tmp.path().join("olm"),
            tmp.path().join("certs"),
        ));

        let err = boot
            .build_manager(
                async { Err(Error::ConfigError("no kubeconfig".into())) },
                &Setup::default(),
            )
            .await
            .err()
            .expect("manager setup should fail");
        assert_eq!(err.step(), Some(BootstrapStep::CreateManager));
    }

    #[tokio::test]
    async fn test_webhooks_skipped_when_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = CertificateLayout::new(tmp.path().join("olm"), tmp.path().join("certs"));

        let setup = Setup::default();
        bootstrap(layout.clone())
            .with_webhooks(false)
            .build_manager(async { offline_manager() }, &setup)
            .await
            .unwrap();
        assert!(!setup.webhooks_registered.load(Ordering::SeqCst));

        let setup = Setup::default();
        bootstrap(layout)
            .build_manager(async { offline_manager() }, &setup)
            .await
            .unwrap();
        assert!(setup.webhooks_registered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_duplicate_readiness_check_names_step() {
        struct DoubleReady;

        impl ManagerSetup for DoubleReady {
            fn register_controllers(&self, _mgr: &mut Manager) -> Result<()> {
                Ok(())
            }

            fn register_webhooks(&self, _mgr: &mut Manager) -> Result<()> {
                Ok(())
            }

            fn register_readiness_checks(&self, mgr: &mut Manager) -> Result<()> {
                mgr.add_readyz_check("ready", manager::ping())?;
                mgr.add_readyz_check("ready", manager::ping())
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let boot = bootstrap(CertificateLayout::new(
            tmp.path().join("olm"),
            tmp.path().join("certs"),
        ));

        let err = boot
            .build_manager(async { offline_manager() }, &DoubleReady)
            .await
            .err()
            .expect("manager setup should fail");
        assert_eq!(err.step(), Some(BootstrapStep::RegisterReadinessCheck));
    }
}
