//! Error types for the SSP operator

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which half of a certificate pair an operation concerns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CertFile {
    Certificate,
    Key,
}

impl fmt::Display for CertFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertFile::Certificate => write!(f, "certificate"),
            CertFile::Key => write!(f, "key"),
        }
    }
}

/// Bootstrap steps whose failure terminates the process
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapStep {
    CopyCertificates,
    CreateManager,
    RegisterController,
    RegisterWebhook,
    RegisterReadinessCheck,
    RunManager,
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            BootstrapStep::CopyCertificates => "copying certificates",
            BootstrapStep::CreateManager => "creating manager",
            BootstrapStep::RegisterController => "creating controller",
            BootstrapStep::RegisterWebhook => "creating webhook",
            BootstrapStep::RegisterReadinessCheck => "registering readiness check",
            BootstrapStep::RunManager => "running manager",
        };
        f.write_str(step)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("failed to create {path}: {source}")]
    CertDirError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy {file} {from} to {to}: {source}")]
    CertCopyError {
        file: CertFile,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Registration error: {0}")]
    RegistrationError(String),

    #[error("Leader election lost: {0}")]
    LeaderElectionLost(String),

    #[error("Background task exited without reporting: {0}")]
    BackgroundTaskLost(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Telemetry error: {0}")]
    TelemetryError(String),

    #[error("error {step}: {source}")]
    Bootstrap {
        step: BootstrapStep,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach the bootstrap step that produced this error
    pub fn during(self, step: BootstrapStep) -> Self {
        Error::Bootstrap {
            step,
            source: Box::new(self),
        }
    }

    /// The failing bootstrap step, if this error carries one
    pub fn step(&self) -> Option<BootstrapStep> {
        match self {
            Error::Bootstrap { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Whether a reconcile failing with this error should be retried soon
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::KubeError(_) | Error::ServerError(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
