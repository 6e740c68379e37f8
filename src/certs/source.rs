//! Certificate locations
//!
//! Two provisioning mechanisms may supply serving certificates. OLM mounts
//! them under a fixed directory with `apiserver.*` names, while every TLS
//! server in this process reads `tls.*` files from the canonical directory.

use std::path::{Path, PathBuf};

/// Directory OLM mounts serving certificates into
pub const OLM_TLS_DIR: &str = "/apiserver.local.config/certificates";
pub const OLM_TLS_CRT: &str = "apiserver.crt";
pub const OLM_TLS_KEY: &str = "apiserver.key";

/// Certificate file names the serving components expect
pub const SDK_TLS_CRT: &str = "tls.crt";
pub const SDK_TLS_KEY: &str = "tls.key";

/// Canonical certificate directory, relative to the system temp dir
const SDK_TLS_SUBDIR: &str = "k8s-webhook-server/serving-certs";

/// Where a certificate pair comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CertificateSource {
    /// Mounted by the Operator Lifecycle Manager
    Olm { dir: PathBuf },
    /// Already present in the canonical location
    Sdk { dir: PathBuf },
}

impl CertificateSource {
    pub fn olm(dir: impl Into<PathBuf>) -> Self {
        CertificateSource::Olm { dir: dir.into() }
    }

    pub fn sdk(dir: impl Into<PathBuf>) -> Self {
        CertificateSource::Sdk { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        match self {
            CertificateSource::Olm { dir } | CertificateSource::Sdk { dir } => dir,
        }
    }

    pub fn cert_file_name(&self) -> &'static str {
        match self {
            CertificateSource::Olm { .. } => OLM_TLS_CRT,
            CertificateSource::Sdk { .. } => SDK_TLS_CRT,
        }
    }

    pub fn key_file_name(&self) -> &'static str {
        match self {
            CertificateSource::Olm { .. } => OLM_TLS_KEY,
            CertificateSource::Sdk { .. } => SDK_TLS_KEY,
        }
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir().join(self.cert_file_name())
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir().join(self.key_file_name())
    }
}

/// The directory every TLS-serving component reads `tls.crt`/`tls.key` from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalCertificateLocation {
    dir: PathBuf,
}

impl CanonicalCertificateLocation {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.join(SDK_TLS_CRT)
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(SDK_TLS_KEY)
    }

    /// Both files exist and are non-empty
    pub fn is_populated(&self) -> bool {
        [self.cert_path(), self.key_path()].iter().all(|p| {
            std::fs::metadata(p)
                .map(|m| m.is_file() && m.len() > 0)
                .unwrap_or(false)
        })
    }

    pub fn as_source(&self) -> CertificateSource {
        CertificateSource::sdk(self.dir.clone())
    }
}

impl Default for CanonicalCertificateLocation {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join(SDK_TLS_SUBDIR))
    }
}

/// The pair of candidate directories inspected at startup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateLayout {
    pub external_mount: PathBuf,
    pub canonical: CanonicalCertificateLocation,
}

impl CertificateLayout {
    pub fn new(external_mount: impl Into<PathBuf>, canonical: impl Into<PathBuf>) -> Self {
        Self {
            external_mount: external_mount.into(),
            canonical: CanonicalCertificateLocation::new(canonical),
        }
    }

    pub fn external_source(&self) -> CertificateSource {
        CertificateSource::olm(self.external_mount.clone())
    }
}

impl Default for CertificateLayout {
    fn default() -> Self {
        Self {
            external_mount: PathBuf::from(OLM_TLS_DIR),
            canonical: CanonicalCertificateLocation::default(),
        }
    }
}
