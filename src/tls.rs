//! rustls crypto provider setup

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

use crate::certs::CanonicalCertificateLocation;
use crate::error::{Error, Result};

/// Install aws-lc-rs as the process-wide provider unless one is already set.
///
/// Several dependencies enable different rustls backends, so the default
/// cannot be inferred from crate features alone.
pub fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        // Losing the race to another installer is fine.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }
}

/// Load the canonical `tls.crt`/`tls.key` pair into a server config
pub async fn load_server_config(location: &CanonicalCertificateLocation) -> Result<RustlsConfig> {
    install_crypto_provider();
    load_pem_files(&location.cert_path(), &location.key_path()).await
}

async fn load_pem_files(cert: &Path, key: &Path) -> Result<RustlsConfig> {
    RustlsConfig::from_pem_file(cert, key).await.map_err(|e| {
        Error::TlsError(format!(
            "failed to load {} / {}: {}",
            cert.display(),
            key.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_pair_is_tls_error() {
        let tmp = tempfile::tempdir().unwrap();
        let location = CanonicalCertificateLocation::new(tmp.path());

        let err = load_server_config(&location)
            .await
            .err()
            .expect("loading a missing pair should fail");
        assert!(matches!(err, Error::TlsError(_)));
    }

    #[tokio::test]
    async fn test_self_signed_pair_loads() {
        let tmp = tempfile::tempdir().unwrap();
        let location = CanonicalCertificateLocation::new(tmp.path());
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        std::fs::write(location.cert_path(), certified.cert.pem()).unwrap();
        std::fs::write(location.key_path(), certified.key_pair.serialize_pem()).unwrap();

        assert!(load_server_config(&location).await.is_ok());
    }
}
