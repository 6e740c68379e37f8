//! Serving certificate resolution
//!
//! Works out whether OLM-provided certificates need to be copied into the
//! canonical serving directory, and performs the copy.

mod materializer;
mod resolver;
mod source;

pub use materializer::{copy_certificates, materialize};
pub use resolver::{resolve, Resolution};
pub use source::{
    CanonicalCertificateLocation, CertificateLayout, CertificateSource, OLM_TLS_CRT, OLM_TLS_DIR,
    OLM_TLS_KEY, SDK_TLS_CRT, SDK_TLS_KEY,
};

use tracing::{info, warn};

use crate::error::Result;

/// Resolve and, when needed, copy the certificate pair. Returns the
/// authoritative source.
pub fn prepare_certificates(layout: &CertificateLayout) -> Result<CertificateSource> {
    let resolution = resolve(layout);

    if resolution.copy_needed {
        info!(
            dir = %layout.external_mount.display(),
            "OLM cert directory found, copying cert files"
        );
        materialize(&resolution)?;
    } else {
        info!("OLM cert directory not found, using default");
    }

    if !layout.canonical.is_populated() {
        warn!(
            dir = %layout.canonical.dir().display(),
            "Canonical certificate directory has no usable certificate pair"
        );
    }

    Ok(resolution.authoritative())
}
