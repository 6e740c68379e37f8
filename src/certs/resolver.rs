//! Decides which certificate source is authoritative

use std::path::Path;

use tracing::warn;

use super::source::{CanonicalCertificateLocation, CertificateLayout, CertificateSource};

/// Outcome of inspecting the two candidate directories
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub copy_needed: bool,
    pub external: CertificateSource,
    pub canonical: CanonicalCertificateLocation,
}

impl Resolution {
    /// The source the serving components effectively get their pair from
    pub fn authoritative(&self) -> CertificateSource {
        if self.copy_needed {
            self.external.clone()
        } else {
            self.canonical.as_source()
        }
    }
}

/// Inspect the filesystem. A copy is needed iff the external mount is a
/// directory and the canonical directory does not exist.
pub fn resolve(layout: &CertificateLayout) -> Resolution {
    let external_is_dir = layout.external_mount.is_dir();
    let canonical_exists = exists_or_absent(layout.canonical.dir());

    Resolution {
        copy_needed: external_is_dir && !canonical_exists,
        external: layout.external_source(),
        canonical: layout.canonical.clone(),
    }
}

/// Stat errors other than NotFound count as "absent".
fn exists_or_absent(path: &Path) -> bool {
    match path.try_exists() {
        Ok(exists) => exists,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Unable to stat canonical certificate directory, treating it as absent"
            );
            false
        }
    }
}
