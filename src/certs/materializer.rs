//! Copies an externally mounted certificate pair into the canonical location

use std::fs::{self, File};
use std::io;
use std::path::Path;

use tracing::{debug, info};

use super::resolver::Resolution;
use super::source::{CanonicalCertificateLocation, CertificateSource};
use crate::error::{CertFile, Error, Result};

#[cfg(unix)]
const CERT_DIR_MODE: u32 = 0o755;

/// Copy the pair if the resolution asks for it. Returns whether a copy happened.
pub fn materialize(resolution: &Resolution) -> Result<bool> {
    if !resolution.copy_needed {
        return Ok(false);
    }
    copy_certificates(&resolution.external, &resolution.canonical)?;
    Ok(true)
}

/// Create the canonical directory and copy the certificate, then the key.
///
/// A failed key copy leaves the already copied certificate in place.
pub fn copy_certificates(
    source: &CertificateSource,
    canonical: &CanonicalCertificateLocation,
) -> Result<()> {
    create_cert_dir(canonical.dir()).map_err(|e| Error::CertDirError {
        path: canonical.dir().to_path_buf(),
        source: e,
    })?;

    let pairs = [
        (CertFile::Certificate, source.cert_path(), canonical.cert_path()),
        (CertFile::Key, source.key_path(), canonical.key_path()),
    ];
    for (file, from, to) in pairs {
        let bytes = copy_file(&from, &to).map_err(|e| Error::CertCopyError {
            file,
            from: from.clone(),
            to: to.clone(),
            source: e,
        })?;
        debug!(%file, from = %from.display(), to = %to.display(), bytes, "Copied");
    }

    info!(dir = %canonical.dir().display(), "Certificates copied to canonical location");
    Ok(())
}

#[cfg(unix)]
fn create_cert_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new()
        .recursive(true)
        .mode(CERT_DIR_MODE)
        .create(dir)
}

#[cfg(not(unix))]
fn create_cert_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

/// Both handles close when they go out of scope, on every path.
fn copy_file(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut reader = File::open(src)?;
    let mut writer = File::create(dst)?;
    io::copy(&mut reader, &mut writer)
}
