//! TLS material for custom registries
//!
//! Inline (base64) `ca_file`, `cert_file` and `key_file` values are decoded
//! and written next to `config.toml` as `<registry>.<ca|cert|key>`. The
//! rendered config points at those paths.

use super::credential::{decode_base64, RegistryCredential, TlsKind, TlsSource};
use super::set::RegistrySet;
use crate::error::{CharmError, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Path of a materialized TLS file
pub fn tls_file_path(config_dir: &Path, credential: &RegistryCredential, kind: TlsKind) -> PathBuf {
    let stem = credential.tls_file_stem().replace('/', "_");
    config_dir.join(format!("{}.{}", stem, kind.extension()))
}

/// Path a TLS source resolves to in the rendered config
pub fn tls_source_path(
    config_dir: &Path,
    credential: &RegistryCredential,
    kind: TlsKind,
) -> Option<PathBuf> {
    match credential.tls_source(kind)? {
        TlsSource::Inline(_) => Some(tls_file_path(config_dir, credential, kind)),
        TlsSource::Path(path) => Some(path.clone()),
    }
}

/// Writes and cleans up registry TLS files
#[derive(Debug, Clone)]
pub struct TlsMaterializer {
    config_dir: PathBuf,
}

impl TlsMaterializer {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Remove files of the previous set, then write the files of the new set
    pub fn apply(&self, registries: &RegistrySet, previous: Option<&RegistrySet>) -> Result<Vec<PathBuf>> {
        if let Some(previous) = previous {
            self.remove(previous)?;
        }
        self.write(registries)
    }

    /// Remove inline TLS files written for a registry set
    pub fn remove(&self, registries: &RegistrySet) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for (credential, kind) in inline_sources(registries) {
            let path = tls_file_path(&self.config_dir, credential, kind);
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed stale TLS file {}", path.display());
                    removed.push(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    /// Decode and write inline TLS files
    pub fn write(&self, registries: &RegistrySet) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (credential, kind) in inline_sources(registries) {
            let Some(TlsSource::Inline(data)) = credential.tls_source(kind) else {
                continue;
            };
            let contents = decode_base64(data).map_err(|e| {
                CharmError::Validation(format!(
                    "{}:{} didn't look like base64 data: {}",
                    credential.url,
                    kind.extension(),
                    e
                ))
            })?;

            fs::create_dir_all(&self.config_dir)?;
            let path = tls_file_path(&self.config_dir, credential, kind);
            write_file(&path, &contents, kind == TlsKind::Key)?;
            info!("Wrote {} for registry {}", path.display(), credential.host);
            written.push(path);
        }
        Ok(written)
    }
}

fn inline_sources(registries: &RegistrySet) -> impl Iterator<Item = (&RegistryCredential, TlsKind)> {
    registries.iter().flat_map(|credential| {
        TlsKind::ALL.into_iter().filter_map(move |kind| {
            matches!(credential.tls_source(kind), Some(TlsSource::Inline(_)))
                .then_some((credential, kind))
        })
    })
}

/// Private key material is created owner-only; an existing file is
/// truncated and forced back to 0600
fn write_file(path: &Path, contents: &[u8], private: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let mut file = options.open(path)?;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        file.write_all(contents)?;
        return Ok(());
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    Ok(())
}
