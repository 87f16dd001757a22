//! Atomic file persistence
//!
//! Rendered files are written to a sibling temp file, synced and renamed
//! over the destination, so readers see either the old or the new file and
//! never a partial one.

use crate::error::Result;
use crate::render::digest_hex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Replace `path` with `contents` atomically
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let temp = temp_path(path);

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&temp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&temp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    debug!("Wrote {} ({} bytes)", path.display(), contents.len());
    Ok(())
}

/// SHA-256 of an existing file, `None` when it does not exist
pub fn file_digest(path: &Path) -> Result<Option<String>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(digest_hex(&data))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Whether the file at `path` already has the given SHA-256 digest
pub fn unchanged(path: &Path, digest: &str) -> Result<bool> {
    Ok(file_digest(path)?.as_deref() == Some(digest))
}

/// Remove a file; returns whether it existed
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_atomic_replaces() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested/config.toml");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!temp.path().join("nested/.config.toml.tmp").exists());
    }

    #[test]
    fn test_failed_write_leaves_original() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "original").unwrap();

        // a directory in place of the temp file makes the write fail
        fs::create_dir(temp.path().join(".config.toml.tmp")).unwrap();
        assert!(write_atomic(&path, b"new").is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn test_file_digest() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        assert_eq!(file_digest(&path).unwrap(), None);

        fs::write(&path, "abc").unwrap();
        assert!(unchanged(
            &path,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        )
        .unwrap());
        assert!(!unchanged(&path, "0000").unwrap());
        assert_eq!(
            file_digest(&path).unwrap().as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_remove_if_exists() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("proxy.conf");
        assert!(!remove_if_exists(&path).unwrap());
        fs::write(&path, "x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!path.exists());
    }
}
