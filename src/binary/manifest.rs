// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The install manifest: which croc is current, and where it lives.
//!
//! The manifest file is the only authority. The `current` link next to it is
//! a convenience for humans and shell scripts; failing to create it is logged
//! and otherwise ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;
use crate::persist::JsonFile;

/// Persisted `{version, binaryPath}` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryManifest {
    pub version: String,
    pub binary_path: PathBuf,
}

/// Reads and writes `manifest.json` inside the managed bin directory.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    bin_dir: PathBuf,
    file: JsonFile,
}

impl ManifestStore {
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        let bin_dir = bin_dir.into();
        let file = JsonFile::new(bin_dir.join("manifest.json"));
        Self { bin_dir, file }
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    pub fn current_link(&self) -> PathBuf {
        self.bin_dir.join("current")
    }

    /// Current manifest. A missing or unreadable file reads as `None`.
    pub fn read(&self) -> Option<BinaryManifest> {
        match self.file.load::<BinaryManifest>() {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!("MANIFEST_UNREADABLE | path={:?} error={:#}", self.file.path(), e);
                None
            }
        }
    }

    /// Atomically record `version` at `binary_path`, then refresh the link.
    pub fn update(&self, version: &str, binary_path: &Path) -> Result<BinaryManifest, ProvisionError> {
        let manifest = BinaryManifest {
            version: version.to_string(),
            binary_path: binary_path.to_path_buf(),
        };
        self.file
            .save(&manifest)
            .map_err(|e| ProvisionError::Io(format!("{:#}", e)))?;

        tracing::info!(
            "MANIFEST_UPDATED | version={} path={}",
            manifest.version,
            manifest.binary_path.display()
        );

        if let Err(e) = self.refresh_current_link(binary_path) {
            tracing::debug!("Could not refresh current link: {}", e);
        }

        Ok(manifest)
    }

    fn refresh_current_link(&self, target: &Path) -> std::io::Result<()> {
        let link = self.current_link();
        if link.symlink_metadata().is_ok() {
            std::fs::remove_file(&link)?;
        }
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, &link)
        }
        #[cfg(windows)]
        {
            std::os::windows::fs::symlink_file(target, &link)
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = target;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        assert!(store.read().is_none());
    }

    #[test]
    fn test_update_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        let path = dir.path().join("versions").join("10.2.1").join("croc");

        store.update("10.2.1", &path).unwrap();
        let manifest = store.read().unwrap();

        assert_eq!(
            manifest,
            BinaryManifest {
                version: "10.2.1".into(),
                binary_path: path,
            }
        );
    }

    #[test]
    fn test_on_disk_shape_is_camel_case() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        store.update("10.2.1", Path::new("/opt/croc")).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("manifest.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], "10.2.1");
        assert_eq!(value["binaryPath"], "/opt/croc");
    }

    #[test]
    fn test_update_overwrites_previous() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        store.update("9.6.17", Path::new("/a/croc")).unwrap();
        store.update("10.2.1", Path::new("/b/croc")).unwrap();

        let manifest = store.read().unwrap();
        assert_eq!(manifest.version, "10.2.1");
        assert_eq!(manifest.binary_path, PathBuf::from("/b/croc"));
    }

    #[cfg(unix)]
    #[test]
    fn test_current_link_points_at_binary() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        let target = dir.path().join("croc");
        std::fs::write(&target, b"bin").unwrap();

        store.update("10.2.1", &target).unwrap();
        assert_eq!(std::fs::read_link(store.current_link()).unwrap(), target);

        // A second update replaces the existing link instead of failing
        store.update("10.2.2", &target).unwrap();
        assert_eq!(std::fs::read_link(store.current_link()).unwrap(), target);
    }
}
