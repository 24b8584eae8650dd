// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Atomic JSON persistence.
//!
//! Every durable file crocdeck owns (binary manifest, history, settings) is a
//! small JSON document rewritten as a whole. Writes go to a sibling `.tmp`
//! file, are fsynced, then renamed over the target while an exclusive lock is
//! held on a sibling `.lock` file. Reads take a shared lock on the same lock
//! file so a reader never observes a half-written document.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Default timeout for acquiring file locks (5 seconds)
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry interval when waiting for lock acquisition
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// A JSON document on disk with a companion lock file.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read and parse the document. `Ok(None)` when the file does not exist.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let lock_file = open_lock_file(&self.lock_path())?;
        acquire_with_timeout(LOCK_TIMEOUT, || FileExt::try_lock_shared(&lock_file))
            .with_context(|| format!("Failed to acquire shared lock for {:?}", self.path))?;

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", self.path))?;

        Ok(Some(value))
    }

    /// Serialize and atomically replace the document.
    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let lock_file = open_lock_file(&self.lock_path())?;
        acquire_with_timeout(LOCK_TIMEOUT, || FileExt::try_lock_exclusive(&lock_file))
            .with_context(|| format!("Failed to acquire exclusive lock for {:?}", self.path))?;

        let content = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize {:?}", self.path))?;

        let temp_path = self.path.with_extension("tmp");
        {
            let mut temp_file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
            temp_file
                .write_all(content.as_bytes())
                .with_context(|| "Failed to write to temp file")?;
            temp_file
                .sync_all()
                .with_context(|| "Failed to sync temp file to disk")?;
        }

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!("Failed to rename {:?} -> {:?}", temp_path, self.path)
        })?;

        Ok(())
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory for lock file: {:?}", parent))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file: {:?}", path))
}

fn acquire_with_timeout<F>(timeout: Duration, mut attempt: F) -> Result<()>
where
    F: FnMut() -> std::io::Result<()>,
{
    let start = Instant::now();
    loop {
        match attempt() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if start.elapsed() >= timeout {
                    bail!(
                        "Timed out waiting for file lock after {:?}. \
                         Another crocdeck instance may be using the data directory.",
                        timeout
                    );
                }
                thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let file = JsonFile::new(dir.path().join("missing.json"));
        let loaded: Option<Doc> = file.load().unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_creates_parents_and_reloads() {
        let dir = TempDir::new().unwrap();
        let file = JsonFile::new(dir.path().join("a").join("b").join("doc.json"));
        let doc = Doc { name: "x".into(), count: 3 };

        file.save(&doc).unwrap();
        assert!(file.exists());
        assert!(!file.path().with_extension("tmp").exists());

        let loaded: Doc = file.load().unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, "{not json").unwrap();

        let file = JsonFile::new(&path);
        assert!(file.load::<Doc>().is_err());
    }

    #[test]
    fn test_exclusive_lock_times_out_while_held() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("held.lock");
        let held = open_lock_file(&lock_path).unwrap();
        FileExt::try_lock_exclusive(&held).unwrap();

        let other = open_lock_file(&lock_path).unwrap();
        let result = acquire_with_timeout(Duration::from_millis(100), || FileExt::try_lock_exclusive(&other));
        assert!(result.is_err());

        drop(held);
        let result = acquire_with_timeout(Duration::from_secs(1), || FileExt::try_lock_exclusive(&other));
        assert!(result.is_ok());
    }
}
