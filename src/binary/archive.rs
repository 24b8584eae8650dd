// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Release archive unpacking and executable discovery.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use super::target::ArchiveKind;
use crate::error::ProvisionError;

/// Unpack an in-memory archive into `dest`.
///
/// Both backends refuse entries that would escape `dest`.
pub fn unpack(bytes: &[u8], kind: ArchiveKind, dest: &Path) -> Result<(), ProvisionError> {
    fs::create_dir_all(dest)?;
    match kind {
        ArchiveKind::TarGz => {
            let decoder = GzDecoder::new(Cursor::new(bytes));
            let mut archive = tar::Archive::new(decoder);
            archive
                .unpack(dest)
                .map_err(|e| ProvisionError::Archive(e.to_string()))
        }
        ArchiveKind::Zip => {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
                .map_err(|e| ProvisionError::Archive(e.to_string()))?;
            archive
                .extract(dest)
                .map_err(|e| ProvisionError::Archive(e.to_string()))
        }
    }
}

/// Find `binary_name` under `root`: the direct child first, then a
/// depth-first search matching the file name case-insensitively.
pub fn locate_executable(root: &Path, binary_name: &str) -> Option<PathBuf> {
    let direct = root.join(binary_name);
    if direct.is_file() {
        return Some(direct);
    }
    search(root, binary_name)
}

fn search(dir: &Path, binary_name: &str) -> Option<PathBuf> {
    let mut subdirs = Vec::new();
    for entry in fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_dir() {
            subdirs.push(path);
        } else if file_type.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.eq_ignore_ascii_case(binary_name))
        {
            return Some(path);
        }
    }
    subdirs.sort();
    subdirs.into_iter().find_map(|sub| search(&sub, binary_name))
}

/// Set `0o755` on POSIX; no-op elsewhere.
pub fn set_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}
