// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SHA-256 verification against a published `checksums.txt`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What a checksum mismatch does to an install.
///
/// `Warn` is the default and keeps the downloaded binary; `Enforce` aborts
/// the install. Operators who want the strict behavior opt in through
/// settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    #[default]
    Warn,
    Enforce,
}

/// Result of checking one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumOutcome {
    Verified,
    Mismatch { expected: String, actual: String },
    /// The manifest has no line for this asset.
    Missing,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Find the expected digest for `asset_name` in goreleaser-style
/// `<hex>  <name>` lines. A `*` binary-mode marker before the name is
/// tolerated.
pub fn expected_digest(checksums: &str, asset_name: &str) -> Option<String> {
    checksums.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let digest = parts.next()?;
        let name = parts.next()?.trim_start_matches('*');
        (name == asset_name && digest.len() == 64).then(|| digest.to_ascii_lowercase())
    })
}

pub fn verify(bytes: &[u8], checksums: &str, asset_name: &str) -> ChecksumOutcome {
    let Some(expected) = expected_digest(checksums, asset_name) else {
        return ChecksumOutcome::Missing;
    };
    let actual = sha256_hex(bytes);
    if actual == expected {
        ChecksumOutcome::Verified
    } else {
        ChecksumOutcome::Mismatch { expected, actual }
    }
}
