// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the crocdeck core.
//!
//! Three families, matching how far a failure is allowed to travel:
//!
//! - [`ProvisionError`]: acquiring the croc binary failed. Fatal to the
//!   requested operation, returned to the caller, never retried here.
//! - [`OptionsError`]: a transfer request was rejected before anything ran.
//! - [`SupervisorError`]: a transfer could not be started (or stopped).
//!
//! Subprocess failures after a successful start are *not* errors at this
//! level; they arrive as a terminal `transfer:done` event with
//! `success = false`. History store failures are recorded on the store
//! itself and never returned.

use std::fmt;

/// Errors raised while resolving, downloading or installing the binary.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionError {
    /// Version string is not `MAJOR.MINOR.PATCH` (optionally `v`-prefixed).
    InvalidVersion(String),
    /// No release asset exists for this OS/architecture pair.
    UnsupportedPlatform { os: String, arch: String },
    /// Release listing or asset download failed.
    Network(String),
    /// The release does not publish the asset we need.
    AssetNotFound { version: String, asset: String },
    /// The archive unpacked but the executable was not inside it.
    BinaryNotInArchive { asset: String, binary: String },
    /// Archive could not be read.
    Archive(String),
    /// Downloaded bytes do not match the published checksum (enforce policy only).
    ChecksumMismatch { asset: String, expected: String, actual: String },
    /// Upstream listed no usable release and nothing is installed.
    NoReleases,
    /// Local filesystem failure.
    Io(String),
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVersion(v) => write!(f, "Invalid version '{}': expected MAJOR.MINOR.PATCH", v),
            Self::UnsupportedPlatform { os, arch } => {
                write!(f, "No croc release is published for {}-{}", os, arch)
            }
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::AssetNotFound { version, asset } => {
                write!(f, "Release v{} has no asset named {}", version, asset)
            }
            Self::BinaryNotInArchive { asset, binary } => {
                write!(f, "Archive {} did not contain '{}'", asset, binary)
            }
            Self::Archive(msg) => write!(f, "Failed to unpack archive: {}", msg),
            Self::ChecksumMismatch { asset, expected, actual } => write!(
                f,
                "Checksum mismatch for {}: expected {}, got {}",
                asset, expected, actual
            ),
            Self::NoReleases => write!(f, "No croc release available and none installed"),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ProvisionError {}

impl From<std::io::Error> for ProvisionError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<reqwest::Error> for ProvisionError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// A transfer request that cannot be turned into a command line.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionsError {
    /// File mode with no paths.
    NoPaths,
    /// Text mode with empty text.
    EmptyText,
    /// Receive without a code.
    MissingCode,
    /// Code failed strict format validation.
    InvalidCode(String),
}

impl fmt::Display for OptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPaths => write!(f, "Select at least one file or folder to send"),
            Self::EmptyText => write!(f, "Text to send is empty"),
            Self::MissingCode => write!(f, "A code is required to receive"),
            Self::InvalidCode(reason) => write!(f, "Invalid code: {}", reason),
        }
    }
}

impl std::error::Error for OptionsError {}

/// Failures starting or addressing a supervised transfer.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorError {
    /// The id is already tracked by a live session.
    DuplicateSession(String),
    /// No live session has this id.
    UnknownSession(String),
    /// Options were rejected.
    Options(OptionsError),
    /// The binary could not be provisioned.
    Provision(ProvisionError),
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateSession(id) => write!(f, "Transfer '{}' is already running", id),
            Self::UnknownSession(id) => write!(f, "No running transfer with id '{}'", id),
            Self::Options(e) => write!(f, "{}", e),
            Self::Provision(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SupervisorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Options(e) => Some(e),
            Self::Provision(e) => Some(e),
            _ => None,
        }
    }
}

impl From<OptionsError> for SupervisorError {
    fn from(e: OptionsError) -> Self {
        Self::Options(e)
    }
}

impl From<ProvisionError> for SupervisorError {
    fn from(e: ProvisionError) -> Self {
        Self::Provision(e)
    }
}
