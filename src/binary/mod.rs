// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Binary provisioning for croc.
//!
//! Resolution order for [`Provisioner::ensure`]:
//!
//! 1. A runnable `croc` on PATH, when the caller prefers the system copy.
//! 2. The manifest, when it names the target version and the file exists.
//! 3. An existing `versions/<ver>/croc`, adopted into the manifest.
//! 4. A fresh download of the platform asset, checksum-checked, unpacked and
//!    copied into `versions/<ver>/`.
//!
//! Only one resolution runs at a time per [`Provisioner`].

pub mod archive;
pub mod checksum;
pub mod manifest;
pub mod provisioner;
pub mod releases;
pub mod target;
pub mod version;

pub use checksum::{ChecksumOutcome, ChecksumPolicy};
pub use manifest::{BinaryManifest, ManifestStore};
pub use provisioner::{BinaryInfo, BinaryLocator, EnsureOptions, FixedBinary, Provisioner};
pub use releases::{GithubReleases, Release, ReleaseAsset, ReleaseSource};
pub use target::{ArchiveKind, ReleaseTarget, Target};
pub use version::normalize_version;
