// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Host platform to croc release asset mapping.

use std::fmt;

use crate::error::ProvisionError;

/// Archive format of a release asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::TarGz => "tar.gz",
            ArchiveKind::Zip => "zip",
        }
    }

    /// Guess the format from an asset file name.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if lower.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else {
            None
        }
    }
}

/// An operating system / CPU architecture pair, using `std::env::consts` names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub os: String,
    pub arch: String,
}

impl Target {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this process is running on.
    pub fn host() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// Executable file name for this platform.
    pub fn binary_name(&self) -> &'static str {
        if self.is_windows() {
            "croc.exe"
        } else {
            "croc"
        }
    }

    /// Resolve the release asset marker for this platform.
    pub fn release_target(&self) -> Result<ReleaseTarget, ProvisionError> {
        let marker = match (self.os.as_str(), self.arch.as_str()) {
            ("linux", "x86_64") => "Linux-64bit",
            ("linux", "aarch64") => "Linux-ARM64",
            ("linux", "arm") => "Linux-ARM",
            ("linux", "x86") => "Linux-32bit",
            ("macos", "x86_64") => "macOS-64bit",
            ("macos", "aarch64") => "macOS-ARM64",
            ("windows", "x86_64") => "Windows-64bit",
            ("windows", "aarch64") => "Windows-ARM64",
            ("windows", "x86") => "Windows-32bit",
            ("freebsd", "x86_64") => "FreeBSD-64bit",
            _ => {
                return Err(ProvisionError::UnsupportedPlatform {
                    os: self.os.clone(),
                    arch: self.arch.clone(),
                })
            }
        };

        let archive = if self.is_windows() {
            ArchiveKind::Zip
        } else {
            ArchiveKind::TarGz
        };

        Ok(ReleaseTarget {
            marker,
            archive,
            binary_name: self.binary_name(),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// What to fetch for one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseTarget {
    pub marker: &'static str,
    pub archive: ArchiveKind,
    pub binary_name: &'static str,
}

impl ReleaseTarget {
    /// e.g. `croc_v10.2.1_Linux-64bit.tar.gz`
    pub fn asset_name(&self, version: &str) -> String {
        format!("croc_v{}_{}.{}", version, self.marker, self.archive.extension())
    }

    /// e.g. `croc_v10.2.1_checksums.txt`
    pub fn checksums_name(version: &str) -> String {
        format!("croc_v{}_checksums.txt", version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPPORTED: &[(&str, &str)] = &[
        ("linux", "x86_64"),
        ("linux", "aarch64"),
        ("linux", "arm"),
        ("linux", "x86"),
        ("macos", "x86_64"),
        ("macos", "aarch64"),
        ("windows", "x86_64"),
        ("windows", "aarch64"),
        ("windows", "x86"),
        ("freebsd", "x86_64"),
    ];

    #[test]
    fn test_every_supported_pair_resolves() {
        for (os, arch) in SUPPORTED {
            let target = Target::new(*os, *arch);
            let release = target.release_target().unwrap();
            let asset = release.asset_name("10.2.1");

            assert!(!asset.is_empty());
            assert!(asset.contains(release.marker));
            assert_eq!(
                release.binary_name.ends_with(".exe"),
                *os == "windows",
                "exe suffix mismatch for {}-{}",
                os,
                arch
            );
        }
    }

    #[test]
    fn test_asset_names() {
        let linux = Target::new("linux", "x86_64").release_target().unwrap();
        assert_eq!(linux.asset_name("10.2.1"), "croc_v10.2.1_Linux-64bit.tar.gz");

        let windows = Target::new("windows", "x86_64").release_target().unwrap();
        assert_eq!(windows.asset_name("10.2.1"), "croc_v10.2.1_Windows-64bit.zip");
        assert_eq!(windows.binary_name, "croc.exe");

        assert_eq!(ReleaseTarget::checksums_name("10.2.1"), "croc_v10.2.1_checksums.txt");
    }

    #[test]
    fn test_unsupported_platform() {
        let err = Target::new("plan9", "mips").release_target().unwrap_err();
        assert!(matches!(err, ProvisionError::UnsupportedPlatform { .. }));
    }

    #[test]
    fn test_archive_kind_from_name() {
        assert_eq!(ArchiveKind::from_name("a.tar.gz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::from_name("A.ZIP"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::from_name("a.txt"), None);
    }
}
