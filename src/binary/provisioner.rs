// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Resolve a runnable croc: system copy, manifest hit, adopted install, or a
//! fresh download.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use super::archive::{locate_executable, set_executable, unpack};
use super::checksum::{verify, ChecksumOutcome, ChecksumPolicy};
use super::manifest::{BinaryManifest, ManifestStore};
use super::releases::{latest_stable, Release, ReleaseSource};
use super::target::{ReleaseTarget, Target};
use super::version::{extract_version, normalize_version, tag_for};
use crate::error::ProvisionError;
use crate::locks::resilient_lock;

/// Timeout for `croc --version`.
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-call overrides for [`Provisioner::ensure`].
#[derive(Debug, Clone, Default)]
pub struct EnsureOptions {
    /// Exact version to provision. Falls back to the configured pin, then
    /// the latest stable release.
    pub version: Option<String>,
    /// Try a croc on PATH first.
    pub prefer_system: bool,
}

/// A resolved executable and, when known, its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryInfo {
    pub path: PathBuf,
    pub version: Option<String>,
}

/// Anything that can hand out a croc executable.
#[async_trait]
pub trait BinaryLocator: Send + Sync {
    async fn locate(&self) -> Result<BinaryInfo, ProvisionError>;
}

/// A locator that always returns the same executable.
#[derive(Debug, Clone)]
pub struct FixedBinary {
    info: BinaryInfo,
}

impl FixedBinary {
    pub fn new(path: impl Into<PathBuf>, version: Option<String>) -> Self {
        Self {
            info: BinaryInfo {
                path: path.into(),
                version,
            },
        }
    }
}

#[async_trait]
impl BinaryLocator for FixedBinary {
    async fn locate(&self) -> Result<BinaryInfo, ProvisionError> {
        Ok(self.info.clone())
    }
}

/// Manages croc installs under one bin directory.
pub struct Provisioner {
    manifest: ManifestStore,
    source: Arc<dyn ReleaseSource>,
    target: Target,
    policy: ChecksumPolicy,
    pinned_version: Option<String>,
    prefer_system: bool,
    search_path: Option<OsString>,
    /// Held for the whole of an `ensure` so concurrent callers queue behind
    /// the first and then hit the manifest it wrote.
    in_flight: Mutex<()>,
    downloads: AtomicUsize,
    /// Last binary handed out, reused by [`locate`](BinaryLocator::locate)
    /// while its file still exists.
    located: std::sync::Mutex<Option<BinaryInfo>>,
}

impl Provisioner {
    pub fn new(bin_dir: impl Into<PathBuf>, source: Arc<dyn ReleaseSource>) -> Self {
        Self {
            manifest: ManifestStore::new(bin_dir),
            source,
            target: Target::host(),
            policy: ChecksumPolicy::default(),
            pinned_version: None,
            prefer_system: false,
            search_path: None,
            in_flight: Mutex::new(()),
            downloads: AtomicUsize::new(0),
            located: std::sync::Mutex::new(None),
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_pinned_version(mut self, version: Option<String>) -> Self {
        self.pinned_version = version;
        self
    }

    pub fn with_prefer_system(mut self, prefer: bool) -> Self {
        self.prefer_system = prefer;
        self
    }

    /// Search these directories (PATH syntax) for a system croc instead of
    /// the process PATH.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Number of release assets downloaded by this instance.
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Current manifest, if any.
    pub fn installed(&self) -> Option<BinaryManifest> {
        self.manifest.read()
    }

    pub async fn releases(&self) -> Result<Vec<Release>, ProvisionError> {
        self.source.list_releases().await
    }

    /// Resolve a runnable croc and return its path.
    pub async fn ensure(&self, options: EnsureOptions) -> Result<PathBuf, ProvisionError> {
        self.resolve(options).await.map(|info| info.path)
    }

    /// Like [`ensure`](Self::ensure), also reporting the version.
    pub async fn resolve(&self, options: EnsureOptions) -> Result<BinaryInfo, ProvisionError> {
        let info = self.resolve_locked(options).await?;
        *resilient_lock(&self.located) = Some(info.clone());
        Ok(info)
    }

    /// The binary a transfer should run. Reuses the last resolved binary or
    /// the installed one, and only falls back to a full
    /// [`resolve`](Self::resolve) when nothing usable is on disk.
    pub async fn locate_installed(&self) -> Result<BinaryInfo, ProvisionError> {
        let remembered = resilient_lock(&self.located)
            .clone()
            .filter(|info| info.path.is_file());
        if let Some(info) = remembered {
            return Ok(info);
        }

        if self.prefer_system {
            if let Some(info) = self.system_binary().await {
                tracing::info!("BINARY_SYSTEM | path={}", info.path.display());
                *resilient_lock(&self.located) = Some(info.clone());
                return Ok(info);
            }
        }

        let pinned = match &self.pinned_version {
            Some(raw) => Some(normalize_version(raw)?),
            None => None,
        };
        let installed = self
            .manifest
            .read()
            .filter(|m| m.binary_path.is_file())
            .filter(|m| pinned.as_ref().map_or(true, |v| *v == m.version));

        match installed {
            Some(m) => {
                tracing::debug!("Using installed croc v{} at {}", m.version, m.binary_path.display());
                let info = manifest_info(m);
                *resilient_lock(&self.located) = Some(info.clone());
                Ok(info)
            }
            None => self.resolve(EnsureOptions::default()).await,
        }
    }

    async fn resolve_locked(&self, options: EnsureOptions) -> Result<BinaryInfo, ProvisionError> {
        let _guard = self.in_flight.lock().await;

        if options.prefer_system || self.prefer_system {
            if let Some(info) = self.system_binary().await {
                tracing::info!("BINARY_SYSTEM | path={}", info.path.display());
                return Ok(info);
            }
            tracing::debug!("No runnable system croc found, falling back to managed install");
        }

        let manifest = self.manifest.read().filter(|m| m.binary_path.is_file());

        let requested = match options.version.or_else(|| self.pinned_version.clone()) {
            Some(raw) => Some(normalize_version(&raw)?),
            None => None,
        };

        let version = match requested {
            Some(version) => version,
            None => match self.latest_version().await {
                Ok(version) => version,
                Err(e) => {
                    if let Some(m) = manifest {
                        tracing::warn!(
                            "Release lookup failed ({}); using installed croc v{}",
                            e,
                            m.version
                        );
                        return Ok(manifest_info(m));
                    }
                    return Err(e);
                }
            },
        };

        if let Some(m) = manifest.filter(|m| m.version == version) {
            tracing::debug!("Manifest hit for v{} at {}", version, m.binary_path.display());
            return Ok(manifest_info(m));
        }

        let release_target = self.target.release_target()?;
        let install_path = self.install_path(&version, &release_target);

        if install_path.is_file() {
            let m = self.manifest.update(&version, &install_path)?;
            tracing::info!("BINARY_ADOPTED | version={} path={}", version, install_path.display());
            return Ok(manifest_info(m));
        }

        self.install(&version, &release_target, &install_path).await?;
        let m = self.manifest.update(&version, &install_path)?;
        tracing::info!("BINARY_INSTALLED | version={} path={}", version, install_path.display());
        Ok(manifest_info(m))
    }

    /// Run `<binary> --version` and pull out `x.y.z`.
    pub async fn runtime_version(path: &Path) -> Option<String> {
        let output = tokio::time::timeout(
            VERSION_PROBE_TIMEOUT,
            tokio::process::Command::new(path)
                .arg("--version")
                .stdin(std::process::Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .ok()?
        .ok()?;

        let text = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        extract_version(&text)
    }

    fn install_path(&self, version: &str, release_target: &ReleaseTarget) -> PathBuf {
        self.manifest
            .bin_dir()
            .join("versions")
            .join(version)
            .join(release_target.binary_name)
    }

    async fn latest_version(&self) -> Result<String, ProvisionError> {
        let releases = self.source.list_releases().await?;
        latest_stable(&releases).ok_or(ProvisionError::NoReleases)
    }

    async fn system_binary(&self) -> Option<BinaryInfo> {
        let name = self.target.binary_name();
        let found = match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().ok()?;
                which::which_in(name, Some(paths), cwd).ok()?
            }
            None => which::which(name).ok()?,
        };

        // Runnable means it answers --version
        let version = Self::runtime_version(&found).await?;
        Some(BinaryInfo {
            path: found,
            version: Some(version),
        })
    }

    async fn asset_url(&self, version: &str, asset_name: &str) -> Result<String, ProvisionError> {
        let tag = tag_for(version);
        let release = match self.source.list_releases().await {
            Ok(releases) => releases.into_iter().find(|r| r.tag_name == tag),
            Err(e) => {
                tracing::debug!("Release list unavailable, using the conventional URL: {}", e);
                None
            }
        };

        match release {
            Some(release) => match release.asset(asset_name) {
                Some(asset) if !asset.url.is_empty() => Ok(asset.url.clone()),
                Some(_) => Ok(self.source.asset_url(&tag, asset_name)),
                None => Err(ProvisionError::AssetNotFound {
                    version: version.to_string(),
                    asset: asset_name.to_string(),
                }),
            },
            None => Ok(self.source.asset_url(&tag, asset_name)),
        }
    }

    async fn install(
        &self,
        version: &str,
        release_target: &ReleaseTarget,
        install_path: &Path,
    ) -> Result<(), ProvisionError> {
        let asset_name = release_target.asset_name(version);
        let url = self.asset_url(version, &asset_name).await?;

        tracing::info!("Downloading {} for {}", asset_name, self.target);
        let bytes = self.source.download(&url).await?;
        self.downloads.fetch_add(1, Ordering::SeqCst);

        self.check_digest(version, &asset_name, &bytes).await?;

        let bin_dir = self.manifest.bin_dir().to_path_buf();
        let install_path = install_path.to_path_buf();
        let archive = release_target.archive;
        let binary_name = release_target.binary_name;

        tokio::task::spawn_blocking(move || {
            extract_into(&bytes, archive, binary_name, &asset_name, &bin_dir, &install_path)
        })
        .await
        .map_err(|e| ProvisionError::Io(format!("extraction task failed: {}", e)))?
    }

    async fn check_digest(&self, version: &str, asset_name: &str, bytes: &[u8]) -> Result<(), ProvisionError> {
        let checksums_name = ReleaseTarget::checksums_name(version);
        let url = self.source.asset_url(&tag_for(version), &checksums_name);

        let checksums = match self.source.download(&url).await {
            Ok(body) => String::from_utf8_lossy(&body).into_owned(),
            Err(e) => {
                tracing::warn!("CHECKSUM_UNAVAILABLE | asset={} error={}", asset_name, e);
                return Ok(());
            }
        };

        match verify(bytes, &checksums, asset_name) {
            ChecksumOutcome::Verified => {
                tracing::debug!("Checksum verified for {}", asset_name);
                Ok(())
            }
            ChecksumOutcome::Missing => {
                tracing::warn!("CHECKSUM_MISSING | asset={} manifest={}", asset_name, checksums_name);
                Ok(())
            }
            ChecksumOutcome::Mismatch { expected, actual } => match self.policy {
                ChecksumPolicy::Warn => {
                    tracing::warn!(
                        "CHECKSUM_MISMATCH | asset={} expected={} actual={} policy=warn",
                        asset_name,
                        expected,
                        actual
                    );
                    Ok(())
                }
                ChecksumPolicy::Enforce => {
                    tracing::error!(
                        "CHECKSUM_MISMATCH | asset={} expected={} actual={} policy=enforce",
                        asset_name,
                        expected,
                        actual
                    );
                    Err(ProvisionError::ChecksumMismatch {
                        asset: asset_name.to_string(),
                        expected,
                        actual,
                    })
                }
            },
        }
    }
}

#[async_trait]
impl BinaryLocator for Provisioner {
    async fn locate(&self) -> Result<BinaryInfo, ProvisionError> {
        self.locate_installed().await
    }
}

fn manifest_info(manifest: BinaryManifest) -> BinaryInfo {
    BinaryInfo {
        path: manifest.binary_path,
        version: Some(manifest.version),
    }
}

/// Unpack into a scratch directory under `bin_dir`, then copy the executable
/// to `install_path`. The scratch directory is removed on drop.
fn extract_into(
    bytes: &[u8],
    archive: super::target::ArchiveKind,
    binary_name: &str,
    asset_name: &str,
    bin_dir: &Path,
    install_path: &Path,
) -> Result<(), ProvisionError> {
    fs::create_dir_all(bin_dir)?;
    let staging = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(bin_dir)?;

    unpack(bytes, archive, staging.path())?;

    let found = locate_executable(staging.path(), binary_name).ok_or_else(|| {
        ProvisionError::BinaryNotInArchive {
            asset: asset_name.to_string(),
            binary: binary_name.to_string(),
        }
    })?;

    if let Some(parent) = install_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(&found, install_path)?;
    set_executable(install_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::checksum::sha256_hex;
    use crate::binary::releases::ReleaseAsset;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    const VERSION: &str = "10.2.1";

    fn linux() -> Target {
        Target::new("linux", "x86_64")
    }

    fn tar_gz(name: &str, data: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    /// In-memory release source keyed by URL.
    struct FakeSource {
        releases: Result<Vec<Release>, ProvisionError>,
        files: HashMap<String, Vec<u8>>,
        fetched: StdMutex<Vec<String>>,
        listed: AtomicUsize,
    }

    impl FakeSource {
        fn with_asset(archive: Vec<u8>, checksums: Option<String>) -> Self {
            let asset = linux().release_target().unwrap().asset_name(VERSION);
            let mut files = HashMap::new();
            files.insert(format!("mem://v{}/{}", VERSION, asset), archive);
            if let Some(text) = checksums {
                files.insert(
                    format!("mem://v{}/{}", VERSION, ReleaseTarget::checksums_name(VERSION)),
                    text.into_bytes(),
                );
            }
            let release = Release {
                tag_name: format!("v{}", VERSION),
                version: Some(VERSION.into()),
                name: String::new(),
                published_at: None,
                prerelease: false,
                draft: false,
                assets: vec![ReleaseAsset {
                    name: asset.clone(),
                    url: String::new(),
                    size: 0,
                }],
            };
            Self {
                releases: Ok(vec![release]),
                files,
                fetched: StdMutex::new(Vec::new()),
                listed: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReleaseSource for FakeSource {
        async fn list_releases(&self) -> Result<Vec<Release>, ProvisionError> {
            self.listed.fetch_add(1, Ordering::SeqCst);
            self.releases.clone()
        }

        fn asset_url(&self, tag: &str, asset_name: &str) -> String {
            format!("mem://{}/{}", tag, asset_name)
        }

        async fn download(&self, url: &str) -> Result<Vec<u8>, ProvisionError> {
            self.fetched.lock().unwrap().push(url.to_string());
            self.files
                .get(url)
                .cloned()
                .ok_or_else(|| ProvisionError::Network(format!("404 {}", url)))
        }
    }

    fn provisioner(dir: &TempDir, source: FakeSource) -> Provisioner {
        Provisioner::new(dir.path().join("bin"), Arc::new(source)).with_target(linux())
    }

    #[tokio::test]
    async fn test_download_installs_and_writes_manifest() {
        let dir = TempDir::new().unwrap();
        let archive = tar_gz("croc", b"#!/bin/sh\n");
        let checksums = format!(
            "{}  {}\n",
            sha256_hex(&archive),
            linux().release_target().unwrap().asset_name(VERSION)
        );
        let p = provisioner(&dir, FakeSource::with_asset(archive, Some(checksums)));

        let path = p.ensure(EnsureOptions::default()).await.unwrap();

        assert_eq!(
            path,
            dir.path().join("bin").join("versions").join(VERSION).join("croc")
        );
        assert!(path.is_file());
        assert_eq!(p.installed().unwrap().version, VERSION);
        assert_eq!(p.download_count(), 1);
    }

    #[tokio::test]
    async fn test_second_ensure_is_a_manifest_hit() {
        let dir = TempDir::new().unwrap();
        let p = provisioner(&dir, FakeSource::with_asset(tar_gz("croc", b"x"), None));

        let first = p.ensure(EnsureOptions::default()).await.unwrap();
        let second = p.ensure(EnsureOptions::default()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(p.download_count(), 1);
    }

    #[tokio::test]
    async fn test_existing_install_dir_is_adopted() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("bin").join("versions").join(VERSION).join("croc");
        fs::create_dir_all(existing.parent().unwrap()).unwrap();
        fs::write(&existing, b"bin").unwrap();

        let p = provisioner(&dir, FakeSource::with_asset(tar_gz("croc", b"x"), None));
        let path = p
            .ensure(EnsureOptions {
                version: Some("v10.2.1".into()),
                prefer_system: false,
            })
            .await
            .unwrap();

        assert_eq!(path, existing);
        assert_eq!(p.download_count(), 0);
        assert_eq!(p.installed().unwrap().binary_path, existing);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_warns_by_default() {
        let dir = TempDir::new().unwrap();
        let asset = linux().release_target().unwrap().asset_name(VERSION);
        let checksums = format!("{}  {}\n", "0".repeat(64), asset);
        let p = provisioner(&dir, FakeSource::with_asset(tar_gz("croc", b"x"), Some(checksums)));

        assert!(p.ensure(EnsureOptions::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_aborts_when_enforced() {
        let dir = TempDir::new().unwrap();
        let asset = linux().release_target().unwrap().asset_name(VERSION);
        let checksums = format!("{}  {}\n", "0".repeat(64), asset);
        let p = provisioner(&dir, FakeSource::with_asset(tar_gz("croc", b"x"), Some(checksums)))
            .with_checksum_policy(ChecksumPolicy::Enforce);

        let err = p.ensure(EnsureOptions::default()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::ChecksumMismatch { .. }));
        assert!(p.installed().is_none());
    }

    #[tokio::test]
    async fn test_archive_without_binary_is_named_error() {
        let dir = TempDir::new().unwrap();
        let p = provisioner(&dir, FakeSource::with_asset(tar_gz("README.md", b"hi"), None));

        let err = p.ensure(EnsureOptions::default()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::BinaryNotInArchive { .. }));
    }

    #[tokio::test]
    async fn test_release_without_asset_is_asset_not_found() {
        let dir = TempDir::new().unwrap();
        let mut source = FakeSource::with_asset(tar_gz("croc", b"x"), None);
        if let Ok(releases) = source.releases.as_mut() {
            releases[0].assets.clear();
        }
        let p = provisioner(&dir, source);

        let err = p.ensure(EnsureOptions::default()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::AssetNotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_version_rejected_before_network() {
        let dir = TempDir::new().unwrap();
        let p = provisioner(&dir, FakeSource::with_asset(tar_gz("croc", b"x"), None));

        let err = p
            .ensure(EnsureOptions {
                version: Some("ten".into()),
                prefer_system: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidVersion(_)));
    }

    #[tokio::test]
    async fn test_offline_falls_back_to_manifest() {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("croc");
        fs::write(&bin, b"bin").unwrap();
        ManifestStore::new(dir.path().join("bin"))
            .update("9.6.17", &bin)
            .unwrap();

        let mut source = FakeSource::with_asset(Vec::new(), None);
        source.releases = Err(ProvisionError::Network("offline".into()));
        let p = provisioner(&dir, source);

        let info = p.resolve(EnsureOptions::default()).await.unwrap();
        assert_eq!(info.path, bin);
        assert_eq!(info.version.as_deref(), Some("9.6.17"));
    }

    #[tokio::test]
    async fn test_offline_without_install_propagates() {
        let dir = TempDir::new().unwrap();
        let mut source = FakeSource::with_asset(Vec::new(), None);
        source.releases = Err(ProvisionError::Network("offline".into()));
        let p = provisioner(&dir, source);

        let err = p.ensure(EnsureOptions::default()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Network(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_prefer_system_uses_runnable_path_binary() {
        let dir = TempDir::new().unwrap();
        let sys = dir.path().join("sys");
        fs::create_dir_all(&sys).unwrap();
        let croc = sys.join("croc");
        fs::write(&croc, "#!/bin/sh\necho 'croc version v10.0.5'\n").unwrap();
        set_executable(&croc).unwrap();

        let p = provisioner(&dir, FakeSource::with_asset(Vec::new(), None)).with_search_path(sys.as_os_str());
        let info = p
            .resolve(EnsureOptions {
                version: None,
                prefer_system: true,
            })
            .await
            .unwrap();

        assert_eq!(info.path, croc);
        assert_eq!(info.version.as_deref(), Some("10.0.5"));
        assert_eq!(p.download_count(), 0);
    }

    #[tokio::test]
    async fn test_fixed_binary_locator() {
        let locator = FixedBinary::new("/usr/bin/croc", Some("10.2.1".into()));
        let info = locator.locate().await.unwrap();
        assert_eq!(info.path, PathBuf::from("/usr/bin/croc"));
    }

    #[tokio::test]
    async fn test_locate_uses_install_without_touching_source() {
        let dir = TempDir::new().unwrap();
        let installed = dir.path().join("bin").join("versions").join(VERSION).join("croc");
        fs::create_dir_all(installed.parent().unwrap()).unwrap();
        fs::write(&installed, b"bin").unwrap();
        ManifestStore::new(dir.path().join("bin"))
            .update(VERSION, &installed)
            .unwrap();

        let mut source = FakeSource::with_asset(Vec::new(), None);
        source.releases = Err(ProvisionError::Network("offline".into()));
        let source = Arc::new(source);
        let p = Provisioner::new(dir.path().join("bin"), source.clone()).with_target(linux());

        for _ in 0..3 {
            let info = p.locate().await.unwrap();
            assert_eq!(info.path, installed);
            assert_eq!(info.version.as_deref(), Some(VERSION));
        }
        assert_eq!(source.listed.load(Ordering::SeqCst), 0);
        assert!(source.fetched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_locate_installs_once_when_nothing_is_on_disk() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::with_asset(tar_gz("croc", b"x"), None));
        let p = Provisioner::new(dir.path().join("bin"), source.clone()).with_target(linux());

        let first = p.locate().await.unwrap();
        let second = p.locate().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(p.download_count(), 1);
        assert_eq!(source.listed.load(Ordering::SeqCst), 2);

        let listed = source.listed.load(Ordering::SeqCst);
        p.locate().await.unwrap();
        assert_eq!(source.listed.load(Ordering::SeqCst), listed);
    }

    #[tokio::test]
    async fn test_locate_ignores_install_of_other_pinned_version() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("bin").join("versions").join("9.6.0").join("croc");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"bin").unwrap();
        ManifestStore::new(dir.path().join("bin"))
            .update("9.6.0", &stale)
            .unwrap();

        let p = provisioner(&dir, FakeSource::with_asset(tar_gz("croc", b"x"), None))
            .with_pinned_version(Some(VERSION.into()));
        let info = p.locate().await.unwrap();
        assert_eq!(info.version.as_deref(), Some(VERSION));
        assert_eq!(p.download_count(), 1);
    }
}
