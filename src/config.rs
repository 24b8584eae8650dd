// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Settings and data-directory layout.
//!
//! The settings schema proper belongs to the front-end; this is the slice of
//! it the core reads: binary selection, capability strategy, checksum policy,
//! cancellation grace, history retention, and defaults folded into every
//! transfer (extra flags, relay).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::binary::ChecksumPolicy;
use crate::capability::StrategyKind;
use crate::history::HistorySettings;
use crate::persist::JsonFile;

/// Environment variable overriding the data directory.
pub const HOME_ENV: &str = "CROCDECK_HOME";

/// Core settings, persisted as `config.json` in the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Pin a croc version instead of following the latest release.
    #[serde(default)]
    pub binary_version: Option<String>,
    /// Use a croc found on PATH before managing our own copy.
    #[serde(default)]
    pub prefer_system_binary: bool,
    /// How flag support is determined: `detect` (help probing) or `static`.
    #[serde(default)]
    pub capability_strategy: StrategyKind,
    /// What to do when a download does not match its published checksum.
    #[serde(default)]
    pub checksum_policy: ChecksumPolicy,
    /// Grace period between interrupt and force-kill on stop.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    /// Validate code format before starting a transfer.
    #[serde(default)]
    pub strict_code_validation: bool,
    /// Free-form flags appended to every croc invocation.
    #[serde(default)]
    pub extra_flags: Option<String>,
    /// Relay used when a transfer does not name one.
    #[serde(default)]
    pub default_relay: Option<String>,
    /// Relay password used when a transfer does not name one.
    #[serde(default)]
    pub relay_password: Option<String>,
    /// History retention and log-tail cap.
    #[serde(default)]
    pub history: HistorySettings,
    /// How long a fetched release list stays fresh.
    #[serde(default = "default_release_cache_ttl_secs")]
    pub release_cache_ttl_secs: u64,
    /// Interval of the background relay reachability probe.
    #[serde(default = "default_relay_probe_interval_secs")]
    pub relay_probe_interval_secs: u64,
}

fn default_kill_grace_ms() -> u64 {
    2000
}

fn default_release_cache_ttl_secs() -> u64 {
    300
}

fn default_relay_probe_interval_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binary_version: None,
            prefer_system_binary: false,
            capability_strategy: StrategyKind::default(),
            checksum_policy: ChecksumPolicy::default(),
            kill_grace_ms: default_kill_grace_ms(),
            strict_code_validation: false,
            extra_flags: None,
            default_relay: None,
            relay_password: None,
            history: HistorySettings::default(),
            release_cache_ttl_secs: default_release_cache_ttl_secs(),
            relay_probe_interval_secs: default_relay_probe_interval_secs(),
        }
    }
}

impl Config {
    /// Clamp values the core cannot work with.
    pub fn validate(mut self) -> Self {
        if self.history.max_log_lines == 0 {
            tracing::warn!("history.max_log_lines=0 is not usable; using 1");
            self.history.max_log_lines = 1;
        }
        if self.relay_probe_interval_secs == 0 {
            self.relay_probe_interval_secs = default_relay_probe_interval_secs();
        }
        if let Some(flags) = &self.extra_flags {
            if flags.trim().is_empty() {
                self.extra_flags = None;
            }
        }
        self
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn release_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.release_cache_ttl_secs)
    }

    pub fn relay_probe_interval(&self) -> Duration {
        Duration::from_secs(self.relay_probe_interval_secs)
    }
}

/// On-disk layout under the data directory.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$CROCDECK_HOME`, else the platform data dir, else `./.crocdeck`.
    pub fn discover() -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Self::new(PathBuf::from(home));
        }
        let root = dirs::data_dir()
            .map(|d| d.join("crocdeck"))
            .unwrap_or_else(|| PathBuf::from(".crocdeck"));
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.root.join("history.json")
    }

    /// Root for managed binaries, manifest and the `current` link.
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }
}

/// Load settings, falling back to defaults when the file does not exist.
pub fn load_config(paths: &Paths) -> Result<Config> {
    let file = JsonFile::new(paths.config_file());
    let config = file
        .load::<Config>()
        .context("Failed to load crocdeck settings")?
        .unwrap_or_default();
    Ok(config.validate())
}

pub fn save_config(paths: &Paths, config: &Config) -> Result<()> {
    JsonFile::new(paths.config_file())
        .save(config)
        .context("Failed to save crocdeck settings")
}
