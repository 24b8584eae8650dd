// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Application context.
//!
//! Every long-lived component is built once here from [`Paths`] and
//! [`Config`] and handed out by reference. Nothing in the crate reaches for
//! a global; tests build a context over a temp directory and a fixed binary.

use std::sync::Arc;

use crate::binary::{BinaryInfo, BinaryLocator, GithubReleases, Provisioner};
use crate::capability::{Capabilities, CapabilityService};
use crate::command::TransferDefaults;
use crate::config::{Config, Paths};
use crate::error::ProvisionError;
use crate::history::{HistoryRecorder, HistoryStore};
use crate::relay::{InvalidRelayAddress, RelayAddress, RelayMonitor, DEFAULT_PROBE_TIMEOUT};
use crate::transfer::{EventBus, HeuristicParser, ProcessSupervisor, SupervisorConfig};

pub struct AppContext {
    pub paths: Paths,
    pub config: Config,
    pub provisioner: Arc<Provisioner>,
    pub capabilities: Arc<CapabilityService>,
    pub bus: Arc<EventBus>,
    pub history: Arc<HistoryStore>,
    pub supervisor: ProcessSupervisor,
    locator: Arc<dyn BinaryLocator>,
}

impl AppContext {
    pub fn new(paths: Paths, config: Config) -> Self {
        Self::with_locator(paths, config, None)
    }

    /// Like [`AppContext::new`], but transfers use `locator` instead of the
    /// provisioner (an explicit `--croc` path, or a test double).
    pub fn with_locator(
        paths: Paths,
        config: Config,
        locator: Option<Arc<dyn BinaryLocator>>,
    ) -> Self {
        let source = Arc::new(GithubReleases::new(config.release_cache_ttl()));
        let provisioner = Arc::new(
            Provisioner::new(paths.bin_dir(), source)
                .with_checksum_policy(config.checksum_policy)
                .with_pinned_version(config.binary_version.clone())
                .with_prefer_system(config.prefer_system_binary),
        );
        let locator = locator.unwrap_or_else(|| provisioner.clone() as Arc<dyn BinaryLocator>);

        let capabilities = Arc::new(CapabilityService::new(config.capability_strategy.build()));

        let history = Arc::new(HistoryStore::open(paths.history_file(), config.history));
        let bus = Arc::new(EventBus::default());
        bus.add_tap(Arc::new(HistoryRecorder::new(history.clone())));

        let supervisor = ProcessSupervisor::new(
            locator.clone(),
            capabilities.clone(),
            Arc::new(HeuristicParser),
            bus.clone(),
            SupervisorConfig {
                kill_grace: config.kill_grace(),
                strict_code_validation: config.strict_code_validation,
                defaults: TransferDefaults {
                    relay: config.default_relay.clone(),
                    pass: config.relay_password.clone(),
                    extra_flags: config.extra_flags.clone(),
                },
                ..SupervisorConfig::default()
            },
        );

        tracing::debug!(
            "Context ready: data={:?} strategy={}",
            paths.root(),
            capabilities.strategy_name()
        );

        Self {
            paths,
            config,
            provisioner,
            capabilities,
            bus,
            history,
            supervisor,
            locator,
        }
    }

    /// The binary transfers will run.
    pub async fn binary(&self) -> Result<BinaryInfo, ProvisionError> {
        self.locator.locate().await
    }

    pub async fn current_capabilities(&self) -> Result<(BinaryInfo, Capabilities), ProvisionError> {
        let binary = self.binary().await?;
        let caps = self.capabilities.get(&binary).await;
        Ok((binary, caps))
    }

    /// The relay transfers go through when they do not name one.
    pub fn relay_address(&self) -> Result<RelayAddress, InvalidRelayAddress> {
        RelayAddress::parse(self.config.default_relay.as_deref().unwrap_or(""))
    }

    pub fn spawn_relay_monitor(&self) -> Result<RelayMonitor, InvalidRelayAddress> {
        Ok(RelayMonitor::spawn(
            self.relay_address()?,
            self.config.relay_probe_interval(),
            DEFAULT_PROBE_TIMEOUT,
        ))
    }

    /// Stop every running transfer.
    pub fn shutdown(&self) {
        let active = self.supervisor.active_sessions().len();
        if active > 0 {
            tracing::info!("SHUTDOWN | stopping {} transfers", active);
        }
        self.supervisor.stop_all();
        self.history.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::FixedBinary;
    use crate::command::SendOptions;
    use tempfile::TempDir;

    fn context(dir: &TempDir, config: Config) -> AppContext {
        AppContext::with_locator(
            Paths::new(dir.path()),
            config,
            Some(Arc::new(FixedBinary::new("/opt/croc", Some("10.2.1".into())))),
        )
    }

    #[tokio::test]
    async fn test_locator_override_is_used() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, Config::default());
        let binary = ctx.binary().await.unwrap();
        assert_eq!(binary.path, std::path::PathBuf::from("/opt/croc"));
        assert_eq!(ctx.history.path(), dir.path().join("history.json"));
    }

    #[tokio::test]
    async fn test_config_defaults_reach_commands() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            default_relay: Some("relay.example:9009".into()),
            capability_strategy: crate::capability::StrategyKind::Static,
            ..Config::default()
        };
        let ctx = context(&dir, config);
        let preview = ctx.supervisor.preview_send(SendOptions::text("hi")).await.unwrap();
        assert!(preview.contains("--relay relay.example:9009"));
        assert_eq!(ctx.relay_address().unwrap().host, "relay.example");
    }

    #[test]
    fn test_default_relay_address() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, Config::default());
        assert_eq!(ctx.relay_address().unwrap(), RelayAddress::default());
        ctx.shutdown();
    }
}
