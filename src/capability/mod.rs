// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Which croc command-line flags the resolved binary understands.
//!
//! A flag missing from [`Capabilities`] is unknown and assumed supported; a
//! flag recorded as `false` is confirmed unsupported and the command builder
//! drops it. Two interchangeable strategies fill the table:
//!
//! - [`HelpProbe`] reads the binary's own `--help` output.
//! - [`StaticTable`] answers from a table of known releases and defers to
//!   another strategy for versions it does not know.
//!
//! [`CapabilityService`] memoizes the result per binary.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::binary::BinaryInfo;

pub mod probe;
pub mod service;
pub mod table;

pub use probe::{capabilities_from_help, HelpProbe};
pub use service::CapabilityService;
pub use table::StaticTable;

/// Gated croc features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Flag {
    Relay,
    Relay6,
    Pass,
    Socks5,
    Local,
    InternalDns,
    NoCompress,
    Exclude,
    ThrottleUpload,
    Yes,
    Overwrite,
    Curve,
    Out,
    Code,
    Text,
    /// The code may be passed in `CROC_SECRET` instead of argv.
    SecretEnv,
    Classic,
}

impl Flag {
    pub const ALL: [Flag; 17] = [
        Flag::Relay,
        Flag::Relay6,
        Flag::Pass,
        Flag::Socks5,
        Flag::Local,
        Flag::InternalDns,
        Flag::NoCompress,
        Flag::Exclude,
        Flag::ThrottleUpload,
        Flag::Yes,
        Flag::Overwrite,
        Flag::Curve,
        Flag::Out,
        Flag::Code,
        Flag::Text,
        Flag::SecretEnv,
        Flag::Classic,
    ];

    /// Command-line token. `SecretEnv` is an environment variable, not a flag.
    pub fn token(&self) -> &'static str {
        match self {
            Flag::Relay => "--relay",
            Flag::Relay6 => "--relay6",
            Flag::Pass => "--pass",
            Flag::Socks5 => "--socks5",
            Flag::Local => "--local",
            Flag::InternalDns => "--internal-dns",
            Flag::NoCompress => "--no-compress",
            Flag::Exclude => "--exclude",
            Flag::ThrottleUpload => "--throttleUpload",
            Flag::Yes => "--yes",
            Flag::Overwrite => "--overwrite",
            Flag::Curve => "--curve",
            Flag::Out => "--out",
            Flag::Code => "--code",
            Flag::Text => "--text",
            Flag::SecretEnv => "CROC_SECRET",
            Flag::Classic => "--classic",
        }
    }

    /// Whether the flag consumes the following argument.
    pub fn takes_value(&self) -> bool {
        matches!(
            self,
            Flag::Relay
                | Flag::Relay6
                | Flag::Pass
                | Flag::Socks5
                | Flag::Exclude
                | Flag::ThrottleUpload
                | Flag::Curve
                | Flag::Out
                | Flag::Code
                | Flag::Text
        )
    }

    /// Flag for a command-line token, `--name` or `--name=value`.
    pub fn from_token(token: &str) -> Option<Flag> {
        let name = token.split_once('=').map_or(token, |(name, _)| name);
        Flag::ALL
            .iter()
            .copied()
            .find(|f| *f != Flag::SecretEnv && f.token() == name)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Flag support table for one binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(BTreeMap<Flag, bool>);

impl Capabilities {
    /// Nothing known: every flag is assumed supported.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Every flag set to `value`.
    pub fn uniform(value: bool) -> Self {
        Self(Flag::ALL.iter().map(|f| (*f, value)).collect())
    }

    pub fn with(mut self, flag: Flag, value: bool) -> Self {
        self.0.insert(flag, value);
        self
    }

    /// `false` only when the flag is confirmed unsupported.
    pub fn supports(&self, flag: Flag) -> bool {
        self.0.get(&flag).copied().unwrap_or(true)
    }

    /// The recorded value, `None` when unknown.
    pub fn get(&self, flag: Flag) -> Option<bool> {
        self.0.get(&flag).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Flag, bool)> + '_ {
        self.0.iter().map(|(f, v)| (*f, *v))
    }
}

impl FromIterator<(Flag, bool)> for Capabilities {
    fn from_iter<I: IntoIterator<Item = (Flag, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Which strategy the service uses, as written in settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Detect,
    Static,
}

impl StrategyKind {
    pub fn build(self) -> Arc<dyn CapabilityStrategy> {
        match self {
            StrategyKind::Detect => Arc::new(HelpProbe::default()),
            StrategyKind::Static => Arc::new(StaticTable::new(Arc::new(HelpProbe::default()))),
        }
    }
}

/// Computes the capability table for a binary.
#[async_trait]
pub trait CapabilityStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Never fails; whatever cannot be determined is left unknown.
    async fn detect(&self, binary: &BinaryInfo) -> Capabilities;
}
