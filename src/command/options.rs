// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Transfer requests as the front-end hands them to the core.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::OptionsError;

/// Accepted shape of a code under strict validation.
static STRICT_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]{5,}$").expect("code regex is valid"));

/// Connection settings shared by send and receive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkOptions {
    pub relay: Option<String>,
    pub relay6: Option<String>,
    pub pass: Option<String>,
    pub socks5: Option<String>,
    pub local: bool,
    pub internal_dns: bool,
}

/// What a send transfers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SendPayload {
    Files { paths: Vec<PathBuf> },
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    #[serde(flatten)]
    pub payload: SendPayload,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub network: NetworkOptions,
    #[serde(default)]
    pub no_compress: bool,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub throttle_upload: Option<String>,
    #[serde(default)]
    pub yes: bool,
    #[serde(default)]
    pub extra_flags: Option<String>,
}

impl SendOptions {
    pub fn files(paths: Vec<PathBuf>) -> Self {
        Self::with_payload(SendPayload::Files { paths })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::with_payload(SendPayload::Text { text: text.into() })
    }

    fn with_payload(payload: SendPayload) -> Self {
        Self {
            payload,
            code: None,
            network: NetworkOptions::default(),
            no_compress: false,
            exclude: Vec::new(),
            throttle_upload: None,
            yes: false,
            extra_flags: None,
        }
    }

    pub fn validate(&self, strict: bool) -> Result<(), OptionsError> {
        match &self.payload {
            SendPayload::Files { paths } if paths.is_empty() => return Err(OptionsError::NoPaths),
            SendPayload::Text { text } if text.trim().is_empty() => return Err(OptionsError::EmptyText),
            _ => {}
        }
        match self.code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() && strict => check_code_format(code),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReceiveOptions {
    pub code: String,
    pub out_dir: Option<PathBuf>,
    pub overwrite: bool,
    pub yes: bool,
    pub curve: Option<String>,
    pub network: NetworkOptions,
    pub extra_flags: Option<String>,
}

impl ReceiveOptions {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self, strict: bool) -> Result<(), OptionsError> {
        let code = self.code.trim();
        if code.is_empty() {
            return Err(OptionsError::MissingCode);
        }
        if strict {
            check_code_format(code)?;
        }
        Ok(())
    }
}

/// Either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransferOptions {
    Send(SendOptions),
    Receive(ReceiveOptions),
}

impl TransferOptions {
    pub fn validate(&self, strict: bool) -> Result<(), OptionsError> {
        match self {
            TransferOptions::Send(o) => o.validate(strict),
            TransferOptions::Receive(o) => o.validate(strict),
        }
    }

    pub fn network(&self) -> &NetworkOptions {
        match self {
            TransferOptions::Send(o) => &o.network,
            TransferOptions::Receive(o) => &o.network,
        }
    }
}

fn check_code_format(code: &str) -> Result<(), OptionsError> {
    if STRICT_CODE.is_match(code) {
        Ok(())
    } else {
        Err(OptionsError::InvalidCode(
            "use at least 6 letters, digits or hyphens, starting with a letter or digit".into(),
        ))
    }
}

/// Settings-level defaults folded into every request that leaves them unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferDefaults {
    pub relay: Option<String>,
    pub pass: Option<String>,
    pub extra_flags: Option<String>,
}

impl TransferDefaults {
    fn fill_network(&self, network: &mut NetworkOptions) {
        if network.relay.is_none() {
            network.relay = self.relay.clone();
        }
        if network.pass.is_none() {
            network.pass = self.pass.clone();
        }
    }

    pub fn apply_send(&self, mut options: SendOptions) -> SendOptions {
        self.fill_network(&mut options.network);
        if options.extra_flags.is_none() {
            options.extra_flags = self.extra_flags.clone();
        }
        options
    }

    pub fn apply_receive(&self, mut options: ReceiveOptions) -> ReceiveOptions {
        self.fill_network(&mut options.network);
        if options.extra_flags.is_none() {
            options.extra_flags = self.extra_flags.clone();
        }
        options
    }
}
