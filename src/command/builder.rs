// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Options + capabilities to argv. No I/O.
//!
//! croc reads global flags before the subcommand, so the layout is:
//!
//! ```text
//! [network] [--yes] [--no-compress] [--throttleUpload R] [extra] send [--code C]
//!     [--exclude a,b] (--text T | paths...)
//! [network] [--yes] [--overwrite] [--curve X] [--out DIR] [extra] [code]
//! ```
//!
//! A receive has no subcommand; the code is either the trailing positional or
//! `CROC_SECRET` in the environment.

use std::path::Path;

use serde::Serialize;

use super::options::{NetworkOptions, ReceiveOptions, SendOptions, SendPayload};
use super::split::split_shell_words;
use crate::capability::{Capabilities, Flag};

/// Environment variable croc reads the code from.
pub const SECRET_ENV: &str = "CROC_SECRET";

/// Arguments plus extra environment for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandLine {
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
}

struct ArgWriter<'a> {
    caps: &'a Capabilities,
    argv: Vec<String>,
}

impl<'a> ArgWriter<'a> {
    fn new(caps: &'a Capabilities) -> Self {
        Self { caps, argv: Vec::new() }
    }

    fn switch(&mut self, flag: Flag, on: bool) {
        if on && self.caps.supports(flag) {
            self.argv.push(flag.token().to_string());
        }
    }

    fn value(&mut self, flag: Flag, value: Option<&str>) {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return;
        };
        if self.caps.supports(flag) {
            self.argv.push(flag.token().to_string());
            self.argv.push(value.to_string());
        }
    }

    fn network(&mut self, network: &NetworkOptions) {
        self.value(Flag::Relay, network.relay.as_deref());
        self.value(Flag::Relay6, network.relay6.as_deref());
        self.value(Flag::Pass, network.pass.as_deref());
        self.value(Flag::Socks5, network.socks5.as_deref());
        self.switch(Flag::Local, network.local);
        self.switch(Flag::InternalDns, network.internal_dns);
    }

    /// User flags, minus any token for a flag confirmed unsupported.
    fn extra(&mut self, extra_flags: Option<&str>) {
        let Some(extra) = extra_flags else { return };
        let mut words = split_shell_words(extra).into_iter();
        while let Some(word) = words.next() {
            match Flag::from_token(&word) {
                Some(flag) if !self.caps.supports(flag) => {
                    tracing::debug!("Dropping unsupported extra flag {}", flag);
                    if flag.takes_value() && !word.contains('=') {
                        words.next();
                    }
                }
                _ => self.argv.push(word),
            }
        }
    }
}

pub fn build_send_args(options: &SendOptions, caps: &Capabilities) -> Vec<String> {
    let mut w = ArgWriter::new(caps);

    w.network(&options.network);
    w.switch(Flag::Yes, options.yes);
    w.switch(Flag::NoCompress, options.no_compress);
    w.value(Flag::ThrottleUpload, options.throttle_upload.as_deref());
    w.extra(options.extra_flags.as_deref());

    w.argv.push("send".to_string());
    w.value(Flag::Code, options.code.as_deref());
    let exclude: Vec<&str> = options
        .exclude
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .collect();
    if !exclude.is_empty() {
        w.value(Flag::Exclude, Some(&exclude.join(",")));
    }

    match &options.payload {
        SendPayload::Text { text } => {
            // Text is not trimmed; leading/trailing whitespace is content
            if caps.supports(Flag::Text) {
                w.argv.push(Flag::Text.token().to_string());
                w.argv.push(text.clone());
            }
        }
        SendPayload::Files { paths } => {
            w.argv
                .extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
        }
    }

    w.argv
}

/// Build a receive. `windows` selects the positional code even when
/// `CROC_SECRET` is supported.
pub fn build_receive_args(options: &ReceiveOptions, caps: &Capabilities, windows: bool) -> CommandLine {
    let mut w = ArgWriter::new(caps);

    w.network(&options.network);
    w.switch(Flag::Yes, options.yes);
    w.switch(Flag::Overwrite, options.overwrite);
    w.value(Flag::Curve, options.curve.as_deref());
    let out_dir = options.out_dir.as_deref().map(|p| p.to_string_lossy());
    w.value(Flag::Out, out_dir.as_deref());
    w.extra(options.extra_flags.as_deref());

    let code = options.code.trim().to_string();
    let mut env = Vec::new();
    if !windows && caps.supports(Flag::SecretEnv) {
        env.push((SECRET_ENV.to_string(), code));
    } else {
        w.argv.push(code);
    }

    CommandLine { argv: w.argv, env }
}

/// Shell-style rendering for display. Secret env values are masked.
pub fn preview_command(binary: &Path, command: &CommandLine) -> String {
    let mut parts: Vec<String> = command
        .env
        .iter()
        .map(|(key, _)| format!("{}=****", key))
        .collect();
    parts.push(shell_quote(&binary.to_string_lossy()));
    parts.extend(command.argv.iter().map(|a| shell_quote(a)));
    parts.join(" ")
}

fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@%+".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
