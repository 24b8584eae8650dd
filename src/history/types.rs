// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! History record types.

use serde::{Deserialize, Serialize};

use crate::command::{SendPayload, TransferOptions};
use crate::transfer::TransferKind;

/// Retention and log-tail limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySettings {
    /// Newest lines kept per record.
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,
    /// Age limit in days; 0 keeps everything.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_max_log_lines() -> usize {
    200
}

fn default_retention_days() -> u32 {
    30
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_log_lines: default_max_log_lines(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HistoryStatus {
    InProgress,
    Done,
    Failed,
    Canceled,
}

impl HistoryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HistoryStatus::InProgress)
    }

    /// Only `in-progress -> terminal` moves; re-asserting the same status is
    /// allowed and changes nothing.
    pub fn can_become(&self, next: HistoryStatus) -> bool {
        *self == next || (*self == HistoryStatus::InProgress && next.is_terminal())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub kind: FileKind,
}

/// The parts of a request safe to keep on disk: no paths, text, extra
/// flags, codes or passwords.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedactedOptions {
    pub mode: Option<String>,
    pub relay: Option<String>,
    pub relay6: Option<String>,
    pub uses_pass: bool,
    pub uses_socks5: bool,
    pub local: bool,
    pub internal_dns: bool,
    pub no_compress: bool,
    pub exclude: Vec<String>,
    pub throttle_upload: Option<String>,
    pub yes: bool,
    pub overwrite: bool,
    pub curve: Option<String>,
    pub has_extra_flags: bool,
}

impl From<&TransferOptions> for RedactedOptions {
    fn from(options: &TransferOptions) -> Self {
        let network = options.network();
        let mut redacted = RedactedOptions {
            relay: network.relay.clone(),
            relay6: network.relay6.clone(),
            uses_pass: network.pass.is_some(),
            uses_socks5: network.socks5.is_some(),
            local: network.local,
            internal_dns: network.internal_dns,
            ..RedactedOptions::default()
        };

        match options {
            TransferOptions::Send(send) => {
                redacted.mode = Some(
                    match send.payload {
                        SendPayload::Files { .. } => "files",
                        SendPayload::Text { .. } => "text",
                    }
                    .to_string(),
                );
                redacted.no_compress = send.no_compress;
                redacted.exclude = send.exclude.clone();
                redacted.throttle_upload = send.throttle_upload.clone();
                redacted.yes = send.yes;
                redacted.has_extra_flags = send.extra_flags.is_some();
            }
            TransferOptions::Receive(receive) => {
                redacted.yes = receive.yes;
                redacted.overwrite = receive.overwrite;
                redacted.curve = receive.curve.clone();
                redacted.has_extra_flags = receive.extra_flags.is_some();
            }
        }
        redacted
    }
}

/// One transfer attempt as remembered across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransferKind,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
    pub status: HistoryStatus,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub options: RedactedOptions,
    #[serde(default)]
    pub log_tail: Vec<String>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_transferred: Option<u64>,
}

impl HistoryRecord {
    pub fn new(id: impl Into<String>, kind: TransferKind, created_at: i64) -> Self {
        Self {
            id: id.into(),
            kind,
            created_at,
            finished_at: None,
            status: HistoryStatus::InProgress,
            files: Vec::new(),
            relay: None,
            code: None,
            options: RedactedOptions::default(),
            log_tail: Vec::new(),
            duration: None,
            source_path: None,
            destination_path: None,
            error: None,
            bytes_transferred: None,
        }
    }

    /// Timestamp the retention sweep ages this record by.
    pub fn age_reference(&self) -> i64 {
        self.finished_at.unwrap_or(self.created_at)
    }
}

/// Partial update; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPatch {
    pub status: Option<HistoryStatus>,
    pub finished_at: Option<i64>,
    pub code: Option<String>,
    pub duration: Option<u64>,
    pub error: Option<String>,
    pub files: Option<Vec<FileEntry>>,
    pub bytes_transferred: Option<u64>,
    pub destination_path: Option<String>,
}

impl HistoryPatch {
    /// Apply to `record`. A backward status change is skipped and reported
    /// as `false`; the other fields still apply.
    pub fn apply(self, record: &mut HistoryRecord) -> bool {
        let mut status_ok = true;
        if let Some(status) = self.status {
            if record.status.can_become(status) {
                record.status = status;
            } else {
                status_ok = false;
            }
        }
        if let Some(finished_at) = self.finished_at {
            record.finished_at = Some(finished_at);
        }
        if let Some(code) = self.code {
            record.code = Some(code);
        }
        if let Some(duration) = self.duration {
            record.duration = Some(duration);
        }
        if let Some(error) = self.error {
            record.error = Some(error);
        }
        if let Some(files) = self.files {
            record.files = files;
        }
        if let Some(bytes) = self.bytes_transferred {
            record.bytes_transferred = Some(bytes);
        }
        if let Some(dest) = self.destination_path {
            record.destination_path = Some(dest);
        }
        status_ok
    }
}
