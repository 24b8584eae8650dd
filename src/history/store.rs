// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Durable list of transfer records, newest first.
//!
//! The whole collection lives in memory and every mutation rewrites
//! `history.json` through [`JsonFile`]. Log-tail appends are batched: they
//! reach disk at most once per flush interval, or with the next other write.
//! Storage failures are logged and remembered in [`StoreStatus`]; they never
//! reach the caller, so a broken disk cannot fail a transfer.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::types::{HistoryPatch, HistoryRecord, HistorySettings};
use crate::locks::resilient_lock;
use crate::persist::JsonFile;
use crate::utils::now_millis;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Minimum spacing between writes caused only by log-tail appends.
pub const LOG_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryDocument {
    #[serde(default)]
    records: Vec<HistoryRecord>,
}

/// Last storage failure, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub last_error: Option<String>,
    pub last_error_at: Option<i64>,
}

struct State {
    records: Vec<HistoryRecord>,
    settings: HistorySettings,
    status: StoreStatus,
    /// In-memory changes not yet on disk.
    dirty: bool,
    last_write: Option<Instant>,
}

pub struct HistoryStore {
    file: JsonFile,
    state: Mutex<State>,
    flush_interval: Duration,
}

impl HistoryStore {
    /// Load `path`, starting empty when it is missing. An unreadable file is
    /// moved aside so the next write does not destroy it.
    pub fn open(path: impl Into<PathBuf>, settings: HistorySettings) -> Self {
        let file = JsonFile::new(path);
        let mut status = StoreStatus::default();

        let records = match file.load::<HistoryDocument>() {
            Ok(Some(doc)) => doc.records,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!("HISTORY_LOAD_FAILED | path={:?} error={:#}", file.path(), e);
                status = StoreStatus {
                    last_error: Some(format!("{:#}", e)),
                    last_error_at: Some(now_millis()),
                };
                quarantine(file.path());
                Vec::new()
            }
        };

        tracing::debug!("History loaded: {} records", records.len());
        Self {
            file,
            state: Mutex::new(State {
                records,
                settings,
                status,
                dirty: false,
                last_write: None,
            }),
            flush_interval: LOG_FLUSH_INTERVAL,
        }
    }

    /// Change how long log-tail appends may sit in memory.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn persist(&self, state: &mut State) {
        let doc = HistoryDocument {
            records: state.records.clone(),
        };
        state.last_write = Some(Instant::now());
        match self.file.save(&doc) {
            Ok(()) => state.dirty = false,
            Err(e) => {
                tracing::error!("HISTORY_WRITE_FAILED | path={:?} error={:#}", self.file.path(), e);
                state.dirty = true;
                state.status = StoreStatus {
                    last_error: Some(format!("{:#}", e)),
                    last_error_at: Some(now_millis()),
                };
            }
        }
    }

    /// Write any batched log lines now.
    pub fn flush(&self) {
        let mut state = resilient_lock(&self.state);
        if state.dirty {
            self.persist(&mut state);
        }
    }

    /// Insert at the front, replacing any record with the same id.
    pub fn add(&self, mut record: HistoryRecord) {
        let mut state = resilient_lock(&self.state);
        let cap = state.settings.max_log_lines;
        trim_tail(&mut record.log_tail, cap);
        state.records.retain(|r| r.id != record.id);
        state.records.insert(0, record);
        let days = state.settings.retention_days;
        prune_locked(&mut state, now_millis(), days);
        self.persist(&mut state);
    }

    /// Merge `patch` into the record. `false` when the id is unknown.
    pub fn update(&self, id: &str, patch: HistoryPatch) -> bool {
        let mut state = resilient_lock(&self.state);
        let Some(record) = state.records.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        let from = record.status;
        if !patch.apply(record) {
            tracing::warn!("History status for {} cannot move back from {:?}", id, from);
        }
        self.persist(&mut state);
        true
    }

    /// Append one line to the record's log tail, dropping the oldest past
    /// the cap. Unknown ids are ignored.
    pub fn append_log(&self, id: &str, line: &str) {
        let mut state = resilient_lock(&self.state);
        let cap = state.settings.max_log_lines;
        let Some(record) = state.records.iter_mut().find(|r| r.id == id) else {
            return;
        };
        record.log_tail.push(line.to_string());
        trim_tail(&mut record.log_tail, cap);
        state.dirty = true;
        let due = state
            .last_write
            .map_or(true, |at| at.elapsed() >= self.flush_interval);
        if due {
            self.persist(&mut state);
        }
    }

    pub fn get(&self, id: &str) -> Option<HistoryRecord> {
        resilient_lock(&self.state)
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// All records, newest first.
    pub fn list(&self) -> Vec<HistoryRecord> {
        resilient_lock(&self.state).records.clone()
    }

    pub fn len(&self) -> usize {
        resilient_lock(&self.state).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = resilient_lock(&self.state);
        state.records.clear();
        self.persist(&mut state);
        tracing::info!("HISTORY_CLEARED");
    }

    /// Remove records older than `days` (or the configured retention).
    /// Returns how many were removed.
    pub fn prune_retention(&self, days: Option<u32>) -> usize {
        self.prune_retention_at(now_millis(), days)
    }

    pub fn prune_retention_at(&self, now: i64, days: Option<u32>) -> usize {
        let mut state = resilient_lock(&self.state);
        let days = days.unwrap_or(state.settings.retention_days);
        let removed = prune_locked(&mut state, now, days);
        if removed > 0 {
            self.persist(&mut state);
        }
        removed
    }

    /// Replace the settings; existing tails are trimmed to the new cap and
    /// the new retention applies immediately.
    pub fn configure(&self, settings: HistorySettings) {
        let mut state = resilient_lock(&self.state);
        state.settings = settings;
        let cap = settings.max_log_lines;
        for record in state.records.iter_mut() {
            trim_tail(&mut record.log_tail, cap);
        }
        prune_locked(&mut state, now_millis(), settings.retention_days);
        self.persist(&mut state);
    }

    pub fn settings(&self) -> HistorySettings {
        resilient_lock(&self.state).settings
    }

    pub fn status(&self) -> StoreStatus {
        resilient_lock(&self.state).status.clone()
    }
}

impl Drop for HistoryStore {
    fn drop(&mut self) {
        self.flush();
    }
}

fn trim_tail(tail: &mut Vec<String>, cap: usize) {
    if tail.len() > cap {
        let excess = tail.len() - cap;
        tail.drain(..excess);
    }
}

fn prune_locked(state: &mut State, now: i64, days: u32) -> usize {
    if days == 0 {
        return 0;
    }
    let cutoff = now - i64::from(days) * DAY_MS;
    let before = state.records.len();
    state.records.retain(|r| r.age_reference() >= cutoff);
    let removed = before - state.records.len();
    if removed > 0 {
        tracing::info!("HISTORY_PRUNED | removed={} retention_days={}", removed, days);
    }
    removed
}

fn quarantine(path: &Path) {
    let aside = path.with_extension(format!("corrupt-{}.json", now_millis()));
    match fs::rename(path, &aside) {
        Ok(()) => tracing::warn!("Unreadable history moved to {:?}", aside),
        Err(e) => tracing::warn!("Could not move unreadable history aside: {}", e),
    }
}
