// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory state of one running croc process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{oneshot, watch};

use super::events::TransferKind;
use super::parser::ParseState;
use crate::locks::resilient_lock;
use crate::utils::now_millis;

/// `{send|receive}-{epoch-ms}-{6 random chars}`
pub fn generate_session_id(kind: TransferKind) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}-{}", kind.as_str(), now_millis(), suffix)
}

/// Lives from spawn until the process has exited and been reported.
pub struct Session {
    pub id: String,
    pub kind: TransferKind,
    pub pid: Option<u32>,
    pub started: Instant,
    pub started_at: i64,
    canceled: AtomicBool,
    force_killed: AtomicBool,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    exited: watch::Receiver<bool>,
    parse: Mutex<ParseState>,
}

/// Snapshot for listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransferKind,
    pub pid: Option<u32>,
    pub started_at: i64,
    pub canceled: bool,
    pub code: Option<String>,
    pub file_name: Option<String>,
    pub bytes_transferred: Option<u64>,
}

impl Session {
    pub fn new(
        id: String,
        kind: TransferKind,
        pid: Option<u32>,
        initial_code: Option<String>,
        kill_tx: oneshot::Sender<()>,
        exited: watch::Receiver<bool>,
    ) -> Self {
        let mut parse = ParseState::new(id.clone(), kind);
        parse.code = initial_code;
        Self {
            id,
            kind,
            pid,
            started: Instant::now(),
            started_at: now_millis(),
            canceled: AtomicBool::new(false),
            force_killed: AtomicBool::new(false),
            kill_tx: Mutex::new(Some(kill_tx)),
            exited,
            parse: Mutex::new(parse),
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Set the canceled flag; `true` if this call set it.
    pub fn mark_canceled(&self) -> bool {
        !self.canceled.swap(true, Ordering::SeqCst)
    }

    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    pub fn exited(&self) -> watch::Receiver<bool> {
        self.exited.clone()
    }

    pub fn was_force_killed(&self) -> bool {
        self.force_killed.load(Ordering::SeqCst)
    }

    /// Ask the waiter to kill the process. Only the first call does
    /// anything; returns whether it was this one.
    pub fn force_kill(&self) -> bool {
        if self.force_killed.swap(true, Ordering::SeqCst) {
            return false;
        }
        match resilient_lock(&self.kill_tx).take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn with_parse_state<R>(&self, f: impl FnOnce(&mut ParseState) -> R) -> R {
        f(&mut resilient_lock(&self.parse))
    }

    pub fn info(&self) -> SessionInfo {
        let parse = resilient_lock(&self.parse);
        SessionInfo {
            id: self.id.clone(),
            kind: self.kind,
            pid: self.pid,
            started_at: self.started_at,
            canceled: self.is_canceled(),
            code: parse.code.clone(),
            file_name: parse.file_name.clone(),
            bytes_transferred: parse.bytes_transferred,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (Session, oneshot::Receiver<()>, watch::Sender<bool>) {
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(false);
        let s = Session::new("send-1".into(), TransferKind::Send, Some(42), None, kill_tx, exited_rx);
        (s, kill_rx, exited_tx)
    }

    #[test]
    fn test_generated_ids_have_kind_prefix_and_differ() {
        let a = generate_session_id(TransferKind::Send);
        let b = generate_session_id(TransferKind::Send);
        assert!(a.starts_with("send-"));
        assert_eq!(a.rsplit('-').next().unwrap().len(), 6);
        assert_ne!(a, b);
        assert!(generate_session_id(TransferKind::Receive).starts_with("receive-"));
    }

    #[test]
    fn test_cancel_flag_set_once() {
        let (s, _rx, _tx) = session();
        assert!(!s.is_canceled());
        assert!(s.mark_canceled());
        assert!(!s.mark_canceled());
        assert!(s.is_canceled());
    }

    #[tokio::test]
    async fn test_force_kill_delivered_once() {
        let (s, rx, _tx) = session();
        assert!(s.force_kill());
        assert!(!s.force_kill());
        assert!(rx.await.is_ok());
        assert!(s.was_force_killed());
    }

    #[test]
    fn test_exit_flag_follows_watch() {
        let (s, _rx, tx) = session();
        assert!(!s.has_exited());
        tx.send(true).unwrap();
        assert!(s.has_exited());
    }
}
