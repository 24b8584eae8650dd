// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! History survives restarts and honours retention across them.

use std::path::PathBuf;
use std::sync::Arc;

use crocdeck::command::{SendOptions, TransferOptions};
use crocdeck::history::{HistoryRecord, HistoryRecorder, HistorySettings, HistoryStatus, HistoryStore};
use crocdeck::transfer::{EventBus, Phase, SessionStart, TransferDone, TransferKind, TransferProgress};
use crocdeck::utils::now_millis;
use tempfile::TempDir;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn open(dir: &TempDir, settings: HistorySettings) -> Arc<HistoryStore> {
    Arc::new(HistoryStore::open(dir.path().join("history.json"), settings))
}

#[test]
fn test_recorded_transfer_survives_restart() {
    let dir = TempDir::new().unwrap();
    let settings = HistorySettings {
        max_log_lines: 2,
        retention_days: 30,
    };

    {
        let store = open(&dir, settings);
        let bus = EventBus::default();
        bus.add_tap(Arc::new(HistoryRecorder::new(store.clone())));

        let mut send = SendOptions::text("secret words");
        send.network.pass = Some("hunter2".into());
        bus.emit_start(&SessionStart {
            id: "send-1".into(),
            kind: TransferKind::Send,
            options: TransferOptions::Send(send),
            binary: PathBuf::from("/opt/croc"),
            started_at: now_millis(),
        });
        for line in ["one", "two", "three"] {
            let mut p = TransferProgress::new("send-1", TransferKind::Send, Phase::Sending, now_millis());
            p.raw = Some(line.into());
            bus.emit_progress(p);
        }
        bus.emit_done(TransferDone {
            id: "send-1".into(),
            kind: TransferKind::Send,
            success: true,
            canceled: false,
            error: None,
            code: Some("7123-alpha-bravo".into()),
            bytes_transferred: Some(12),
            duration_ms: Some(900),
            finished_at: now_millis(),
        });
    }

    let store = open(&dir, settings);
    let record = store.get("send-1").unwrap();
    assert_eq!(record.status, HistoryStatus::Done);
    assert_eq!(record.log_tail, vec!["two", "three"]);
    assert_eq!(record.code.as_deref(), Some("7123-alpha-bravo"));

    let raw = std::fs::read_to_string(dir.path().join("history.json")).unwrap();
    assert!(!raw.contains("secret words"));
    assert!(!raw.contains("hunter2"));
}

#[test]
fn test_retention_applies_on_reopen() {
    let dir = TempDir::new().unwrap();
    let keep_all = HistorySettings {
        max_log_lines: 10,
        retention_days: 0,
    };
    {
        let store = open(&dir, keep_all);
        let now = now_millis();
        store.add(HistoryRecord::new("old", TransferKind::Receive, now - 40 * DAY_MS));
        store.add(HistoryRecord::new("new", TransferKind::Receive, now - DAY_MS));
        assert_eq!(store.len(), 2);
    }

    let store = open(&dir, keep_all);
    assert_eq!(store.len(), 2);
    store.configure(HistorySettings {
        max_log_lines: 10,
        retention_days: 30,
    });
    let ids: Vec<_> = store.list().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["new"]);

    drop(store);
    let store = open(&dir, keep_all);
    assert!(store.get("old").is_none());
}

#[test]
fn test_newest_first_across_restart() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir, HistorySettings::default());
        let now = now_millis();
        for id in ["a", "b", "c"] {
            store.add(HistoryRecord::new(id, TransferKind::Send, now));
        }
    }
    let store = open(&dir, HistorySettings::default());
    let ids: Vec<_> = store.list().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["c", "b", "a"]);
}
