// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Keeps the history store in step with the event bus.

use std::path::Path;
use std::sync::Arc;

use super::store::HistoryStore;
use super::types::{FileEntry, FileKind, HistoryPatch, HistoryRecord, HistoryStatus, RedactedOptions};
use crate::command::{SendPayload, TransferOptions};
use crate::transfer::{EventTap, SessionStart, TransferDone, TransferProgress};

pub struct HistoryRecorder {
    store: Arc<HistoryStore>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<HistoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }
}

fn file_entry(path: &Path) -> FileEntry {
    let metadata = std::fs::metadata(path).ok();
    let is_dir = metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false);
    FileEntry {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        size: metadata.filter(|m| m.is_file()).map(|m| m.len()),
        path: Some(path.display().to_string()),
        kind: if is_dir { FileKind::Directory } else { FileKind::File },
    }
}

fn record_for(start: &SessionStart) -> HistoryRecord {
    let mut record = HistoryRecord::new(start.id.clone(), start.kind, start.started_at);
    record.options = RedactedOptions::from(&start.options);
    record.relay = start.options.network().relay.clone();

    match &start.options {
        TransferOptions::Send(send) => {
            record.code = send.code.clone();
            match &send.payload {
                SendPayload::Files { paths } => {
                    record.files = paths.iter().map(|p| file_entry(p)).collect();
                    record.source_path = paths.first().map(|p| p.display().to_string());
                }
                SendPayload::Text { text } => {
                    record.files = vec![FileEntry {
                        name: "text".to_string(),
                        size: Some(text.len() as u64),
                        path: None,
                        kind: FileKind::Text,
                    }];
                }
            }
        }
        TransferOptions::Receive(receive) => {
            record.code = Some(receive.code.clone());
            record.destination_path = receive.out_dir.as_ref().map(|p| p.display().to_string());
        }
    }
    record
}

impl EventTap for HistoryRecorder {
    fn on_start(&self, start: &SessionStart) {
        self.store.add(record_for(start));
    }

    fn on_progress(&self, progress: &TransferProgress) {
        let mut patch = HistoryPatch::default();
        let mut changed = false;

        if let Some(current) = self.store.get(&progress.id) {
            if progress.code.is_some() && progress.code != current.code {
                patch.code = progress.code.clone();
                changed = true;
            }
            // Receivers learn file names from croc's output.
            if let Some(name) = &progress.file_name {
                if current.files.iter().all(|f| &f.name != name) {
                    let mut files = current.files.clone();
                    files.push(FileEntry {
                        name: name.clone(),
                        size: None,
                        path: None,
                        kind: FileKind::File,
                    });
                    patch.files = Some(files);
                    changed = true;
                }
            }
        }

        if changed {
            self.store.update(&progress.id, patch);
        }
        if let Some(raw) = &progress.raw {
            self.store.append_log(&progress.id, raw);
        }
    }

    fn on_done(&self, done: &TransferDone) {
        let status = if done.canceled {
            HistoryStatus::Canceled
        } else if done.success {
            HistoryStatus::Done
        } else {
            HistoryStatus::Failed
        };

        let updated = self.store.update(
            &done.id,
            HistoryPatch {
                status: Some(status),
                finished_at: Some(done.finished_at),
                code: done.code.clone(),
                duration: done.duration_ms,
                error: done.error.clone(),
                bytes_transferred: done.bytes_transferred,
                ..HistoryPatch::default()
            },
        );
        if !updated {
            tracing::warn!("Done event for unknown history record {}", done.id);
        }
        self.store.prune_retention(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ReceiveOptions, SendOptions};
    use crate::history::HistorySettings;
    use crate::transfer::{EventBus, Phase, TransferKind};
    use crate::utils::now_millis;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (EventBus, Arc<HistoryStore>) {
        let store = Arc::new(HistoryStore::open(
            dir.path().join("history.json"),
            HistorySettings::default(),
        ));
        let bus = EventBus::default();
        bus.add_tap(Arc::new(HistoryRecorder::new(store.clone())));
        (bus, store)
    }

    fn done(id: &str, kind: TransferKind, success: bool, canceled: bool) -> TransferDone {
        TransferDone {
            id: id.into(),
            kind,
            success,
            canceled,
            error: (!success && !canceled).then(|| "exit code 1".to_string()),
            code: Some("7123-alpha-beta".into()),
            bytes_transferred: Some(2048),
            duration_ms: Some(1500),
            finished_at: now_millis(),
        }
    }

    #[test]
    fn test_send_lifecycle() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("report.pdf");
        std::fs::write(&file, vec![0u8; 100]).unwrap();
        let (bus, store) = setup(&dir);

        bus.emit_start(&SessionStart {
            id: "send-1".into(),
            kind: TransferKind::Send,
            options: TransferOptions::Send(SendOptions::files(vec![file.clone()])),
            binary: PathBuf::from("/opt/croc"),
            started_at: now_millis(),
        });

        let r = store.get("send-1").unwrap();
        assert_eq!(r.status, HistoryStatus::InProgress);
        assert_eq!(r.files[0].name, "report.pdf");
        assert_eq!(r.files[0].size, Some(100));
        assert_eq!(r.options.mode.as_deref(), Some("files"));

        let mut p = TransferProgress::new("send-1", TransferKind::Send, Phase::Connecting, 0);
        p.code = Some("7123-alpha-beta".into());
        p.raw = Some("Code is: 7123-alpha-beta".into());
        bus.emit_progress(p);

        let r = store.get("send-1").unwrap();
        assert_eq!(r.code.as_deref(), Some("7123-alpha-beta"));
        assert_eq!(r.log_tail, vec!["Code is: 7123-alpha-beta"]);

        bus.emit_done(done("send-1", TransferKind::Send, true, false));
        let r = store.get("send-1").unwrap();
        assert_eq!(r.status, HistoryStatus::Done);
        assert_eq!(r.duration, Some(1500));
        assert!(r.finished_at.is_some());
    }

    #[test]
    fn test_receive_learns_file_names_and_cancel() {
        let dir = TempDir::new().unwrap();
        let (bus, store) = setup(&dir);
        let mut options = ReceiveOptions::new("7123-alpha-beta");
        options.out_dir = Some(PathBuf::from("/tmp/in"));

        bus.emit_start(&SessionStart {
            id: "receive-1".into(),
            kind: TransferKind::Receive,
            options: TransferOptions::Receive(options),
            binary: PathBuf::from("/opt/croc"),
            started_at: now_millis(),
        });
        assert_eq!(
            store.get("receive-1").unwrap().destination_path.as_deref(),
            Some("/tmp/in")
        );

        for _ in 0..2 {
            let mut p = TransferProgress::new("receive-1", TransferKind::Receive, Phase::Receiving, 0);
            p.file_name = Some("photo.jpg".into());
            p.raw = Some("Receiving 'photo.jpg'".into());
            bus.emit_progress(p);
        }
        let r = store.get("receive-1").unwrap();
        assert_eq!(r.files.len(), 1);
        assert_eq!(r.log_tail.len(), 2);

        bus.emit_done(done("receive-1", TransferKind::Receive, false, true));
        let r = store.get("receive-1").unwrap();
        assert_eq!(r.status, HistoryStatus::Canceled);
        assert!(r.error.is_none());
    }

    #[test]
    fn test_failed_transfer_keeps_error() {
        let dir = TempDir::new().unwrap();
        let (bus, store) = setup(&dir);
        bus.emit_start(&SessionStart {
            id: "send-2".into(),
            kind: TransferKind::Send,
            options: TransferOptions::Send(SendOptions::text("hello")),
            binary: PathBuf::from("/opt/croc"),
            started_at: now_millis(),
        });
        assert_eq!(store.get("send-2").unwrap().files[0].kind, FileKind::Text);

        bus.emit_done(done("send-2", TransferKind::Send, false, false));
        let r = store.get("send-2").unwrap();
        assert_eq!(r.status, HistoryStatus::Failed);
        assert_eq!(r.error.as_deref(), Some("exit code 1"));
    }
}
