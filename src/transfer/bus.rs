// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fan-out of transfer events.
//!
//! Two kinds of consumer:
//!
//! - **Taps** ([`EventTap`]) are registered once and called synchronously, in
//!   order, before an event is broadcast. They see every event; the history
//!   recorder is one.
//! - **Subscribers** ([`Subscription`]) attach and detach at will and only
//!   receive events published while attached. A subscriber that falls more
//!   than the channel capacity behind loses the oldest events.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use super::events::{TransferDone, TransferEvent, TransferKind, TransferProgress};
use crate::command::TransferOptions;
use crate::locks::{resilient_read, resilient_write};

/// Default broadcast buffer.
pub const DEFAULT_CAPACITY: usize = 1024;

/// A session that has just been spawned (or failed to spawn).
#[derive(Debug, Clone)]
pub struct SessionStart {
    pub id: String,
    pub kind: TransferKind,
    pub options: TransferOptions,
    pub binary: PathBuf,
    pub started_at: i64,
}

/// Synchronous observer of every event.
pub trait EventTap: Send + Sync {
    fn on_start(&self, start: &SessionStart);
    fn on_progress(&self, progress: &TransferProgress);
    fn on_done(&self, done: &TransferDone);
}

pub struct EventBus {
    tx: broadcast::Sender<TransferEvent>,
    taps: RwLock<Vec<Arc<dyn EventTap>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            taps: RwLock::new(Vec::new()),
        }
    }

    pub fn add_tap(&self, tap: Arc<dyn EventTap>) {
        resilient_write(&self.taps).push(tap);
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn taps(&self) -> Vec<Arc<dyn EventTap>> {
        resilient_read(&self.taps).clone()
    }

    pub fn emit_start(&self, start: &SessionStart) {
        for tap in self.taps() {
            tap.on_start(start);
        }
    }

    pub fn emit_progress(&self, progress: TransferProgress) {
        for tap in self.taps() {
            tap.on_progress(&progress);
        }
        // No subscribers is not an error
        let _ = self.tx.send(TransferEvent::Progress(progress));
    }

    pub fn emit_done(&self, done: TransferDone) {
        self.emit_done_with(done, || {});
    }

    /// Like [`emit_done`](Self::emit_done), running `after_taps` once every
    /// tap has seen the event and before any subscriber does.
    pub fn emit_done_with(&self, done: TransferDone, after_taps: impl FnOnce()) {
        for tap in self.taps() {
            tap.on_done(&done);
        }
        after_taps();
        let _ = self.tx.send(TransferEvent::Done(done));
    }
}

/// A live attachment to the bus. Dropping it detaches.
pub struct Subscription {
    rx: broadcast::Receiver<TransferEvent>,
}

impl Subscription {
    /// Next event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<TransferEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Event subscriber lagged, {} events dropped", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<TransferEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!("Event subscriber lagged, {} events dropped", missed);
                }
                Err(_) => return None,
            }
        }
    }

    /// Skip to the terminal event for `id`.
    pub async fn wait_done(&mut self, id: &str) -> Option<TransferDone> {
        while let Some(event) = self.recv().await {
            if let TransferEvent::Done(done) = event {
                if done.id == id {
                    return Some(done);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SendOptions;
    use crate::transfer::events::Phase;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    impl EventTap for Recording {
        fn on_start(&self, start: &SessionStart) {
            self.0.lock().unwrap().push(format!("start:{}", start.id));
        }
        fn on_progress(&self, progress: &TransferProgress) {
            self.0.lock().unwrap().push(format!("progress:{}", progress.id));
        }
        fn on_done(&self, done: &TransferDone) {
            self.0.lock().unwrap().push(format!("done:{}", done.id));
        }
    }

    fn done(id: &str) -> TransferDone {
        TransferDone {
            id: id.into(),
            kind: TransferKind::Send,
            success: true,
            canceled: false,
            error: None,
            code: None,
            bytes_transferred: None,
            duration_ms: None,
            finished_at: 0,
        }
    }

    #[tokio::test]
    async fn test_taps_see_everything_in_order() {
        let bus = EventBus::default();
        let tap = Arc::new(Recording::default());
        bus.add_tap(tap.clone());

        bus.emit_start(&SessionStart {
            id: "a".into(),
            kind: TransferKind::Send,
            options: TransferOptions::Send(SendOptions::text("hi")),
            binary: PathBuf::from("/opt/croc"),
            started_at: 0,
        });
        bus.emit_progress(TransferProgress::new("a", TransferKind::Send, Phase::Sending, 0));
        bus.emit_done(done("a"));

        assert_eq!(*tap.0.lock().unwrap(), vec!["start:a", "progress:a", "done:a"]);
    }

    #[tokio::test]
    async fn test_subscribers_only_get_events_after_attaching() {
        let bus = EventBus::default();
        bus.emit_done(done("before"));

        let mut sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        bus.emit_progress(TransferProgress::new("x", TransferKind::Send, Phase::Sending, 0));
        bus.emit_done(done("x"));

        assert_eq!(sub.recv().await.unwrap().id(), "x");
        assert_eq!(sub.wait_done("x").await.unwrap().id, "x");

        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_oldest() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for i in 0..5 {
            bus.emit_done(done(&format!("s{}", i)));
        }
        assert_eq!(sub.recv().await.unwrap().id(), "s3");
        assert_eq!(sub.recv().await.unwrap().id(), "s4");
    }

    #[tokio::test]
    async fn test_done_hook_runs_between_taps_and_subscribers() {
        let bus = EventBus::default();
        let tap = Arc::new(Recording::default());
        bus.add_tap(tap.clone());
        let mut sub = bus.subscribe();

        let mut taps_seen = Vec::new();
        bus.emit_done_with(done("a"), || {
            taps_seen = tap.0.lock().unwrap().clone();
            assert!(sub.rx.try_recv().is_err());
        });

        assert_eq!(taps_seen, vec!["done:a"]);
        assert_eq!(sub.recv().await.unwrap().id(), "a");
    }
}
