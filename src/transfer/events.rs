// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Events published for the front-end.

use serde::{Deserialize, Serialize};

/// Transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Send,
    Receive,
}

impl TransferKind {
    /// The phase a running transfer of this kind is naturally in.
    pub fn active_phase(&self) -> Phase {
        match self {
            TransferKind::Send => Phase::Sending,
            TransferKind::Receive => Phase::Receiving,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Send => "send",
            TransferKind::Receive => "receive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Connecting,
    Sending,
    Receiving,
    Done,
    Failed,
}

/// One interpreted line of croc output. Every optional field may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransferKind,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    pub ts: i64,
}

impl TransferProgress {
    pub fn new(id: impl Into<String>, kind: TransferKind, phase: Phase, ts: i64) -> Self {
        Self {
            id: id.into(),
            kind,
            phase,
            percent: None,
            speed: None,
            eta: None,
            file_name: None,
            message: None,
            code: None,
            raw: None,
            ts,
        }
    }
}

/// Terminal event; exactly one per session, always its last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferDone {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransferKind,
    pub success: bool,
    #[serde(default)]
    pub canceled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_transferred: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub finished_at: i64,
}

/// What travels over the event bus, tagged with its channel name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum TransferEvent {
    #[serde(rename = "transfer:progress")]
    Progress(TransferProgress),
    #[serde(rename = "transfer:done")]
    Done(TransferDone),
}

impl TransferEvent {
    pub fn id(&self) -> &str {
        match self {
            TransferEvent::Progress(p) => &p.id,
            TransferEvent::Done(d) => &d.id,
        }
    }

    pub fn channel(&self) -> &'static str {
        match self {
            TransferEvent::Progress(_) => "transfer:progress",
            TransferEvent::Done(_) => "transfer:done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TransferEvent::Done(_))
    }

    /// Decode an event arriving from outside the process. Malformed input is
    /// logged and dropped.
    pub fn decode(json: &str) -> Option<TransferEvent> {
        match serde_json::from_str(json) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("Dropping malformed transfer event: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_wire_shape() {
        let mut p = TransferProgress::new("send-1", TransferKind::Send, Phase::Sending, 1_700_000_000_000);
        p.percent = Some(50.0);
        p.file_name = Some("a.txt".into());

        let value = serde_json::to_value(TransferEvent::Progress(p)).unwrap();
        assert_eq!(value["event"], "transfer:progress");
        assert_eq!(value["payload"]["type"], "send");
        assert_eq!(value["payload"]["phase"], "sending");
        assert_eq!(value["payload"]["fileName"], "a.txt");
        assert!(value["payload"].get("speed").is_none());
    }

    #[test]
    fn test_done_wire_shape() {
        let done = TransferDone {
            id: "receive-1".into(),
            kind: TransferKind::Receive,
            success: false,
            canceled: true,
            error: None,
            code: Some("abcde-12345".into()),
            bytes_transferred: Some(10),
            duration_ms: Some(1500),
            finished_at: 1,
        };
        let value = serde_json::to_value(&done).unwrap();
        assert_eq!(value["durationMs"], 1500);
        assert_eq!(value["bytesTransferred"], 10);
        assert_eq!(value["canceled"], true);
    }

    #[test]
    fn test_decode_drops_malformed() {
        assert!(TransferEvent::decode("{}").is_none());
        assert!(TransferEvent::decode(r#"{"event":"transfer:done","payload":{"id":1}}"#).is_none());

        let ok = r#"{"event":"transfer:done","payload":{"id":"x","type":"send","success":true,"finishedAt":5}}"#;
        let event = TransferEvent::decode(ok).unwrap();
        assert_eq!(event.id(), "x");
        assert_eq!(event.channel(), "transfer:done");
        assert!(event.is_done());
    }
}
