// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Transfer history.
//!
//! [`HistoryRecorder`] taps the event bus and writes one [`HistoryRecord`]
//! per session into a [`HistoryStore`]: created in progress at start, log
//! lines appended as they arrive, finalized and retention-swept on done.

pub mod recorder;
pub mod store;
pub mod types;

pub use recorder::HistoryRecorder;
pub use store::{HistoryStore, StoreStatus};
pub use types::{
    FileEntry, FileKind, HistoryPatch, HistoryRecord, HistorySettings, HistoryStatus,
    RedactedOptions,
};
