// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! crocdeck - process-orchestration core for a croc front-end
//!
//! Everything a desktop front-end needs to drive the `croc` CLI without
//! knowing how croc behaves on a given machine:
//!
//! **Provision** -> **Probe capabilities** -> **Build argv** -> **Supervise** -> **Record**
//!
//! # Core Modules
//!
//! - [`binary`] - Locate, download, verify and install the croc binary
//! - [`capability`] - Which optional flags the installed croc understands
//! - [`command`] - Transfer options, validation and argv construction
//! - [`transfer`] - Process supervision, output parsing and the event bus
//! - [`history`] - Durable transfer history with retention
//! - [`relay`] - Relay reachability probes
//! - [`context`] - Wiring of the above from settings
//! - [`error`] - Error types for the library operations

pub mod binary;
pub mod capability;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod locks;
pub mod logging;
pub mod persist;
pub mod relay;
pub mod transfer;
pub mod utils;

pub use binary::{BinaryInfo, BinaryLocator, EnsureOptions, FixedBinary, Provisioner};
pub use capability::{Capabilities, CapabilityService, CapabilityStrategy, Flag};
pub use command::{ReceiveOptions, SendOptions, TransferOptions};
pub use config::{load_config, save_config, Config, Paths};
pub use context::AppContext;
pub use error::{OptionsError, ProvisionError, SupervisorError};
pub use history::{HistoryRecord, HistoryStatus, HistoryStore};
pub use relay::{probe, RelayAddress, RelayMonitor, RelayStatus};
pub use transfer::{
    EventBus, ProcessSupervisor, TransferDone, TransferEvent, TransferKind, TransferProgress,
};
