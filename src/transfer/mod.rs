// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Running croc transfers and interpreting their output.
//!
//! Data flow for one session:
//!
//! ```text
//! stdout/stderr chunks -> LineBuffer -> LineParser -> EventBus -> taps + subscribers
//! process exit ---------------------------------------^ (transfer:done, last)
//! ```

pub mod bus;
pub mod events;
pub mod line_buffer;
pub mod parser;
pub mod session;
pub mod supervisor;

pub use bus::{EventBus, EventTap, SessionStart, Subscription};
pub use events::{Phase, TransferDone, TransferEvent, TransferKind, TransferProgress};
pub use line_buffer::LineBuffer;
pub use parser::{HeuristicParser, LineParser, ParseState};
pub use session::{generate_session_id, SessionInfo};
pub use supervisor::{ProcessSupervisor, SupervisorConfig, SupervisorStats};
