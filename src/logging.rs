// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging setup for the crocdeck binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! front-end's job.

use tracing::Level;

/// Map a `-v` count to a maximum level (0=warn, 1=info, 2=debug, 3+=trace).
pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install a stderr `fmt` subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init_logging(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level_for_verbosity(verbosity))
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .try_init();
}
