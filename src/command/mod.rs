// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Command construction for croc transfers.
//!
//! Pure and side-effect free, so previews can be built as often as the
//! front-end likes without spawning anything.

pub mod builder;
pub mod options;
pub mod split;

pub use builder::{build_receive_args, build_send_args, preview_command, CommandLine, SECRET_ENV};
pub use options::{NetworkOptions, ReceiveOptions, SendOptions, SendPayload, TransferDefaults, TransferOptions};
pub use split::split_shell_words;
