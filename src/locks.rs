// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Poison-tolerant lock helpers.
//!
//! The session map and the history store are touched from reader tasks,
//! waiter tasks and the caller. A panic in any one of them must not take the
//! rest of the supervisor down with a poisoned lock, so every acquisition in
//! the crate goes through these helpers, which log the poisoning and hand the
//! guard back anyway.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a read lock, recovering from poisoning.
#[inline]
pub fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::error!(
            target: "crocdeck::locks",
            event = "LOCK_POISONED_READ",
            "RwLock poisoned during read; continuing with possibly stale data"
        );
        poisoned.into_inner()
    })
}

/// Acquire a write lock, recovering from poisoning.
#[inline]
pub fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::error!(
            target: "crocdeck::locks",
            event = "LOCK_POISONED_WRITE",
            "RwLock poisoned during write; continuing with possibly stale data"
        );
        poisoned.into_inner()
    })
}

/// Acquire a mutex, recovering from poisoning.
#[inline]
pub fn resilient_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        tracing::error!(
            target: "crocdeck::locks",
            event = "LOCK_POISONED_MUTEX",
            "Mutex poisoned; continuing with possibly stale data"
        );
        poisoned.into_inner()
    })
}
