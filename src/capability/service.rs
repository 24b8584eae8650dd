// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process-lifetime memoization of capability tables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use super::{Capabilities, CapabilityStrategy};
use crate::binary::BinaryInfo;
use crate::locks::resilient_lock;

type CellKey = (PathBuf, Option<String>);

/// Caches one table per binary path and version. Concurrent callers for the
/// same binary share a single detection.
pub struct CapabilityService {
    strategy: Arc<dyn CapabilityStrategy>,
    cells: Mutex<HashMap<CellKey, Arc<OnceCell<Capabilities>>>>,
}

impl CapabilityService {
    pub fn new(strategy: Arc<dyn CapabilityStrategy>) -> Self {
        Self {
            strategy,
            cells: Mutex::new(HashMap::new()),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub async fn get(&self, binary: &BinaryInfo) -> Capabilities {
        let cell = {
            let mut cells = resilient_lock(&self.cells);
            cells
                .entry((binary.path.clone(), binary.version.clone()))
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        cell.get_or_init(|| self.strategy.detect(binary)).await.clone()
    }

    /// Number of binaries with a cached table.
    pub fn cached_len(&self) -> usize {
        resilient_lock(&self.cells)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}
