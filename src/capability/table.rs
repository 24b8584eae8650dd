// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hard-coded capabilities for known croc releases.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Capabilities, CapabilityStrategy, Flag};
use crate::binary::version::major_minor;
use crate::binary::BinaryInfo;

/// Table lookup by `MAJOR.MINOR`, deferring to `fallback` otherwise.
pub struct StaticTable {
    fallback: Arc<dyn CapabilityStrategy>,
}

impl StaticTable {
    pub fn new(fallback: Arc<dyn CapabilityStrategy>) -> Self {
        Self { fallback }
    }

    /// Known-good table for a `MAJOR.MINOR` series.
    pub fn lookup(series: &str) -> Option<Capabilities> {
        match series {
            // v10 added CROC_SECRET and --classic
            "10.0" | "10.1" | "10.2" => Some(Capabilities::uniform(true)),
            "9.6" => Some(
                Capabilities::uniform(true)
                    .with(Flag::SecretEnv, false)
                    .with(Flag::Classic, false),
            ),
            _ => None,
        }
    }
}

#[async_trait]
impl CapabilityStrategy for StaticTable {
    fn name(&self) -> &'static str {
        "static-table"
    }

    async fn detect(&self, binary: &BinaryInfo) -> Capabilities {
        let series = binary.version.as_deref().and_then(major_minor);
        if let Some(caps) = series.as_deref().and_then(Self::lookup) {
            tracing::debug!("Capabilities for croc {:?} served from table", series);
            return caps;
        }

        tracing::debug!(
            "croc {:?} not in capability table, using {}",
            binary.version,
            self.fallback.name()
        );
        self.fallback.detect(binary).await
    }
}
