// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Relay reachability.
//!
//! A probe is a plain TCP connect to the relay's port under a timeout; it
//! says nothing about whether the relay will accept a room, only whether it
//! answers at all.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::utils::now_millis;

pub const DEFAULT_RELAY_HOST: &str = "croc.schollz.com";
pub const DEFAULT_RELAY_PORT: u16 = 9009;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRelayAddress(pub String);

impl fmt::Display for InvalidRelayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid relay address: {}", self.0)
    }
}

impl std::error::Error for InvalidRelayAddress {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAddress {
    pub host: String,
    pub port: u16,
}

impl Default for RelayAddress {
    fn default() -> Self {
        Self {
            host: DEFAULT_RELAY_HOST.to_string(),
            port: DEFAULT_RELAY_PORT,
        }
    }
}

impl fmt::Display for RelayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl RelayAddress {
    /// `host`, `host:port`, `[v6]` or `[v6]:port`. Blank input means the
    /// public relay.
    pub fn parse(input: &str) -> Result<Self, InvalidRelayAddress> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::default());
        }
        let invalid = || InvalidRelayAddress(input.to_string());

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
            match after {
                "" => (host, None),
                _ => (host, Some(after.strip_prefix(':').ok_or_else(invalid)?)),
            }
        } else if input.matches(':').count() > 1 {
            // Bare IPv6 literal
            (input, None)
        } else {
            match input.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (input, None),
            }
        };

        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }
        let port = match port {
            Some(p) => p.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(invalid)?,
            None => DEFAULT_RELAY_PORT,
        };
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub address: String,
    pub reachable: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    pub checked_at: i64,
}

/// Connect once and report.
pub async fn probe(addr: &RelayAddress, timeout: Duration) -> RelayStatus {
    let target = (addr.host.as_str(), addr.port);
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, TcpStream::connect(target)).await;

    let (reachable, error) = match outcome {
        Ok(Ok(_stream)) => (true, None),
        Ok(Err(e)) => (false, Some(e.to_string())),
        Err(_) => (false, Some(format!("timed out after {}ms", timeout.as_millis()))),
    };
    let latency_ms = reachable.then(|| started.elapsed().as_millis() as u64);

    if reachable {
        tracing::debug!("Relay {} reachable in {:?}ms", addr, latency_ms);
    } else {
        tracing::info!("RELAY_UNREACHABLE | address={} error={:?}", addr, error);
    }

    RelayStatus {
        address: addr.to_string(),
        reachable,
        latency_ms,
        error,
        checked_at: now_millis(),
    }
}

/// Periodic probe publishing through a watch channel. Stops when dropped.
pub struct RelayMonitor {
    rx: watch::Receiver<Option<RelayStatus>>,
    handle: JoinHandle<()>,
}

impl RelayMonitor {
    pub fn spawn(addr: RelayAddress, interval: Duration, timeout: Duration) -> Self {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let status = probe(&addr, timeout).await;
                if tx.send(Some(status)).is_err() {
                    break;
                }
            }
        });
        Self { rx, handle }
    }

    /// Most recent result; `None` before the first probe completes.
    pub fn latest(&self) -> Option<RelayStatus> {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<RelayStatus>> {
        self.rx.clone()
    }
}

impl Drop for RelayMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
