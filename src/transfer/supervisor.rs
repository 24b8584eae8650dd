// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Spawning, streaming and stopping croc processes.
//!
//! Per session, three tasks: one reader each for stdout and stderr, and a
//! waiter that owns the `Child`. The waiter reports the terminal event only
//! after both readers have drained, so `transfer:done` is always the last
//! event for an id. An id stays registered until every tap has seen its
//! done event.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::bus::{EventBus, SessionStart};
use super::events::{TransferDone, TransferKind};
use super::line_buffer::LineBuffer;
use super::parser::LineParser;
use super::session::{generate_session_id, Session, SessionInfo};
use crate::binary::{BinaryInfo, BinaryLocator};
use crate::capability::CapabilityService;
use crate::command::{
    build_receive_args, build_send_args, preview_command, CommandLine, ReceiveOptions, SendOptions,
    TransferDefaults, TransferOptions,
};
use crate::error::SupervisorError;
use crate::locks::resilient_lock;
use crate::utils::{mask_sensitive, now_millis};

/// How long to wait for output pipes to close once the process has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8192;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Interrupt-to-kill grace period for `stop`.
    pub kill_grace: Duration,
    pub strict_code_validation: bool,
    pub defaults: TransferDefaults,
    /// Pass receive codes positionally even when `CROC_SECRET` is supported.
    pub windows: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            kill_grace: Duration::from_secs(2),
            strict_code_validation: false,
            defaults: TransferDefaults::default(),
            windows: cfg!(windows),
        }
    }
}

/// Lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorStats {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub canceled: u64,
    pub spawn_errors: u64,
    pub force_kills: u64,
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    canceled: AtomicU64,
    spawn_errors: AtomicU64,
    force_kills: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SupervisorStats {
        SupervisorStats {
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            canceled: self.canceled.load(Ordering::Relaxed),
            spawn_errors: self.spawn_errors.load(Ordering::Relaxed),
            force_kills: self.force_kills.load(Ordering::Relaxed),
        }
    }
}

struct Inner {
    locator: Arc<dyn BinaryLocator>,
    capabilities: Arc<CapabilityService>,
    parser: Arc<dyn LineParser>,
    bus: Arc<EventBus>,
    config: SupervisorConfig,
    /// The only mutable state shared between sessions.
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    counters: Counters,
}

/// Owns every in-flight croc process. Cheap to clone.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

/// A fully built invocation, before spawning.
struct Prepared {
    binary: BinaryInfo,
    line: CommandLine,
}

impl ProcessSupervisor {
    pub fn new(
        locator: Arc<dyn BinaryLocator>,
        capabilities: Arc<CapabilityService>,
        parser: Arc<dyn LineParser>,
        bus: Arc<EventBus>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                locator,
                capabilities,
                parser,
                bus,
                config,
                sessions: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    /// Start a send. Returns the session id; the outcome arrives as events.
    ///
    /// Errors are returned only when nothing was started: a live duplicate
    /// id, rejected options, or an unprovisionable binary. A spawn failure
    /// is reported as a failed `transfer:done` instead.
    pub async fn run_send(&self, id: Option<String>, options: SendOptions) -> Result<String, SupervisorError> {
        let id = self.claim_id(id, TransferKind::Send)?;
        let (options, prepared) = self.prepare_send(options).await?;
        let code = options.code.clone().filter(|c| !c.trim().is_empty());
        self.launch(id, TransferKind::Send, prepared, TransferOptions::Send(options), code)
    }

    /// Start a receive.
    pub async fn run_receive(&self, id: Option<String>, options: ReceiveOptions) -> Result<String, SupervisorError> {
        let id = self.claim_id(id, TransferKind::Receive)?;
        let (options, prepared) = self.prepare_receive(options).await?;
        let code = Some(options.code.trim().to_string());
        self.launch(id, TransferKind::Receive, prepared, TransferOptions::Receive(options), code)
    }

    /// The command line a send would run, without running it.
    pub async fn preview_send(&self, options: SendOptions) -> Result<String, SupervisorError> {
        let (_, prepared) = self.prepare_send(options).await?;
        Ok(preview_command(&prepared.binary.path, &prepared.line))
    }

    pub async fn preview_receive(&self, options: ReceiveOptions) -> Result<String, SupervisorError> {
        let (_, prepared) = self.prepare_receive(options).await?;
        Ok(preview_command(&prepared.binary.path, &prepared.line))
    }

    /// Request termination. Returns once the interrupt is sent; the process
    /// may still be running and the caller sees the outcome as events.
    pub fn stop(&self, id: &str) -> Result<(), SupervisorError> {
        let session = resilient_lock(&self.inner.sessions)
            .get(id)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownSession(id.to_string()))?;

        if !session.mark_canceled() {
            tracing::debug!("Transfer {} is already stopping", id);
            return Ok(());
        }

        tracing::info!("TRANSFER_STOP | id={} pid={:?}", id, session.pid);
        if let Some(pid) = session.pid {
            if let Err(e) = interrupt(pid) {
                tracing::warn!("Failed to interrupt croc pid {}: {}", pid, e);
            }
        }

        let grace = self.inner.config.kill_grace;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut exited = session.exited();
            let exited_in_time = tokio::time::timeout(grace, exited.wait_for(|done| *done))
                .await
                .is_ok();
            if !exited_in_time && session.force_kill() {
                Counters::bump(&inner.counters.force_kills);
                tracing::warn!(
                    "TRANSFER_FORCE_KILL | id={} grace_ms={}",
                    session.id,
                    grace.as_millis()
                );
            }
        });

        Ok(())
    }

    /// Stop every live session.
    pub fn stop_all(&self) {
        let ids: Vec<String> = resilient_lock(&self.inner.sessions).keys().cloned().collect();
        if !ids.is_empty() {
            tracing::info!("Stopping {} active transfer(s)", ids.len());
        }
        for id in ids {
            // A session may finish between the snapshot and the stop
            if let Err(e) = self.stop(&id) {
                tracing::debug!("stop_all: {}", e);
            }
        }
    }

    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = resilient_lock(&self.inner.sessions)
            .values()
            .map(|s| s.info())
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    pub fn is_active(&self, id: &str) -> bool {
        resilient_lock(&self.inner.sessions).contains_key(id)
    }

    pub fn stats(&self) -> SupervisorStats {
        self.inner.counters.snapshot()
    }

    fn claim_id(&self, id: Option<String>, kind: TransferKind) -> Result<String, SupervisorError> {
        let id = id
            .filter(|i| !i.trim().is_empty())
            .unwrap_or_else(|| generate_session_id(kind));
        if self.is_active(&id) {
            return Err(SupervisorError::DuplicateSession(id));
        }
        Ok(id)
    }

    async fn prepare_send(&self, options: SendOptions) -> Result<(SendOptions, Prepared), SupervisorError> {
        let options = self.inner.config.defaults.apply_send(options);
        options.validate(self.inner.config.strict_code_validation)?;

        let binary = self.inner.locator.locate().await?;
        let caps = self.inner.capabilities.get(&binary).await;
        let argv = build_send_args(&options, &caps);
        Ok((
            options,
            Prepared {
                binary,
                line: CommandLine { argv, env: Vec::new() },
            },
        ))
    }

    async fn prepare_receive(
        &self,
        options: ReceiveOptions,
    ) -> Result<(ReceiveOptions, Prepared), SupervisorError> {
        let options = self.inner.config.defaults.apply_receive(options);
        options.validate(self.inner.config.strict_code_validation)?;

        let binary = self.inner.locator.locate().await?;
        let caps = self.inner.capabilities.get(&binary).await;
        let line = build_receive_args(&options, &caps, self.inner.config.windows);
        Ok((options, Prepared { binary, line }))
    }

    fn launch(
        &self,
        id: String,
        kind: TransferKind,
        prepared: Prepared,
        options: TransferOptions,
        initial_code: Option<String>,
    ) -> Result<String, SupervisorError> {
        let inner = &self.inner;
        let Prepared { binary, line } = prepared;

        let mut sessions = resilient_lock(&inner.sessions);
        if sessions.contains_key(&id) {
            return Err(SupervisorError::DuplicateSession(id));
        }

        let start = SessionStart {
            id: id.clone(),
            kind,
            options,
            binary: binary.path.clone(),
            started_at: now_millis(),
        };

        tracing::debug!("Spawning {}", preview_command(&binary.path, &line));

        let mut command = Command::new(&binary.path);
        command
            .args(&line.argv)
            .envs(line.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                drop(sessions);
                tracing::error!("TRANSFER_SPAWN_FAILED | id={} binary={} error={}", id, binary.path.display(), e);
                Counters::bump(&inner.counters.spawn_errors);
                Counters::bump(&inner.counters.failed);
                inner.bus.emit_start(&start);
                inner.bus.emit_done(TransferDone {
                    id: id.clone(),
                    kind,
                    success: false,
                    canceled: false,
                    error: Some(format!("Failed to start croc: {}", e)),
                    code: initial_code,
                    bytes_transferred: None,
                    duration_ms: Some(0),
                    finished_at: now_millis(),
                });
                return Ok(id);
            }
        };

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(false);
        let session = Arc::new(Session::new(
            id.clone(),
            kind,
            child.id(),
            initial_code.clone(),
            kill_tx,
            exited_rx,
        ));
        sessions.insert(id.clone(), Arc::clone(&session));
        drop(sessions);

        Counters::bump(&inner.counters.started);
        tracing::info!(
            "TRANSFER_START | id={} type={} pid={:?} code={}",
            id,
            kind.as_str(),
            session.pid,
            initial_code
                .as_deref()
                .map(|c| mask_sensitive(c, 4))
                .unwrap_or_else(|| "-".into())
        );
        inner.bus.emit_start(&start);

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(Arc::clone(inner), Arc::clone(&session), stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(Arc::clone(inner), Arc::clone(&session), stderr));
        }

        let waiter_inner = Arc::clone(inner);
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                signal = kill_rx => {
                    if signal.is_ok() {
                        if let Err(e) = child.start_kill() {
                            tracing::debug!("start_kill for {}: {}", session.id, e);
                        }
                    }
                    child.wait().await
                }
            };
            let _ = exited_tx.send(true);

            for reader in readers {
                let abort = reader.abort_handle();
                if tokio::time::timeout(DRAIN_TIMEOUT, reader).await.is_err() {
                    tracing::debug!("Output of {} still open after exit; abandoning", session.id);
                    abort.abort();
                }
            }

            waiter_inner.finish(&session, status);
        });

        Ok(id)
    }
}

impl Inner {
    fn handle_line(&self, session: &Session, line: &str) {
        tracing::trace!("[{}] {}", session.id, line);
        let event = session.with_parse_state(|state| self.parser.parse(state, line));
        if let Some(event) = event {
            self.bus.emit_progress(event);
        }
    }

    /// Publish the terminal event and deregister. Taps run while the id is
    /// still registered, so it cannot be reused until history is final.
    fn finish(&self, session: &Arc<Session>, status: std::io::Result<ExitStatus>) {
        let canceled = session.is_canceled();
        let (success, error) = match &status {
            Ok(status) if canceled => {
                tracing::debug!("Canceled transfer {} exited with {}", session.id, status);
                (false, None)
            }
            Ok(status) if status.success() => (true, None),
            Ok(status) => (false, Some(exit_message(status))),
            Err(e) => (false, Some(format!("Failed waiting for croc: {}", e))),
        };

        let (code, bytes_transferred) = session.with_parse_state(|p| (p.code.clone(), p.bytes_transferred));
        let duration_ms = session.started.elapsed().as_millis() as u64;

        tracing::info!(
            "TRANSFER_DONE | id={} success={} canceled={} duration_ms={} force_killed={}",
            session.id,
            success,
            canceled,
            duration_ms,
            session.was_force_killed()
        );

        let done = TransferDone {
            id: session.id.clone(),
            kind: session.kind,
            success,
            canceled,
            error,
            code,
            bytes_transferred,
            duration_ms: Some(duration_ms),
            finished_at: now_millis(),
        };

        self.bus.emit_done_with(done, || {
            let mut sessions = resilient_lock(&self.sessions);
            if sessions
                .get(&session.id)
                .is_some_and(|live| Arc::ptr_eq(live, session))
            {
                sessions.remove(&session.id);
            }
            drop(sessions);

            let counter = if canceled {
                &self.counters.canceled
            } else if success {
                &self.counters.succeeded
            } else {
                &self.counters.failed
            };
            Counters::bump(counter);
        });
    }
}

fn exit_message(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("croc exited with code {}", code),
        None => format!("croc was terminated ({})", status),
    }
}

fn spawn_reader<R>(inner: Arc<Inner>, session: Arc<Session>, mut reader: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = LineBuffer::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    for line in lines.push(&chunk[..n]) {
                        inner.handle_line(&session, &line);
                    }
                }
                Err(e) => {
                    tracing::debug!("Read error on {} output: {}", session.id, e);
                    break;
                }
            }
        }
        if let Some(line) = lines.finish() {
            inner.handle_line(&session, &line);
        }
    })
}

/// Polite termination request: SIGINT on unix.
#[cfg(unix)]
fn interrupt(pid: u32) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid).map_err(|_| std::io::Error::other("pid out of range"))?;
    kill(Pid::from_raw(pid), Signal::SIGINT).map_err(std::io::Error::from)
}

/// Polite termination request: `taskkill /T` without `/F` on Windows.
#[cfg(windows)]
fn interrupt(pid: u32) -> std::io::Result<()> {
    std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

#[cfg(not(any(unix, windows)))]
fn interrupt(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::other("no interrupt signal on this platform"))
}
