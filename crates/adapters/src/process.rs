// SPDX-License-Identifier: MIT

//! The `Process` handle: owned by the supervisor, created by
//! `Driver::spawn`, destroyed by `Driver::cleanup` via `handleExit`.

use crate::buffer::{StderrBuffer, StdoutBuffer};
use fray_core::SessionId;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Spawn-mode prefix parsed from a wake-triggering message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpawnMode {
    #[default]
    Normal,
    Fly,
    Hop,
    Land,
    Hand,
}

impl SpawnMode {
    /// Parse a leading `@agent /fly|/hop|/land|/hand` prefix from a trigger body.
    pub fn detect(trigger_body: &str) -> Self {
        let mut words = trigger_body.split_whitespace();
        let Some(first) = words.next() else {
            return SpawnMode::Normal;
        };
        if !first.starts_with('@') {
            return SpawnMode::Normal;
        }
        match words.next() {
            Some("/fly") => SpawnMode::Fly,
            Some("/hop") => SpawnMode::Hop,
            Some("/land") => SpawnMode::Land,
            Some("/hand") => SpawnMode::Hand,
            _ => SpawnMode::Normal,
        }
    }
}

/// Signals that the driver's asynchronously-discovered session id is ready.
/// `None` means the driver gave up without finding one (still not fatal).
pub type SessionIdReady = oneshot::Receiver<Option<String>>;

struct Inner {
    session_id: Mutex<Option<String>>,
    last_seen_tokens: Mutex<(u64, u64)>,
    last_seen_at: Mutex<Instant>,
}

/// A running (or just-exited) driver-spawned process.
///
/// `child` is only ever touched by the monitor task that owns this value
/// (draining stdout/stderr, awaiting exit, handing it to `Driver::cleanup`).
/// Everything else the poll loop needs to read concurrently (session id,
/// token watermarks, cancellation) lives behind `inner`/`cancel`, which are
/// shared with the supervisor through a cheap [`ProcessHandle`] clone.
pub struct Process {
    pub child: Child,
    pub driver_name: String,
    pub started_at: Instant,
    pub spawn_mode: SpawnMode,
    /// (input, output) totals captured right after spawn, so later deltas
    /// reflect this session's own work rather than resumed history.
    pub baseline_tokens: (u64, u64),
    pub stdout: StdoutBuffer,
    pub stderr: StderrBuffer,
    pub temp_files: Vec<PathBuf>,
    /// Cancelled to request the process be killed; the driver binds the
    /// child to this token via `CommandContext`-style cancellation.
    pub cancel: CancellationToken,
    /// Set by drivers that interpose on stdout to sniff an asynchronously
    /// discovered session id.
    /// When present, the monitor drains this instead of `child.stdout`;
    /// bytes read from the real stdout are forwarded here untouched once the
    /// sniffer has seen the id it was looking for.
    pub stdout_override: Option<tokio::io::ReadHalf<tokio::io::DuplexStream>>,
    /// Closed by the driver's sniffer task once it has either found the
    /// session id or given up; the spawner waits up to 5s on this before
    /// continuing regardless.
    pub session_id_ready: Option<SessionIdReady>,
    inner: Arc<Inner>,
}

impl Process {
    pub fn new(child: Child, driver_name: impl Into<String>, spawn_mode: SpawnMode) -> Self {
        Self::with_cancel(child, driver_name, spawn_mode, CancellationToken::new())
    }

    pub fn with_cancel(
        child: Child,
        driver_name: impl Into<String>,
        spawn_mode: SpawnMode,
        cancel: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            child,
            driver_name: driver_name.into(),
            started_at: now,
            spawn_mode,
            baseline_tokens: (0, 0),
            stdout: StdoutBuffer::new(),
            stderr: StderrBuffer::new(),
            temp_files: Vec::new(),
            cancel,
            stdout_override: None,
            session_id_ready: None,
            inner: Arc::new(Inner {
                session_id: Mutex::new(None),
                last_seen_tokens: Mutex::new((0, 0)),
                last_seen_at: Mutex::new(now),
            }),
        }
    }

    pub fn with_baseline(mut self, input: u64, output: u64) -> Self {
        self.baseline_tokens = (input, output);
        *self.inner.last_seen_tokens.lock() = (input, output);
        self
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id.lock().clone()
    }

    pub fn set_session_id(&self, id: impl Into<String>) {
        *self.inner.session_id.lock() = Some(id.into());
    }

    /// A handle that can be used to set the session id from a separate task
    /// (e.g. the stdout-sniffing task for drivers that discover it async).
    pub fn session_id_setter(&self) -> SessionIdSetter {
        SessionIdSetter {
            inner: self.inner.clone(),
        }
    }

    pub fn record_tokens(&self, input: u64, output: u64) {
        *self.inner.last_seen_tokens.lock() = (input, output);
        *self.inner.last_seen_at.lock() = Instant::now();
    }

    pub fn last_seen_tokens(&self) -> (u64, u64) {
        *self.inner.last_seen_tokens.lock()
    }

    pub fn last_seen_at(&self) -> Instant {
        *self.inner.last_seen_at.lock()
    }

    pub fn new_tokens(&self, total_input: u64, total_output: u64) -> (u64, u64) {
        (
            total_input.saturating_sub(self.baseline_tokens.0),
            total_output.saturating_sub(self.baseline_tokens.1),
        )
    }

    /// A cheap, `Send + Sync` view the supervisor can hold in its process map
    /// while the monitor task keeps ownership of `child` for draining/exit.
    pub fn handle(&self) -> ProcessHandle {
        ProcessHandle {
            driver_name: self.driver_name.clone(),
            started_at: self.started_at,
            spawn_mode: self.spawn_mode,
            baseline_tokens: self.baseline_tokens,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            cancel: self.cancel.clone(),
            inner: self.inner.clone(),
        }
    }
}

/// Cheap clone used to hand off session-id discovery to another task without
/// sharing the whole `Process` (which owns the non-`Clone` `Child`).
#[derive(Clone)]
pub struct SessionIdSetter {
    inner: Arc<Inner>,
}

impl SessionIdSetter {
    pub fn set(&self, id: impl Into<String>) {
        *self.inner.session_id.lock() = Some(id.into());
    }
}

/// A `Clone`able, `Send + Sync` view over a live [`Process`]'s observable
/// state: everything the supervisor's poll loop reads or kills, without
/// needing mutable access to the underlying child handle.
#[derive(Clone)]
pub struct ProcessHandle {
    pub driver_name: String,
    pub started_at: Instant,
    pub spawn_mode: SpawnMode,
    pub baseline_tokens: (u64, u64),
    pub stdout: StdoutBuffer,
    pub stderr: StderrBuffer,
    pub cancel: CancellationToken,
    inner: Arc<Inner>,
}

impl ProcessHandle {
    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id.lock().clone()
    }

    pub fn last_seen_tokens(&self) -> (u64, u64) {
        *self.inner.last_seen_tokens.lock()
    }

    pub fn last_seen_at(&self) -> Instant {
        *self.inner.last_seen_at.lock()
    }

    pub fn record_tokens(&self, input: u64, output: u64) {
        *self.inner.last_seen_tokens.lock() = (input, output);
        *self.inner.last_seen_at.lock() = Instant::now();
    }

    pub fn new_tokens(&self, total_input: u64, total_output: u64) -> (u64, u64) {
        (
            total_input.saturating_sub(self.baseline_tokens.0),
            total_output.saturating_sub(self.baseline_tokens.1),
        )
    }

    /// Request the process be killed; the monitor task owning the `Child`
    /// observes this via `cancel.cancelled()` and calls `start_kill`.
    pub fn kill(&self) {
        self.cancel.cancel();
    }
}

/// Helper to turn a `Process`'s discovered session id into a `SessionId`.
pub fn resolved_session_id(process: &Process) -> Option<SessionId> {
    process.session_id().map(SessionId::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_mode_detects_leading_slash_command() {
        assert_eq!(SpawnMode::detect("@alice /hop do the thing"), SpawnMode::Hop);
        assert_eq!(SpawnMode::detect("@alice /land"), SpawnMode::Land);
        assert_eq!(SpawnMode::detect("@alice please help"), SpawnMode::Normal);
        assert_eq!(SpawnMode::detect("no mention here"), SpawnMode::Normal);
    }
}
