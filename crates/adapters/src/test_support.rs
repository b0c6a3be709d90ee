// SPDX-License-Identifier: MIT

//! Test-only `Driver` spawning real, short-lived `sh` subprocesses so the
//! supervisor's monitor/exit-handling code can be exercised against a real
//! `tokio::process::Child` without needing an actual LLM CLI installed.
//!
//! Gated behind the `test-support` feature so `fray-engine` (and anything
//! else wiring a supervisor together for tests) can depend on it without
//! shipping it in production builds.

use crate::driver::{Driver, DriverError, SpawnRequest};
use crate::process::{Process, SpawnMode};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A `Driver` whose underlying CLI is a `sh -c <script>` invocation. The
/// script is read from a queue of canned scripts (one per spawn), so a test
/// can script a sequence of exit codes/stdout without a real agent binary.
pub struct FakeDriver {
    name: &'static str,
    scripts: Mutex<VecDeque<String>>,
    default_script: String,
    spawned: Arc<Mutex<Vec<String>>>,
}

impl FakeDriver {
    /// A driver whose every spawn runs `default_script` (e.g. `"exit 0"`).
    pub fn new(name: &'static str, default_script: impl Into<String>) -> Self {
        Self {
            name,
            scripts: Mutex::new(VecDeque::new()),
            default_script: default_script.into(),
            spawned: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a one-off script for the next spawn; falls back to
    /// `default_script` once the queue is drained.
    pub fn push_script(&self, script: impl Into<String>) {
        self.scripts.lock().push_back(script.into());
    }

    /// Prompts passed to every `spawn` call so far, in order.
    pub fn spawned_prompts(&self) -> Vec<String> {
        self.spawned.lock().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().len()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn spawn(&self, request: SpawnRequest<'_>) -> Result<Process, DriverError> {
        self.spawned.lock().push(request.prompt.to_string());
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_script.clone());

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd.kill_on_drop(true);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|err| DriverError::SpawnFailed(err.to_string()))?;

        let mut process = Process::with_cancel(
            child,
            self.name,
            SpawnMode::detect(request.prompt),
            request.cancel,
        );
        if let Some(session_id) = request.last_session_id {
            process.set_session_id(session_id.to_string());
        } else {
            process.set_session_id(format!("fake-session-{}", self.spawned.lock().len()));
        }
        Ok(process)
    }

    async fn cleanup(&self, process: &mut Process) {
        if process.child.try_wait().ok().flatten().is_none() {
            let _ = process.child.start_kill();
        }
    }
}

/// A driver whose spawn always fails, for exercising configuration-error
/// handling.
pub struct AlwaysFailsDriver(pub &'static str);

#[async_trait]
impl Driver for AlwaysFailsDriver {
    fn name(&self) -> &'static str {
        self.0
    }

    async fn spawn(&self, _request: SpawnRequest<'_>) -> Result<Process, DriverError> {
        Err(DriverError::SpawnFailed("fake driver configured to fail".to_string()))
    }

    async fn cleanup(&self, _process: &mut Process) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use fray_core::{AgentId, Invoke, MessageId};

    fn request(agent_id: &AgentId, invoke: &Invoke) -> SpawnRequest<'_> {
        SpawnRequest {
            agent_id,
            invoke,
            prompt: "hello",
            last_session_id: None,
            trigger: crate::driver::SpawnTrigger {
                msg_id: MessageId::new("m1"),
                home: "general".to_string(),
            },
            cancel: tokio_util::sync::CancellationToken::new(),
            spawn_mode: crate::process::SpawnMode::Normal,
        }
    }

    #[tokio::test]
    async fn fake_driver_runs_queued_script() {
        let driver = FakeDriver::new("fake", "exit 0");
        driver.push_script("exit 7");
        let agent_id = AgentId::new("alice");
        let invoke = Invoke::new("fake");
        let mut process = driver.spawn(request(&agent_id, &invoke)).await.unwrap();
        let status = process.child.wait().await.unwrap();
        assert_eq!(status.code(), Some(7));
    }

    #[tokio::test]
    async fn always_fails_driver_surfaces_spawn_error() {
        let driver = AlwaysFailsDriver("broken");
        let agent_id = AgentId::new("alice");
        let invoke = Invoke::new("broken");
        let err = driver.spawn(request(&agent_id, &invoke)).await.unwrap_err();
        assert!(matches!(err, DriverError::SpawnFailed(_)));
    }
}
