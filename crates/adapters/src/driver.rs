// SPDX-License-Identifier: MIT

//! The driver contract: launch/cleanup a specific LLM CLI.

use crate::process::{Process, SpawnMode};
use async_trait::async_trait;
use fray_core::{AgentId, Invoke, MessageId};
use std::collections::HashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("unknown driver: {0}")]
    UnknownDriver(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extra context about the message that triggered a spawn, forwarded to the
/// driver so it can (optionally) expose it in the process environment.
#[derive(Debug, Clone)]
pub struct SpawnTrigger {
    pub msg_id: MessageId,
    pub home: String,
}

/// Everything a `Driver::spawn` call needs about the agent being spawned.
pub struct SpawnRequest<'a> {
    pub agent_id: &'a AgentId,
    pub invoke: &'a Invoke,
    pub prompt: &'a str,
    pub last_session_id: Option<&'a str>,
    pub trigger: SpawnTrigger,
    pub cancel: CancellationToken,
    /// The spawn mode `wake_prompt::build` already detected from the
    /// trigger message's body. The prompt text itself (what `prompt` holds)
    /// no longer starts with `@agent /hop` once it's been assembled into a
    /// wake prompt, so drivers must not re-detect it from `prompt`.
    pub spawn_mode: SpawnMode,
}

/// Contract implemented by each registered LLM CLI adapter. No global state;
/// every method is given everything it needs.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Stable identifier, e.g. `"claude"`, `"codex"`, `"opencode"`.
    fn name(&self) -> &'static str;

    /// Launch the underlying CLI. Cancellation of `request.cancel` must kill
    /// the spawned process (the driver binds the child to that token).
    async fn spawn(&self, request: SpawnRequest<'_>) -> Result<Process, DriverError>;

    /// Release any pipes/temp files the process holds, and send a kill
    /// signal iff the process has not yet exited.
    async fn cleanup(&self, process: &mut Process);
}

/// Builds the environment variables common to every driver invocation: the
/// agent id (so tools can operate without an explicit identity flag) and,
/// when present, the triggering message's id/home.
pub fn base_env(agent_id: &AgentId, trigger: &SpawnTrigger) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("FRAY_AGENT_ID".to_string(), agent_id.to_string());
    env.insert("FRAY_TRIGGER_MSG_ID".to_string(), trigger.msg_id.to_string());
    env.insert("FRAY_TRIGGER_HOME".to_string(), trigger.home.clone());
    env
}

/// A tagged registry of drivers, indexed by name.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Box<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    pub fn register(&mut self, driver: Box<dyn Driver>) {
        self.drivers.insert(driver.name().to_string(), driver);
    }

    pub fn get(&self, name: &str) -> Result<&dyn Driver, DriverError> {
        self.drivers
            .get(name)
            .map(|d| d.as_ref())
            .ok_or_else(|| DriverError::UnknownDriver(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_rejects_unknown_driver_names() {
        let registry = DriverRegistry::new();
        let err = registry.get("no-such-driver").unwrap_err();
        assert!(matches!(err, DriverError::UnknownDriver(name) if name == "no-such-driver"));
    }
}
