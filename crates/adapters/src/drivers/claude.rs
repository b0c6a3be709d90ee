// SPDX-License-Identifier: MIT

//! Driver for Claude-family CLIs: a synchronous `--session-id`/`--resume`
//! contract, prompt delivered as configured (defaults to an argument).

use super::{binary_path, generate_session_id, prepare_prompt, PromptPlacement};
use crate::driver::{base_env, Driver, DriverError, SpawnRequest};
use crate::process::Process;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct ClaudeDriver;

#[async_trait]
impl Driver for ClaudeDriver {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn spawn(&self, request: SpawnRequest<'_>) -> Result<Process, DriverError> {
        let bin = binary_path(request.invoke, "claude");
        let mut cmd = Command::new(&bin);
        cmd.kill_on_drop(true);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let session_id = match request.last_session_id {
            Some(existing) => {
                cmd.arg("--resume").arg(existing);
                existing.to_string()
            }
            None => {
                let fresh = generate_session_id();
                cmd.arg("--session-id").arg(&fresh);
                fresh
            }
        };

        if let Some(model) = &request.invoke.model {
            cmd.arg("--model").arg(model);
        }

        let mut temp_files = Vec::new();
        let delivery = request
            .invoke
            .prompt_delivery
            .unwrap_or(fray_core::PromptDelivery::Args);
        let placement = prepare_prompt(delivery, request.prompt, request.agent_id.as_str())?;
        match &placement {
            PromptPlacement::Arg(text) => {
                cmd.arg("-p").arg(text);
            }
            PromptPlacement::Stdin => {
                cmd.stdin(std::process::Stdio::piped());
            }
            PromptPlacement::TempFile(path) => {
                cmd.arg("-p").arg(format!("@{}", path.display()));
                temp_files.push(path.clone());
            }
        }

        for (key, value) in base_env(request.agent_id, &request.trigger) {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|err| DriverError::SpawnFailed(err.to_string()))?;

        if matches!(placement, PromptPlacement::Stdin) {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(request.prompt.as_bytes())
                    .await
                    .map_err(DriverError::Io)?;
                stdin.shutdown().await.map_err(DriverError::Io)?;
            }
        }

        let mut process = Process::with_cancel(child, self.name(), request.spawn_mode, request.cancel);
        process.set_session_id(session_id);
        process.temp_files = temp_files;
        Ok(process)
    }

    async fn cleanup(&self, process: &mut Process) {
        if process.child.try_wait().ok().flatten().is_none() {
            let _ = process.child.start_kill();
        }
        for path in process.temp_files.drain(..) {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fray_core::{AgentId, Invoke, MessageId};

    #[test]
    fn name_is_claude() {
        assert_eq!(ClaudeDriver.name(), "claude");
    }

    #[tokio::test]
    async fn unknown_binary_surfaces_spawn_failed() {
        let agent_id = AgentId::new("alice");
        let mut invoke = Invoke::new("claude");
        invoke.config.insert(
            "binary".to_string(),
            serde_json::json!("fray-test-nonexistent-binary-xyz"),
        );
        let request = SpawnRequest {
            agent_id: &agent_id,
            invoke: &invoke,
            prompt: "hello",
            last_session_id: None,
            trigger: crate::driver::SpawnTrigger {
                msg_id: MessageId::new("m1"),
                home: "general".to_string(),
            },
            cancel: tokio_util::sync::CancellationToken::new(),
            spawn_mode: crate::process::SpawnMode::Normal,
        };
        let err = ClaudeDriver.spawn(request).await.unwrap_err();
        assert!(matches!(err, DriverError::SpawnFailed(_)));
    }
}
