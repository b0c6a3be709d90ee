// SPDX-License-Identifier: MIT

//! Driver for Codex-family CLIs: the session id is not known up front, it
//! arrives as a streamed JSON line on stdout. This driver interposes a pipe
//! between the real child stdout and the consumer: a sniffer task reads the
//! real stream, watches for the id, then forwards every byte (seen and
//! unseen) into a duplex pipe exposed on the process as `stdout_override`.

use super::{binary_path, prepare_prompt, PromptPlacement};
use crate::driver::{base_env, Driver, DriverError, SpawnRequest};
use crate::process::Process;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::oneshot;

pub struct CodexDriver;

#[async_trait]
impl Driver for CodexDriver {
    fn name(&self) -> &'static str {
        "codex"
    }

    async fn spawn(&self, request: SpawnRequest<'_>) -> Result<Process, DriverError> {
        let bin = binary_path(request.invoke, "codex");
        let mut cmd = Command::new(&bin);
        cmd.kill_on_drop(true);
        cmd.arg("exec").arg("--json");

        if let Some(existing) = request.last_session_id {
            cmd.arg("resume").arg(existing);
        }
        if let Some(model) = &request.invoke.model {
            cmd.arg("--model").arg(model);
        }

        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut temp_files = Vec::new();
        let delivery = request
            .invoke
            .prompt_delivery
            .unwrap_or(fray_core::PromptDelivery::Args);
        let placement = prepare_prompt(delivery, request.prompt, request.agent_id.as_str())?;
        match &placement {
            PromptPlacement::Arg(text) => {
                cmd.arg(text);
            }
            PromptPlacement::Stdin => {
                cmd.stdin(std::process::Stdio::piped());
            }
            PromptPlacement::TempFile(path) => {
                cmd.arg(format!("@{}", path.display()));
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

        let real_stdout = child.stdout.take();
        let mut process = Process::with_cancel(child, self.name(), request.spawn_mode, request.cancel);
        process.temp_files = temp_files;

        if let Some(real_stdout) = real_stdout {
            let (ready_tx, ready_rx) = oneshot::channel();
            let (forward_write, forward_read) = tokio::io::duplex(64 * 1024);
            process.stdout_override = Some(forward_read);
            process.session_id_ready = Some(ready_rx);
            let setter = process.session_id_setter();
            tokio::spawn(sniff_session_id(real_stdout, forward_write, setter, ready_tx));
        }

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

/// Reads newline-delimited JSON from `source`, looking for a `thread.started`
/// (or `session_configured`) event carrying the session id, then forwards
/// every byte read, including what was already buffered for sniffing, into
/// `sink` untouched. `ready` is closed once the search is over, whether or
/// not an id was found.
async fn sniff_session_id(
    mut source: tokio::process::ChildStdout,
    mut sink: tokio::io::DuplexStream,
    setter: crate::process::SessionIdSetter,
    ready: oneshot::Sender<Option<String>>,
) {
    let mut found: Option<String> = None;
    let mut pending = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        let chunk = &buf[..n];
        if sink.write_all(chunk).await.is_err() {
            break;
        }

        if found.is_none() {
            pending.extend_from_slice(chunk);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                if let Some(id) = extract_session_id(&line) {
                    setter.set(id.clone());
                    found = Some(id);
                    let _ = ready.send(found.clone());
                    break;
                }
            }
        }
    }

    if found.is_none() {
        let _ = ready.send(None);
    }
}

fn extract_session_id(line: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    let json: serde_json::Value = serde_json::from_str(text).ok()?;
    let event_type = json.get("type").and_then(|v| v.as_str())?;
    if event_type != "thread.started" && event_type != "session_configured" {
        return None;
    }
    json.get("thread_id")
        .or_else(|| json.get("session_id"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_codex() {
        assert_eq!(CodexDriver.name(), "codex");
    }

    #[test]
    fn extracts_thread_started_id() {
        let line = br#"{"type":"thread.started","thread_id":"abc123"}
"#;
        assert_eq!(extract_session_id(line), Some("abc123".to_string()));
    }

    #[test]
    fn ignores_unrelated_events() {
        let line = br#"{"type":"agent_message","text":"hi"}"#;
        assert_eq!(extract_session_id(line), None);
    }

    #[test]
    fn ignores_malformed_json() {
        assert_eq!(extract_session_id(b"not json"), None);
    }
}
