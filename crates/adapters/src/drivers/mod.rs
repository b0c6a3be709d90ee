// SPDX-License-Identifier: MIT

//! Concrete `Driver` implementations: one adapter per LLM CLI family.
//!
//! Each driver owns nothing across calls: every method is given everything
//! it needs through its arguments, per the "no global state" contract.

mod claude;
mod codex;
mod opencode;

pub use claude::ClaudeDriver;
pub use codex::CodexDriver;
pub use opencode::OpencodeDriver;

use crate::driver::DriverError;
use fray_core::PromptDelivery;
use std::path::PathBuf;

/// Where a driver decided to put the wake prompt before spawning.
pub(crate) enum PromptPlacement {
    Arg(String),
    Stdin,
    TempFile(PathBuf),
}

/// Resolve how to deliver `prompt` per the agent's configured delivery mode.
/// `TempFile` mode writes the prompt to a 0600 file under the system temp
/// directory; its path is returned so the caller can record it on the
/// `Process` for `Driver::cleanup` to remove later.
pub(crate) fn prepare_prompt(
    delivery: PromptDelivery,
    prompt: &str,
    agent_id: &str,
) -> Result<PromptPlacement, DriverError> {
    match delivery {
        PromptDelivery::Args => Ok(PromptPlacement::Arg(prompt.to_string())),
        PromptDelivery::Stdin => Ok(PromptPlacement::Stdin),
        PromptDelivery::TempFile => {
            let path = std::env::temp_dir().join(format!(
                "fray-prompt-{agent_id}-{}.txt",
                uuid_like_suffix()
            ));
            std::fs::write(&path, prompt)?;
            set_owner_only_permissions(&path)?;
            Ok(PromptPlacement::TempFile(path))
        }
    }
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &std::path::Path) -> Result<(), DriverError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &std::path::Path) -> Result<(), DriverError> {
    Ok(())
}

/// A short random suffix for temp file names, without pulling in a full UUID
/// dependency in the hot spawn path (the crate already depends on `rand`).
fn uuid_like_suffix() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..16)
        .map(|_| {
            let n: u8 = rng.random_range(0..36);
            std::char::from_digit(n as u32, 36).unwrap_or('0')
        })
        .collect()
}

/// Resolve the driver's binary path: `invoke.config["binary"]` if set, else
/// the family default.
pub(crate) fn binary_path(invoke: &fray_core::Invoke, default_bin: &str) -> String {
    invoke
        .config
        .get("binary")
        .and_then(|v| v.as_str())
        .unwrap_or(default_bin)
        .to_string()
}

/// Generate a session id for drivers whose CLI accepts one up front (Claude,
/// Opencode). Uses the same base-36 alphabet as message ids for a consistent
/// on-disk appearance.
pub(crate) fn generate_session_id() -> String {
    uuid_like_suffix()
}
