// SPDX-License-Identifier: MIT

//! `fray daemon` - start/stop/status for the `frayd` background process.
//!
//! There is no IPC surface to the running daemon (out of scope), so these
//! commands only ever look at the on-disk lock file; `status` reports
//! liveness and uptime, never live agent state.

use crate::state_dir;
use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use fray_engine::LockBody;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Args)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub command: DaemonCommand,
}

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon
    Start {
        /// Run in the foreground instead of detaching
        #[arg(long)]
        foreground: bool,
    },
    /// Send SIGTERM to a running daemon
    Stop,
    /// Report whether the daemon is running
    Status,
}

pub async fn daemon(args: DaemonArgs) -> Result<()> {
    match args.command {
        DaemonCommand::Start { foreground } => start(foreground),
        DaemonCommand::Stop => stop(),
        DaemonCommand::Status => status(),
    }
}

fn start(foreground: bool) -> Result<()> {
    if let Some(body) = read_lock_body()? {
        if process_alive(body.pid) {
            println!("Daemon already running (pid {})", body.pid);
            return Ok(());
        }
    }

    let binary = find_frayd_binary()?;
    if foreground {
        let status = Command::new(&binary).status()?;
        if !status.success() {
            return Err(anyhow!("daemon exited with status: {status}"));
        }
        return Ok(());
    }

    let child = Command::new(&binary)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .spawn()?;
    println!("Daemon started (pid {})", child.id());
    Ok(())
}

fn stop() -> Result<()> {
    let Some(body) = read_lock_body()? else {
        println!("Daemon not running");
        return Ok(());
    };
    if !process_alive(body.pid) {
        println!("Daemon not running");
        return Ok(());
    }
    send_sigterm(body.pid)?;
    println!("Sent SIGTERM to pid {}", body.pid);
    Ok(())
}

fn status() -> Result<()> {
    let Some(body) = read_lock_body()? else {
        println!("Status: not running");
        return Ok(());
    };
    if !process_alive(body.pid) {
        println!("Status: not running (stale lock file)");
        return Ok(());
    }

    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let uptime_secs = now_ms.saturating_sub(body.started_at) / 1000;

    println!("Status: running");
    println!("Pid: {}", body.pid);
    println!("Uptime: {}", format_uptime(uptime_secs));
    Ok(())
}

fn read_lock_body() -> Result<Option<LockBody>> {
    let path = state_dir::lock_path()?;
    match std::fs::read_to_string(&path) {
        Ok(contents) if !contents.trim().is_empty() => {
            Ok(serde_json::from_str(&contents).ok())
        }
        _ => Ok(None),
    }
}

#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    false
}

#[cfg(unix)]
fn send_sigterm(pid: i32) -> Result<()> {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), nix::sys::signal::Signal::SIGTERM)
        .map_err(|e| anyhow!("failed to signal pid {pid}: {e}"))
}

#[cfg(not(unix))]
fn send_sigterm(_pid: i32) -> Result<()> {
    Err(anyhow!("signalling the daemon is only supported on unix"))
}

fn format_uptime(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    if hours > 0 {
        format!("{hours}h {mins}m {secs}s")
    } else if mins > 0 {
        format!("{mins}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Looks for `frayd` next to the running `fray` binary, then falls back to
/// `PATH`.
fn find_frayd_binary() -> Result<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("frayd");
            if sibling.exists() {
                return Ok(sibling);
            }
        }
    }
    Ok(PathBuf::from("frayd"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formats_hours_minutes_seconds() {
        assert_eq!(format_uptime(5), "5s");
        assert_eq!(format_uptime(65), "1m 5s");
        assert_eq!(format_uptime(3725), "1h 2m 5s");
    }
}
