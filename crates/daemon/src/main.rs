// SPDX-License-Identifier: MIT

//! frayd, the Fray supervisor daemon. Acquires the single-instance lock,
//! wires up a store, driver registry, transcript reader, and clock, and
//! drives `fray_engine::Supervisor` until asked to stop.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;

use fray_adapters::{default_driver_registry, FilesystemTranscriptReader, TranscriptReader};
use fray_core::{Clock, SystemClock};
use fray_daemon::{setup_logging, Config};
use fray_engine::{Lock, LockBody, Supervisor, SupervisorConfig, SupervisorError};
use fray_store::{FixedAmbiguityRouter, InMemoryStore};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("frayd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: frayd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    let log_guard = setup_logging(&config)?;
    info!(state_dir = %config.state_dir.display(), "starting fray daemon");

    let clock = SystemClock;
    let lock = match Lock::acquire(
        &config.lock_path,
        LockBody {
            pid: std::process::id() as i32,
            started_at: clock.now_ms(),
        },
        config.force,
    ) {
        Ok(lock) => lock,
        Err(SupervisorError::AlreadyRunning { pid, started_at }) => {
            eprintln!("frayd is already running (pid {pid}, started_at {started_at})");
            eprintln!("pass --force (or set FRAY_FORCE=1) to take over the lock");
            drop(log_guard);
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "failed to acquire daemon lock");
            drop(log_guard);
            return Err(e.into());
        }
    };

    let store = Arc::new(InMemoryStore::new());
    let router = Arc::new(FixedAmbiguityRouter::never_spawn());
    let drivers = Arc::new(default_driver_registry());
    let transcripts: Arc<dyn TranscriptReader> = Arc::new(FilesystemTranscriptReader::new());
    let supervisor_clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let supervisor = Supervisor::new(
        store,
        router,
        drivers,
        transcripts,
        supervisor_clock,
        SupervisorConfig::default(),
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let run_handle = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run().await })
    };

    info!("daemon ready");
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    supervisor.stop();
    let _ = run_handle.await;
    drop(lock);

    info!("daemon stopped");
    Ok(())
}

fn print_help() {
    println!("frayd {}", env!("CARGO_PKG_VERSION"));
    println!("The Fray agent supervisor daemon.");
    println!();
    println!("USAGE:");
    println!("    frayd");
    println!();
    println!("The daemon is typically started by the `fray` CLI and should not");
    println!("be invoked directly.");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -V, --version    Print version information");
}
