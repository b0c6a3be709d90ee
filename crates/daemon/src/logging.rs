// SPDX-License-Identifier: MIT

//! Structured logging setup: a non-blocking file appender plus `RUST_LOG`
//! env-filtering.

use crate::config::{Config, ConfigError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the global subscriber. The returned guard must be held for
/// the life of the process; dropping it stops the background flush thread.
pub fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, ConfigError> {
    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let dir = config.log_path.parent().ok_or(ConfigError::NoStateDir)?;
    let file_name = config.log_path.file_name().ok_or(ConfigError::NoStateDir)?;
    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
