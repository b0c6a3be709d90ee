// SPDX-License-Identifier: MIT

//! Supervisor-level error kinds.

use fray_adapters::DriverError;
use fray_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("lock held by a live supervisor (pid {pid}, started_at {started_at})")]
    AlreadyRunning { pid: i32, started_at: u64 },
    #[error("lock io error: {0}")]
    LockIo(#[from] std::io::Error),
}
