// SPDX-License-Identifier: MIT

//! The on-disk supervisor lock: at most one live
//! supervisor per project. Stale entries (pid not alive) are reclaimed;
//! live entries force an error unless `force` is set, in which case the
//! prior process is sent SIGTERM then, after 1s, SIGKILL.

use crate::error::SupervisorError;
use fs2::FileExt;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockBody {
    pub pid: i32,
    pub started_at: u64,
}

/// An acquired exclusive lock on `daemon.lock`. Dropping it releases the
/// advisory lock; the file itself is left behind (truncated) on disk.
pub struct Lock {
    file: File,
    path: PathBuf,
}

impl Lock {
    /// Acquire the lock at `path`, writing `body` once held. If the lock is
    /// already held by a live process, returns
    /// [`SupervisorError::AlreadyRunning`] unless `force` is set, in which
    /// case that process is killed first.
    pub fn acquire(path: &Path, body: LockBody, force: bool) -> Result<Self, SupervisorError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            let previous = read_body(&mut file);
            match previous {
                Some(previous) if process_alive(previous.pid) => {
                    if !force {
                        return Err(SupervisorError::AlreadyRunning {
                            pid: previous.pid,
                            started_at: previous.started_at,
                        });
                    }
                    kill_and_wait(previous.pid);
                }
                _ => {}
            }
            // Either the holder was stale or we just killed it; try once more.
            file.try_lock_exclusive().map_err(|_| {
                SupervisorError::AlreadyRunning {
                    pid: 0,
                    started_at: 0,
                }
            })?;
        }

        write_body(&mut file, &body)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn read_body(file: &mut File) -> Option<LockBody> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut contents).ok()?;
    serde_json::from_str(&contents).ok()
}

fn write_body(file: &mut File, body: &LockBody) -> Result<(), SupervisorError> {
    let json = serde_json::to_string(body).unwrap_or_default();
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(json.as_bytes())?;
    file.flush()?;
    Ok(())
}

#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    signal::kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    false
}

#[cfg(unix)]
fn kill_and_wait(pid: i32) {
    let target = Pid::from_raw(pid);
    let _ = signal::kill(target, Signal::SIGTERM);
    std::thread::sleep(Duration::from_secs(1));
    if process_alive(pid) {
        let _ = signal::kill(target, Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_and_wait(_pid: i32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquiring_an_unheld_lock_writes_the_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.lock");
        let lock = Lock::acquire(
            &path,
            LockBody {
                pid: std::process::id() as i32,
                started_at: 1000,
            },
            false,
        )
        .unwrap();

        let mut file = File::open(lock.path()).unwrap();
        let body = read_body(&mut file).unwrap();
        assert_eq!(body.started_at, 1000);
    }

    #[test]
    fn a_stale_pid_is_reclaimed_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.lock");

        // A pid astronomically unlikely to be alive, and the lock itself is
        // not actually held (no flock from a live process), so this should
        // succeed even though the file records a non-matching prior pid.
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)
                .unwrap();
            write_body(
                &mut file,
                &LockBody {
                    pid: 9_999_999,
                    started_at: 1,
                },
            )
            .unwrap();
        }

        let lock = Lock::acquire(
            &path,
            LockBody {
                pid: std::process::id() as i32,
                started_at: 2000,
            },
            false,
        )
        .unwrap();
        assert!(lock.path().exists());
    }
}
