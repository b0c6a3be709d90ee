// SPDX-License-Identifier: MIT

//! Duplicates `fray-daemon`'s `FRAY_STATE_DIR`/`XDG_STATE_HOME`/`HOME`
//! resolution so the CLI can find the lock and log files without linking
//! against the daemon binary crate.

use anyhow::{anyhow, Result};
use std::path::PathBuf;

pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("FRAY_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("fray"));
    }
    let home = std::env::var("HOME").map_err(|_| anyhow!("HOME is not set"))?;
    Ok(PathBuf::from(home).join(".local/state/fray"))
}

pub fn lock_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("daemon.lock"))
}

pub fn log_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("daemon.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn state_dir_honors_override() {
        std::env::set_var("FRAY_STATE_DIR", "/tmp/fray-cli-test");
        assert_eq!(state_dir().unwrap(), PathBuf::from("/tmp/fray-cli-test"));
        assert_eq!(
            lock_path().unwrap(),
            PathBuf::from("/tmp/fray-cli-test/daemon.lock")
        );
        std::env::remove_var("FRAY_STATE_DIR");
    }
}
