// SPDX-License-Identifier: MIT

//! Daemon configuration: resolves the state directory the lock file, log
//! file, and (via `fray-adapters`) transcript lookups live under.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a state directory: set FRAY_STATE_DIR or HOME")]
    NoStateDir,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Where the daemon keeps its on-disk footprint.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
    /// Kill a live holder of the lock instead of refusing to start.
    pub force: bool,
}

impl Config {
    /// Resolve `FRAY_STATE_DIR` > `XDG_STATE_HOME/fray` > `~/.local/state/fray`,
    /// honoring `FRAY_FORCE` as a boolean override for [`Config::force`].
    pub fn load() -> Result<Self, ConfigError> {
        let state_dir = state_dir()?;
        let force = std::env::var("FRAY_FORCE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            lock_path: state_dir.join("daemon.lock"),
            log_path: state_dir.join("daemon.log"),
            state_dir,
            force,
        })
    }
}

fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("FRAY_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("fray"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/fray"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn state_dir_prefers_fray_state_dir_override() {
        std::env::set_var("FRAY_STATE_DIR", "/tmp/fray-test-state");
        std::env::remove_var("FRAY_FORCE");
        let config = Config::load().unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/tmp/fray-test-state"));
        assert_eq!(
            config.lock_path,
            PathBuf::from("/tmp/fray-test-state/daemon.lock")
        );
        assert!(!config.force);
        std::env::remove_var("FRAY_STATE_DIR");
    }

    #[test]
    #[serial]
    fn force_env_var_is_parsed_as_a_boolean() {
        std::env::set_var("FRAY_STATE_DIR", "/tmp/fray-test-state");
        std::env::set_var("FRAY_FORCE", "true");
        let config = Config::load().unwrap();
        assert!(config.force);
        std::env::remove_var("FRAY_STATE_DIR");
        std::env::remove_var("FRAY_FORCE");
    }

    #[test]
    #[serial]
    fn falls_back_to_xdg_state_home_then_home() {
        std::env::remove_var("FRAY_STATE_DIR");
        std::env::set_var("XDG_STATE_HOME", "/tmp/xdg-state");
        let config = Config::load().unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/tmp/xdg-state/fray"));
        std::env::remove_var("XDG_STATE_HOME");
    }
}
