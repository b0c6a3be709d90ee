// SPDX-License-Identifier: MIT

//! Session mode tagging: how a spawn's session id was obtained.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    /// No stored session id discarded; driver starts a fresh session.
    New,
    /// Resuming the agent's stored `last_session_id`.
    Resume,
    /// Spawned against a specific session id addressed via `@agent#sessid`.
    Fork(String),
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::New => write!(f, "n"),
            SessionMode::Resume => write!(f, ""),
            SessionMode::Fork(session_id) => {
                write!(f, "{}", &session_id[..session_id.len().min(3)])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_mode_displays_first_three_chars() {
        assert_eq!(SessionMode::Fork("abcdef".to_string()).to_string(), "abc");
        assert_eq!(SessionMode::Fork("ab".to_string()).to_string(), "ab");
    }

    #[test]
    fn new_and_resume_display_per_spec() {
        assert_eq!(SessionMode::New.to_string(), "n");
        assert_eq!(SessionMode::Resume.to_string(), "");
    }
}
