// SPDX-License-Identifier: MIT

//! Transcript discovery and parsing: reads a driver-specific JSONL
//! transcript for a session and reports a uniform token-usage shape.

mod claude;
mod codex;
mod locate;

use fray_core::TokenUsageWithModel;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("no transcript found for session {0}")]
    NotFound(String),
}

/// Reads cumulative usage for a session from its on-disk transcript.
pub trait TranscriptReader: Send + Sync {
    fn read(&self, driver: &str, session_id: &str) -> Result<TokenUsageWithModel, TranscriptError>;

    /// Locate the transcript path for a session, if one exists. Exposed so
    /// `TranscriptWatcher` can set up an fs-events watch on the exact file.
    fn locate(&self, driver: &str, session_id: &str) -> Option<PathBuf>;
}

/// Reads transcripts directly off the local filesystem, searching each
/// driver's XDG/legacy/env-override base directories in turn.
#[derive(Default)]
pub struct FilesystemTranscriptReader;

impl FilesystemTranscriptReader {
    pub fn new() -> Self {
        Self
    }
}

impl TranscriptReader for FilesystemTranscriptReader {
    fn read(&self, driver: &str, session_id: &str) -> Result<TokenUsageWithModel, TranscriptError> {
        let path = self
            .locate(driver, session_id)
            .ok_or_else(|| TranscriptError::NotFound(session_id.to_string()))?;
        Ok(match driver {
            "codex" => codex::parse(&path),
            _ => claude::parse(&path),
        })
    }

    fn locate(&self, driver: &str, session_id: &str) -> Option<PathBuf> {
        locate::find_transcript(driver, session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn not_found_error_when_session_missing() {
        let reader = FilesystemTranscriptReader::new();
        let err = reader.read("claude", "does-not-exist-session").unwrap_err();
        assert!(matches!(err, TranscriptError::NotFound(_)));
    }

    #[test]
    fn read_dispatches_on_driver_family() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sess.jsonl");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"{{"type":"assistant","message":{{"model":"claude-x","usage":{{"input_tokens":10,"output_tokens":5,"cache_read_input_tokens":0}}}}}}"#
        )
        .unwrap();
        let usage = claude::parse(&path);
        assert_eq!(usage.usage.input, 10);
        assert_eq!(usage.usage.output, 5);
    }
}
