// SPDX-License-Identifier: MIT

//! Store-side error kinds.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Probed by error-substring match against "no such column"/"no such
    /// table" in a real backing store; the supervisor treats this as fatal
    /// and exits the poll loop with a remediation hint.
    #[error("store schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("store io error: {0}")]
    Io(String),
}

impl StoreError {
    /// True for errors a real SQL-backed store would have reported as a
    /// missing column/table.
    pub fn is_schema_mismatch(message: &str) -> bool {
        let lower = message.to_ascii_lowercase();
        lower.contains("no such column") || lower.contains("no such table")
    }
}
