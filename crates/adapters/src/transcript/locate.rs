// SPDX-License-Identifier: MIT

//! Transcript path discovery, grounded on the Claude/Codex CLIs' own
//! on-disk session log layout: state directories keyed by an env override,
//! falling back to `~/.claude` or `~/.codex`, holding one `.jsonl` file per
//! session somewhere under a handful of nesting levels.

use std::path::{Path, PathBuf};

const MAX_SCAN_DEPTH: usize = 4;

fn base_dir(driver: &str) -> Option<PathBuf> {
    match driver {
        "codex" => std::env::var("CODEX_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|h| h.join(".codex"))),
        _ => std::env::var("CLAUDE_CONFIG_DIR")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|h| h.join(".claude"))),
    }
}

/// Search `dir` (and its subdirectories, up to `MAX_SCAN_DEPTH`) for a file
/// named `{session_id}.jsonl`, or one whose name merely contains the id (the
/// Codex CLI prefixes rollout files with a timestamp).
fn scan(dir: &Path, session_id: &str, depth: usize) -> Option<PathBuf> {
    let exact = dir.join(format!("{session_id}.jsonl"));
    if exact.is_file() {
        return Some(exact);
    }
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
            continue;
        }
        let is_match = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.contains(session_id));
        let is_jsonl = path.extension().is_some_and(|e| e == "jsonl");
        if is_match && is_jsonl {
            return Some(path);
        }
    }
    if depth >= MAX_SCAN_DEPTH {
        return None;
    }
    for subdir in subdirs {
        if let Some(found) = scan(&subdir, session_id, depth + 1) {
            return Some(found);
        }
    }
    None
}

pub(crate) fn find_transcript(driver: &str, session_id: &str) -> Option<PathBuf> {
    let base = base_dir(driver)?;
    if !base.is_dir() {
        return None;
    }
    scan(&base, session_id, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_exact_match_nested_under_base() {
        let base = tempfile::tempdir().unwrap();
        let project_dir = base.path().join("projects").join("-home-me-proj");
        std::fs::create_dir_all(&project_dir).unwrap();
        let session_file = project_dir.join("abc-123.jsonl");
        std::fs::write(&session_file, "").unwrap();

        let found = scan(base.path(), "abc-123", 0);
        assert_eq!(found.as_deref(), Some(session_file.as_path()));
    }

    #[test]
    fn finds_prefixed_rollout_file_by_substring() {
        let base = tempfile::tempdir().unwrap();
        let session_dir = base.path().join("sessions").join("2026-01-01");
        std::fs::create_dir_all(&session_dir).unwrap();
        let session_file = session_dir.join("rollout-2026-01-01T00-00-00-abc-123.jsonl");
        std::fs::write(&session_file, "").unwrap();

        let found = scan(base.path(), "abc-123", 0);
        assert_eq!(found.as_deref(), Some(session_file.as_path()));
    }

    #[test]
    fn scan_returns_none_when_no_file_matches() {
        let base = tempfile::tempdir().unwrap();
        assert!(scan(base.path(), "nonexistent-session-xyz", 0).is_none());
    }
}
