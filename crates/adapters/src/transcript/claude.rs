// SPDX-License-Identifier: MIT

//! Claude-family transcript parsing.
//!
//! `input` is the *last* assistant record's input token count (current
//! context size, not a cumulative sum); `output` sums every record's output
//! tokens; `cached` and `model` come from the last record that has them.

use fray_core::{TokenUsage, TokenUsageWithModel};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Context window by model family. Defaults to 200k; "-1m" suffixed model
/// names (long-context variants) get 1M.
fn context_limit_for(model: Option<&str>) -> u64 {
    match model {
        Some(m) if m.to_ascii_lowercase().contains("1m") => 1_000_000,
        _ => 200_000,
    }
}

pub(crate) fn parse(path: &Path) -> TokenUsageWithModel {
    let Ok(file) = File::open(path) else {
        return TokenUsageWithModel::default();
    };
    let reader = BufReader::new(file);

    let mut last_input = 0u64;
    let mut output_sum = 0u64;
    let mut last_cached = 0u64;
    let mut last_model: Option<String> = None;

    for line in reader.lines() {
        // Corrupted lines are skipped silently; best-effort parsing.
        let Ok(line) = line else { continue };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            continue;
        };
        if json.get("type").and_then(|v| v.as_str()) != Some("assistant") {
            continue;
        }
        let Some(usage) = json.pointer("/message/usage") else {
            continue;
        };
        if let Some(input) = usage.get("input_tokens").and_then(|v| v.as_u64()) {
            last_input = input;
        }
        if let Some(output) = usage.get("output_tokens").and_then(|v| v.as_u64()) {
            output_sum += output;
        }
        if let Some(cached) = usage
            .get("cache_read_input_tokens")
            .and_then(|v| v.as_u64())
        {
            last_cached = cached;
        }
        if let Some(model) = json
            .pointer("/message/model")
            .and_then(|v| v.as_str())
        {
            last_model = Some(model.to_string());
        }
    }

    TokenUsageWithModel {
        usage: TokenUsage {
            input: last_input,
            output: output_sum,
            cached: last_cached,
            context_limit: context_limit_for(last_model.as_deref()),
        },
        model: last_model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_lines(lines: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut f = File::create(dir.path().join("t.jsonl")).unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
        dir
    }

    #[test]
    fn input_is_last_record_not_cumulative() {
        let dir = write_lines(&[
            r#"{"type":"assistant","message":{"model":"claude-3","usage":{"input_tokens":100,"output_tokens":10}}}"#,
            r#"{"type":"assistant","message":{"model":"claude-3","usage":{"input_tokens":150,"output_tokens":20}}}"#,
        ]);
        let usage = parse(&dir.path().join("t.jsonl"));
        assert_eq!(usage.usage.input, 150);
        assert_eq!(usage.usage.output, 30);
    }

    #[test]
    fn context_limit_picks_1m_variant() {
        let dir = write_lines(&[
            r#"{"type":"assistant","message":{"model":"claude-3-1m","usage":{"input_tokens":5,"output_tokens":1}}}"#,
        ]);
        let usage = parse(&dir.path().join("t.jsonl"));
        assert_eq!(usage.usage.context_limit, 1_000_000);
    }

    #[test]
    fn corrupted_lines_are_skipped() {
        let dir = write_lines(&[
            "not json at all",
            r#"{"type":"assistant","message":{"model":"claude-3","usage":{"input_tokens":5,"output_tokens":1}}}"#,
        ]);
        let usage = parse(&dir.path().join("t.jsonl"));
        assert_eq!(usage.usage.input, 5);
    }

    #[test]
    fn missing_file_returns_zeroed_default() {
        let usage = parse(Path::new("/no/such/transcript.jsonl"));
        assert_eq!(usage.usage.input, 0);
        assert_eq!(usage.usage.context_limit, 0);
    }
}
