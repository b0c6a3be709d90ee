// SPDX-License-Identifier: MIT

//! Codex-family transcript parsing.
//!
//! Codex transcripts emit `event_msg` records with `token_count` payloads.
//! `total_token_usage` there is already cumulative across the session, so no
//! manual summing is needed; `last_token_usage.input_tokens` is the current
//! context size used for the percent-full figure. The model name travels on
//! `turn_context` records (and is occasionally repeated on token events).

use fray_core::{TokenUsage, TokenUsageWithModel};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub(crate) fn parse(path: &Path) -> TokenUsageWithModel {
    let Ok(file) = File::open(path) else {
        return TokenUsageWithModel::default();
    };
    let reader = BufReader::new(file);

    let mut cumulative_input = 0u64;
    let mut cumulative_output = 0u64;
    let mut context_input = 0u64;
    let mut model: Option<String> = None;

    for line in reader.lines() {
        let Ok(line) = line else { continue };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            continue;
        };

        if json.pointer("/turn_context").is_some() {
            if let Some(m) = json
                .pointer("/turn_context/model")
                .and_then(|v| v.as_str())
            {
                model = Some(m.to_string());
            }
            continue;
        }

        let Some(payload) = json.pointer("/msg") else {
            continue;
        };
        if payload.get("type").and_then(|v| v.as_str()) != Some("token_count") {
            continue;
        }

        if let Some(total) = payload.get("total_token_usage") {
            if let Some(v) = total.get("input_tokens").and_then(|v| v.as_u64()) {
                cumulative_input = v;
            }
            if let Some(v) = total.get("output_tokens").and_then(|v| v.as_u64()) {
                cumulative_output = v;
            }
        }
        if let Some(last) = payload.get("last_token_usage") {
            if let Some(v) = last.get("input_tokens").and_then(|v| v.as_u64()) {
                context_input = v;
            }
        }
        if let Some(m) = payload.get("model").and_then(|v| v.as_str()) {
            model = Some(m.to_string());
        }
    }

    TokenUsage {
        input: context_input,
        output: cumulative_output,
        cached: cumulative_input.saturating_sub(context_input),
        context_limit: 200_000,
    }
    .with_model(model)
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
    fn cumulative_usage_and_context_percent_input() {
        let dir = write_lines(&[
            r#"{"turn_context":{"model":"codex-mini"}}"#,
            r#"{"msg":{"type":"token_count","total_token_usage":{"input_tokens":1000,"output_tokens":50},"last_token_usage":{"input_tokens":300}}}"#,
            r#"{"msg":{"type":"token_count","total_token_usage":{"input_tokens":1800,"output_tokens":90},"last_token_usage":{"input_tokens":500}}}"#,
        ]);
        let usage = parse(&dir.path().join("t.jsonl"));
        assert_eq!(usage.usage.output, 90);
        assert_eq!(usage.usage.input, 500);
        assert_eq!(usage.model.as_deref(), Some("codex-mini"));
    }

    #[test]
    fn ignores_unrelated_event_types() {
        let dir = write_lines(&[
            r#"{"msg":{"type":"agent_message","text":"hello"}}"#,
            r#"{"msg":{"type":"token_count","total_token_usage":{"input_tokens":10,"output_tokens":2},"last_token_usage":{"input_tokens":10}}}"#,
        ]);
        let usage = parse(&dir.path().join("t.jsonl"));
        assert_eq!(usage.usage.input, 10);
        assert_eq!(usage.usage.output, 2);
    }

    #[test]
    fn missing_file_returns_zeroed_default() {
        let usage = parse(Path::new("/no/such/transcript.jsonl"));
        assert_eq!(usage.usage.output, 0);
    }
}
