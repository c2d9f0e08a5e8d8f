//! Reads one append-only JSONL transcript file and emits normalized
//! records into the storage engine (§4.C).

use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Utc};

use conductor_domain::error::Result;
use conductor_domain::trace::TraceEvent;
use conductor_storage::records::AnalyticsFields;
use conductor_storage::Storage;

use crate::inflight::{InflightMap, PendingToolUse, DEFAULT_MAX_ENTRIES};
use crate::schema::{ContentBlock, TranscriptLine};

/// Buffer size floor for the line reader — tolerates very long lines
/// (large tool inputs/outputs) per §4.C step 1.
const MIN_BUFFER: usize = 1024 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct ParseSummary {
    pub shell_commands: usize,
    pub claude_commands: usize,
    pub skipped_lines: usize,
}

pub fn parse_file(path: &Path, storage: &Storage) -> Result<ParseSummary> {
    parse_file_with_cap(path, storage, DEFAULT_MAX_ENTRIES)
}

pub fn parse_file_with_cap(path: &Path, storage: &Storage, max_entries: usize) -> Result<ParseSummary> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::with_capacity(MIN_BUFFER, file);

    let mut inflight = InflightMap::new(max_entries);
    let mut summary = ParseSummary::default();

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => {
                summary.skipped_lines += 1;
                continue;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed: TranscriptLine = match serde_json::from_str(line) {
            Ok(p) => p,
            Err(_) => {
                summary.skipped_lines += 1;
                continue;
            }
        };

        let Some(message) = parsed.message.as_ref() else {
            continue;
        };

        let conversation_id = parsed
            .session_id
            .clone()
            .unwrap_or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default());
        let executed_at = parsed
            .timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        match message.role.as_str() {
            "assistant" => {
                for block in &message.content {
                    if let ContentBlock::ToolUse { id, name, input } = block {
                        if id.is_empty() || name.is_empty() {
                            continue;
                        }
                        let pending = PendingToolUse {
                            tool_id: id.clone(),
                            tool_name: name.clone(),
                            input: input.clone(),
                            conversation_id: conversation_id.clone(),
                            working_directory: parsed.cwd.clone(),
                            git_branch: parsed.git_branch.clone(),
                            executed_at,
                        };
                        if let Some(evicted) = inflight.insert(pending) {
                            TraceEvent::ToolMapBoundsEvicted {
                                path: path.display().to_string(),
                                evicted_tool_id: evicted,
                            }
                            .emit();
                        }
                    }
                }
            }
            "user" => {
                for block in &message.content {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        let Some(pending) = inflight.take(tool_use_id) else {
                            continue;
                        };
                        let result_text = coerce_content_to_string(content);
                        let success = !contains_failure(&result_text);

                        let fields = AnalyticsFields {
                            conversation_id: pending.conversation_id,
                            session_name: None,
                            working_directory: pending.working_directory,
                            git_branch: pending.git_branch,
                            model_provider: None,
                            model_name: None,
                            executed_at: pending.executed_at,
                        };

                        if pending.tool_name == "Bash" {
                            let command = pending
                                .input
                                .get("command")
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string();
                            storage.record_shell_command(&fields, &command, Some(&result_text), success)?;
                            summary.shell_commands += 1;
                        } else {
                            storage.record_claude_command(
                                &fields,
                                &pending.tool_name,
                                &pending.input,
                                Some(&result_text),
                                success,
                            )?;
                            summary.claude_commands += 1;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    TraceEvent::TranscriptIngested {
        path: path.display().to_string(),
        shell_commands: summary.shell_commands,
        claude_commands: summary.claude_commands,
        skipped_lines: summary.skipped_lines,
    }
    .emit();

    Ok(summary)
}

fn coerce_content_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn contains_failure(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("error") || lowered.contains("failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_transcript(dir: &Path, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join("session.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn pairs_tool_use_and_tool_result_into_shell_command() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_for_test(dir.path()).unwrap();

        let assistant = serde_json::json!({
            "type": "assistant",
            "sessionId": "S",
            "timestamp": "2026-01-01T00:00:00Z",
            "message": {
                "role": "assistant",
                "content": [{"type": "tool_use", "id": "T1", "name": "Bash", "input": {"command": "ls"}}]
            }
        });
        let user = serde_json::json!({
            "type": "user",
            "sessionId": "S",
            "timestamp": "2026-01-01T00:00:01Z",
            "message": {
                "role": "user",
                "content": [{"type": "tool_result", "tool_use_id": "T1", "content": "a\nb"}]
            }
        });

        let path = write_transcript(dir.path(), &[&assistant.to_string(), &user.to_string()]);
        let summary = parse_file(&path, &storage).unwrap();

        assert_eq!(summary.shell_commands, 1);
        assert_eq!(summary.claude_commands, 0);

        let mut q = conductor_storage::Query::new();
        q.conversation_id = Some("S".into());
        let rows = storage.get_shell_commands(&q).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command, "ls");
        assert!(rows[0].success);
    }

    #[test]
    fn unpaired_tool_use_produces_nothing_and_malformed_lines_never_abort() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_for_test(dir.path()).unwrap();

        let assistant = serde_json::json!({
            "type": "assistant",
            "sessionId": "S",
            "message": {
                "role": "assistant",
                "content": [{"type": "tool_use", "id": "T1", "name": "Read", "input": {}}]
            }
        });

        let path = write_transcript(dir.path(), &["not json at all", &assistant.to_string()]);
        let summary = parse_file(&path, &storage).unwrap();

        assert_eq!(summary.skipped_lines, 1);
        assert_eq!(summary.claude_commands, 0);
        assert_eq!(summary.shell_commands, 0);
    }

    #[test]
    fn failed_result_marks_success_false() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_for_test(dir.path()).unwrap();

        let assistant = serde_json::json!({
            "type": "assistant",
            "sessionId": "S",
            "message": {
                "role": "assistant",
                "content": [{"type": "tool_use", "id": "T1", "name": "Edit", "input": {}}]
            }
        });
        let user = serde_json::json!({
            "type": "user",
            "sessionId": "S",
            "message": {
                "role": "user",
                "content": [{"type": "tool_result", "tool_use_id": "T1", "content": "Error: failed to apply patch"}]
            }
        });

        let path = write_transcript(dir.path(), &[&assistant.to_string(), &user.to_string()]);
        parse_file(&path, &storage).unwrap();

        let mut q = conductor_storage::Query::new();
        q.conversation_id = Some("S".into());
        let rows = storage.get_claude_commands(&q).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].success);
    }
}
