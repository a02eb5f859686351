use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::core::cost::cache::{DayUsage, Sign, StreamedMessage, TokenCounts};
use crate::core::cost::day::{day_key_from_timestamp, DayKey, DayRange};
use crate::core::cost::jsonl::{self, Line};
use crate::core::cost::labels::ModelName;
use crate::core::cost::parser::{count, text};
use crate::core::cost::provider::ClaudeLogFilter;

// ── Claude JSONL structs ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ClaudeLine {
    #[serde(rename = "type")]
    line_type: Option<String>,
    timestamp: Option<Value>,
    message: Option<ClaudeMessage>,
    #[serde(rename = "requestId")]
    request_id: Option<Value>,
}

#[derive(Deserialize)]
struct ClaudeMessage {
    id: Option<Value>,
    model: Option<Value>,
    usage: Option<ClaudeUsage>,
}

#[derive(Deserialize)]
struct ClaudeUsage {
    input_tokens: Option<Value>,
    output_tokens: Option<Value>,
    cache_read_input_tokens: Option<Value>,
    cache_creation_input_tokens: Option<Value>,
}

impl ClaudeUsage {
    /// `input` covers the whole prompt, cache reads and writes included.
    fn counts(&self) -> TokenCounts {
        let cache_read = count(self.cache_read_input_tokens.as_ref());
        let cache_creation = count(self.cache_creation_input_tokens.as_ref());
        TokenCounts {
            input: count(self.input_tokens.as_ref())
                .saturating_add(cache_read)
                .saturating_add(cache_creation),
            cached_input: cache_read,
            output: count(self.output_tokens.as_ref()),
            reasoning_output: 0,
            cache_creation,
        }
    }
}

/// What one parse of a Claude log (or of its new tail) contributed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaudeParseResult {
    pub days: DayUsage,
    pub parsed_bytes: u64,
    pub last_message: Option<StreamedMessage>,
    /// The tail carried on the message passed in as `carried`. Its earlier
    /// usage must be retracted, `days` holds the final one.
    pub replaces_carried: bool,
}

struct Entry {
    key: Option<String>,
    day: DayKey,
    model: ModelName,
    counts: TokenCounts,
}

/// Requests routed through Vertex AI carry `_vrtx_` ids or an `@revision`
/// model name.
pub fn is_vertex_entry(message_id: &str, request_id: &str, model: &str) -> bool {
    message_id.contains("_vrtx_") || request_id.contains("_vrtx_") || model.contains('@')
}

fn is_claude_candidate(line: &Line<'_>) -> bool {
    !line.truncated && line.contains(r#""type":"assistant""#) && line.contains(r#""usage""#)
}

fn parse_entry(line: Line<'_>, filter: ClaudeLogFilter) -> Option<Entry> {
    if !is_claude_candidate(&line) {
        return None;
    }
    let parsed: ClaudeLine = serde_json::from_slice(line.bytes).ok()?;
    if parsed.line_type.as_deref() != Some("assistant") {
        return None;
    }
    let message = parsed.message?;
    let model = text(&message.model)?;
    let usage = message.usage.as_ref()?;
    let day = parsed
        .timestamp
        .as_ref()
        .and_then(Value::as_str)
        .and_then(day_key_from_timestamp)?;

    let message_id = text(&message.id).unwrap_or("");
    let request_id = text(&parsed.request_id).unwrap_or("");
    if !filter.accepts(is_vertex_entry(message_id, request_id, model)) {
        return None;
    }

    let counts = usage.counts();
    if counts.is_zero() {
        return None;
    }
    let key = (!message_id.is_empty() || !request_id.is_empty())
        .then(|| format!("{}:{}", message_id, request_id));
    Some(Entry {
        key,
        day,
        model: ModelName::normalize(model),
        counts,
    })
}

/// Parse a Claude project log from `start_offset`. Streamed chunks of one
/// message share a message/request id pair and only the last chunk counts,
/// including across a resume from `carried`.
pub fn parse_claude_file(
    path: &Path,
    range: &DayRange,
    start_offset: u64,
    carried: Option<&StreamedMessage>,
    filter: ClaudeLogFilter,
    max_line_bytes: usize,
) -> Result<ClaudeParseResult> {
    let mut entries: Vec<Entry> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    let parsed_bytes = jsonl::scan_lines(path, start_offset, max_line_bytes, |line| {
        let Some(entry) = parse_entry(line, filter) else {
            return;
        };
        let existing = entry.key.as_ref().and_then(|k| by_key.get(k).copied());
        match existing {
            Some(idx) => entries[idx] = entry,
            None => {
                if let Some(key) = &entry.key {
                    by_key.insert(key.clone(), entries.len());
                }
                entries.push(entry);
            }
        }
    })?;

    let mut days = DayUsage::new();
    for entry in &entries {
        add_entry(&mut days, entry, range);
    }

    let replaces_carried = carried.is_some_and(|c| by_key.contains_key(&c.key));
    let last_message = match entries.last() {
        Some(entry) => entry.key.as_ref().map(|key| {
            let mut usage = DayUsage::new();
            add_entry(&mut usage, entry, range);
            StreamedMessage {
                key: key.clone(),
                usage,
            }
        }),
        None => carried.cloned(),
    };

    Ok(ClaudeParseResult {
        days,
        parsed_bytes,
        last_message,
        replaces_carried,
    })
}

fn add_entry(days: &mut DayUsage, entry: &Entry, range: &DayRange) {
    if !range.scan_contains(&entry.day) {
        return;
    }
    let slot = days
        .entry(entry.day.clone())
        .or_default()
        .entry(entry.model.clone())
        .or_default();
    *slot = slot.combine(entry.counts, Sign::Add);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn range() -> DayRange {
        DayRange::new(
            NaiveDate::from_ymd_opt(2025, 2, 10).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 20).unwrap(),
        )
    }

    fn day(s: &str) -> DayKey {
        DayKey::parse(s).unwrap()
    }

    fn model(s: &str) -> ModelName {
        ModelName::normalize(s)
    }

    fn assistant(msg: &str, req: &str, model: &str, input: u64, output: u64) -> String {
        format!(
            r#"{{"type":"assistant","message":{{"model":"{model}","usage":{{"input_tokens":{input},"output_tokens":{output},"cache_read_input_tokens":500,"cache_creation_input_tokens":50}},"id":"{msg}"}},"requestId":"{req}","timestamp":"2025-02-13T10:00:00"}}"#
        )
    }

    fn write_lines(dir: &Path, name: &str, lines: &[String]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        path
    }

    fn parse(path: &Path, filter: ClaudeLogFilter) -> ClaudeParseResult {
        parse_claude_file(path, &range(), 0, None, filter, jsonl::DEFAULT_MAX_LINE_BYTES).unwrap()
    }

    #[test]
    fn usage_folds_cache_counters_into_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(
            dir.path(),
            "a.jsonl",
            &[
                assistant("msg_1", "req_1", "claude-sonnet-4-5-20250929", 1000, 200),
                r#"{"type":"user","message":{"content":"hello"}}"#.to_string(),
            ],
        );
        let result = parse(&path, ClaudeLogFilter::All);
        let counts = result.days[&day("2025-02-13")][&model("claude-sonnet-4-5")];
        assert_eq!(counts.input, 1550);
        assert_eq!(counts.cached_input, 500);
        assert_eq!(counts.cache_creation, 50);
        assert_eq!(counts.output, 200);
    }

    #[test]
    fn streamed_chunks_count_once_with_the_last_usage() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(
            dir.path(),
            "a.jsonl",
            &[
                assistant("msg_1", "req_1", "claude-opus-4-5", 10, 1),
                assistant("msg_1", "req_1", "claude-opus-4-5", 10, 40),
                assistant("msg_2", "req_2", "claude-opus-4-5", 20, 2),
            ],
        );
        let result = parse(&path, ClaudeLogFilter::All);
        let counts = result.days[&day("2025-02-13")][&model("claude-opus-4-5")];
        assert_eq!(counts.output, 42);
        assert_eq!(counts.input, 10 + 550 + 20 + 550);
        assert_eq!(result.last_message.unwrap().key, "msg_2:req_2");
    }

    #[test]
    fn vertex_entries_are_detected() {
        assert!(is_vertex_entry("msg_vrtx_01", "", "claude-opus-4-5"));
        assert!(is_vertex_entry("", "req_vrtx_9", "claude-opus-4-5"));
        assert!(is_vertex_entry("msg_1", "req_1", "claude-opus-4-5@20251101"));
        assert!(!is_vertex_entry("msg_1", "req_1", "claude-opus-4-5"));
    }

    #[test]
    fn filter_splits_vertex_from_direct_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(
            dir.path(),
            "a.jsonl",
            &[
                assistant("msg_1", "req_1", "claude-opus-4-5", 100, 1),
                assistant("msg_vrtx_2", "req_2", "claude-opus-4-5@20251101", 7, 1),
            ],
        );
        let input = |filter| {
            parse(&path, filter)
                .days
                .get(&day("2025-02-13"))
                .and_then(|m| m.get(&model("claude-opus-4-5")))
                .map(|c| c.input)
                .unwrap_or(0)
        };
        assert_eq!(input(ClaudeLogFilter::All), 650 + 557);
        assert_eq!(input(ClaudeLogFilter::VertexAiOnly), 557);
        assert_eq!(input(ClaudeLogFilter::ExcludeVertexAi), 650);
    }

    #[test]
    fn resumed_tail_replaces_carried_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(
            dir.path(),
            "a.jsonl",
            &[assistant("msg_1", "req_1", "claude-opus-4-5", 10, 1)],
        );
        let head = parse(&path, ClaudeLogFilter::All);
        let carried = head.last_message.clone().unwrap();

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "{}", assistant("msg_1", "req_1", "claude-opus-4-5", 10, 30)).unwrap();
        drop(f);

        let tail = parse_claude_file(
            &path,
            &range(),
            head.parsed_bytes,
            Some(&carried),
            ClaudeLogFilter::All,
            jsonl::DEFAULT_MAX_LINE_BYTES,
        )
        .unwrap();
        assert!(tail.replaces_carried);
        assert_eq!(tail.days[&day("2025-02-13")][&model("claude-opus-4-5")].output, 30);

        let empty_tail = parse_claude_file(
            &path,
            &range(),
            tail.parsed_bytes,
            tail.last_message.as_ref(),
            ClaudeLogFilter::All,
            jsonl::DEFAULT_MAX_LINE_BYTES,
        )
        .unwrap();
        assert!(!empty_tail.replaces_carried);
        assert!(empty_tail.days.is_empty());
        assert_eq!(empty_tail.last_message, tail.last_message);
    }

    #[test]
    fn lines_without_model_usage_or_timestamp_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(
            dir.path(),
            "a.jsonl",
            &[
                r#"{"type":"assistant","message":{"usage":{"input_tokens":5}},"timestamp":"2025-02-13T10:00:00"}"#.to_string(),
                r#"{"type":"assistant","message":{"model":"claude-opus-4-5","usage":{"input_tokens":5}}}"#.to_string(),
                r#"{"type":"assistant","message":{"model":"<synthetic>","usage":{"input_tokens":0,"output_tokens":0}},"timestamp":"2025-02-13T10:00:00"}"#.to_string(),
                r#"{"type":"assistant","message":{"model":"claude-opus-4-5","usage":{"input_tokens":5}},"timestamp":"2025-01-01T10:00:00"}"#.to_string(),
                r#"{"type":"assistant","message":{"model":"claude-opus-4-5","usage""#.to_string(),
            ],
        );
        let result = parse(&path, ClaudeLogFilter::All);
        assert!(result.days.is_empty());
        assert!(result.last_message.is_none());
    }
}
