use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use crate::core::cost::cache::{ContextDay, ContextDays, CountMap, DayUsage, Sign, TokenCounts};
use crate::core::cost::day::{day_key_from_epoch_seconds, day_key_from_timestamp, DayKey, DayRange};
use crate::core::cost::jsonl::{self, Line};
use crate::core::cost::labels::{classify_skills, Label, ModelName};

const FALLBACK_MODEL: &str = "gpt-5";

// ── Codex JSONL structs ───────────────────────────────────────────────

#[derive(Deserialize)]
struct CodexLine {
    #[serde(rename = "type")]
    line_type: Option<String>,
    timestamp: Option<Value>,
    #[serde(default)]
    payload: Value,
    model: Option<Value>,
    session_id: Option<Value>,
    #[serde(rename = "sessionId")]
    session_id_camel: Option<Value>,
    id: Option<Value>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SessionMetaPayload {
    session_id: Option<Value>,
    #[serde(rename = "sessionId")]
    session_id_camel: Option<Value>,
    id: Option<Value>,
    instructions: Option<Value>,
    base_instructions: Option<Value>,
    timestamp: Option<Value>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TurnContextPayload {
    model: Option<Value>,
    info: Option<Value>,
    approval_policy: Option<Value>,
    sandbox_policy: Option<Value>,
    effort: Option<Value>,
    collaboration_mode: Option<Value>,
}

#[derive(Deserialize)]
struct TokenCountPayload {
    #[serde(rename = "type")]
    payload_type: Option<String>,
    info: Option<TokenCountInfo>,
    model: Option<Value>,
}

#[derive(Deserialize)]
struct TokenCountInfo {
    model: Option<Value>,
    model_name: Option<Value>,
    total_token_usage: Option<RawUsage>,
    last_token_usage: Option<RawUsage>,
}

#[derive(Deserialize)]
struct RawUsage {
    input_tokens: Option<Value>,
    #[serde(alias = "cache_read_input_tokens")]
    cached_input_tokens: Option<Value>,
    output_tokens: Option<Value>,
    #[serde(alias = "reasoning_tokens")]
    reasoning_output_tokens: Option<Value>,
}

impl RawUsage {
    fn counts(&self) -> TokenCounts {
        TokenCounts {
            input: count(self.input_tokens.as_ref()),
            cached_input: count(self.cached_input_tokens.as_ref()),
            output: count(self.output_tokens.as_ref()),
            reasoning_output: count(self.reasoning_output_tokens.as_ref()),
            ..Default::default()
        }
    }
}

// ── Parse state ───────────────────────────────────────────────────────

/// Context carried from one parse to the next when resuming a file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarryState {
    pub model: Option<String>,
    pub totals: Option<TokenCounts>,
    pub approval_policy: Option<Label>,
    pub sandbox_mode: Option<Label>,
    pub effort: Option<Label>,
}

/// What one parse of a file (or of its new tail) contributed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    pub days: DayUsage,
    pub context_days: ContextDays,
    pub parsed_bytes: u64,
    pub state: CarryState,
    pub session_id: Option<String>,
}

struct EventParser<'a> {
    range: &'a DayRange,
    state: CarryState,
    session_id: Option<String>,
    days: DayUsage,
    context_days: ContextDays,
    pending_risky: CountMap,
    pending_forbidden: CountMap,
    assigned_skills: bool,
}

/// Parse a Codex session log from `start_offset`, continuing from `initial`.
pub fn parse_codex_file(
    path: &Path,
    range: &DayRange,
    start_offset: u64,
    initial: CarryState,
    max_line_bytes: usize,
) -> Result<ParseResult> {
    let mut parser = EventParser {
        range,
        state: initial,
        session_id: None,
        days: DayUsage::new(),
        context_days: ContextDays::new(),
        pending_risky: CountMap::new(),
        pending_forbidden: CountMap::new(),
        assigned_skills: false,
    };

    let parsed_bytes = jsonl::scan_lines(path, start_offset, max_line_bytes, |line| {
        parser.handle_line(line)
    })?;

    Ok(ParseResult {
        days: parser.days,
        context_days: parser.context_days,
        parsed_bytes,
        state: parser.state,
        session_id: parser.session_id,
    })
}

/// Cheap substring filter run before any JSON decoding.
fn is_codex_candidate(line: &Line<'_>) -> bool {
    if line.contains(r#""type":"event_msg""#) {
        return line.contains(r#""token_count""#);
    }
    line.contains(r#""type":"turn_context""#) || line.contains(r#""type":"session_meta""#)
}

impl EventParser<'_> {
    fn handle_line(&mut self, line: Line<'_>) {
        if line.truncated || line.bytes.is_empty() || !is_codex_candidate(&line) {
            return;
        }
        let parsed: CodexLine = match serde_json::from_slice(line.bytes) {
            Ok(p) => p,
            Err(_) => return,
        };

        match parsed.line_type.as_deref() {
            Some("session_meta") => self.handle_session_meta(parsed),
            Some("turn_context") => self.handle_turn_context(parsed),
            Some("event_msg") => self.handle_event(parsed),
            _ => {}
        }
    }

    fn handle_session_meta(&mut self, line: CodexLine) {
        let payload: SessionMetaPayload = serde_json::from_value(line.payload).unwrap_or_default();

        if self.session_id.is_none() {
            self.session_id = [
                &payload.session_id,
                &payload.session_id_camel,
                &payload.id,
                &line.session_id,
                &line.session_id_camel,
                &line.id,
            ]
            .into_iter()
            .filter_map(text)
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string);
        }

        if self.pending_risky.is_empty() && self.pending_forbidden.is_empty() {
            let instructions = text(&payload.instructions).or_else(|| {
                payload
                    .base_instructions
                    .as_ref()
                    .and_then(|b| b.get("text"))
                    .and_then(Value::as_str)
            });
            if let Some(instructions) = instructions {
                let classified = classify_skills(instructions);
                self.pending_risky = classified.risky;
                self.pending_forbidden = classified.forbidden;
            }
        }

        if !self.assigned_skills {
            let day = line
                .timestamp
                .as_ref()
                .or(payload.timestamp.as_ref())
                .and_then(day_key_from_value);
            if let Some(day) = day {
                self.assign_session_skills(&day);
            }
        }
    }

    fn handle_turn_context(&mut self, line: CodexLine) {
        let Some(day) = line.timestamp.as_ref().and_then(day_key_from_value) else {
            return;
        };
        if !line.payload.is_object() {
            return;
        }
        let payload: TurnContextPayload = serde_json::from_value(line.payload).unwrap_or_default();

        let model = text(&payload.model).or_else(|| {
            payload
                .info
                .as_ref()
                .and_then(|i| i.get("model"))
                .and_then(Value::as_str)
        });
        if let Some(model) = model {
            self.state.model = Some(model.to_string());
        }
        self.state.approval_policy = text(&payload.approval_policy).and_then(Label::new);
        self.state.sandbox_mode = sandbox_mode(payload.sandbox_policy.as_ref());
        self.state.effort = effort_level(&payload);
        self.assign_session_skills(&day);
    }

    fn handle_event(&mut self, line: CodexLine) {
        let Some(day) = line.timestamp.as_ref().and_then(day_key_from_value) else {
            return;
        };
        let payload: TokenCountPayload = match serde_json::from_value(line.payload) {
            Ok(p) => p,
            Err(_) => return,
        };
        if payload.payload_type.as_deref() != Some("token_count") {
            return;
        }
        let info = payload.info;

        let model = info
            .as_ref()
            .and_then(|i| text(&i.model).or_else(|| text(&i.model_name)))
            .or_else(|| text(&payload.model))
            .or_else(|| text(&line.model))
            .map(str::to_string)
            .or_else(|| self.state.model.clone())
            .unwrap_or_else(|| FALLBACK_MODEL.to_string());

        let total = info.as_ref().and_then(|i| i.total_token_usage.as_ref());
        let last = info.as_ref().and_then(|i| i.last_token_usage.as_ref());

        // Cumulative snapshots repeat running totals; only the growth counts.
        let mut delta = if let Some(total) = total {
            let current = total.counts();
            let previous = self.state.totals.unwrap_or_default();
            self.state.totals = Some(current);
            current.combine(previous, Sign::Retract)
        } else if let Some(last) = last {
            last.counts()
        } else {
            return;
        };

        if delta.is_zero() {
            return;
        }
        delta.cached_input = delta.cached_input.min(delta.input);

        self.add_usage(&day, &model, delta);
        self.add_context(&day);
        self.assign_session_skills(&day);
    }

    fn add_usage(&mut self, day: &DayKey, model: &str, delta: TokenCounts) {
        if !self.range.scan_contains(day) {
            return;
        }
        let slot = self
            .days
            .entry(day.clone())
            .or_default()
            .entry(ModelName::normalize(model))
            .or_default();
        *slot = slot.combine(delta, Sign::Add);
    }

    fn add_context(&mut self, day: &DayKey) {
        if !self.range.scan_contains(day) {
            return;
        }
        let mut context = self.context_days.remove(day).unwrap_or_default();
        increment(&mut context.approval_policies, self.state.approval_policy.as_ref());
        increment(&mut context.sandbox_modes, self.state.sandbox_mode.as_ref());
        increment(&mut context.effort_levels, self.state.effort.as_ref());
        if !context.is_empty() {
            self.context_days.insert(day.clone(), context);
        }
    }

    /// Attribute the session's classified skills to the first in-window day
    /// seen, once per parse.
    fn assign_session_skills(&mut self, day: &DayKey) {
        if self.assigned_skills {
            return;
        }
        if self.pending_risky.is_empty() && self.pending_forbidden.is_empty() {
            return;
        }
        if !self.range.scan_contains(day) {
            return;
        }
        let context: &mut ContextDay = self.context_days.entry(day.clone()).or_default();
        for (skill, n) in &self.pending_risky {
            *context.risky_skills.entry(skill.clone()).or_insert(0) += (*n).max(0);
        }
        for (skill, n) in &self.pending_forbidden {
            *context.forbidden_skills.entry(skill.clone()).or_insert(0) += (*n).max(0);
        }
        self.assigned_skills = true;
    }
}

fn increment(map: &mut CountMap, label: Option<&Label>) {
    if let Some(label) = label {
        *map.entry(label.clone()).or_insert(0) += 1;
    }
}

pub(super) fn text(value: &Option<Value>) -> Option<&str> {
    value.as_ref().and_then(Value::as_str)
}

pub(super) fn count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        _ => 0,
    }
}

fn day_key_from_value(value: &Value) -> Option<DayKey> {
    match value {
        Value::String(s) => day_key_from_timestamp(s),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Millisecond timestamps are larger than any plausible seconds value.
            let seconds = if raw > 100_000_000_000 { raw / 1000 } else { raw };
            day_key_from_epoch_seconds(seconds)
        }
        _ => None,
    }
}

fn sandbox_mode(raw: Option<&Value>) -> Option<Label> {
    match raw? {
        Value::String(mode) => Label::new(mode),
        Value::Object(obj) => obj
            .get("mode")
            .and_then(Value::as_str)
            .or_else(|| obj.get("type").and_then(Value::as_str))
            .and_then(Label::new),
        _ => None,
    }
}

fn effort_level(payload: &TurnContextPayload) -> Option<Label> {
    if let Some(effort) = text(&payload.effort) {
        return Label::new(effort);
    }
    payload
        .collaboration_mode
        .as_ref()
        .and_then(|c| c.pointer("/settings/reasoning_effort"))
        .and_then(Value::as_str)
        .and_then(Label::new)
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

    fn write_lines(dir: &Path, name: &str, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        path
    }

    fn parse(path: &Path) -> ParseResult {
        parse_codex_file(path, &range(), 0, CarryState::default(), jsonl::DEFAULT_MAX_LINE_BYTES)
            .unwrap()
    }

    const META: &str = r#"{"type":"session_meta","payload":{"id":"sess-1","timestamp":"2025-02-13T09:00:00","instructions":"- deploy: Ship a release (file: /s/deploy.md)\n- legacy: Blocked here (file: /s/legacy.md)"}}"#;
    const TURN: &str = r#"{"type":"turn_context","timestamp":"2025-02-13T09:00:01","payload":{"model":"gpt-5","approval_policy":"on-request","sandbox_policy":{"mode":"workspace-write"},"collaboration_mode":{"settings":{"reasoning_effort":"high"}}}}"#;

    fn total_event(ts: &str, input: u64, cached: u64, output: u64, reasoning: u64) -> String {
        format!(
            r#"{{"type":"event_msg","timestamp":"{ts}","payload":{{"type":"token_count","info":{{"total_token_usage":{{"input_tokens":{input},"cached_input_tokens":{cached},"output_tokens":{output},"reasoning_output_tokens":{reasoning}}}}}}}}}"#
        )
    }

    #[test]
    fn cumulative_totals_yield_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let e1 = total_event("2025-02-13T10:00:00", 40, 10, 10, 0);
        let e2 = total_event("2025-02-13T10:01:00", 100, 20, 30, 0);
        let path = write_lines(dir.path(), "a.jsonl", &[TURN, &e1, &e2]);

        let result = parse(&path);
        let counts = result.days[&day("2025-02-13")][&model("gpt-5")];
        assert_eq!(counts.input, 100);
        assert_eq!(counts.cached_input, 20);
        assert_eq!(counts.output, 30);
        assert_eq!(
            result.state.totals,
            Some(TokenCounts {
                input: 100,
                cached_input: 20,
                output: 30,
                reasoning_output: 0,
                ..Default::default()
            })
        );
    }

    #[test]
    fn carried_totals_produce_only_the_increment() {
        let dir = tempfile::tempdir().unwrap();
        let e = total_event("2025-02-13T10:00:00", 100, 20, 30, 0);
        let path = write_lines(dir.path(), "a.jsonl", &[&e]);
        let initial = CarryState {
            model: Some("gpt-4.1".to_string()),
            totals: Some(TokenCounts {
                input: 40,
                cached_input: 10,
                output: 10,
                reasoning_output: 0,
                ..Default::default()
            }),
            ..Default::default()
        };
        let result =
            parse_codex_file(&path, &range(), 0, initial, jsonl::DEFAULT_MAX_LINE_BYTES).unwrap();
        assert_eq!(
            result.days[&day("2025-02-13")][&model("gpt-4.1")],
            TokenCounts {
                input: 60,
                cached_input: 10,
                output: 20,
                reasoning_output: 0,
                ..Default::default()
            }
        );
    }

    #[test]
    fn regressing_totals_never_go_negative() {
        let dir = tempfile::tempdir().unwrap();
        let e1 = total_event("2025-02-13T10:00:00", 100, 0, 50, 0);
        let e2 = total_event("2025-02-13T10:01:00", 80, 0, 60, 0);
        let path = write_lines(dir.path(), "a.jsonl", &[&e1, &e2]);
        let counts = parse(&path).days[&day("2025-02-13")][&model(FALLBACK_MODEL)];
        assert_eq!(counts.input, 100);
        assert_eq!(counts.output, 60);
    }

    #[test]
    fn last_usage_is_used_directly_and_cached_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let line = r#"{"type":"event_msg","timestamp":"2025-02-13T10:00:00","payload":{"type":"token_count","info":{"model_name":"gpt-5.2","last_token_usage":{"input_tokens":10,"cache_read_input_tokens":50,"output_tokens":5,"reasoning_tokens":2}}}}"#;
        let path = write_lines(dir.path(), "a.jsonl", &[line, line]);
        let result = parse(&path);
        assert_eq!(
            result.days[&day("2025-02-13")][&model("gpt-5.2")],
            TokenCounts {
                input: 20,
                cached_input: 20,
                output: 10,
                reasoning_output: 4,
                ..Default::default()
            }
        );
        assert!(result.state.totals.is_none());
    }

    #[test]
    fn non_string_model_falls_back_instead_of_dropping_event() {
        let dir = tempfile::tempdir().unwrap();
        let line = r#"{"type":"event_msg","timestamp":"2025-02-13T10:00:00","payload":{"type":"token_count","model":7,"info":{"model":{},"model_name":"gpt-5.2","last_token_usage":{"input_tokens":10,"output_tokens":5}}}}"#;
        let bare = r#"{"type":"event_msg","timestamp":"2025-02-13T11:00:00","payload":{"type":"token_count","model":["x"],"info":{"model":null,"last_token_usage":{"input_tokens":3,"output_tokens":1}}}}"#;
        let path = write_lines(dir.path(), "a.jsonl", &[TURN, line, bare]);
        let result = parse(&path);
        assert_eq!(result.days[&day("2025-02-13")][&model("gpt-5.2")].input, 10);
        assert_eq!(result.days[&day("2025-02-13")][&model("gpt-5")].input, 3);
    }

    #[test]
    fn numeric_timestamps_accept_seconds_and_milliseconds() {
        let seconds: i64 = 1_739_440_800;
        let expected = day_key_from_epoch_seconds(seconds).unwrap();
        assert_eq!(day_key_from_value(&serde_json::json!(seconds)), Some(expected.clone()));
        assert_eq!(
            day_key_from_value(&serde_json::json!(seconds * 1000 + 999)),
            Some(expected.clone())
        );
        assert_eq!(day_key_from_value(&serde_json::json!(null)), None);

        let dir = tempfile::tempdir().unwrap();
        let line = format!(
            r#"{{"type":"event_msg","timestamp":{},"payload":{{"type":"token_count","info":{{"last_token_usage":{{"input_tokens":8,"output_tokens":2}}}}}}}}"#,
            seconds * 1000
        );
        let path = write_lines(dir.path(), "a.jsonl", &[&line]);
        let result = parse(&path);
        assert_eq!(result.days[&expected][&model(FALLBACK_MODEL)].input, 8);
    }

    #[test]
    fn zero_delta_events_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let e = total_event("2025-02-13T10:00:00", 10, 0, 10, 0);
        let path = write_lines(dir.path(), "a.jsonl", &[TURN, &e, &e]);
        let result = parse(&path);
        let ctx = &result.context_days[&day("2025-02-13")];
        assert_eq!(ctx.approval_policies[&Label::new("on-request").unwrap()], 1);
    }

    #[test]
    fn turn_context_sets_carried_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(dir.path(), "a.jsonl", &[TURN]);
        let result = parse(&path);
        assert!(result.days.is_empty());
        assert!(result.context_days.is_empty());
        assert_eq!(result.state.model.as_deref(), Some("gpt-5"));
        assert_eq!(result.state.approval_policy, Label::new("on-request"));
        assert_eq!(result.state.sandbox_mode, Label::new("workspace-write"));
        assert_eq!(result.state.effort, Label::new("high"));
    }

    #[test]
    fn token_events_count_context_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let e1 = total_event("2025-02-13T10:00:00", 10, 0, 1, 0);
        let e2 = total_event("2025-02-13T10:01:00", 20, 0, 2, 0);
        let path = write_lines(dir.path(), "a.jsonl", &[TURN, &e1, &e2]);
        let ctx = &parse(&path).context_days[&day("2025-02-13")];
        assert_eq!(ctx.approval_policies[&Label::new("on-request").unwrap()], 2);
        assert_eq!(ctx.sandbox_modes[&Label::new("workspace-write").unwrap()], 2);
        assert_eq!(ctx.effort_levels[&Label::new("high").unwrap()], 2);
    }

    #[test]
    fn session_meta_sets_id_and_skills_once() {
        let dir = tempfile::tempdir().unwrap();
        let other_meta = r#"{"type":"session_meta","payload":{"id":"sess-2"}}"#;
        let e = total_event("2025-02-14T10:00:00", 10, 0, 1, 0);
        let path = write_lines(dir.path(), "a.jsonl", &[META, other_meta, TURN, &e]);
        let result = parse(&path);
        assert_eq!(result.session_id.as_deref(), Some("sess-1"));

        let ctx = &result.context_days[&day("2025-02-13")];
        assert_eq!(ctx.risky_skills[&Label::new("deploy").unwrap()], 1);
        assert_eq!(ctx.forbidden_skills[&Label::new("legacy").unwrap()], 1);
        let later = &result.context_days[&day("2025-02-14")];
        assert!(later.risky_skills.is_empty());
    }

    #[test]
    fn skills_wait_for_first_timestamped_day() {
        let dir = tempfile::tempdir().unwrap();
        let meta = r#"{"type":"session_meta","payload":{"session_id":"s","base_instructions":{"text":"- deploy: release it (file: x)"}}}"#;
        let e = total_event("2025-02-15T10:00:00", 10, 0, 1, 0);
        let path = write_lines(dir.path(), "a.jsonl", &[meta, &e]);
        let result = parse(&path);
        let ctx = &result.context_days[&day("2025-02-15")];
        assert_eq!(ctx.risky_skills[&Label::new("deploy").unwrap()], 1);
    }

    #[test]
    fn session_id_falls_back_to_top_level() {
        let dir = tempfile::tempdir().unwrap();
        let meta = r#"{"type":"session_meta","sessionId":"top-level","payload":{"id":"  "}}"#;
        let path = write_lines(dir.path(), "a.jsonl", &[meta]);
        assert_eq!(parse(&path).session_id.as_deref(), Some("top-level"));
    }

    #[test]
    fn events_outside_scan_window_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let e1 = total_event("2025-01-01T10:00:00", 10, 0, 1, 0);
        let e2 = total_event("2025-02-13T10:00:00", 15, 0, 2, 0);
        let path = write_lines(dir.path(), "a.jsonl", &[&e1, &e2]);
        let result = parse(&path);
        assert_eq!(result.days.len(), 1);
        assert_eq!(result.days[&day("2025-02-13")][&model("gpt-5")].input, 5);
    }

    #[test]
    fn malformed_and_irrelevant_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let e = total_event("2025-02-13T10:00:00", 10, 0, 1, 0);
        let path = write_lines(
            dir.path(),
            "a.jsonl",
            &[
                r#"{"type":"event_msg","payload":{"type":"token_count""#,
                r#"{"type":"response_item","payload":{"type":"message"}}"#,
                r#"{"type":"event_msg","timestamp":"2025-02-13T10:00:00","payload":{"type":"agent_message"}}"#,
                r#"{"type":"event_msg","timestamp":"2025-02-13T10:00:00","payload":{"type":"token_count","info":null}}"#,
                "",
                &e,
            ],
        );
        let result = parse(&path);
        assert_eq!(result.days[&day("2025-02-13")][&model("gpt-5")].input, 10);
    }

    #[test]
    fn overlong_lines_are_not_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let e = total_event("2025-02-13T10:00:00", 10, 0, 1, 0);
        let path = write_lines(dir.path(), "a.jsonl", &[&e]);
        let result = parse_codex_file(&path, &range(), 0, CarryState::default(), 16).unwrap();
        assert!(result.days.is_empty());
        assert_eq!(result.parsed_bytes, e.len() as u64 + 1);
    }

    #[test]
    fn resuming_matches_a_full_parse() {
        let dir = tempfile::tempdir().unwrap();
        let e1 = total_event("2025-02-13T10:00:00", 40, 10, 10, 1);
        let e2 = total_event("2025-02-14T10:00:00", 100, 20, 30, 5);
        let e3 = total_event("2025-02-14T11:00:00", 130, 25, 50, 5);
        let full_path = write_lines(dir.path(), "full.jsonl", &[META, TURN, &e1, &e2, &e3]);
        let full = parse(&full_path);

        let grown = write_lines(dir.path(), "grown.jsonl", &[META, TURN, &e1]);
        let head = parse(&grown);
        let mut f = std::fs::OpenOptions::new().append(true).open(&grown).unwrap();
        writeln!(f, "{}", e2).unwrap();
        writeln!(f, "{}", e3).unwrap();
        drop(f);

        let tail = parse_codex_file(
            &grown,
            &range(),
            head.parsed_bytes,
            head.state.clone(),
            jsonl::DEFAULT_MAX_LINE_BYTES,
        )
        .unwrap();

        let mut days = head.days.clone();
        crate::core::cost::cache::apply_usage(&mut days, &tail.days, Sign::Add);
        let mut context_days = head.context_days.clone();
        crate::core::cost::cache::apply_context(&mut context_days, &tail.context_days, Sign::Add);

        assert_eq!(days, full.days);
        assert_eq!(context_days, full.context_days);
        assert_eq!(tail.state, full.state);
        assert_eq!(tail.parsed_bytes, full.parsed_bytes);
        assert!(tail.session_id.is_none());
    }
}
