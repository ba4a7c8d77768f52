//! Codex CLI rollout logs: `{timestamp, type, payload}` per line.
//!
//! Codex writes most conversational turns twice: a coarse `event_msg` and a structured
//! `response_item`. The coarse record is held back until the next structured record
//! arrives; when both carry the same role and the same trimmed text (or reasoning), only
//! the structured one is kept. The comparison is purely textual, so a message that is
//! legitimately repeated verbatim right after itself is folded into one entry.

use crate::common::{
    decode_tool_input, new_entry, normalize_tool_output, output_reports_failure, parse_timestamp,
    set_first_str, str_field, synth_uuid, EntryQueue,
};
use crate::{BoxedInput, EntryParser, ParseContext, SessionHints};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use thinkt_core::{ContentBlock, Entry, LineReader, Result, Role, Source};

#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(default)]
    timestamp: String,
    #[serde(rename = "type")]
    line_type: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct RawSessionMeta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    model_provider: Option<String>,
    #[serde(default)]
    git: Option<RawGit>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGit {
    #[serde(default)]
    branch: Option<String>,
}

/// Which structured record a coarse event can be folded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Message,
    Reasoning,
}

/// A comparable summary of a record: shape, role and trimmed text.
#[derive(Debug, Clone, PartialEq)]
struct Fingerprint {
    shape: Shape,
    role: Role,
    text: String,
}

impl Fingerprint {
    fn of(shape: Shape, entry: &Entry) -> Self {
        let text = match shape {
            Shape::Message => entry.text.trim().to_string(),
            Shape::Reasoning => entry
                .content_blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Thinking { thinking, .. } => Some(thinking.trim()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        };
        Self {
            shape,
            role: entry.role,
            text,
        }
    }
}

struct PendingEvent {
    fingerprint: Fingerprint,
    entry: Entry,
}

pub struct CodexParser<R = BoxedInput> {
    ctx: ParseContext,
    lines: LineReader<R>,
    hints: SessionHints,
    queue: EntryQueue,
    pending: Option<PendingEvent>,
    /// Structured record read on the immediately preceding line.
    last_structured: Option<Fingerprint>,
}

impl<R: Read> CodexParser<R> {
    pub fn new(ctx: ParseContext, lines: LineReader<R>) -> Self {
        Self {
            ctx,
            lines,
            hints: SessionHints::default(),
            queue: EntryQueue::default(),
            pending: None,
            last_structured: None,
        }
    }

    fn flush_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.queue.push(&self.ctx, pending.entry);
        }
    }

    fn handle_line(&mut self, line_no: u64, raw: RawLine) {
        let timestamp = parse_timestamp(&raw.timestamp);
        match raw.line_type.as_str() {
            "session_meta" => {
                self.last_structured = None;
                self.apply_session_meta(raw.payload);
            }
            "turn_context" => {
                self.last_structured = None;
                set_first_str(&mut self.hints.cwd, str_field(&raw.payload, "cwd"));
                if let Some(model) = str_field(&raw.payload, "model").filter(|m| !m.is_empty()) {
                    self.hints.model = Some(model.to_string());
                }
            }
            "event_msg" => self.handle_event(line_no, timestamp, &raw.payload),
            "response_item" => self.handle_response(line_no, timestamp, &raw.payload),
            other => {
                self.last_structured = None;
                tracing::trace!(line = line_no, kind = other, "ignoring codex line");
            }
        }
    }

    fn apply_session_meta(&mut self, payload: Value) {
        let meta: RawSessionMeta = match serde_json::from_value(payload) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::debug!(error = %err, "malformed codex session_meta");
                return;
            }
        };
        set_first_str(&mut self.hints.session_id, meta.id.as_deref());
        set_first_str(&mut self.hints.cwd, meta.cwd.as_deref());
        set_first_str(&mut self.hints.model_provider, meta.model_provider.as_deref());
        set_first_str(
            &mut self.hints.git_branch,
            meta.git.as_ref().and_then(|git| git.branch.as_deref()),
        );
        if self.hints.started_at.is_none() {
            self.hints.started_at = meta.timestamp.as_deref().and_then(parse_timestamp);
        }
    }

    fn handle_event(
        &mut self,
        line_no: u64,
        timestamp: Option<chrono::DateTime<chrono::Utc>>,
        payload: &Value,
    ) {
        let (shape, role, kind) = match str_field(payload, "type").unwrap_or_default() {
            "user_message" => (Shape::Message, Role::User, "user_message"),
            "agent_message" => (Shape::Message, Role::Assistant, "agent_message"),
            "agent_reasoning" => (Shape::Reasoning, Role::Assistant, "agent_reasoning"),
            _ => return,
        };

        let mut entry = new_entry(&self.ctx, synth_uuid(&self.ctx.session_id, line_no, kind, None), role);
        entry.timestamp = timestamp;
        match shape {
            Shape::Message => {
                entry.text = str_field(payload, "message").unwrap_or_default().to_string();
            }
            Shape::Reasoning => {
                let text = str_field(payload, "text").unwrap_or_default();
                if !text.trim().is_empty() {
                    entry.content_blocks.push(ContentBlock::thinking(text));
                }
            }
        }
        if role == Role::Assistant {
            entry.model = self.hints.model.clone();
        }
        if entry.is_empty() {
            return;
        }

        let fingerprint = Fingerprint::of(shape, &entry);
        if self.last_structured.take().as_ref() == Some(&fingerprint) {
            tracing::trace!(line = line_no, "dropping codex event already seen as response_item");
            return;
        }
        self.flush_pending();
        self.pending = Some(PendingEvent { fingerprint, entry });
    }

    fn handle_response(
        &mut self,
        line_no: u64,
        timestamp: Option<chrono::DateTime<chrono::Utc>>,
        payload: &Value,
    ) {
        let item_type = str_field(payload, "type").unwrap_or_default();
        let built = match item_type {
            "message" => self.response_message(line_no, payload),
            "reasoning" => self.response_reasoning(line_no, payload),
            "function_call" | "custom_tool_call" => self.response_tool_call(line_no, item_type, payload),
            "function_call_output" | "custom_tool_call_output" => {
                self.response_tool_output(line_no, item_type, payload)
            }
            _ => None,
        };

        let Some((shape, mut entry)) = built else {
            self.last_structured = None;
            return;
        };
        entry.timestamp = timestamp;

        let fingerprint = shape.map(|shape| Fingerprint::of(shape, &entry));
        match (self.pending.take(), &fingerprint) {
            (Some(pending), Some(current)) if pending.fingerprint == *current => {
                tracing::trace!(line = line_no, "response_item supersedes pending codex event");
            }
            (Some(pending), _) => self.queue.push(&self.ctx, pending.entry),
            (None, _) => {}
        }
        self.last_structured = fingerprint;
        self.queue.push(&self.ctx, entry);
    }

    fn response_message(&self, line_no: u64, payload: &Value) -> Option<(Option<Shape>, Entry)> {
        let role = Role::from_vendor(str_field(payload, "role").unwrap_or_default());
        let text = message_text(payload.get("content"));
        let mut entry = new_entry(&self.ctx, synth_uuid(&self.ctx.session_id, line_no, "message", None), role);
        if !text.trim().is_empty() {
            entry.content_blocks.push(ContentBlock::text(text.clone()));
        }
        entry.text = text;
        if role == Role::Assistant {
            entry.model = self.hints.model.clone();
        }
        Some((Some(Shape::Message), entry))
    }

    fn response_reasoning(&self, line_no: u64, payload: &Value) -> Option<(Option<Shape>, Entry)> {
        let summary = reasoning_text(payload.get("summary"));
        let thinking = if summary.trim().is_empty() {
            reasoning_text(payload.get("content"))
        } else {
            summary
        };
        let mut entry = new_entry(
            &self.ctx,
            synth_uuid(&self.ctx.session_id, line_no, "reasoning", None),
            Role::Assistant,
        );
        if !thinking.trim().is_empty() {
            entry.content_blocks.push(ContentBlock::thinking(thinking));
        }
        entry.model = self.hints.model.clone();
        Some((Some(Shape::Reasoning), entry))
    }

    fn response_tool_call(
        &self,
        line_no: u64,
        item_type: &str,
        payload: &Value,
    ) -> Option<(Option<Shape>, Entry)> {
        let call_id = str_field(payload, "call_id")
            .or_else(|| str_field(payload, "id"))
            .unwrap_or_default()
            .to_string();
        let name = str_field(payload, "name").unwrap_or("unknown").to_string();
        let raw_input = if item_type == "custom_tool_call" {
            payload.get("input")
        } else {
            payload.get("arguments")
        };
        let input = raw_input.map(decode_tool_input).unwrap_or(Value::Null);

        let mut entry = new_entry(
            &self.ctx,
            synth_uuid(&self.ctx.session_id, line_no, item_type, Some(&call_id)),
            Role::Assistant,
        );
        entry.content_blocks.push(ContentBlock::tool_use(call_id, name, input));
        entry.model = self.hints.model.clone();
        Some((None, entry))
    }

    fn response_tool_output(
        &self,
        line_no: u64,
        item_type: &str,
        payload: &Value,
    ) -> Option<(Option<Shape>, Entry)> {
        let call_id = str_field(payload, "call_id").unwrap_or_default().to_string();
        let raw_output = payload.get("output").cloned().unwrap_or(Value::Null);
        let result = normalize_tool_output(&raw_output);
        let is_error = output_reports_failure(&raw_output);

        let mut entry = new_entry(
            &self.ctx,
            synth_uuid(&self.ctx.session_id, line_no, item_type, Some(&call_id)),
            Role::Tool,
        );
        entry
            .content_blocks
            .push(ContentBlock::tool_result(call_id, result, is_error));
        Some((None, entry))
    }
}

/// Joined `text`/`input_text`/`output_text` items of a message.
fn message_text(content: Option<&Value>) -> String {
    let Some(Value::Array(items)) = content else {
        return content.and_then(Value::as_str).unwrap_or_default().to_string();
    };
    items
        .iter()
        .filter(|item| {
            matches!(
                str_field(item, "type"),
                Some("text" | "input_text" | "output_text") | None
            )
        })
        .filter_map(|item| str_field(item, "text"))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn reasoning_text(items: Option<&Value>) -> String {
    let Some(Value::Array(items)) = items else {
        return String::new();
    };
    items
        .iter()
        .filter_map(|item| str_field(item, "text"))
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

impl<R: Read + Send> EntryParser for CodexParser<R> {
    fn source(&self) -> Source {
        Source::Codex
    }

    fn next_entry(&mut self) -> Result<Option<Entry>> {
        loop {
            if let Some(entry) = self.queue.pop() {
                return Ok(Some(entry));
            }
            let raw = match self.lines.next_line()? {
                Some((line_no, bytes)) => match serde_json::from_slice::<RawLine>(bytes) {
                    Ok(raw) => Some((line_no, raw)),
                    Err(err) => {
                        tracing::debug!(line = line_no, error = %err, "skipping malformed codex line");
                        self.last_structured = None;
                        continue;
                    }
                },
                None => None,
            };
            match raw {
                Some((line_no, raw)) => self.handle_line(line_no, raw),
                None => {
                    self.flush_pending();
                    return Ok(self.queue.pop());
                }
            }
        }
    }

    fn hints(&self) -> &SessionHints {
        &self.hints
    }

    fn bytes_consumed(&self) -> u64 {
        self.lines.bytes_consumed()
    }

    fn is_exhausted(&self) -> bool {
        self.lines.is_eof() && self.pending.is_none() && self.queue.is_empty()
    }
}
