//! Qwen Code chat logs: Gemini-style message parts wrapped in Claude-style records.

use crate::common::{
    decode_tool_input, new_entry, parse_timestamp, set_first, set_first_str, synth_uuid,
    EntryQueue,
};
use crate::{BoxedInput, EntryParser, ParseContext, SessionHints};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use thinkt_core::{ContentBlock, Entry, LineReader, Result, Role, Source};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    parent_uuid: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    git_branch: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    system_payload: Value,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    parts: Vec<RawPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    #[serde(default)]
    function_call: Option<RawFunctionCall>,
    #[serde(default)]
    function_response: Option<RawFunctionResponse>,
}

#[derive(Debug, Deserialize)]
struct RawFunctionCall {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
struct RawFunctionResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    response: Value,
}

pub struct QwenParser<R = BoxedInput> {
    ctx: ParseContext,
    lines: LineReader<R>,
    hints: SessionHints,
    queue: EntryQueue,
}

impl<R: Read> QwenParser<R> {
    pub fn new(ctx: ParseContext, lines: LineReader<R>) -> Self {
        Self {
            ctx,
            lines,
            hints: SessionHints::default(),
            queue: EntryQueue::default(),
        }
    }

    fn handle_record(&mut self, line_no: u64, record: RawRecord) {
        let role = match record.kind.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool_result" => Role::Tool,
            "system" => Role::System,
            _ => record.role.as_deref().map_or(Role::System, Role::from_vendor),
        };

        set_first_str(&mut self.hints.session_id, record.session_id.as_deref());
        set_first_str(&mut self.hints.cwd, record.cwd.as_deref());
        set_first_str(&mut self.hints.git_branch, record.git_branch.as_deref());

        let uuid = record
            .uuid
            .filter(|uuid| !uuid.is_empty())
            .unwrap_or_else(|| synth_uuid(&self.ctx.session_id, line_no, role.as_str(), None));
        let mut entry = new_entry(&self.ctx, uuid, role);
        entry.timestamp = record.timestamp.as_deref().and_then(parse_timestamp);
        set_first(&mut self.hints.started_at, entry.timestamp);
        entry.parent_uuid = record.parent_uuid.filter(|id| !id.is_empty());
        entry.cwd = record.cwd;
        entry.git_branch = record.git_branch;

        if record.kind == "system" {
            if record.subtype.as_deref() == Some("slash_command") {
                if let Some(command) = record.system_payload.get("rawCommand").and_then(Value::as_str) {
                    entry.text = format!("Slash command: {command}");
                }
            }
        } else if let Some(message) = record.message {
            apply_parts(&mut entry, message.parts);
        }

        if role == Role::Assistant {
            let model = record.model.filter(|m| !m.is_empty());
            set_first_str(&mut self.hints.model, model.as_deref());
            entry.model = model;
        }
        self.queue.push(&self.ctx, entry);
    }
}

fn apply_parts(entry: &mut Entry, parts: Vec<RawPart>) {
    let mut texts = Vec::new();
    for part in parts {
        if let Some(text) = part.text.filter(|t| !t.is_empty()) {
            if part.thought {
                entry.content_blocks.push(ContentBlock::thinking(text));
            } else {
                texts.push(text.clone());
                entry.content_blocks.push(ContentBlock::text(text));
            }
        }
        if let Some(call) = part.function_call {
            entry.content_blocks.push(ContentBlock::tool_use(
                call.id,
                call.name,
                decode_tool_input(&call.args),
            ));
        }
        if let Some(response) = part.function_response {
            let output = match response.response.get("output") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            if !output.is_empty() {
                texts.push(format!("[Tool result: {output}]"));
            }
            entry
                .content_blocks
                .push(ContentBlock::tool_result(response.id, output, false));
        }
    }
    entry.text = texts.join("\n");
}

impl<R: Read + Send> EntryParser for QwenParser<R> {
    fn source(&self) -> Source {
        Source::Qwen
    }

    fn next_entry(&mut self) -> Result<Option<Entry>> {
        loop {
            if let Some(entry) = self.queue.pop() {
                return Ok(Some(entry));
            }
            let Some((line_no, bytes)) = self.lines.next_line()? else {
                return Ok(None);
            };
            match serde_json::from_slice::<RawRecord>(bytes) {
                Ok(record) => self.handle_record(line_no, record),
                Err(err) => {
                    tracing::debug!(line = line_no, error = %err, "skipping malformed qwen line");
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
        self.lines.is_eof() && self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect_entries;
    use serde_json::json;
    use std::io::Cursor;

    fn parse(input: &str) -> (Vec<Entry>, SessionHints) {
        let ctx = ParseContext::new("q1", Source::Qwen, "install-q");
        let mut parser = QwenParser::new(ctx, LineReader::new(Cursor::new(input.to_string())));
        let entries = collect_entries(&mut parser).unwrap();
        (entries, parser.hints().clone())
    }

    #[test]
    fn parts_become_blocks() {
        let input = [
            r#"{"uuid":"u1","sessionId":"q1","type":"user","timestamp":"2026-02-01T12:00:00Z","cwd":"/srv/api","gitBranch":"dev","message":{"role":"user","parts":[{"text":"read config"}]}}"#,
            r#"{"uuid":"a1","parentUuid":"u1","type":"assistant","model":"qwen3-coder-plus","message":{"role":"model","parts":[{"text":"checking","thought":true},{"text":"Reading it."},{"functionCall":{"id":"call_1","name":"read_file","args":{"path":"config.toml"}}}]}}"#,
            r#"{"uuid":"t1","parentUuid":"a1","type":"tool_result","message":{"role":"user","parts":[{"functionResponse":{"id":"call_1","name":"read_file","response":{"output":"port = 80"}}}]}}"#,
        ]
        .join("\n");
        let (entries, hints) = parse(&input);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].text, "read config");

        let assistant = &entries[1];
        assert_eq!(assistant.text, "Reading it.");
        assert!(assistant.has_thinking());
        assert_eq!(assistant.model.as_deref(), Some("qwen3-coder-plus"));
        assert_eq!(
            assistant.tool_uses().next(),
            Some(&ContentBlock::tool_use("call_1", "read_file", json!({"path": "config.toml"})))
        );

        let tool = &entries[2];
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.text, "[Tool result: port = 80]");
        assert_eq!(
            tool.tool_result_for("call_1"),
            Some(&ContentBlock::tool_result("call_1", "port = 80", false))
        );

        assert_eq!(hints.cwd.as_deref(), Some("/srv/api"));
        assert_eq!(hints.git_branch.as_deref(), Some("dev"));
        assert_eq!(hints.model.as_deref(), Some("qwen3-coder-plus"));
    }

    #[test]
    fn slash_commands_and_untyped_records() {
        let input = [
            r#"{"uuid":"s1","type":"system","subtype":"slash_command","systemPayload":{"rawCommand":"/compress"}}"#,
            r#"{"uuid":"s2","type":"system","subtype":"ui_telemetry","systemPayload":{}}"#,
            r#"{"uuid":"x1","role":"assistant","message":{"parts":[{"text":"legacy"}]}}"#,
        ]
        .join("\n");
        let (entries, _) = parse(&input);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "Slash command: /compress");
        assert_eq!(entries[0].role, Role::System);
        assert_eq!(entries[1].role, Role::Assistant);
        assert_eq!(entries[1].text, "legacy");
    }
}
