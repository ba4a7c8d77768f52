//! Kimi Code `context.jsonl`: chat-completion style messages, one per line.

use crate::common::{
    decode_tool_input, flatten_text, new_entry, parse_unix_timestamp, str_field, synth_uuid,
    EntryQueue,
};
use crate::{BoxedInput, EntryParser, ParseContext, SessionHints};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use thinkt_core::{ContentBlock, Entry, LineReader, Result, Role, Source, TokenUsage};

/// Roles Kimi uses for bookkeeping lines rather than conversation turns.
const METADATA_ROLES: [&str; 3] = ["_checkpoint", "_usage", "_system_prompt"];

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    tool_calls: Vec<RawToolCall>,
    #[serde(default)]
    tool_call_id: Option<String>,
    #[serde(default)]
    timestamp: Value,
    #[serde(default)]
    usage: Option<RawUsage>,
    #[serde(default)]
    model: Option<String>,
}

/// Either `{id, name, input}` or the OpenAI shape `{id, function: {name, arguments}}`.
#[derive(Debug, Deserialize)]
struct RawToolCall {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    function: Option<RawFunction>,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct RawUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

impl RawToolCall {
    fn into_block(self) -> ContentBlock {
        match self.function {
            Some(function) if self.name.is_none() => ContentBlock::tool_use(
                self.id,
                function.name,
                decode_tool_input(&function.arguments),
            ),
            _ => ContentBlock::tool_use(
                self.id,
                self.name.unwrap_or_default(),
                self.input.map(|input| decode_tool_input(&input)).unwrap_or(Value::Null),
            ),
        }
    }
}

pub struct KimiParser<R = BoxedInput> {
    ctx: ParseContext,
    lines: LineReader<R>,
    hints: SessionHints,
    queue: EntryQueue,
}

impl<R: Read> KimiParser<R> {
    pub fn new(ctx: ParseContext, lines: LineReader<R>) -> Self {
        Self {
            ctx,
            lines,
            hints: SessionHints::default(),
            queue: EntryQueue::default(),
        }
    }

    fn handle_message(&mut self, line_no: u64, raw: RawMessage) {
        let role_label = raw.role.trim();
        if role_label.is_empty() || METADATA_ROLES.contains(&role_label) {
            return;
        }
        let role = Role::from_vendor(role_label);
        let uuid = raw
            .id
            .as_str()
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| synth_uuid(&self.ctx.session_id, line_no, role.as_str(), None));
        let mut entry = new_entry(&self.ctx, uuid, role);
        entry.timestamp = parse_unix_timestamp(&raw.timestamp);

        if role == Role::Tool {
            let tool_call_id = raw.tool_call_id.unwrap_or_default();
            entry.content_blocks.push(ContentBlock::tool_result(
                tool_call_id,
                flatten_text(&raw.content),
                false,
            ));
        } else {
            let mut texts = Vec::new();
            match &raw.content {
                Value::String(text) => texts.push(text.clone()),
                Value::Array(parts) => {
                    for part in parts {
                        if let Some(block) = part_block(part) {
                            if let ContentBlock::Text { text } = &block {
                                texts.push(text.clone());
                            }
                            entry.content_blocks.push(block);
                        }
                    }
                }
                _ => {}
            }
            entry.text = texts.join("\n");
            entry
                .content_blocks
                .extend(raw.tool_calls.into_iter().map(RawToolCall::into_block));
        }

        if role == Role::Assistant {
            let model = raw.model.filter(|m| !m.is_empty());
            if self.hints.model.is_none() {
                self.hints.model.clone_from(&model);
            }
            entry.model = model;
        }
        entry.usage = raw.usage.map(|usage| TokenUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_creation_input_tokens: usage.cache_creation_input_tokens,
            cache_read_input_tokens: usage.cache_read_input_tokens,
        });
        self.queue.push(&self.ctx, entry);
    }
}

fn part_block(part: &Value) -> Option<ContentBlock> {
    match str_field(part, "type").unwrap_or("text") {
        "text" => {
            let text = str_field(part, "text")?;
            (!text.trim().is_empty()).then(|| ContentBlock::text(text))
        }
        "think" | "thinking" => {
            let thinking = str_field(part, "think").or_else(|| str_field(part, "thinking"))?;
            (!thinking.trim().is_empty()).then(|| ContentBlock::Thinking {
                thinking: thinking.to_string(),
                signature: str_field(part, "signature")
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            })
        }
        "tool_result" => Some(ContentBlock::tool_result(
            str_field(part, "tool_use_id").unwrap_or_default(),
            part.get("content").map(flatten_text).unwrap_or_default(),
            part.get("is_error").and_then(Value::as_bool).unwrap_or(false),
        )),
        _ => None,
    }
}

impl<R: Read + Send> EntryParser for KimiParser<R> {
    fn source(&self) -> Source {
        Source::Kimi
    }

    fn next_entry(&mut self) -> Result<Option<Entry>> {
        loop {
            if let Some(entry) = self.queue.pop() {
                return Ok(Some(entry));
            }
            let Some((line_no, bytes)) = self.lines.next_line()? else {
                return Ok(None);
            };
            match serde_json::from_slice::<RawMessage>(bytes) {
                Ok(raw) => self.handle_message(line_no, raw),
                Err(err) => {
                    tracing::debug!(line = line_no, error = %err, "skipping malformed kimi line");
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

    fn parse(input: &str) -> Vec<Entry> {
        let ctx = ParseContext::new("k1", Source::Kimi, "device-1");
        let mut parser = KimiParser::new(ctx, LineReader::new(Cursor::new(input.to_string())));
        collect_entries(&mut parser).unwrap()
    }

    #[test]
    fn metadata_roles_are_skipped() {
        let input = [
            r#"{"role":"_system_prompt","content":"You are Kimi"}"#,
            r#"{"role":"_checkpoint","id":3}"#,
            r#"{"role":"user","content":"list files","timestamp":1767261600.25}"#,
            r#"{"role":"_usage","token_count":1200}"#,
            r#"{"content":"no role"}"#,
        ]
        .join("\n");
        let entries = parse(&input);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[0].text, "list files");
        assert_eq!(entries[0].uuid, "k1:000003:user");
        assert!(entries[0].timestamp.is_some());
        assert_eq!(entries[0].workspace_id, "device-1");
    }

    #[test]
    fn assistant_parts_and_both_tool_call_shapes() {
        let input = [
            r#"{"role":"assistant","content":[{"type":"think","think":"check the dir"},{"type":"text","text":"Listing."}],"tool_calls":[{"id":"c1","name":"Shell","input":{"command":"ls"}},{"id":"c2","type":"function","function":{"name":"ReadFile","arguments":"{\"path\":\"a.txt\"}"}}],"usage":{"input_tokens":50,"output_tokens":7}}"#,
            r#"{"role":"tool","tool_call_id":"c1","content":[{"type":"text","text":"a.txt"}]}"#,
        ]
        .join("\n");
        let entries = parse(&input);
        assert_eq!(entries.len(), 2);

        let assistant = &entries[0];
        assert_eq!(assistant.text, "Listing.");
        assert!(assistant.has_thinking());
        let uses: Vec<_> = assistant.tool_uses().collect();
        assert_eq!(uses.len(), 2);
        assert_eq!(
            uses[1],
            &ContentBlock::tool_use("c2", "ReadFile", json!({"path": "a.txt"}))
        );
        assert_eq!(assistant.usage.map(|u| u.total()), Some(57));

        let tool = &entries[1];
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(
            tool.tool_result_for("c1"),
            Some(&ContentBlock::tool_result("c1", "a.txt", false))
        );
    }
}
