//! GitHub Copilot CLI `events.jsonl`: a typed event stream.

use crate::common::{
    decode_tool_input, new_entry, parse_timestamp, set_first, set_first_str, str_field,
    synth_uuid, EntryQueue,
};
use crate::{BoxedInput, EntryParser, ParseContext, SessionHints};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use thinkt_core::{ContentBlock, Entry, LineReader, Result, Role, Source};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssistantMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    reasoning_text: String,
    #[serde(default)]
    reasoning_opaque: String,
    #[serde(default)]
    tool_requests: Vec<ToolRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolRequest {
    #[serde(default)]
    tool_call_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub struct CopilotParser<R = BoxedInput> {
    ctx: ParseContext,
    lines: LineReader<R>,
    hints: SessionHints,
    queue: EntryQueue,
}

impl<R: Read> CopilotParser<R> {
    pub fn new(ctx: ParseContext, lines: LineReader<R>) -> Self {
        Self {
            ctx,
            lines,
            hints: SessionHints::default(),
            queue: EntryQueue::default(),
        }
    }

    fn handle_event(&mut self, line_no: u64, event: RawEvent) {
        let data = &event.data;
        let role = match event.kind.as_str() {
            "session.start" => Role::System,
            "user.message" => Role::User,
            "assistant.message" => Role::Assistant,
            "tool.execution_complete" | "tool.execution_success" | "tool.execution_error" => {
                Role::Tool
            }
            "session.model_change" => {
                let model = str_field(data, "newModel").or_else(|| str_field(data, "model"));
                if model.is_some_and(|m| !m.trim().is_empty()) {
                    self.hints.model = model.map(str::to_string);
                }
                return;
            }
            other => {
                tracing::trace!(kind = other, "ignoring copilot event");
                return;
            }
        };

        let uuid = event
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| synth_uuid(&self.ctx.session_id, line_no, &event.kind, None));
        let mut entry = new_entry(&self.ctx, uuid, role);
        entry.timestamp = event.timestamp.as_deref().and_then(parse_timestamp);
        entry.parent_uuid = event.parent_id.clone().filter(|id| !id.is_empty());

        match event.kind.as_str() {
            "session.start" => {
                entry.text = "Session Started".to_string();
                set_first_str(&mut self.hints.session_id, str_field(data, "sessionId"));
                set_first(&mut self.hints.started_at, entry.timestamp);
                if let Some(context) = data.get("context") {
                    let cwd = str_field(context, "cwd");
                    set_first_str(&mut self.hints.cwd, cwd);
                    set_first_str(&mut self.hints.git_branch, str_field(context, "branch"));
                    entry.cwd = cwd.map(str::to_string);
                }
                set_first_str(&mut self.hints.model, str_field(data, "selectedModel"));
            }
            "user.message" => {
                entry.text = str_field(data, "transformedContent")
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| str_field(data, "content"))
                    .unwrap_or_default()
                    .to_string();
            }
            "assistant.message" => {
                let message: AssistantMessage =
                    serde_json::from_value(data.clone()).unwrap_or_default();
                if !message.content.trim().is_empty() {
                    entry.text = message.content.clone();
                    entry.content_blocks.push(ContentBlock::text(message.content));
                }
                if !message.reasoning_text.trim().is_empty() {
                    entry
                        .content_blocks
                        .push(ContentBlock::thinking(message.reasoning_text));
                } else if !message.reasoning_opaque.is_empty() {
                    entry.content_blocks.push(ContentBlock::Thinking {
                        thinking: "(Encrypted Thinking Block)".to_string(),
                        signature: Some(message.reasoning_opaque),
                    });
                }
                for request in message.tool_requests {
                    entry.content_blocks.push(ContentBlock::tool_use(
                        request.tool_call_id,
                        request.name,
                        decode_tool_input(&request.arguments),
                    ));
                }
                entry.model = self.hints.model.clone();
            }
            "tool.execution_error" => {
                let message = data
                    .get("error")
                    .map(error_text)
                    .unwrap_or_default();
                entry.content_blocks.push(ContentBlock::tool_result(
                    str_field(data, "toolCallId").unwrap_or_default(),
                    message,
                    true,
                ));
            }
            _ => {
                let is_error = data.get("success").and_then(Value::as_bool) == Some(false);
                let result = data.get("result").map(result_text).unwrap_or_default();
                entry.content_blocks.push(ContentBlock::tool_result(
                    str_field(data, "toolCallId").unwrap_or_default(),
                    result,
                    is_error,
                ));
            }
        }
        self.queue.push(&self.ctx, entry);
    }
}

fn result_text(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("content") {
            Some(Value::String(s)) => s.clone(),
            _ => result.to_string(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(s)) => s.clone(),
            _ => error.to_string(),
        },
        _ => String::new(),
    }
}

impl<R: Read + Send> EntryParser for CopilotParser<R> {
    fn source(&self) -> Source {
        Source::Copilot
    }

    fn next_entry(&mut self) -> Result<Option<Entry>> {
        loop {
            if let Some(entry) = self.queue.pop() {
                return Ok(Some(entry));
            }
            let Some((line_no, bytes)) = self.lines.next_line()? else {
                return Ok(None);
            };
            match serde_json::from_slice::<RawEvent>(bytes) {
                Ok(event) => self.handle_event(line_no, event),
                Err(err) => {
                    tracing::debug!(line = line_no, error = %err, "skipping malformed copilot line");
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
        let ctx = ParseContext::new("cp1", Source::Copilot, "copilot-cli-host");
        let mut parser = CopilotParser::new(ctx, LineReader::new(Cursor::new(input.to_string())));
        let entries = collect_entries(&mut parser).unwrap();
        (entries, parser.hints().clone())
    }

    #[test]
    fn event_stream() {
        let input = [
            r#"{"type":"session.start","id":"e1","timestamp":"2026-01-20T08:00:00.000Z","data":{"sessionId":"cp1","context":{"cwd":"/home/dev/site","branch":"feature/x"}}}"#,
            r#"{"type":"session.model_change","id":"e2","data":{"newModel":"gpt-5"}}"#,
            r#"{"type":"user.message","id":"e3","parentId":"e1","data":{"content":"deploy","transformedContent":"<context/>deploy"}}"#,
            r#"{"type":"assistant.message","id":"e4","parentId":"e3","data":{"messageId":"m1","content":"Deploying.","reasoningText":"need the script","toolRequests":[{"toolCallId":"t1","name":"bash","arguments":{"command":"./deploy.sh"}}]}}"#,
            r#"{"type":"tool.execution_start","id":"e5","data":{"toolCallId":"t1"}}"#,
            r#"{"type":"tool.execution_complete","id":"e6","data":{"toolCallId":"t1","success":false,"result":{"content":"permission denied"}}}"#,
            r#"{"type":"tool.execution_error","id":"e7","data":{"toolCallId":"t2","error":"timeout"}}"#,
        ]
        .join("\n");
        let (entries, hints) = parse(&input);
        let roles: Vec<Role> = entries.iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Tool]
        );
        assert_eq!(entries[0].text, "Session Started");
        assert_eq!(entries[1].text, "<context/>deploy");
        assert_eq!(entries[1].parent_uuid.as_deref(), Some("e1"));

        let assistant = &entries[2];
        assert_eq!(assistant.text, "Deploying.");
        assert!(assistant.has_thinking());
        assert_eq!(assistant.model.as_deref(), Some("gpt-5"));
        assert_eq!(
            assistant.tool_uses().next(),
            Some(&ContentBlock::tool_use("t1", "bash", json!({"command": "./deploy.sh"})))
        );

        assert_eq!(
            entries[3].tool_result_for("t1"),
            Some(&ContentBlock::tool_result("t1", "permission denied", true))
        );
        assert_eq!(
            entries[4].tool_result_for("t2"),
            Some(&ContentBlock::tool_result("t2", "timeout", true))
        );

        assert_eq!(hints.cwd.as_deref(), Some("/home/dev/site"));
        assert_eq!(hints.git_branch.as_deref(), Some("feature/x"));
        assert_eq!(hints.model.as_deref(), Some("gpt-5"));
    }

    #[test]
    fn string_arguments_are_decoded() {
        let input = r#"{"type":"assistant.message","id":"e1","data":{"content":"","toolRequests":[{"toolCallId":"t1","name":"view","arguments":"{\"path\":\"README.md\"}"}]}}"#;
        let (entries, _) = parse(input);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].text.is_empty());
        assert_eq!(
            entries[0].content_blocks,
            vec![ContentBlock::tool_use("t1", "view", json!({"path": "README.md"}))]
        );
    }
}
