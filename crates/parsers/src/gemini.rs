//! Gemini CLI chat files: a single JSON document per session.
//!
//! The document is read whole on the first call and then drained entry by entry. Files
//! written one message per line are accepted as well.

use crate::common::{
    decode_tool_input, flatten_text, new_entry, null_default, parse_timestamp, set_first,
    set_first_str, synth_uuid, EntryQueue,
};
use crate::{BoxedInput, EntryParser, ParseContext, SessionHints};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use thinkt_core::{ContentBlock, Entry, LineReader, Result, Role, Source, TokenUsage};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "null_default")]
    kind: String,
    #[serde(default)]
    content: Value,
    #[serde(default, deserialize_with = "null_default")]
    tool_calls: Vec<RawToolCall>,
    #[serde(default, deserialize_with = "null_default")]
    thoughts: Vec<RawThought>,
    #[serde(default)]
    tokens: Option<RawTokens>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawToolCall {
    #[serde(default, deserialize_with = "null_default")]
    id: String,
    #[serde(default, deserialize_with = "null_default")]
    name: String,
    #[serde(default)]
    args: Value,
    #[serde(default, deserialize_with = "null_default")]
    result: Vec<RawToolResult>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawToolResult {
    #[serde(default)]
    function_response: Option<RawFunctionResponse>,
}

#[derive(Debug, Deserialize)]
struct RawFunctionResponse {
    #[serde(default)]
    response: Value,
}

#[derive(Debug, Deserialize)]
struct RawThought {
    #[serde(default, deserialize_with = "null_default")]
    subject: String,
    #[serde(default, deserialize_with = "null_default")]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RawTokens {
    #[serde(default)]
    input: u64,
    #[serde(default)]
    output: u64,
    #[serde(default)]
    cached: u64,
}

pub struct GeminiParser<R = BoxedInput> {
    ctx: ParseContext,
    lines: LineReader<R>,
    hints: SessionHints,
    queue: EntryQueue,
    loaded: bool,
}

impl<R: Read> GeminiParser<R> {
    pub fn new(ctx: ParseContext, lines: LineReader<R>) -> Self {
        Self {
            ctx,
            lines,
            hints: SessionHints::default(),
            queue: EntryQueue::default(),
            loaded: false,
        }
    }

    fn load(&mut self) -> Result<()> {
        let document = self.lines.read_remaining()?;
        self.loaded = true;

        let mut session = match serde_json::from_slice::<Value>(&document) {
            Ok(Value::Object(session)) if session.get("messages").is_some_and(Value::is_array) => {
                session
            }
            Ok(_) => {
                tracing::debug!("gemini session has no messages array, reading lines");
                self.load_lines(&document);
                return Ok(());
            }
            Err(err) => {
                tracing::debug!(error = %err, "gemini session is not a single document, reading lines");
                self.load_lines(&document);
                return Ok(());
            }
        };

        set_first_str(
            &mut self.hints.session_id,
            session.get("sessionId").and_then(Value::as_str),
        );
        set_first(
            &mut self.hints.started_at,
            session
                .get("startTime")
                .and_then(Value::as_str)
                .and_then(parse_timestamp),
        );
        let Some(Value::Array(messages)) = session.remove("messages") else {
            return Ok(());
        };
        for (index, raw) in messages.into_iter().enumerate() {
            let position = index as u64 + 1;
            match serde_json::from_value::<RawMessage>(raw) {
                Ok(message) => self.handle_message(position, message),
                Err(err) => {
                    tracing::debug!(message = position, error = %err, "skipping malformed gemini message");
                }
            }
        }
        Ok(())
    }

    fn load_lines(&mut self, document: &[u8]) {
        for (index, line) in document.split(|b| *b == b'\n').enumerate() {
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<RawMessage>(line) {
                Ok(message) if !message.kind.is_empty() => {
                    self.handle_message(index as u64 + 1, message);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(line = index + 1, error = %err, "skipping malformed gemini line");
                }
            }
        }
    }

    fn handle_message(&mut self, position: u64, message: RawMessage) {
        let role = match message.kind.as_str() {
            "user" => Role::User,
            "gemini" => Role::Assistant,
            "info" | "error" | "warning" => Role::System,
            other => {
                tracing::trace!(kind = other, "ignoring gemini message type");
                return;
            }
        };
        let uuid = message
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| synth_uuid(&self.ctx.session_id, position, role.as_str(), None));
        let timestamp = message.timestamp.as_deref().and_then(parse_timestamp);
        let mut entry = new_entry(&self.ctx, uuid, role);
        entry.timestamp = timestamp;
        entry.text = flatten_text(&message.content);

        if role != Role::Assistant {
            self.queue.push(&self.ctx, entry);
            return;
        }

        let model = message.model.filter(|m| !m.is_empty());
        set_first_str(&mut self.hints.model, model.as_deref());
        entry.model = model;
        entry.usage = message.tokens.map(|tokens| TokenUsage {
            input_tokens: tokens.input,
            output_tokens: tokens.output,
            cache_read_input_tokens: tokens.cached,
            ..TokenUsage::default()
        });
        if !entry.text.trim().is_empty() {
            entry.content_blocks.push(ContentBlock::text(entry.text.clone()));
        }
        for thought in &message.thoughts {
            entry.content_blocks.push(ContentBlock::thinking(format!(
                "[{}] {}",
                thought.subject, thought.description
            )));
        }
        // Calls without an ID get a synthesized one so tool results still pair up.
        let call_ids: Vec<String> = message
            .tool_calls
            .iter()
            .enumerate()
            .map(|(index, call)| match call.id.as_str() {
                "" => synth_uuid(
                    &self.ctx.session_id,
                    position,
                    "tool_use",
                    Some(&index.to_string()),
                ),
                id => id.to_string(),
            })
            .collect();
        for (call, id) in message.tool_calls.iter().zip(&call_ids) {
            entry.content_blocks.push(ContentBlock::tool_use(
                id.clone(),
                call.name.clone(),
                decode_tool_input(&call.args),
            ));
        }
        self.queue.push(&self.ctx, entry);

        for (index, (call, call_id)) in message.tool_calls.into_iter().zip(call_ids).enumerate() {
            let is_error = call.status.as_deref() == Some("error");
            let base = if call.id.is_empty() {
                synth_uuid(
                    &self.ctx.session_id,
                    position,
                    "tool_result",
                    Some(&index.to_string()),
                )
            } else {
                format!("{}-res", call.id)
            };
            let responses = call
                .result
                .into_iter()
                .filter_map(|result| result.function_response);
            for (n, response) in responses.enumerate() {
                let uuid = match n {
                    0 => base.clone(),
                    n => format!("{base}-{}", n + 1),
                };
                let mut tool = new_entry(&self.ctx, uuid, Role::Tool);
                tool.timestamp = timestamp;
                tool.content_blocks.push(ContentBlock::tool_result(
                    call_id.clone(),
                    response_output(&response.response),
                    is_error,
                ));
                self.queue.push(&self.ctx, tool);
            }
        }
    }
}

fn response_output(response: &Value) -> String {
    match response.get("output").or_else(|| response.get("error")) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl<R: Read + Send> EntryParser for GeminiParser<R> {
    fn source(&self) -> Source {
        Source::Gemini
    }

    fn next_entry(&mut self) -> Result<Option<Entry>> {
        if !self.loaded {
            self.load()?;
        }
        Ok(self.queue.pop())
    }

    fn hints(&self) -> &SessionHints {
        &self.hints
    }

    fn bytes_consumed(&self) -> u64 {
        self.lines.bytes_consumed()
    }

    fn is_exhausted(&self) -> bool {
        self.loaded && self.queue.is_empty()
    }
}
