//! Claude Code project logs: one typed record per line.

use crate::common::{
    decode_tool_input, new_entry, null_default, parse_timestamp, set_first_str, synth_uuid,
    EntryQueue,
};
use crate::{BoxedInput, EntryParser, ParseContext, SessionHints};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use thinkt_core::{ContentBlock, Entry, LineReader, Result, Role, Source, TokenUsage};

/// Placeholder model name Claude Code writes for locally generated messages.
const SYNTHETIC_MODEL: &str = "<synthetic>";

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawRecord {
    #[serde(rename = "user")]
    User(RawConversation),
    #[serde(rename = "assistant")]
    Assistant(RawConversation),
    #[serde(rename = "system")]
    System(RawSystem),
    #[serde(rename = "summary")]
    Summary {
        #[serde(default)]
        summary: String,
    },
    #[serde(rename = "file-history-snapshot")]
    FileHistorySnapshot {
        #[serde(default, rename = "messageId")]
        message_id: Option<String>,
        #[serde(default)]
        snapshot: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConversation {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    parent_uuid: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    timestamp: String,
    message: RawMessage,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    git_branch: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    is_sidechain: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSystem {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    parent_uuid: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    timestamp: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    git_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    /// A plain string or an array of blocks. Blocks are decoded one at a time so a
    /// malformed block does not take the rest of the line with it.
    #[serde(default)]
    content: Value,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<RawUsage>,
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

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default, deserialize_with = "null_default")]
        text: String,
    },
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default, deserialize_with = "null_default")]
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default, deserialize_with = "null_default")]
        id: String,
        #[serde(default, deserialize_with = "null_default")]
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default, deserialize_with = "null_default")]
        tool_use_id: String,
        #[serde(default)]
        content: ToolResultContent,
        #[serde(default)]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Other,
}

/// tool_result content can be a string, an array of blocks, or absent.
#[derive(Debug, Deserialize, Default)]
#[serde(untagged)]
enum ToolResultContent {
    Text(String),
    Blocks(Vec<Value>),
    #[default]
    Null,
}

impl ToolResultContent {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Blocks(blocks) => blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Null => String::new(),
        }
    }
}

pub struct ClaudeParser<R = BoxedInput> {
    ctx: ParseContext,
    lines: LineReader<R>,
    hints: SessionHints,
    queue: EntryQueue,
}

impl<R: Read> ClaudeParser<R> {
    pub fn new(ctx: ParseContext, lines: LineReader<R>) -> Self {
        Self {
            ctx,
            lines,
            hints: SessionHints::default(),
            queue: EntryQueue::default(),
        }
    }

    fn handle_record(&mut self, line_no: u64, record: RawRecord) {
        let entry = match record {
            RawRecord::User(conv) => Some(self.conversation_entry(line_no, Role::User, conv)),
            RawRecord::Assistant(conv) => {
                Some(self.conversation_entry(line_no, Role::Assistant, conv))
            }
            RawRecord::System(system) => Some(self.system_entry(line_no, system)),
            RawRecord::Summary { summary } => {
                let mut entry = new_entry(
                    &self.ctx,
                    synth_uuid(&self.ctx.session_id, line_no, "summary", None),
                    Role::System,
                );
                entry.text = summary;
                Some(entry)
            }
            RawRecord::FileHistorySnapshot {
                message_id,
                snapshot,
            } => {
                let files = snapshot
                    .get("trackedFileBackups")
                    .and_then(Value::as_object)
                    .map_or(0, |backups| backups.len());
                let mut entry = new_entry(
                    &self.ctx,
                    synth_uuid(
                        &self.ctx.session_id,
                        line_no,
                        "snapshot",
                        message_id.as_deref(),
                    ),
                    Role::Checkpoint,
                );
                entry.timestamp = snapshot
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp);
                entry.text = format!("File History Snapshot ({files} files)");
                Some(entry)
            }
            RawRecord::Other => None,
        };
        if let Some(entry) = entry {
            self.queue.push(&self.ctx, entry);
        }
    }

    fn conversation_entry(&mut self, line_no: u64, role: Role, conv: RawConversation) -> Entry {
        set_first_str(&mut self.hints.session_id, conv.session_id.as_deref());
        set_first_str(&mut self.hints.cwd, conv.cwd.as_deref());
        set_first_str(&mut self.hints.git_branch, conv.git_branch.as_deref());

        let kind = role.as_str();
        let uuid = conv
            .uuid
            .filter(|uuid| !uuid.is_empty())
            .unwrap_or_else(|| synth_uuid(&self.ctx.session_id, line_no, kind, None));
        let mut entry = new_entry(&self.ctx, uuid, role);
        entry.timestamp = parse_timestamp(&conv.timestamp);
        entry.parent_uuid = conv.parent_uuid;
        entry.cwd = conv.cwd;
        entry.git_branch = conv.git_branch;
        entry.is_sidechain = conv.is_sidechain;

        let RawMessage {
            content,
            model,
            usage,
        } = conv.message;

        if role == Role::Assistant {
            let model = model.filter(|m| !m.is_empty() && m != SYNTHETIC_MODEL);
            set_first_str(&mut self.hints.model, model.as_deref());
            entry.model = model;
            entry.usage = usage.map(|usage| TokenUsage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                cache_creation_input_tokens: usage.cache_creation_input_tokens,
                cache_read_input_tokens: usage.cache_read_input_tokens,
            });
        }

        let mut texts = Vec::new();
        match content {
            Value::String(text) => texts.push(text),
            Value::Array(blocks) => {
                for raw in blocks {
                    let block = match serde_json::from_value::<RawBlock>(raw) {
                        Ok(block) => block,
                        Err(err) => {
                            tracing::debug!(line = line_no, error = %err, "skipping malformed claude content block");
                            continue;
                        }
                    };
                    match block {
                        RawBlock::Text { text } => {
                            if !text.trim().is_empty() {
                                texts.push(text.clone());
                                entry.content_blocks.push(ContentBlock::text(text));
                            }
                        }
                        RawBlock::Thinking {
                            thinking,
                            signature,
                        } => {
                            if !thinking.trim().is_empty() {
                                entry.content_blocks.push(ContentBlock::Thinking {
                                    thinking,
                                    signature: signature.filter(|s| !s.is_empty()),
                                });
                            }
                        }
                        RawBlock::ToolUse { id, name, input } => {
                            entry.content_blocks.push(ContentBlock::tool_use(
                                id,
                                name,
                                decode_tool_input(&input),
                            ));
                        }
                        RawBlock::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } => {
                            entry.content_blocks.push(ContentBlock::tool_result(
                                tool_use_id,
                                content.into_text(),
                                is_error.unwrap_or(false),
                            ));
                        }
                        RawBlock::Other => {}
                    }
                }
            }
            _ => {}
        }
        entry.text = texts.join("\n");
        entry
    }

    fn system_entry(&mut self, line_no: u64, system: RawSystem) -> Entry {
        set_first_str(&mut self.hints.cwd, system.cwd.as_deref());
        set_first_str(&mut self.hints.git_branch, system.git_branch.as_deref());
        let uuid = system
            .uuid
            .filter(|uuid| !uuid.is_empty())
            .unwrap_or_else(|| synth_uuid(&self.ctx.session_id, line_no, "system", None));
        let mut entry = new_entry(&self.ctx, uuid, Role::System);
        entry.timestamp = parse_timestamp(&system.timestamp);
        entry.parent_uuid = system.parent_uuid;
        entry.text = system.content.unwrap_or_default();
        entry.cwd = system.cwd;
        entry
    }
}

impl<R: Read + Send> EntryParser for ClaudeParser<R> {
    fn source(&self) -> Source {
        Source::Claude
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
                    tracing::debug!(line = line_no, error = %err, "skipping malformed claude line");
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
