use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;

/// Vendor tag identifying which AI CLI produced a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Claude,
    Codex,
    Kimi,
    Gemini,
    Copilot,
    Qwen,
}

impl Source {
    pub const ALL: [Source; 6] = [
        Source::Claude,
        Source::Codex,
        Source::Kimi,
        Source::Gemini,
        Source::Copilot,
        Source::Qwen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Kimi => "kimi",
            Self::Gemini => "gemini",
            Self::Copilot => "copilot",
            Self::Qwen => "qwen",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Claude => "Claude Code",
            Self::Codex => "Codex CLI",
            Self::Kimi => "Kimi Code",
            Self::Gemini => "Gemini CLI",
            Self::Copilot => "GitHub Copilot CLI",
            Self::Qwen => "Qwen Code",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "claude-code" | "claude_code" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "kimi" => Ok(Self::Kimi),
            "gemini" => Ok(Self::Gemini),
            "copilot" => Ok(Self::Copilot),
            "qwen" => Ok(Self::Qwen),
            other => Err(Error::Config(format!("unknown source: {other}"))),
        }
    }
}

/// Canonical speaker of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    Checkpoint,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::User,
        Role::Assistant,
        Role::System,
        Role::Tool,
        Role::Checkpoint,
    ];

    /// Map a vendor role label. Unknown labels become `System` so nothing is dropped.
    pub fn from_vendor(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "user" | "human" => Self::User,
            "assistant" | "model" | "gemini" | "agent" => Self::Assistant,
            "tool" | "function" => Self::Tool,
            "checkpoint" => Self::Checkpoint,
            _ => Self::System,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
            Self::Checkpoint => "checkpoint",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A typed fragment of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolUse {
        tool_use_id: String,
        tool_name: String,
        tool_input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        tool_result: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
            signature: None,
        }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::ToolUse {
            tool_use_id: id.into(),
            tool_name: name.into(),
            tool_input: input,
        }
    }

    pub fn tool_result(id: impl Into<String>, result: impl Into<String>, is_error: bool) -> Self {
        Self::ToolResult {
            tool_use_id: id.into(),
            tool_result: result.into(),
            is_error,
        }
    }
}

/// Token accounting reported by the vendor for a single turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_creation_input_tokens
            + self.cache_read_input_tokens
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_input_tokens += other.cache_creation_input_tokens;
        self.cache_read_input_tokens += other.cache_read_input_tokens;
    }
}

/// One normalized conversation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub uuid: String,
    pub role: Role,
    /// `None` when the vendor line carries no usable timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_blocks: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub source: Source,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_sidechain: bool,
}

impl Entry {
    pub fn new(uuid: impl Into<String>, role: Role, source: Source) -> Self {
        Self {
            uuid: uuid.into(),
            role,
            timestamp: None,
            text: String::new(),
            content_blocks: Vec::new(),
            model: None,
            source,
            workspace_id: String::new(),
            parent_uuid: None,
            usage: None,
            cwd: None,
            git_branch: None,
            is_sidechain: false,
        }
    }

    /// True when the entry carries neither text nor blocks. Parsers drop such entries.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.content_blocks.is_empty()
    }

    /// Primary text, falling back to the joined text blocks.
    pub fn text_content(&self) -> String {
        if !self.text.is_empty() {
            return self.text.clone();
        }
        self.content_blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_thinking(&self) -> bool {
        self.content_blocks
            .iter()
            .any(|block| matches!(block, ContentBlock::Thinking { .. }))
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = &ContentBlock> {
        self.content_blocks
            .iter()
            .filter(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }

    pub fn tool_result_for(&self, tool_use_id: &str) -> Option<&ContentBlock> {
        self.content_blocks.iter().find(|block| {
            matches!(block, ContentBlock::ToolResult { tool_use_id: id, .. } if id == tool_use_id)
        })
    }
}

/// Header and summary of one session, computed without materializing its entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: String,
    pub full_path: PathBuf,
    #[serde(default)]
    pub project_path: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub entry_count: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub role_counts: BTreeMap<Role, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    pub source: Source,
    #[serde(default)]
    pub first_prompt: String,
    #[serde(default = "default_chunk_count")]
    pub chunk_count: usize,
}

fn default_chunk_count() -> usize {
    1
}

impl SessionMeta {
    pub fn new(id: impl Into<String>, full_path: impl Into<PathBuf>, source: Source) -> Self {
        Self {
            id: id.into(),
            full_path: full_path.into(),
            project_path: String::new(),
            workspace_id: String::new(),
            created_at: None,
            modified_at: None,
            file_size: 0,
            entry_count: 0,
            role_counts: BTreeMap::new(),
            model: None,
            git_branch: None,
            source,
            first_prompt: String::new(),
            chunk_count: 1,
        }
    }

    pub fn role_count(&self, role: Role) -> usize {
        self.role_counts.get(&role).copied().unwrap_or(0)
    }
}

/// Metadata plus every entry of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub meta: SessionMeta,
    pub entries: Vec<Entry>,
}

impl Session {
    pub fn user_prompts(&self) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .filter(|entry| entry.role == Role::User && !entry.text.trim().is_empty())
    }

    pub fn entry_by_uuid(&self, uuid: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.uuid == uuid)
    }

    /// Span between the first and last timestamped entries.
    pub fn duration(&self) -> Option<chrono::Duration> {
        let mut stamps = self.entries.iter().filter_map(|entry| entry.timestamp);
        let first = stamps.next()?;
        let last = stamps.last().unwrap_or(first);
        Some(last - first)
    }

    pub fn total_usage(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for usage in self.entries.iter().filter_map(|entry| entry.usage.as_ref()) {
            total.add(usage);
        }
        total
    }
}

/// Logical grouping of sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: String,
    pub display_path: String,
    pub source: Source,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub source_base_path: PathBuf,
    #[serde(default)]
    pub session_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default = "default_path_exists")]
    pub path_exists: bool,
}

fn default_path_exists() -> bool {
    true
}

impl Project {
    /// Build a project whose counters are derived from `sessions`.
    pub fn fold_sessions(
        id: impl Into<String>,
        path: impl Into<String>,
        source: Source,
        sessions: &[SessionMeta],
    ) -> Self {
        let path = path.into();
        let name = std::path::Path::new(&path)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(path.as_str())
            .to_string();
        let last_modified = sessions
            .iter()
            .filter_map(|session| session.modified_at)
            .max();
        Self {
            id: id.into(),
            name,
            display_path: path.clone(),
            path,
            source,
            workspace_id: String::new(),
            source_base_path: PathBuf::new(),
            session_count: sessions.len(),
            last_modified,
            path_exists: true,
        }
    }
}

/// Machine/install that produced a vendor's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub source: Source,
    pub base_path: PathBuf,
}
