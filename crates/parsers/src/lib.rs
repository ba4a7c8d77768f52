//! Per-vendor converters from raw session logs into canonical [`Entry`] values.
//!
//! Every parser pulls lines from a [`LineReader`] one at a time, so a caller can stop
//! after any entry and resume later without re-reading consumed bytes.

pub mod claude;
pub mod codex;
pub mod copilot;
pub mod gemini;
pub mod kimi;
pub mod qwen;

pub(crate) mod common;

use chrono::{DateTime, Utc};
use std::io::Read;
use thinkt_core::{Entry, LineReader, Result, Source};

/// Byte stream handed to a parser.
pub type BoxedInput = Box<dyn Read + Send>;

/// Identity stamped onto every entry a parser emits.
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Used when synthesizing entry UUIDs. Must be stable for a given file.
    pub session_id: String,
    pub source: Source,
    pub workspace_id: String,
}

impl ParseContext {
    pub fn new(session_id: impl Into<String>, source: Source, workspace_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            source,
            workspace_id: workspace_id.into(),
        }
    }
}

/// Session-level facts a parser picks up while reading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionHints {
    pub session_id: Option<String>,
    pub cwd: Option<String>,
    pub model: Option<String>,
    pub model_provider: Option<String>,
    pub git_branch: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl SessionHints {
    /// Best model label: the concrete model, else the provider name.
    pub fn model_label(&self) -> Option<&str> {
        self.model.as_deref().or(self.model_provider.as_deref())
    }
}

/// Stateful line-at-a-time converter for one vendor format.
pub trait EntryParser: Send {
    fn source(&self) -> Source;

    /// Next canonical entry in file order, or `None` at end of input.
    ///
    /// Malformed lines are skipped. I/O failures, cancellation and over-long lines are errors.
    fn next_entry(&mut self) -> Result<Option<Entry>>;

    fn hints(&self) -> &SessionHints;

    /// Bytes of input consumed so far.
    fn bytes_consumed(&self) -> u64;

    /// True once input is exhausted and no buffered entry remains.
    fn is_exhausted(&self) -> bool;
}

/// Build the parser for `source` over `lines`.
pub fn parser_for(
    source: Source,
    ctx: ParseContext,
    lines: LineReader<BoxedInput>,
) -> Box<dyn EntryParser> {
    match source {
        Source::Claude => Box::new(claude::ClaudeParser::new(ctx, lines)),
        Source::Codex => Box::new(codex::CodexParser::new(ctx, lines)),
        Source::Kimi => Box::new(kimi::KimiParser::new(ctx, lines)),
        Source::Gemini => Box::new(gemini::GeminiParser::new(ctx, lines)),
        Source::Copilot => Box::new(copilot::CopilotParser::new(ctx, lines)),
        Source::Qwen => Box::new(qwen::QwenParser::new(ctx, lines)),
    }
}

/// Drain a parser into a vector. Convenience for tests and eager loads.
pub fn collect_entries(parser: &mut dyn EntryParser) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    while let Some(entry) = parser.next_entry()? {
        entries.push(entry);
    }
    Ok(entries)
}
