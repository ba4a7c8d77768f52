//! Export the user prompts of a session as markdown, JSON or plain text.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptFormat {
    #[default]
    Markdown,
    Json,
    Plain,
}

impl PromptFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Plain => "plain",
        }
    }
}

impl fmt::Display for PromptFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PromptFormat {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "plain" | "text" | "txt" => Ok(Self::Plain),
            other => Err(Error::Config(format!(
                "unknown prompt format {other:?} (valid: markdown, json, plain)"
            ))),
        }
    }
}

/// One user prompt, as exported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub uuid: String,
}

/// The user prompts of `session` in conversation order.
pub fn extract(session: &Session) -> Vec<Prompt> {
    session
        .user_prompts()
        .map(|entry| Prompt {
            text: entry.text.clone(),
            timestamp: entry.timestamp,
            uuid: entry.uuid.clone(),
        })
        .collect()
}

pub fn render(session: &Session, format: PromptFormat) -> Result<String> {
    let prompts = extract(session);
    match format {
        PromptFormat::Markdown => Ok(markdown(&session.meta.id, &prompts)),
        PromptFormat::Json => serde_json::to_string_pretty(&prompts)
            .map(|mut out| {
                out.push('\n');
                out
            })
            .map_err(|err| Error::json("prompt export", err)),
        PromptFormat::Plain => Ok(prompts
            .iter()
            .map(|prompt| format!("{}\n\n", prompt.text))
            .collect()),
    }
}

fn markdown(session_id: &str, prompts: &[Prompt]) -> String {
    let mut out = String::from("# Prompts\n\n");
    if !session_id.is_empty() {
        let _ = writeln!(out, "Session: `{session_id}`  ");
    }
    let _ = writeln!(out, "Count: {}\n", prompts.len());
    for prompt in prompts {
        let heading = prompt.timestamp.map_or_else(
            || "(no timestamp)".to_string(),
            |ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        let _ = write!(out, "## {heading}\n\n{}\n\n---\n\n", prompt.text.trim_end());
    }
    out
}
