use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thinkt_core::text::{single_line, truncate_chars};
use thinkt_core::{ContentBlock, Entry};

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

const TOOL_PREVIEW_CHARS: usize = 200;

/// Human-readable rendering of one entry.
pub fn render_entry(entry: &Entry) -> String {
    let mut out = format!("[{}]", entry.role);
    if let Some(ts) = entry.timestamp {
        out.push_str(&format!(" {}", ts.format("%Y-%m-%d %H:%M:%S")));
    }
    if let Some(model) = &entry.model {
        out.push_str(&format!(" ({model})"));
    }
    if entry.content_blocks.is_empty() {
        if !entry.text.is_empty() {
            out.push('\n');
            out.push_str(&indent(&entry.text));
        }
        return out;
    }
    for block in &entry.content_blocks {
        out.push('\n');
        match block {
            ContentBlock::Text { text } => out.push_str(&indent(text)),
            ContentBlock::Thinking { thinking, .. } => {
                out.push_str(&indent(&format!("(thinking) {thinking}")))
            }
            ContentBlock::ToolUse {
                tool_name,
                tool_input,
                ..
            } => {
                let input = single_line(&tool_input.to_string());
                out.push_str(&format!(
                    "  -> {tool_name} {}",
                    truncate_chars(&input, TOOL_PREVIEW_CHARS)
                ));
            }
            ContentBlock::ToolResult {
                tool_result,
                is_error,
                ..
            } => {
                let marker = if *is_error { "error" } else { "result" };
                out.push_str(&format!(
                    "  <- {marker}: {}",
                    truncate_chars(&single_line(tool_result), TOOL_PREVIEW_CHARS)
                ));
            }
        }
    }
    out
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
