//! Normalization helpers shared by the vendor parsers.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::VecDeque;
use thinkt_core::{Entry, Role};

use crate::ParseContext;

/// Assign `source` to `target` if `target` is still `None` (first-wins semantics).
pub fn set_first<T>(target: &mut Option<T>, source: Option<T>) {
    if target.is_none() {
        *target = source;
    }
}

/// Like [`set_first`] for string fields, ignoring blank values.
pub fn set_first_str(target: &mut Option<String>, source: Option<&str>) {
    let source = source.map(str::trim).filter(|s| !s.is_empty());
    set_first(target, source.map(str::to_string));
}

/// Field deserializer that reads an explicit `null` as the type's default.
pub fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deterministic entry ID for lines that carry none: `session:line:kind[:suffix]`.
pub fn synth_uuid(session_id: &str, line: u64, kind: &str, suffix: Option<&str>) -> String {
    match suffix.filter(|s| !s.is_empty()) {
        Some(suffix) => format!("{session_id}:{line:06}:{kind}:{suffix}"),
        None => format!("{session_id}:{line:06}:{kind}"),
    }
}

/// Tool input as a structured value. JSON-encoded strings are decoded, other strings kept.
pub fn decode_tool_input(raw: &Value) -> Value {
    match raw {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                serde_json::from_str(trimmed).unwrap_or_else(|_| raw.clone())
            } else {
                raw.clone()
            }
        }
        other => other.clone(),
    }
}

/// Tool output as display text.
///
/// A string that itself encodes `{"output": ...}` is unwrapped one level. Structured
/// output is serialized.
pub fn normalize_tool_output(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::String(s) => unwrap_output_envelope(s).unwrap_or_else(|| s.clone()),
        Value::Object(map) => match map.get("output") {
            Some(Value::String(s)) => s.clone(),
            _ => raw.to_string(),
        },
        other => other.to_string(),
    }
}

fn unwrap_output_envelope(s: &str) -> Option<String> {
    let trimmed = s.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    let decoded: Value = serde_json::from_str(trimmed).ok()?;
    match decoded.get("output")? {
        Value::String(inner) => Some(inner.clone()),
        Value::Null => None,
        inner => Some(inner.to_string()),
    }
}

/// Non-zero `metadata.exit_code` inside a string-encoded tool output envelope.
pub fn output_reports_failure(raw: &Value) -> bool {
    let decoded = match raw {
        Value::String(s) if s.trim_start().starts_with('{') => {
            serde_json::from_str::<Value>(s).ok()
        }
        Value::Object(_) => Some(raw.clone()),
        _ => None,
    };
    decoded
        .as_ref()
        .and_then(|v| v.pointer("/metadata/exit_code"))
        .and_then(Value::as_i64)
        .is_some_and(|code| code != 0)
}

/// Text of a vendor content field that is either a string or a list of `{text}` parts.
pub fn flatten_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                Value::Object(map) => map.get("text").and_then(Value::as_str),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

pub fn join_nonempty<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f").map(|ndt| ndt.and_utc())
        })
        .ok()
}

/// Seconds (or milliseconds, when the magnitude says so) since the Unix epoch.
pub fn parse_unix_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_f64()?;
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    let millis = if raw > 1e12 { raw } else { raw * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Buffers finished entries and stamps them with the parse context.
///
/// Entries without text and blocks are dropped here, so no parser can emit one.
#[derive(Debug, Default)]
pub struct EntryQueue {
    ready: VecDeque<Entry>,
}

impl EntryQueue {
    pub fn push(&mut self, ctx: &ParseContext, mut entry: Entry) {
        if entry.is_empty() {
            return;
        }
        entry.source = ctx.source;
        if entry.workspace_id.is_empty() {
            entry.workspace_id = ctx.workspace_id.clone();
        }
        self.ready.push_back(entry);
    }

    pub fn pop(&mut self) -> Option<Entry> {
        self.ready.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }
}

/// Start an entry for `ctx` with the given ID and role.
pub fn new_entry(ctx: &ParseContext, uuid: String, role: Role) -> Entry {
    let mut entry = Entry::new(uuid, role, ctx.source);
    entry.workspace_id = ctx.workspace_id.clone();
    entry
}
