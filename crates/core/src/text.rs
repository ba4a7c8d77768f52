/// Default length (in characters) for first-prompt previews.
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// Shorten `text` to at most `max_chars` characters, appending `...` when cut.
///
/// Cuts only on `char` boundaries so multi-byte characters are never split.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some(_) if max_chars <= 3 => text.chars().take(max_chars).collect(),
        Some(_) => {
            let cut = text
                .char_indices()
                .nth(max_chars - 3)
                .map_or(text.len(), |(idx, _)| idx);
            format!("{}...", &text[..cut])
        }
    }
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Preview used for `SessionMeta::first_prompt`.
pub fn preview(text: &str) -> String {
    truncate_chars(&single_line(text), DEFAULT_PREVIEW_CHARS)
}
