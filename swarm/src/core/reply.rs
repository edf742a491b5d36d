//! Helpers for handling free-text oracle replies.

use std::sync::LazyLock;

use serde_json::{Map, Value};

static OUTERMOST_OBJECT: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?s)\{.*\}").unwrap());

pub const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Body of the leading markdown code fence (with optional language tag).
///
/// Anything after the closing fence is dropped; an unterminated fence keeps
/// the rest of the reply. Replies without a leading fence come back trimmed.
/// Line structure inside the block is kept.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(newline) = after_open.find('\n') else {
        return after_open.strip_suffix("```").unwrap_or(after_open);
    };
    let body = &after_open[newline + 1..];
    if body.starts_with("```") {
        return "";
    }
    match body.find("\n```") {
        Some(close) => &body[..close + 1],
        None => body,
    }
}

/// Source text from a reply: fence body without surrounding blank lines or
/// trailing whitespace, ending in exactly one newline when non-empty.
pub fn code_body(text: &str) -> String {
    let body = strip_code_fences(text)
        .trim_start_matches(['\n', '\r'])
        .trim_end();
    if body.is_empty() {
        String::new()
    } else {
        format!("{body}\n")
    }
}

/// Extract a JSON object from a reply.
///
/// Strategy order:
/// 1) the whole trimmed reply;
/// 2) the first balanced object in the text;
/// 3) the outermost `{...}` span after normalizing smart quotes.
pub fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(map);
    }

    if let Some(map) = first_balanced_object(trimmed) {
        return Some(map);
    }

    let normalized = normalize_quotes(trimmed);
    let span = OUTERMOST_OBJECT.find(&normalized)?;
    match serde_json::from_str::<Value>(span.as_str()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn first_balanced_object(text: &str) -> Option<Map<String, Value>> {
    for (idx, ch) in text.char_indices() {
        if ch != '{' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = stream.next() {
            return Some(map);
        }
    }
    None
}

fn normalize_quotes(text: &str) -> String {
    text.replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// The first `max_chars` characters of `text`, without a marker.
pub fn sample(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
