use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// A fenced code block, optionally tagged `json`.
static FENCED_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)\n?\s*```").unwrap());

/// Pull a JSON object out of free-form model output.
///
/// Tries, in order: the whole text, the first fenced code block, and the span
/// from the first `{` to the last `}`. Only JSON objects are accepted; a bare
/// array or scalar counts as a failed attempt.
pub fn extract_json(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }

    if let Some(v) = parse_object(text) {
        return Some(v);
    }

    if let Some(caps) = FENCED_BLOCK_RE.captures(text)
        && let Some(inner) = caps.get(1)
        && let Some(v) = parse_object(inner.as_str())
    {
        return Some(v);
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}'))
        && start < end
    {
        return parse_object(&text[start..=end]);
    }

    None
}

fn parse_object(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}
