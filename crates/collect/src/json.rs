use listings::RawCandidate;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?\s*```").expect("valid regex"));

/// Pull a JSON document out of free-form model output.
///
/// Tries the whole text, then the first fenced code block, then the widest
/// `{...}` or `[...]` span.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Some(value);
    }

    if let Some(caps) = FENCE.captures(text) {
        if let Ok(value) = serde_json::from_str(caps[1].trim()) {
            return Some(value);
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if end > start {
                if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}

#[derive(Debug, Default)]
pub struct CandidateBatch {
    pub candidates: Vec<RawCandidate>,
    /// Array elements that were not objects
    pub skipped: usize,
}

/// Accepts a bare array, `{"roles": [...]}`, or any object whose first
/// array-valued field (in document order) holds the candidates.
pub fn parse_candidates(value: Value) -> CandidateBatch {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut first = None;
            for (key, v) in map {
                if let Value::Array(items) = v {
                    if key == "roles" {
                        first = Some(items);
                        break;
                    }
                    if first.is_none() {
                        first = Some(items);
                    }
                }
            }
            first.unwrap_or_default()
        }
        _ => Vec::new(),
    };

    let mut batch = CandidateBatch::default();
    for item in items {
        if !item.is_object() {
            batch.skipped += 1;
            continue;
        }
        match serde_json::from_value::<RawCandidate>(item) {
            Ok(candidate) => batch.candidates.push(candidate),
            Err(_) => batch.skipped += 1,
        }
    }
    batch
}
