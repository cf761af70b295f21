//! Normalization of common model output deviations.
//!
//! Coercion only repairs spelling and representation. It never invents a
//! missing field or pulls an out-of-range number back into range; those stay
//! schema violations.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};

use super::{SchemaId, SchemaViolation};

lazy_static! {
    /// Markdown code fence, optionally tagged with a language
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*(.*?)\s*```").unwrap();
}

/// Extract the JSON document from model text.
///
/// Accepts bare JSON, JSON inside a code fence, or a JSON object surrounded
/// by prose.
pub fn extract_json(text: &str, schema: SchemaId) -> Result<JsonValue, SchemaViolation> {
    let trimmed = text.trim();

    let first_error = match serde_json::from_str::<JsonValue>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(caps) = CODE_FENCE.captures(trimmed) {
        if let Ok(value) = serde_json::from_str::<JsonValue>(&caps[1]) {
            return Ok(value);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<JsonValue>(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(SchemaViolation::single(
        schema,
        "$",
        format!("response is not valid JSON: {}", first_error),
    ))
}

/// Lowercase alphanumerics only, so "Term & duration" and "TERM_AND_DURATION" compare loosely.
fn fold(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Find the canonical label matching `input`, ignoring case and separators.
pub(crate) fn canonical_label(input: &str, labels: &[&'static str]) -> Option<&'static str> {
    let folded = fold(input);
    labels.iter().copied().find(|label| fold(label) == folded)
}

/// Replace a string field with its canonical spelling, when one matches.
pub(crate) fn canonicalize_field(obj: &mut Map<String, JsonValue>, key: &str, labels: &[&'static str]) {
    let replacement = match obj.get(key) {
        Some(JsonValue::String(current)) => {
            canonical_label(current, labels).filter(|label| *label != current.as_str())
        }
        _ => None,
    };

    if let Some(label) = replacement {
        obj.insert(key.to_string(), JsonValue::String(label.to_string()));
    }
}

/// Turn a numeric string ("0.8") into a number.
pub(crate) fn numeric_field(obj: &mut Map<String, JsonValue>, key: &str) {
    let parsed = match obj.get(key) {
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    if let Some(number) = parsed.and_then(serde_json::Number::from_f64) {
        obj.insert(key.to_string(), JsonValue::Number(number));
    }
}

/// Turn "true"/"false" strings into booleans.
pub(crate) fn boolean_field(obj: &mut Map<String, JsonValue>, key: &str) {
    let parsed = match obj.get(key) {
        Some(JsonValue::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    };

    if let Some(flag) = parsed {
        obj.insert(key.to_string(), JsonValue::Bool(flag));
    }
}

/// Turn a numeric value into a string ("2" for `2`).
pub(crate) fn string_field(obj: &mut Map<String, JsonValue>, key: &str) {
    let text = match obj.get(key) {
        Some(JsonValue::Number(n)) => n.to_string(),
        _ => return,
    };
    obj.insert(key.to_string(), JsonValue::String(text));
}

/// Move `from` to `to` unless `to` is already present.
pub(crate) fn rename_key(obj: &mut Map<String, JsonValue>, from: &str, to: &str) {
    if obj.contains_key(to) {
        return;
    }
    if let Some(value) = obj.remove(from) {
        obj.insert(to.to_string(), value);
    }
}
