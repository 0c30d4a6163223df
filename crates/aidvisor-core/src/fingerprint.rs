//! Request canonicalization and cache-key derivation.
//!
//! Two requests that differ only in incidental formatting (surrounding or
//! repeated whitespace, letter case on case-insensitive fields, list order)
//! must land on the same digest. Normalization happens field by field through
//! [`Normalizer`]; the resulting object is then emitted in a canonical textual
//! form with sorted keys before hashing, so encoder key ordering never leaks
//! into the digest.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Trim and collapse internal whitespace runs to a single space.
/// Returns `None` when nothing remains.
pub fn collapse(raw: &str) -> Option<String> {
    let joined = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// [`collapse`] followed by lower-casing, for case-insensitive fields.
pub fn collapse_folded(raw: &str) -> Option<String> {
    collapse(raw).map(|s| s.to_lowercase())
}

/// Normalize a multi-valued field: collapse and lower-case every element,
/// drop empties, sort. Returns `None` when the list ends up empty.
pub fn collapse_list<S: AsRef<str>>(items: &[S]) -> Option<Vec<String>> {
    let mut out: Vec<String> = items
        .iter()
        .filter_map(|item| collapse_folded(item.as_ref()))
        .collect();
    if out.is_empty() {
        return None;
    }
    out.sort();
    Some(out)
}

/// Builder for the normalized form of a request record.
///
/// Fields that normalize to nothing are omitted rather than stored as empty
/// strings, so "absent" and "blank" requests fingerprint identically.
#[derive(Debug, Default, Clone)]
pub struct Normalizer {
    fields: Map<String, Value>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-preserving scalar text field.
    pub fn text(mut self, name: &str, value: Option<&str>) -> Self {
        if let Some(v) = value.and_then(collapse) {
            self.fields.insert(name.to_string(), Value::String(v));
        }
        self
    }

    /// Case-insensitive scalar text field.
    pub fn folded(mut self, name: &str, value: Option<&str>) -> Self {
        if let Some(v) = value.and_then(collapse_folded) {
            self.fields.insert(name.to_string(), Value::String(v));
        }
        self
    }

    /// List-valued field; element order carries no signal.
    pub fn list<S: AsRef<str>>(mut self, name: &str, values: &[S]) -> Self {
        if let Some(items) = collapse_list(values) {
            self.fields.insert(
                name.to_string(),
                Value::Array(items.into_iter().map(Value::String).collect()),
            );
        }
        self
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn fingerprint(self) -> String {
        fingerprint(&self.into_value())
    }
}

/// Emit `value` in canonical form: object keys sorted ascending, strings
/// JSON-escaped, numbers and literals in their fixed JSON spelling.
pub fn canonical_text(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
    }
}

fn write_string(s: &str, out: &mut String) {
    // serde_json string escaping is stable; serializing a &str cannot fail.
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
    }
}

/// SHA-256 over the canonical text, hex-encoded.
pub fn fingerprint(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_text(value).as_bytes());
    hex::encode(hasher.finalize())
}

static SLUG_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("slug regex"));

/// Single-level cache key for a named entity: lower-case, runs of anything
/// outside `[a-z0-9]` become `_`, edges trimmed. Falls back to `fallback`
/// when nothing survives.
pub fn slugify(name: &str, fallback: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let replaced = SLUG_SEPARATORS.replace_all(&lowered, "_");
    let slug = replaced.trim_matches('_');
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collapse_trims_and_squeezes() {
        assert_eq!(collapse("  a \t b\n\nc ").as_deref(), Some("a b c"));
        assert_eq!(collapse("   "), None);
        assert_eq!(collapse_folded(" Computer  Science ").as_deref(), Some("computer science"));
    }

    #[test]
    fn list_order_and_blanks_do_not_matter() {
        let a = collapse_list(&["Mountains", "  beach ", ""]);
        let b = collapse_list(&["BEACH", "mountains"]);
        assert_eq!(a, b);
        assert_eq!(collapse_list::<&str>(&[]), None);
        assert_eq!(collapse_list(&["  ", ""]), None);
    }

    #[test]
    fn canonical_text_sorts_keys_recursively() {
        let value = json!({"b": 1, "a": {"z": true, "c": [null, "x"]}});
        assert_eq!(
            canonical_text(&value),
            r#"{"a":{"c":[null,"x"],"z":true},"b":1}"#
        );
    }

    #[test]
    fn normalizer_equates_formatting_variants() {
        let first = Normalizer::new()
            .text("gpa", Some(" 3.8 "))
            .folded("will_apply_aid", Some("Yes"))
            .list("geographic_features", &["Coast", "mountains"])
            .text("zip_code", Some("   "))
            .fingerprint();
        let second = Normalizer::new()
            .list("geographic_features", &[" MOUNTAINS", "coast  "])
            .folded("will_apply_aid", Some("  yes"))
            .text("gpa", Some("3.8"))
            .fingerprint();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn case_preserving_fields_stay_distinct() {
        let upper = Normalizer::new().text("career_goal", Some("NASA")).fingerprint();
        let lower = Normalizer::new().text("career_goal", Some("nasa")).fingerprint();
        assert_ne!(upper, lower);
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("  Texas A&M University ", "school"), "texas_a_m_university");
        assert_eq!(slugify("!!!", "school"), "school");
    }
}
