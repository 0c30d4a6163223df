use serde_json::{error::Category, json, Value};

/// Client-facing description of a request body that failed to decode:
/// `{error, explanation, line, column}`. Position is `-1` when unknown.
pub fn decode_error_detail(err: &serde_json::Error, body: &[u8]) -> Value {
    let blank = body.iter().all(|b| b.is_ascii_whitespace());
    let explanation = match err.classify() {
        Category::Eof if blank => "The request body was empty. Did you forget to include JSON?",
        Category::Syntax => {
            "The JSON contains an invalid character. Check for stray quotes, trailing commas, or incorrect field names."
        }
        Category::Data => {
            "The JSON does not match the expected shape. For example, a field may be unknown or a string may have been sent where a list was required."
        }
        _ => "The JSON could not be decoded. Ensure it's valid and matches the expected schema.",
    };
    let (line, column) = if blank || err.line() == 0 {
        (-1, -1)
    } else {
        (err.line() as i64, err.column() as i64)
    };
    json!({
        "error": err.to_string(),
        "explanation": explanation,
        "line": line,
        "column": column,
    })
}
