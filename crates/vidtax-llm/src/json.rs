//! Cleanup of model output before JSON parsing.

/// Remove markdown code fences (```` ```json ```` and ```` ``` ````) and trim.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// The span from the first `{` to the last `}`, the largest object-shaped
/// block in the text. Returns the input unchanged when there is none.
pub fn extract_json_object(text: &str) -> &str {
    extract_between(text, '{', '}')
}

/// Like [`extract_json_object`], for `[` ... `]`.
pub fn extract_json_array(text: &str) -> &str {
    extract_between(text, '[', ']')
}

fn extract_between(text: &str, open: char, close: char) -> &str {
    match (text.find(open), text.rfind(close)) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}
