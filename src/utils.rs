use serde_json::Value;

/// Escapes text for use in HTML or SVG content and attribute values.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Button labels the shell swaps in for a moment after a copy attempt.
pub const COPY_LABEL: &str = "Copy";
pub const COPY_SUCCESS_LABEL: &str = "Copied!";
pub const COPY_FAILURE_LABEL: &str = "Copy failed";

/// Text placed on the clipboard for a JSON value.
pub fn clipboard_payload(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn copy_feedback(succeeded: bool) -> &'static str {
    if succeeded {
        COPY_SUCCESS_LABEL
    } else {
        COPY_FAILURE_LABEL
    }
}
