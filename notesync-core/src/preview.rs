/// Preview derivation from a note body.
///
/// Bodies are usually rich-text deltas (`{"ops":[{"insert":...}]}`). Anything
/// that does not parse as one is treated as plain text.

use serde_json::Value;

/// Maximum preview length in characters, excluding the ellipsis
pub const PREVIEW_MAX_CHARS: usize = 100;

/// Number of delta operations considered for a preview
pub const PREVIEW_MAX_OPS: usize = 10;

const IMAGE_PLACEHOLDER: &str = "🖼️";
const ELLIPSIS: &str = "...";

/// Derive the short preview text shown in note listings.
pub fn derive_preview(body: &str) -> String {
    let text = match delta_text(body) {
        Some(text) => text,
        None => body.to_string(),
    };

    if text.is_empty() {
        return String::new();
    }

    let mut preview: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
    preview.push_str(ELLIPSIS);
    preview
}

fn delta_text(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let ops = value.get("ops")?.as_array()?;

    let text = ops
        .iter()
        .take(PREVIEW_MAX_OPS)
        .map(|op| match op.get("insert") {
            Some(Value::String(s)) => s.as_str(),
            Some(Value::Object(embed)) if embed.contains_key("image") => IMAGE_PLACEHOLDER,
            _ => "",
        })
        .collect();

    Some(text)
}
