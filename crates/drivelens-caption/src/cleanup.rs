//! Legacy caption payload cleanup
//!
//! Early deployments stored captions as JSON-wrapped or HTML-entity-
//! encoded strings. The read path treats stored captions as opaque text
//! and passes them through [`clean_caption`] before returning; writers
//! emit plain text, so new rows pass through unchanged.

/// Decodes `&quot;`, strips fenced code markers, and unwraps
/// `{"caption":"…"}` shapes. Pure and idempotent.
pub fn clean_caption(stored: &str) -> String {
    let mut text = stored.trim().to_string();

    // HTML entity escaping from the oldest rows
    if text.contains("&quot;") {
        text = text.replace("&quot;", "\"");
    }

    // ```json ... ``` fences around the payload
    if text.starts_with("```") {
        text = strip_fences(&text);
    }

    // {"caption":"..."} wrapping
    if looks_like_json_object(&text) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
            if let Some(caption) = value.get("caption").and_then(|c| c.as_str()) {
                text = caption.to_string();
            }
        }
    }

    text.trim().to_string()
}

/// Removes a leading fence line (``` or ```json) and a trailing ```
fn strip_fences(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    if lines
        .first()
        .map(|l| l.trim_start().starts_with("```"))
        .unwrap_or(false)
    {
        lines.remove(0);
    }
    if lines
        .last()
        .map(|l| l.trim() == "```")
        .unwrap_or(false)
    {
        lines.pop();
    }
    lines.join("\n")
}

fn looks_like_json_object(text: &str) -> bool {
    text.starts_with('{') && text.ends_with('}')
}
