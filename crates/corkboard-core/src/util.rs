//! Shared utility functions used across multiple modules.

/// Trim a string and reject whitespace-only values.
///
/// Returns `None` when the trimmed value is empty.
pub fn trimmed_non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Normalize optional text by trimming whitespace and removing empties.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .and_then(trimmed_non_empty)
        .map(ToOwned::to_owned)
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for one-line display.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}
