//! UTF-8 safe truncation for viewer-supplied text (display names, chat bodies in logs).

/// Returns a prefix of the string up to `max_chars` characters.
/// Respects UTF-8 boundaries and won't panic on multi-byte characters.
pub fn safe_prefix(s: &str, max_chars: usize) -> &str {
    if s.is_empty() || max_chars == 0 {
        return "";
    }
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Truncates a string to `max_chars` characters and adds an ellipsis if truncated.
pub fn ellipsize(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 1 {
        return String::from("…");
    }
    format!("{}…", safe_prefix(s, max_chars - 1))
}

/// Shorten a display name to what fits on one overlay line, dropping control characters.
pub fn overlay_name(name: &str, max_chars: usize) -> String {
    let cleaned: String = name.chars().filter(|ch| !ch.is_control()).collect();
    safe_prefix(cleaned.trim(), max_chars).to_string()
}
