//! Character-safe string truncation.
//!
//! Titles are limited by character count (60 for auto titles, 100 for
//! renames). Slicing a `&str` by byte index panics inside a multi-byte
//! character, so these helpers count `char`s instead.

/// Truncate `s` to at most `max_chars` characters.
///
/// Returns the input unchanged (borrowed) when it already fits.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Collapse runs of whitespace (including newlines) into single spaces and trim.
pub fn squash_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
