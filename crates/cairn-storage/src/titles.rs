//! Session title rules.

use cairn_core::text::{squash_whitespace, truncate_chars};
use cairn_core::time::format_minute;
use cairn_store::SessionMode;

/// Longest title taken from a first user message.
pub const MESSAGE_TITLE_CHARS: usize = 60;

/// Longest title accepted by a rename.
pub const RENAME_TITLE_CHARS: usize = 100;

/// `"<Mode label> · YYYY-MM-DD HH:MM"`.
pub fn default_title(mode: SessionMode, created_at: i64) -> String {
    format!("{} · {}", mode.label(), format_minute(created_at))
}

/// Title derived from a user message, or `None` if it is blank.
pub fn from_message(content: &str) -> Option<String> {
    let squashed = squash_whitespace(content);
    (!squashed.is_empty()).then(|| truncate_chars(&squashed, MESSAGE_TITLE_CHARS).to_string())
}

/// Normalized rename target, or `None` if it is blank.
pub fn for_rename(title: &str) -> Option<String> {
    let trimmed = title.trim();
    (!trimmed.is_empty()).then(|| truncate_chars(trimmed, RENAME_TITLE_CHARS).to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
