//! Prefixed identifier generation.
//!
//! All IDs are UUID v7 (time-ordered) generated via [`uuid::Uuid::now_v7`]
//! with a short type prefix, so a stray ID in a log line says what it names.

use uuid::Uuid;

/// Prefix for session IDs.
pub const SESSION_PREFIX: &str = "sess_";

/// Prefix for message IDs.
pub const MESSAGE_PREFIX: &str = "msg_";

/// Generate a new session ID (`sess_<uuid-v7>`).
pub fn new_session_id() -> String {
    format!("{SESSION_PREFIX}{}", Uuid::now_v7())
}

/// Generate a new message ID (`msg_<uuid-v7>`).
pub fn new_message_id() -> String {
    format!("{MESSAGE_PREFIX}{}", Uuid::now_v7())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
