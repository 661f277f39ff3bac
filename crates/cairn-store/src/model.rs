//! Session data model shared by both backends.
//!
//! JSON field names are camelCase so a flat-file session document and the
//! remote listing index use the same shape. `plan` and `metadata` are opaque
//! JSON payloads owned by the application layer.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StoreError;

/// What kind of work a session is for. Fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// Building a new project from scratch.
    NewBuild,
    /// Working inside an existing project directory.
    ExistingProject,
    /// Free-form conversation.
    Chat,
}

impl SessionMode {
    /// Wire/storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewBuild => "new-build",
            Self::ExistingProject => "existing-project",
            Self::Chat => "chat",
        }
    }

    /// Human label used in default titles.
    pub fn label(self) -> &'static str {
        match self {
            Self::NewBuild => "New Build",
            Self::ExistingProject => "Existing Project",
            Self::Chat => "Chat",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new-build" => Ok(Self::NewBuild),
            "existing-project" => Ok(Self::ExistingProject),
            "chat" => Ok(Self::Chat),
            other => Err(StoreError::InvalidValue(format!("unknown session mode: {other}"))),
        }
    }
}

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person using the tool.
    User,
    /// Model output.
    Assistant,
    /// Application-injected notices.
    System,
}

impl Role {
    /// Wire/storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(StoreError::InvalidValue(format!("unknown role: {other}"))),
        }
    }
}

// ── SQL column mapping ──────────────────────────────────────────────────────

fn text_column<T: FromStr<Err = StoreError>>(value: ValueRef<'_>) -> FromSqlResult<T> {
    value
        .as_str()?
        .parse()
        .map_err(|e: StoreError| FromSqlError::Other(Box::new(e)))
}

impl ToSql for SessionMode {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SessionMode {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value)
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value)
    }
}

// ── Records ─────────────────────────────────────────────────────────────────

/// One turn in a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// `msg_<uuid-v7>`, unique within its session.
    pub id: String,
    /// Author.
    pub role: Role,
    /// Text body.
    pub content: String,
    /// Render tag (`text`, `plan`, `diff`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Creation time, ms since epoch.
    pub timestamp: i64,
    /// Opaque per-message payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A conversation with its full message history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// `sess_<uuid-v7>`.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Session kind.
    pub mode: SessionMode,
    /// Project directory, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    /// Creation time, ms since epoch.
    pub created_at: i64,
    /// Last modification time, ms since epoch. Drives sync merges.
    pub updated_at: i64,
    /// Messages in insertion order.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Opaque generated plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Value>,
}

impl Session {
    /// Listing row for this session.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            mode: self.mode,
            project_path: self.project_path.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len(),
        }
    }
}

/// Session header without message bodies, as returned by listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Session kind.
    pub mode: SessionMode,
    /// Project directory, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    /// Creation time, ms since epoch.
    pub created_at: i64,
    /// Last modification time, ms since epoch.
    pub updated_at: i64,
    /// Number of messages in the session.
    pub message_count: usize,
}

/// A stored secret such as a provider API key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Lookup name.
    pub name: String,
    /// Secret value.
    pub value: String,
    /// Last write, ms since epoch.
    pub updated_at: i64,
}

/// Credential listing entry. Never carries the value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialInfo {
    /// Lookup name.
    pub name: String,
    /// Last write, ms since epoch.
    pub updated_at: i64,
}

/// A non-secret preference that travels with the account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    /// Lookup key.
    pub key: String,
    /// Value, usually JSON text.
    pub value: String,
    /// Last write, ms since epoch.
    pub updated_at: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Session {
        Session {
            id: "sess_1".into(),
            title: "Chat · 2024-03-01 12:34".into(),
            mode: SessionMode::ExistingProject,
            project_path: Some("/work/app".into()),
            created_at: 10,
            updated_at: 20,
            messages: vec![Message {
                id: "msg_1".into(),
                role: Role::User,
                content: "hi".into(),
                kind: "text".into(),
                timestamp: 15,
                metadata: Some(serde_json::json!({"tokens": 3})),
            }],
            plan: None,
        }
    }

    #[test]
    fn session_json_is_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["mode"], "existing-project");
        assert_eq!(json["projectPath"], "/work/app");
        assert_eq!(json["updatedAt"], 20);
        assert_eq!(json["messages"][0]["type"], "text");
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("plan").is_none());
    }

    #[test]
    fn session_json_tolerates_missing_optionals() {
        let raw = r#"{"id":"sess_2","title":"t","mode":"chat","createdAt":1,"updatedAt":2}"#;
        let session: Session = serde_json::from_str(raw).unwrap();
        assert!(session.messages.is_empty());
        assert!(session.project_path.is_none());
        assert!(session.plan.is_none());
    }

    #[test]
    fn summary_counts_messages() {
        let summary = sample().summary();
        assert_eq!(summary.message_count, 1);
        assert_eq!(summary.mode, SessionMode::ExistingProject);
    }

    #[test]
    fn mode_parse_and_label() {
        assert_eq!("new-build".parse::<SessionMode>().unwrap(), SessionMode::NewBuild);
        assert_eq!(SessionMode::NewBuild.label(), "New Build");
        assert!("project".parse::<SessionMode>().is_err());
    }

    #[test]
    fn role_parse() {
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("bot".parse::<Role>().is_err());
    }
}
