//! Message repository: ordered message lists per session.

use rusqlite::{Connection, params};

use crate::errors::Result;
use crate::model::Message;

/// Message repository. Stateless, every method takes `&Connection`.
pub struct MessageRepo;

impl MessageRepo {
    /// Replace a session's messages with `messages`, numbering `seq` by position.
    ///
    /// Not atomic on its own; run inside the caller's transaction.
    pub fn replace_all(conn: &Connection, session_id: &str, messages: &[Message]) -> Result<()> {
        let _ = Self::delete_for_session(conn, session_id)?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO messages (id, session_id, role, content, type, timestamp, metadata, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for (seq, msg) in messages.iter().enumerate() {
            let seq = i64::try_from(seq).unwrap_or(i64::MAX);
            let _ = stmt.execute(params![
                msg.id,
                session_id,
                msg.role,
                msg.content,
                msg.kind,
                msg.timestamp,
                msg.metadata,
                seq,
            ])?;
        }
        Ok(())
    }

    /// Messages of one session in `seq` order.
    pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<Message>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, role, content, type, timestamp, metadata
             FROM messages WHERE session_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok(Message {
                    id: row.get(0)?,
                    role: row.get(1)?,
                    content: row.get(2)?,
                    kind: row.get(3)?,
                    timestamp: row.get(4)?,
                    metadata: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete every message of one session.
    pub fn delete_for_session(conn: &Connection, session_id: &str) -> Result<usize> {
        Ok(conn.execute(
            "DELETE FROM messages WHERE session_id = ?1",
            params![session_id],
        )?)
    }

    /// Delete every message.
    pub fn delete_all(conn: &Connection) -> Result<usize> {
        Ok(conn.execute("DELETE FROM messages", [])?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::sqlite::repositories::session::SessionRepo;
    use crate::sqlite::repositories::test_support::{message, migrated, session};

    #[test]
    fn replace_preserves_order_and_fields() {
        let conn = migrated();
        SessionRepo::upsert(&conn, &session("sess_a", 1, vec![])).unwrap();

        let mut second = message("msg_b", "second");
        second.role = Role::Assistant;
        second.kind = "diff".into();
        second.metadata = Some(serde_json::json!({"files": 2}));
        let msgs = vec![message("msg_z", "first"), second, message("msg_a", "third")];
        MessageRepo::replace_all(&conn, "sess_a", &msgs).unwrap();

        let got = MessageRepo::list_for_session(&conn, "sess_a").unwrap();
        assert_eq!(got, msgs);
    }

    #[test]
    fn replace_drops_previous_messages() {
        let conn = migrated();
        SessionRepo::upsert(&conn, &session("sess_a", 1, vec![])).unwrap();
        MessageRepo::replace_all(&conn, "sess_a", &[message("msg_1", "a"), message("msg_2", "b")])
            .unwrap();
        MessageRepo::replace_all(&conn, "sess_a", &[message("msg_3", "c")]).unwrap();

        let got = MessageRepo::list_for_session(&conn, "sess_a").unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "msg_3");
    }

    #[test]
    fn same_message_id_in_two_sessions() {
        let conn = migrated();
        SessionRepo::upsert(&conn, &session("sess_a", 1, vec![])).unwrap();
        SessionRepo::upsert(&conn, &session("sess_b", 1, vec![])).unwrap();
        MessageRepo::replace_all(&conn, "sess_a", &[message("msg_1", "a")]).unwrap();
        MessageRepo::replace_all(&conn, "sess_b", &[message("msg_1", "b")]).unwrap();

        assert_eq!(MessageRepo::list_for_session(&conn, "sess_a").unwrap()[0].content, "a");
        assert_eq!(MessageRepo::list_for_session(&conn, "sess_b").unwrap()[0].content, "b");
    }

    #[test]
    fn insert_for_unknown_session_violates_foreign_key() {
        let conn = migrated();
        let result = MessageRepo::replace_all(&conn, "sess_ghost", &[message("msg_1", "a")]);
        assert!(result.is_err());
    }

    #[test]
    fn delete_for_session_reports_count() {
        let conn = migrated();
        SessionRepo::upsert(&conn, &session("sess_a", 1, vec![])).unwrap();
        MessageRepo::replace_all(&conn, "sess_a", &[message("msg_1", "a"), message("msg_2", "b")])
            .unwrap();
        assert_eq!(MessageRepo::delete_for_session(&conn, "sess_a").unwrap(), 2);
        assert_eq!(MessageRepo::delete_all(&conn).unwrap(), 0);
    }
}
