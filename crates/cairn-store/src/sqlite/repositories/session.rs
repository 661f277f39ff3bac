//! Session repository: session header rows and listing.

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::errors::Result;
use crate::model::{Session, SessionSummary};

/// Session repository. Stateless, every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert or update the header row. Messages are untouched.
    ///
    /// Uses `ON CONFLICT DO UPDATE` rather than `REPLACE` so the row is never
    /// deleted and the message cascade never fires.
    pub fn upsert(conn: &Connection, session: &Session) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO sessions (id, title, mode, project_path, created_at, updated_at, plan)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (id) DO UPDATE SET
               title = excluded.title,
               mode = excluded.mode,
               project_path = excluded.project_path,
               created_at = excluded.created_at,
               updated_at = excluded.updated_at,
               plan = excluded.plan",
            params![
                session.id,
                session.title,
                session.mode,
                session.project_path,
                session.created_at,
                session.updated_at,
                session.plan,
            ],
        )?;
        Ok(())
    }

    /// Header for one session, with an empty message list.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<Session>> {
        let row = conn
            .query_row(
                "SELECT id, title, mode, project_path, created_at, updated_at, plan
                 FROM sessions WHERE id = ?1",
                params![id],
                Self::map_header,
            )
            .optional()?;
        Ok(row)
    }

    /// `updated_at` of one session, if present.
    pub fn updated_at(conn: &Connection, id: &str) -> Result<Option<i64>> {
        let ts = conn
            .query_row(
                "SELECT updated_at FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts)
    }

    /// Most recently updated sessions first, without message bodies.
    pub fn list(conn: &Connection, limit: usize) -> Result<Vec<SessionSummary>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(
            "SELECT s.id, s.title, s.mode, s.project_path, s.created_at, s.updated_at,
                    COALESCE(c.message_count, 0)
             FROM sessions s
             LEFT JOIN (
               SELECT session_id, COUNT(*) AS message_count
               FROM messages GROUP BY session_id
             ) c ON c.session_id = s.id
             ORDER BY s.updated_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                let count: i64 = row.get(6)?;
                Ok(SessionSummary {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    mode: row.get(2)?,
                    project_path: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                    message_count: usize::try_from(count).unwrap_or(0),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every session id with its `updated_at`, unordered and unlimited.
    pub fn versions(conn: &Connection) -> Result<Vec<(String, i64)>> {
        let mut stmt = conn.prepare("SELECT id, updated_at FROM sessions")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete one header row. Returns whether it existed.
    pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
        let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Delete every header row.
    pub fn delete_all(conn: &Connection) -> Result<usize> {
        Ok(conn.execute("DELETE FROM sessions", [])?)
    }

    /// Number of sessions.
    pub fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?)
    }

    fn map_header(row: &Row<'_>) -> rusqlite::Result<Session> {
        Ok(Session {
            id: row.get(0)?,
            title: row.get(1)?,
            mode: row.get(2)?,
            project_path: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            messages: Vec::new(),
            plan: row.get(6)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionMode;
    use crate::sqlite::repositories::message::MessageRepo;
    use crate::sqlite::repositories::test_support::{message, migrated, session};

    #[test]
    fn upsert_then_get() {
        let conn = migrated();
        let mut s = session("sess_a", 5, vec![]);
        s.mode = SessionMode::NewBuild;
        s.project_path = Some("/p".into());
        s.plan = Some(serde_json::json!({"steps": ["a", "b"]}));
        SessionRepo::upsert(&conn, &s).unwrap();

        let got = SessionRepo::get(&conn, "sess_a").unwrap().unwrap();
        assert_eq!(got, s);
    }

    #[test]
    fn upsert_updates_existing_row_and_keeps_messages() {
        let conn = migrated();
        let s = session("sess_a", 5, vec![message("msg_1", "hi")]);
        SessionRepo::upsert(&conn, &s).unwrap();
        MessageRepo::replace_all(&conn, &s.id, &s.messages).unwrap();

        let mut renamed = s.clone();
        renamed.title = "renamed".into();
        renamed.updated_at = 9;
        SessionRepo::upsert(&conn, &renamed).unwrap();

        let got = SessionRepo::get(&conn, "sess_a").unwrap().unwrap();
        assert_eq!(got.title, "renamed");
        assert_eq!(SessionRepo::updated_at(&conn, "sess_a").unwrap(), Some(9));
        assert_eq!(MessageRepo::list_for_session(&conn, "sess_a").unwrap().len(), 1);
    }

    #[test]
    fn get_missing_returns_none() {
        let conn = migrated();
        assert!(SessionRepo::get(&conn, "nope").unwrap().is_none());
        assert!(SessionRepo::updated_at(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn list_orders_by_recency_and_counts_messages() {
        let conn = migrated();
        for (id, ts, n) in [("sess_old", 1, 0), ("sess_new", 30, 2), ("sess_mid", 20, 1)] {
            let msgs = (0..n).map(|i| message(&format!("msg_{i}"), "x")).collect();
            let s = session(id, ts, msgs);
            SessionRepo::upsert(&conn, &s).unwrap();
            MessageRepo::replace_all(&conn, &s.id, &s.messages).unwrap();
        }

        let list = SessionRepo::list(&conn, 10).unwrap();
        let ids: Vec<_> = list.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["sess_new", "sess_mid", "sess_old"]);
        let counts: Vec<_> = list.iter().map(|s| s.message_count).collect();
        assert_eq!(counts, [2, 1, 0]);
    }

    #[test]
    fn list_respects_limit() {
        let conn = migrated();
        for i in 0..5 {
            SessionRepo::upsert(&conn, &session(&format!("sess_{i}"), i, vec![])).unwrap();
        }
        let list = SessionRepo::list(&conn, 3).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].id, "sess_4");
    }

    #[test]
    fn delete_cascades_to_messages() {
        let conn = migrated();
        let s = session("sess_a", 1, vec![message("msg_1", "a"), message("msg_2", "b")]);
        SessionRepo::upsert(&conn, &s).unwrap();
        MessageRepo::replace_all(&conn, &s.id, &s.messages).unwrap();

        assert!(SessionRepo::delete(&conn, "sess_a").unwrap());
        assert!(!SessionRepo::delete(&conn, "sess_a").unwrap());
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn versions_and_count() {
        let conn = migrated();
        SessionRepo::upsert(&conn, &session("sess_a", 3, vec![])).unwrap();
        SessionRepo::upsert(&conn, &session("sess_b", 4, vec![])).unwrap();
        let mut versions = SessionRepo::versions(&conn).unwrap();
        versions.sort();
        assert_eq!(versions, [("sess_a".to_string(), 3), ("sess_b".to_string(), 4)]);
        assert_eq!(SessionRepo::count(&conn).unwrap(), 2);
        assert_eq!(SessionRepo::delete_all(&conn).unwrap(), 2);
        assert_eq!(SessionRepo::count(&conn).unwrap(), 0);
    }
}
