//! Non-destructive merge of another session database into the local one.
//!
//! Newest wins by `updated_at`, compared strictly: a remote row replaces the
//! local one only when its timestamp is greater. Nothing is ever deleted.

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::table_exists;
use crate::sqlite::migrations::REQUIRED_TABLES;
use crate::sqlite::repositories::kv::{KvRepo, KvTable};
use crate::sqlite::repositories::session::SessionRepo;
use crate::sqlite::store::{read_session, write_session};

/// What a merge changed locally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    /// Sessions imported or replaced.
    pub sessions: usize,
    /// Credentials imported or replaced.
    pub credentials: usize,
    /// Settings imported or replaced.
    pub settings: usize,
}

impl MergeStats {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.sessions == 0 && self.credentials == 0 && self.settings == 0
    }
}

/// Check that `conn` looks like a session database.
pub fn verify_schema(conn: &Connection) -> Result<()> {
    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            return Err(StoreError::InvalidValue(format!(
                "database has no {table} table"
            )));
        }
    }
    Ok(())
}

/// Whether a migrated database holds no sessions, credentials or settings.
pub fn is_empty(conn: &Connection) -> Result<bool> {
    let total = SessionRepo::count(conn)?
        + KvRepo::count(conn, KvTable::Credentials)?
        + KvRepo::count(conn, KvTable::Settings)?;
    Ok(total == 0)
}

/// Merge `remote` into `local` inside one local transaction.
///
/// A failure at any point rolls the local database back untouched.
pub fn merge_from(local: &Connection, remote: &Connection) -> Result<MergeStats> {
    verify_schema(remote)?;

    let tx = local.unchecked_transaction()?;
    let mut stats = MergeStats::default();

    for (id, remote_updated_at) in SessionRepo::versions(remote)? {
        let import = match SessionRepo::updated_at(&tx, &id)? {
            None => true,
            Some(local_updated_at) => remote_updated_at > local_updated_at,
        };
        if !import {
            continue;
        }
        if let Some(session) = read_session(remote, &id)? {
            write_session(&tx, &session)?;
            stats.sessions += 1;
        }
    }

    for table in [KvTable::Credentials, KvTable::Settings] {
        if !table_exists(remote, table.table())? {
            debug!(table = table.table(), "table absent in source database, skipping");
            continue;
        }
        let mut imported = 0;
        for row in KvRepo::list(remote, table)? {
            if KvRepo::put_if_newer(&tx, table, &row)? {
                imported += 1;
            }
        }
        if table == KvTable::Credentials {
            stats.credentials = imported;
        } else {
            stats.settings = imported;
        }
    }

    tx.commit()?;
    if !stats.is_empty() {
        info!(
            sessions = stats.sessions,
            credentials = stats.credentials,
            settings = stats.settings,
            "merged remote database"
        );
    }
    Ok(stats)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::repositories::kv::KvRow;
    use crate::sqlite::repositories::test_support::{message, migrated, session};

    fn put_session(conn: &Connection, id: &str, updated_at: i64, content: &str) {
        write_session(conn, &session(id, updated_at, vec![message("msg_1", content)])).unwrap();
    }

    fn content_of(conn: &Connection, id: &str) -> String {
        read_session(conn, id).unwrap().unwrap().messages[0].content.clone()
    }

    #[test]
    fn imports_absent_and_newer_keeps_local_newer() {
        let local = migrated();
        let remote = migrated();
        put_session(&local, "sess_local_only", 5, "mine");
        put_session(&local, "sess_shared_newer_local", 50, "local wins");
        put_session(&local, "sess_shared_newer_remote", 10, "stale");
        put_session(&remote, "sess_shared_newer_local", 40, "remote loses");
        put_session(&remote, "sess_shared_newer_remote", 60, "remote wins");
        put_session(&remote, "sess_remote_only", 7, "theirs");

        let stats = merge_from(&local, &remote).unwrap();
        assert_eq!(stats.sessions, 2);

        assert_eq!(content_of(&local, "sess_local_only"), "mine");
        assert_eq!(content_of(&local, "sess_shared_newer_local"), "local wins");
        assert_eq!(content_of(&local, "sess_shared_newer_remote"), "remote wins");
        assert_eq!(content_of(&local, "sess_remote_only"), "theirs");
        assert_eq!(SessionRepo::count(&local).unwrap(), 4);
    }

    #[test]
    fn equal_timestamps_keep_local() {
        let local = migrated();
        let remote = migrated();
        put_session(&local, "sess_a", 10, "local");
        put_session(&remote, "sess_a", 10, "remote");
        let stats = merge_from(&local, &remote).unwrap();
        assert!(stats.is_empty());
        assert_eq!(content_of(&local, "sess_a"), "local");
    }

    #[test]
    fn second_merge_is_a_no_op() {
        let local = migrated();
        let remote = migrated();
        put_session(&remote, "sess_a", 10, "remote");
        KvRepo::put(&remote, KvTable::Credentials, "openai", "k", 3).unwrap();

        let first = merge_from(&local, &remote).unwrap();
        assert_eq!(first.sessions, 1);
        assert_eq!(first.credentials, 1);
        let second = merge_from(&local, &remote).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn key_values_follow_newest_wins() {
        let local = migrated();
        let remote = migrated();
        KvRepo::put(&local, KvTable::Settings, "theme", "light", 20).unwrap();
        KvRepo::put(&remote, KvTable::Settings, "theme", "dark", 10).unwrap();
        KvRepo::put(&local, KvTable::Credentials, "anthropic", "old", 1).unwrap();
        KvRepo::put(&remote, KvTable::Credentials, "anthropic", "new", 2).unwrap();

        let stats = merge_from(&local, &remote).unwrap();
        assert_eq!(stats.settings, 0);
        assert_eq!(stats.credentials, 1);
        assert_eq!(
            KvRepo::get(&local, KvTable::Settings, "theme").unwrap().unwrap().value,
            "light"
        );
        assert_eq!(
            KvRepo::get(&local, KvTable::Credentials, "anthropic").unwrap(),
            Some(KvRow {
                key: "anthropic".into(),
                value: "new".into(),
                updated_at: 2
            })
        );
    }

    #[test]
    fn sync_state_stays_local() {
        let local = migrated();
        let remote = migrated();
        KvRepo::put(&local, KvTable::SyncState, "lastSyncAt", "100", 100).unwrap();
        KvRepo::put(&remote, KvTable::SyncState, "lastSyncAt", "900", 900).unwrap();

        let stats = merge_from(&local, &remote).unwrap();
        assert!(stats.is_empty());
        assert_eq!(
            KvRepo::get(&local, KvTable::SyncState, "lastSyncAt").unwrap().unwrap().value,
            "100"
        );
        assert!(is_empty(&local).unwrap());
    }

    #[test]
    fn source_without_tables_is_rejected_untouched() {
        let local = migrated();
        put_session(&local, "sess_a", 1, "keep");
        let remote = Connection::open_in_memory().unwrap();
        remote.execute_batch("CREATE TABLE unrelated (x INTEGER);").unwrap();

        let err = merge_from(&local, &remote).unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue(_)));
        assert_eq!(SessionRepo::count(&local).unwrap(), 1);
    }

    #[test]
    fn source_without_settings_table_still_merges_sessions() {
        let local = migrated();
        let remote = migrated();
        remote.execute_batch("DROP TABLE settings;").unwrap();
        put_session(&remote, "sess_a", 1, "x");
        let stats = merge_from(&local, &remote).unwrap();
        assert_eq!(stats.sessions, 1);
    }

    #[test]
    fn emptiness_counts_all_tables() {
        let conn = migrated();
        assert!(is_empty(&conn).unwrap());
        KvRepo::put(&conn, KvTable::Settings, "k", "v", 1).unwrap();
        assert!(!is_empty(&conn).unwrap());
    }
}
