//! Key/value repository backing the `credentials`, `settings` and
//! `sync_state` tables.
//!
//! All three share the shape `(key, value, updated_at)`; only the key
//! column name differs.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;

/// Which key/value table to address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KvTable {
    /// `credentials(name, value, updated_at)`.
    Credentials,
    /// `settings(key, value, updated_at)`.
    Settings,
    /// `sync_state(key, value, updated_at)`. Local to one device.
    SyncState,
}

impl KvTable {
    /// Table name.
    pub fn table(self) -> &'static str {
        match self {
            Self::Credentials => "credentials",
            Self::Settings => "settings",
            Self::SyncState => "sync_state",
        }
    }

    fn key_column(self) -> &'static str {
        match self {
            Self::Credentials => "name",
            Self::Settings | Self::SyncState => "key",
        }
    }
}

/// Raw row from a key/value table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KvRow {
    /// Key (`name` for credentials).
    pub key: String,
    /// Stored value.
    pub value: String,
    /// Last write, ms since epoch.
    pub updated_at: i64,
}

/// Key/value repository. Stateless, every method takes `&Connection`.
pub struct KvRepo;

impl KvRepo {
    /// Look up one row.
    pub fn get(conn: &Connection, table: KvTable, key: &str) -> Result<Option<KvRow>> {
        let sql = format!(
            "SELECT {k}, value, updated_at FROM {t} WHERE {k} = ?1",
            k = table.key_column(),
            t = table.table()
        );
        let row = conn
            .query_row(&sql, params![key], |row| {
                Ok(KvRow {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Insert or overwrite unconditionally.
    pub fn put(conn: &Connection, table: KvTable, key: &str, value: &str, updated_at: i64) -> Result<()> {
        let sql = format!(
            "INSERT INTO {t} ({k}, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT ({k}) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            k = table.key_column(),
            t = table.table()
        );
        let _ = conn.execute(&sql, params![key, value, updated_at])?;
        Ok(())
    }

    /// Insert, or overwrite only when `row` is strictly newer. Returns whether a write happened.
    pub fn put_if_newer(conn: &Connection, table: KvTable, row: &KvRow) -> Result<bool> {
        let sql = format!(
            "INSERT INTO {t} ({k}, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT ({k}) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
             WHERE excluded.updated_at > {t}.updated_at",
            k = table.key_column(),
            t = table.table()
        );
        let changed = conn.execute(&sql, params![row.key, row.value, row.updated_at])?;
        Ok(changed > 0)
    }

    /// Delete one row. Returns whether it existed.
    pub fn delete(conn: &Connection, table: KvTable, key: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {t} WHERE {k} = ?1", k = table.key_column(), t = table.table());
        Ok(conn.execute(&sql, params![key])? > 0)
    }

    /// All rows ordered by key.
    pub fn list(conn: &Connection, table: KvTable) -> Result<Vec<KvRow>> {
        let sql = format!(
            "SELECT {k}, value, updated_at FROM {t} ORDER BY {k}",
            k = table.key_column(),
            t = table.table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(KvRow {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete every row.
    pub fn delete_all(conn: &Connection, table: KvTable) -> Result<usize> {
        Ok(conn.execute(&format!("DELETE FROM {}", table.table()), [])?)
    }

    /// Number of rows.
    pub fn count(conn: &Connection, table: KvTable) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.table());
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
