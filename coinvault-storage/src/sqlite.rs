use crate::error::{StorageError, StorageResult};
use crate::store::{KeyRange, TableStore, WriteBatch, WriteOp};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Table store persisted in one SQLite database.
///
/// Every logical table lives in a single `entries` table keyed by
/// `(tbl, key)`, so table names never reach SQL as identifiers.
pub struct SqliteTableStore {
    conn: Mutex<Connection>,
}

impl SqliteTableStore {
    /// Opens or creates the database at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        debug!("opening table store at {}", path.display());
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                tbl TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (tbl, key)
            ) WITHOUT ROWID;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn collect_rows(
    stmt: &mut rusqlite::Statement<'_>,
    params: impl rusqlite::Params,
) -> StorageResult<Vec<(String, String)>> {
    let rows = stmt.query_map(params, |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

impl TableStore for SqliteTableStore {
    fn get(&self, table: &str, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let value = conn
            .query_row(
                "SELECT value FROM entries WHERE tbl = ?1 AND key = ?2",
                params![table, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, table: &str, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO entries (tbl, key, value) VALUES (?1, ?2, ?3)",
            params![table, key, value],
        )?;
        Ok(())
    }

    fn delete(&self, table: &str, key: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let removed = conn.execute(
            "DELETE FROM entries WHERE tbl = ?1 AND key = ?2",
            params![table, key],
        )?;
        Ok(removed > 0)
    }

    fn range(&self, table: &str, range: &KeyRange) -> StorageResult<Vec<(String, String)>> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        match range {
            KeyRange::All => {
                let mut stmt =
                    conn.prepare("SELECT key, value FROM entries WHERE tbl = ?1 ORDER BY key")?;
                collect_rows(&mut stmt, params![table])
            }
            KeyRange::Prefix(prefix) => {
                let mut stmt = conn.prepare(
                    "SELECT key, value FROM entries
                     WHERE tbl = ?1 AND substr(key, 1, length(?2)) = ?2
                     ORDER BY key",
                )?;
                collect_rows(&mut stmt, params![table, prefix])
            }
            KeyRange::Between { start, end } => {
                let mut stmt = conn.prepare(
                    "SELECT key, value FROM entries
                     WHERE tbl = ?1 AND key >= ?2 AND key < ?3
                     ORDER BY key",
                )?;
                collect_rows(&mut stmt, params![table, start, end])
            }
        }
    }

    fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let tx = conn.transaction()?;
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { table, key, value } => {
                    tx.execute(
                        "INSERT OR REPLACE INTO entries (tbl, key, value) VALUES (?1, ?2, ?3)",
                        params![table, key, value],
                    )?;
                }
                WriteOp::Delete { table, key } => {
                    tx.execute(
                        "DELETE FROM entries WHERE tbl = ?1 AND key = ?2",
                        params![table, key],
                    )?;
                }
                WriteOp::Clear { table } => {
                    tx.execute("DELETE FROM entries WHERE tbl = ?1", params![table])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn count(&self, table: &str) -> StorageResult<usize> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE tbl = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}
