//! SQLite-backed change log.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::notify::{ChangeNotifier, Listener, Subscription};
use crate::store::{
    format_transaction_id, new_write_id, row_key, ChangeLogStore, LocalWrite, OptimisticRow,
};
use outflow_protocol::{ChangeRecord, Operation, Row};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A change log persisted in SQLite.
///
/// Layout:
/// - `changes`: the change log, `id INTEGER PRIMARY KEY AUTOINCREMENT` so ids
///   are never reused after deletes
/// - the configured optimistic table (`users_local` by default), one row per
///   entity key with the latest local value
/// - `outflow_meta`: the transaction sequence
///
/// Local writes run in an `IMMEDIATE` transaction; listeners are notified
/// after the commit, outside the connection lock. Writes committed through
/// other connections (another process, another handle) are only seen by
/// [`poll_external_changes`](ChangeLogStore::poll_external_changes).
pub struct SqliteChangeLog {
    config: StoreConfig,
    conn: Mutex<Connection>,
    notifier: Arc<ChangeNotifier>,
    /// Last `PRAGMA data_version` observed on `conn`.
    data_version: AtomicI64,
}

impl SqliteChangeLog {
    /// Opens (or creates) a store at `path`.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn, config)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(config: StoreConfig) -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, config)
    }

    fn with_connection(conn: Connection, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        apply_schema(&conn, &config.local_table)?;
        let data_version = data_version(&conn)?;
        Ok(Self {
            config,
            conn: Mutex::new(conn),
            notifier: Arc::new(ChangeNotifier::new()),
            data_version: AtomicI64::new(data_version),
        })
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Records `writes` as one local transaction with a generated id.
    ///
    /// Returns the transaction id, or `None` if `writes` is empty.
    pub fn record_transaction(&self, writes: &[LocalWrite]) -> StoreResult<Option<String>> {
        self.record(None, writes)
    }

    /// Records `writes` as one local transaction under `transaction_id`.
    pub fn record_transaction_as(
        &self,
        transaction_id: &str,
        writes: &[LocalWrite],
    ) -> StoreResult<()> {
        self.record(Some(transaction_id), writes).map(|_| ())
    }

    fn record(
        &self,
        transaction_id: Option<&str>,
        writes: &[LocalWrite],
    ) -> StoreResult<Option<String>> {
        if writes.is_empty() {
            return Ok(None);
        }

        let keys = writes
            .iter()
            .map(|w| {
                row_key(&w.value, &self.config.key_column).ok_or_else(|| {
                    StoreError::MissingKey {
                        column: self.config.key_column.clone(),
                    }
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let transaction_id = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let transaction_id = match transaction_id {
                Some(id) => id.to_string(),
                None => format_transaction_id(next_transaction_sequence(&tx)?),
            };

            let upsert = format!(
                "INSERT INTO {} (key, value, write_id, deleted) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     write_id = excluded.write_id,
                     deleted = excluded.deleted",
                self.config.local_table
            );

            for (write, key) in writes.iter().zip(keys) {
                let value = serde_json::to_string(&write.value)?;
                let write_id = new_write_id();
                tx.execute(
                    &upsert,
                    params![key, value, write_id, write.operation == Operation::Delete],
                )?;
                tx.execute(
                    "INSERT INTO changes (operation, value, write_id, transaction_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![write.operation.as_str(), value, write_id, transaction_id],
                )?;
            }

            tx.commit()?;
            transaction_id
        };

        tracing::trace!(transaction_id = %transaction_id, writes = writes.len(), "recorded local transaction");
        self.notifier.notify(&self.config.channel);
        Ok(Some(transaction_id))
    }

    /// Returns the number of records in the change log.
    pub fn pending_count(&self) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM changes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Returns the optimistic table, ordered by key.
    pub fn optimistic_rows(&self) -> StoreResult<Vec<OptimisticRow>> {
        let raw = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT key, value, write_id, deleted FROM {} ORDER BY key ASC",
                self.config.local_table
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        raw.into_iter()
            .map(|(key, value, write_id, deleted)| -> StoreResult<OptimisticRow> {
                Ok(OptimisticRow {
                    key,
                    value: serde_json::from_str::<Row>(&value)?,
                    write_id,
                    deleted,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for SqliteChangeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteChangeLog")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChangeLogStore for SqliteChangeLog {
    fn changes_after(&self, cursor: u64) -> StoreResult<Vec<ChangeRecord>> {
        let raw = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT id, operation, value, write_id, transaction_id
                 FROM changes WHERE id > ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![sql_cursor(cursor)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        raw.into_iter()
            .map(|(id, operation, value, write_id, transaction_id)| -> StoreResult<ChangeRecord> {
                Ok(ChangeRecord {
                    id: id as u64,
                    operation: operation.parse()?,
                    value: serde_json::from_str(&value)?,
                    write_id,
                    transaction_id,
                })
            })
            .collect()
    }

    fn delete_through(&self, cursor: u64) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM changes WHERE id <= ?1",
            params![sql_cursor(cursor)],
        )?;
        Ok(deleted)
    }

    fn discard_all(&self) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM changes", [])?;
        tx.execute(&format!("DELETE FROM {}", self.config.local_table), [])?;
        tx.commit()?;
        Ok(())
    }

    fn listen(&self, channel: &str, listener: Listener) -> Subscription {
        self.notifier.listen(channel, listener)
    }

    fn poll_external_changes(&self) -> StoreResult<bool> {
        let version = data_version(&self.conn.lock())?;
        if self.data_version.swap(version, Ordering::SeqCst) == version {
            return Ok(false);
        }
        tracing::trace!(version, "external write detected");
        self.notifier.notify(&self.config.channel);
        Ok(true)
    }
}

/// SQLite ids are signed; cursors past `i64::MAX` cover every row.
fn sql_cursor(cursor: u64) -> i64 {
    i64::try_from(cursor).unwrap_or(i64::MAX)
}

/// Changes whenever another connection commits to the database file.
fn data_version(conn: &Connection) -> StoreResult<i64> {
    Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}

fn apply_schema(conn: &Connection, local_table: &str) -> StoreResult<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS changes (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             operation TEXT NOT NULL CHECK (operation IN ('insert', 'update', 'delete')),
             value TEXT NOT NULL,
             write_id TEXT NOT NULL,
             transaction_id TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS {local_table} (
             key TEXT PRIMARY KEY,
             value TEXT NOT NULL,
             write_id TEXT NOT NULL,
             deleted INTEGER NOT NULL DEFAULT 0
         );
         CREATE TABLE IF NOT EXISTS outflow_meta (
             name TEXT PRIMARY KEY,
             value INTEGER NOT NULL
         );"
    ))?;
    Ok(())
}

fn next_transaction_sequence(conn: &Connection) -> StoreResult<u64> {
    let current: Option<i64> = conn
        .query_row(
            "SELECT value FROM outflow_meta WHERE name = 'transaction_seq'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let next = current.unwrap_or(0) + 1;
    conn.execute(
        "INSERT INTO outflow_meta (name, value) VALUES ('transaction_seq', ?1)
         ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        params![next],
    )?;
    Ok(next as u64)
}


