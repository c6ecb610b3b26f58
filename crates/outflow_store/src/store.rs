//! Change log store trait.

use crate::error::StoreResult;
use crate::notify::{Listener, Subscription};
use outflow_protocol::{ChangeRecord, Operation, Row};

/// The local change log as seen by the synchronizer.
///
/// # Invariants
///
/// - Ids are assigned on append, strictly increasing, and never reused,
///   not even after [`discard_all`](Self::discard_all)
/// - Records are never mutated once appended
/// - `discard_all` clears the change log and the optimistic table in one
///   local transaction
/// - Stores must be `Send + Sync`; the synchronizer calls them from a
///   background task
///
/// # Implementors
///
/// - [`crate::MemoryChangeLog`] - For testing
/// - [`crate::SqliteChangeLog`] - For persistent storage
pub trait ChangeLogStore: Send + Sync + 'static {
    /// Returns all records with id strictly greater than `cursor`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or a row cannot be decoded.
    fn changes_after(&self, cursor: u64) -> StoreResult<Vec<ChangeRecord>>;

    /// Deletes all records with id less than or equal to `cursor`.
    ///
    /// Returns the number of records removed. Calling it again with the same
    /// or a smaller cursor removes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete_through(&self, cursor: u64) -> StoreResult<usize>;

    /// Deletes every change record and every optimistic row, atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; in that case neither table
    /// has been modified.
    fn discard_all(&self) -> StoreResult<()>;

    /// Registers a wake-up listener on the named notification channel.
    fn listen(&self, channel: &str, listener: Listener) -> Subscription;

    /// Notifies the store's channel if writes were committed outside this
    /// handle since the last call. Returns whether it notified.
    ///
    /// Stores that only see their own writes keep the default, which never
    /// notifies.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn poll_external_changes(&self) -> StoreResult<bool> {
        Ok(false)
    }
}

/// One mutating local operation, before it is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalWrite {
    /// Kind of mutation.
    pub operation: Operation,
    /// Post-mutation row, including the key column.
    pub value: Row,
}

impl LocalWrite {
    /// Creates a local write.
    pub fn new(operation: Operation, value: Row) -> Self {
        Self { operation, value }
    }

    /// An insert of `value`.
    pub fn insert(value: Row) -> Self {
        Self::new(Operation::Insert, value)
    }

    /// An update to `value`.
    pub fn update(value: Row) -> Self {
        Self::new(Operation::Update, value)
    }

    /// A delete of the entity identified by `value`.
    pub fn delete(value: Row) -> Self {
        Self::new(Operation::Delete, value)
    }
}

/// A row of the local-only optimistic table.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticRow {
    /// Entity key.
    pub key: String,
    /// Latest locally written value.
    pub value: Row,
    /// Write that produced this row.
    pub write_id: String,
    /// Set when the latest local write was a delete.
    pub deleted: bool,
}

/// Formats a transaction sequence number so that lexical order matches
/// numeric order.
pub fn format_transaction_id(sequence: u64) -> String {
    format!("{sequence:020}")
}

/// Extracts the key of `value` using the same rules as
/// [`ChangeRecord::key`].
pub(crate) fn row_key(value: &Row, column: &str) -> Option<String> {
    match value.get(column)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Generates a fresh idempotency token for a local write.
pub(crate) fn new_write_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transaction_ids_sort_numerically() {
        let a = format_transaction_id(9);
        let b = format_transaction_id(10);
        assert_eq!(a.len(), 20);
        assert!(a < b);
    }

    #[test]
    fn row_key_matches_record_key() {
        let value = json!({"pub_key": 42}).as_object().cloned().unwrap();
        let record = ChangeRecord::new(1, Operation::Insert, value.clone(), "w", "t");
        assert_eq!(row_key(&value, "pub_key"), record.key("pub_key"));
    }

    #[test]
    fn write_ids_are_unique() {
        assert_ne!(new_write_id(), new_write_id());
    }
}
