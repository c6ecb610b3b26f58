//! Change log records.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A row payload: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Kind of local mutation recorded in the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A new entity was written.
    Insert,
    /// An existing entity was modified.
    Update,
    /// An entity was removed.
    Delete,
}

impl Operation {
    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(ProtocolError::UnknownOperation(other.to_string())),
        }
    }
}

/// One row of the local change log.
///
/// Records are appended by local writes and never mutated. They leave the
/// log either after the remote side accepted them or when a rejection
/// discards the whole queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Store-assigned id, strictly increasing. Used as the sync cursor.
    pub id: u64,
    /// Kind of mutation.
    pub operation: Operation,
    /// Post-mutation payload, including the entity's key column.
    pub value: Row,
    /// Client-generated idempotency token of the originating write.
    pub write_id: String,
    /// Shared by all records written in the same local transaction.
    pub transaction_id: String,
}

impl ChangeRecord {
    /// Creates a change record.
    pub fn new(
        id: u64,
        operation: Operation,
        value: Row,
        write_id: impl Into<String>,
        transaction_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            operation,
            value,
            write_id: write_id.into(),
            transaction_id: transaction_id.into(),
        }
    }

    /// Returns the value of `column` rendered as a key string.
    ///
    /// String values are returned verbatim; other scalars use their JSON
    /// text. Missing or null columns yield `None`.
    pub fn key(&self, column: &str) -> Option<String> {
        match self.value.get(column)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn operation_names() {
        assert_eq!(Operation::Insert.as_str(), "insert");
        assert_eq!(Operation::Update.to_string(), "update");
        assert_eq!("delete".parse::<Operation>().unwrap(), Operation::Delete);
        assert!("upsert".parse::<Operation>().is_err());
    }

    #[test]
    fn operation_serializes_lowercase() {
        let json = serde_json::to_string(&Operation::Insert).unwrap();
        assert_eq!(json, "\"insert\"");
    }

    #[test]
    fn record_key_lookup() {
        let record = ChangeRecord::new(
            1,
            Operation::Insert,
            row(json!({"pub_key": "abc", "age": 7, "nick": null})),
            "w1",
            "t1",
        );

        assert_eq!(record.key("pub_key").as_deref(), Some("abc"));
        assert_eq!(record.key("age").as_deref(), Some("7"));
        assert_eq!(record.key("nick"), None);
        assert_eq!(record.key("missing"), None);
    }
}
