//! Write command implementation.

use super::open_store;
use outflow_protocol::{Operation, Row};
use outflow_store::LocalWrite;
use std::path::Path;
use thiserror::Error;

/// A `--value` argument that cannot be used as a row.
#[derive(Debug, Error)]
pub enum ValueError {
    /// The argument is not valid JSON.
    #[error("invalid JSON value: {0}")]
    Json(#[from] serde_json::Error),

    /// The argument is valid JSON but not an object.
    #[error("value must be a JSON object, got {0}")]
    NotAnObject(String),
}

/// Parses one `--value` argument into a row.
pub fn parse_row(text: &str) -> Result<Row, ValueError> {
    match serde_json::from_str::<serde_json::Value>(text)? {
        serde_json::Value::Object(row) => Ok(row),
        other => Err(ValueError::NotAnObject(other.to_string())),
    }
}

/// Runs the write command.
pub fn run(path: &Path, op: &str, values: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let operation: Operation = op.parse()?;
    let writes = values
        .iter()
        .map(|v| parse_row(v).map(|row| LocalWrite::new(operation, row)))
        .collect::<Result<Vec<_>, _>>()?;

    let store = open_store(path)?;
    match store.record_transaction(&writes)? {
        Some(transaction_id) => {
            println!("{transaction_id}");
            tracing::debug!(
                transaction_id = %transaction_id,
                changes = writes.len(),
                "recorded local transaction"
            );
        }
        None => println!("Nothing to write"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_objects_only() {
        let row = parse_row(r#"{"pub_key": "k1", "name": "alice"}"#).unwrap();
        assert_eq!(row["name"], "alice");

        assert!(matches!(parse_row("[1, 2]"), Err(ValueError::NotAnObject(_))));
        assert!(matches!(parse_row("{not json"), Err(ValueError::Json(_))));
    }

    #[test]
    fn records_one_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outflow.db");
        let values = vec![
            r#"{"pub_key": "a"}"#.to_string(),
            r#"{"pub_key": "b"}"#.to_string(),
        ];

        run(&path, "insert", &values).unwrap();

        let store = open_store(&path).unwrap();
        assert_eq!(store.pending_count().unwrap(), 2);
        assert_eq!(store.optimistic_rows().unwrap().len(), 2);
    }

    #[test]
    fn rejects_unknown_operation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outflow.db");
        let values = vec![r#"{"pub_key": "a"}"#.to_string()];

        assert!(run(&path, "upsert", &values).is_err());
    }
}
