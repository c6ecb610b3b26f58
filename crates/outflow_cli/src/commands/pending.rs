//! Pending command implementation.

use super::open_store;
use outflow_protocol::ChangeRecord;
use outflow_store::ChangeLogStore;
use serde::Serialize;
use std::path::Path;

/// Snapshot of the change log.
#[derive(Debug, Serialize)]
pub struct PendingResult {
    /// Database path.
    pub path: String,
    /// Records waiting to be propagated, in id order.
    pub changes: Vec<ChangeRecord>,
    /// Number of rows in the optimistic table.
    pub optimistic_rows: usize,
}

/// Runs the pending command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let result = PendingResult {
        path: path.display().to_string(),
        changes: store.changes_after(0)?,
        optimistic_rows: store.optimistic_rows()?.len(),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &PendingResult) {
    println!("Outflow Change Log");
    println!("==================");
    println!();
    println!("Path: {}", result.path);
    println!("Pending changes: {}", result.changes.len());
    println!("Optimistic rows: {}", result.optimistic_rows);

    if result.changes.is_empty() {
        return;
    }

    println!();
    for change in &result.changes {
        println!(
            "  [{}] {:<6} tx={} write={} {}",
            change.id,
            change.operation,
            change.transaction_id,
            change.write_id,
            serde_json::Value::Object(change.value.clone())
        );
    }
}
