//! Init command implementation.

use super::open_store;
use std::path::Path;

/// Runs the init command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    println!("Initialized change log at {}", path.display());
    println!("  Local table: {}", store.config().local_table);
    println!("  Pending:     {}", store.pending_count()?);
    Ok(())
}
