//! CLI command implementations.

pub mod init;
pub mod pending;
pub mod sync;
pub mod write;

use outflow_store::{SqliteChangeLog, StoreConfig};
use std::path::Path;

/// Opens the change log at `path`, creating the schema if needed.
pub fn open_store(path: &Path) -> Result<SqliteChangeLog, Box<dyn std::error::Error>> {
    Ok(SqliteChangeLog::open(path, StoreConfig::default())?)
}
