//! Store configuration.

use crate::error::{StoreError, StoreResult};

/// Configuration shared by all change log stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Name of the local-only optimistic table.
    pub local_table: String,
    /// Column of a row value that holds the entity's unique key.
    pub key_column: String,
    /// Notification channel fired after every committed local write.
    pub channel: String,
}

impl StoreConfig {
    /// Creates a configuration for the given optimistic table and key column.
    pub fn new(local_table: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self {
            local_table: local_table.into(),
            key_column: key_column.into(),
            channel: "changes".into(),
        }
    }

    /// Sets the notification channel name.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Checks that the table name can be spliced into SQL.
    pub fn validate(&self) -> StoreResult<()> {
        validate_identifier(&self.local_table)?;
        if self.key_column.is_empty() {
            return Err(StoreError::InvalidIdentifier(self.key_column.clone()));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("users_local", "pub_key")
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn validate_identifier(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}


