//! # Outflow Store
//!
//! Local change log stores for the Outflow write path.
//!
//! A store keeps two things in step:
//! - the **change log**, an append-only table of [`ChangeRecord`]s waiting to
//!   be propagated, with strictly increasing ids
//! - the **optimistic table**, the local-only materialization of those writes
//!
//! Local writes go through `record_transaction`, which touches both inside one
//! local transaction and then wakes every listener registered on the store's
//! notification channel.
//!
//! ## Available Stores
//!
//! - [`MemoryChangeLog`] - For testing and ephemeral sessions
//! - [`SqliteChangeLog`] - Persistent store backed by SQLite
//!
//! ## Example
//!
//! ```rust
//! use outflow_store::{ChangeLogStore, LocalWrite, MemoryChangeLog};
//! use serde_json::json;
//!
//! let store = MemoryChangeLog::new();
//! let value = json!({"pub_key": "k1", "name": "alice"});
//! store
//!     .record_transaction(&[LocalWrite::insert(value.as_object().unwrap().clone())])
//!     .unwrap();
//!
//! let pending = store.changes_after(0).unwrap();
//! assert_eq!(pending.len(), 1);
//! ```
//!
//! [`ChangeRecord`]: outflow_protocol::ChangeRecord

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod memory;
mod notify;
mod sqlite;
mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryChangeLog;
pub use notify::{ChangeNotifier, Listener, Subscription};
pub use sqlite::SqliteChangeLog;
pub use store::{format_transaction_id, ChangeLogStore, LocalWrite, OptimisticRow};
