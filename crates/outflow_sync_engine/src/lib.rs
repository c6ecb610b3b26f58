//! # Outflow Sync Engine
//!
//! Outbound synchronizer for Outflow's local-first write path.
//!
//! This crate provides:
//! - A single-flight synchronizer (idle → processing → idle)
//! - Cursor management over the local change log
//! - Verdict mapping from remote responses (accept, reject, retry)
//! - Fixed-delay retry with cancellable waits
//! - HTTP transport abstraction
//!
//! ## Architecture
//!
//! Local writes land in the change log and fire a notification. The
//! synchronizer reacts by draining everything past its cursor, grouping it
//! by transaction and sending one batch:
//! 1. Accepted: acknowledged records are deleted and the cursor advances
//! 2. Rejected: the change log and optimistic rows are discarded
//! 3. Anything else: the batch stays queued and is retried after a delay
//!
//! ## Key Invariants
//!
//! - At most one batch is in flight
//! - Notifications during a cycle are never lost
//! - The cursor never moves backwards
//! - `stop()` cancels pending waits and in-flight requests

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod state;
mod transport;
mod verdict;

pub use config::{SyncConfig, DEFAULT_RETRY_DELAY};
pub use error::{SyncError, SyncResult};
pub use http::HttpTransport;
pub use state::{SyncStats, SyncStatus, Synchronizer};
pub use transport::{MockReply, MockTransport, MutationTransport, TransportResponse};
pub use verdict::Verdict;
