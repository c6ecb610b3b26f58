//! # Outflow Protocol
//!
//! Change record and mutation batch types for the Outflow write path.
//!
//! This crate provides:
//! - [`ChangeRecord`] rows as they sit in the local change log
//! - [`TransactionGroup`] partitioning of drained records
//! - [`Mutation`] / [`MutationBatch`], the JSON body sent to the
//!   mutation-ingestion endpoint
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Wire format
//!
//! ```json
//! {"mutations":[{"type":"insert","modified":{"pub_key":"k1"},"syncMetadata":{"relation":"users"}}]}
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod group;
mod mutation;
mod operation;

pub use error::{ProtocolError, ProtocolResult};
pub use group::{group_by_transaction, TransactionGroup};
pub use mutation::{Mutation, MutationBatch, SyncMetadata};
pub use operation::{ChangeRecord, Operation, Row};
