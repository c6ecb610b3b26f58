//! In-memory change log for testing.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::notify::{ChangeNotifier, Listener, Subscription};
use crate::store::{
    format_transaction_id, new_write_id, row_key, ChangeLogStore, LocalWrite, OptimisticRow,
};
use outflow_protocol::{ChangeRecord, Operation};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct MemoryState {
    changes: Vec<ChangeRecord>,
    optimistic: BTreeMap<String, OptimisticRow>,
    next_id: u64,
    next_transaction: u64,
}

/// An in-memory change log.
///
/// Suitable for unit and integration tests and for sessions that do not
/// need persistence. Both tables sit behind one lock, so every operation is
/// atomic with respect to the others.
///
/// # Example
///
/// ```rust
/// use outflow_store::{ChangeLogStore, LocalWrite, MemoryChangeLog};
/// use serde_json::json;
///
/// let store = MemoryChangeLog::new();
/// let row = json!({"pub_key": "k1"}).as_object().unwrap().clone();
/// store.record_transaction(&[LocalWrite::insert(row)]).unwrap();
///
/// assert_eq!(store.pending_count(), 1);
/// store.delete_through(1).unwrap();
/// assert_eq!(store.pending_count(), 0);
/// ```
#[derive(Debug)]
pub struct MemoryChangeLog {
    config: StoreConfig,
    state: Mutex<MemoryState>,
    notifier: Arc<ChangeNotifier>,
    failing: AtomicBool,
}

impl MemoryChangeLog {
    /// Creates an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates an empty store with the given configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MemoryState {
                changes: Vec::new(),
                optimistic: BTreeMap::new(),
                next_id: 1,
                next_transaction: 1,
            }),
            notifier: Arc::new(ChangeNotifier::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Records `writes` as one local transaction with a generated id.
    ///
    /// Returns the transaction id, or `None` if `writes` is empty.
    pub fn record_transaction(&self, writes: &[LocalWrite]) -> StoreResult<Option<String>> {
        self.record(None, writes)
    }

    /// Records `writes` as one local transaction under `transaction_id`.
    ///
    /// Nothing is written if any value lacks the key column.
    pub fn record_transaction_as(
        &self,
        transaction_id: &str,
        writes: &[LocalWrite],
    ) -> StoreResult<()> {
        self.record(Some(transaction_id), writes).map(|_| ())
    }

    fn record(
        &self,
        transaction_id: Option<&str>,
        writes: &[LocalWrite],
    ) -> StoreResult<Option<String>> {
        self.check_available()?;
        if writes.is_empty() {
            return Ok(None);
        }

        let keys = writes
            .iter()
            .map(|w| {
                row_key(&w.value, &self.config.key_column).ok_or_else(|| {
                    StoreError::MissingKey {
                        column: self.config.key_column.clone(),
                    }
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let transaction_id = {
            let mut state = self.state.lock();
            let transaction_id = match transaction_id {
                Some(id) => id.to_string(),
                None => {
                    let sequence = state.next_transaction;
                    state.next_transaction += 1;
                    format_transaction_id(sequence)
                }
            };

            for (write, key) in writes.iter().zip(keys) {
                let id = state.next_id;
                state.next_id += 1;
                let write_id = new_write_id();

                state.optimistic.insert(
                    key.clone(),
                    OptimisticRow {
                        key,
                        value: write.value.clone(),
                        write_id: write_id.clone(),
                        deleted: write.operation == Operation::Delete,
                    },
                );
                state.changes.push(ChangeRecord::new(
                    id,
                    write.operation,
                    write.value.clone(),
                    write_id,
                    transaction_id.as_str(),
                ));
            }
            transaction_id
        };

        self.notifier.notify(&self.config.channel);
        Ok(Some(transaction_id))
    }

    /// Returns the number of records in the change log.
    pub fn pending_count(&self) -> usize {
        self.state.lock().changes.len()
    }

    /// Returns the optimistic table, ordered by key.
    pub fn optimistic_rows(&self) -> Vec<OptimisticRow> {
        self.state.lock().optimistic.values().cloned().collect()
    }

    /// Makes every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeLogStore for MemoryChangeLog {
    fn changes_after(&self, cursor: u64) -> StoreResult<Vec<ChangeRecord>> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .changes
            .iter()
            .filter(|c| c.id > cursor)
            .cloned()
            .collect())
    }

    fn delete_through(&self, cursor: u64) -> StoreResult<usize> {
        self.check_available()?;
        let mut state = self.state.lock();
        let before = state.changes.len();
        state.changes.retain(|c| c.id > cursor);
        Ok(before - state.changes.len())
    }

    fn discard_all(&self) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.lock();
        state.changes.clear();
        state.optimistic.clear();
        Ok(())
    }

    fn listen(&self, channel: &str, listener: Listener) -> Subscription {
        self.notifier.listen(channel, listener)
    }
}


