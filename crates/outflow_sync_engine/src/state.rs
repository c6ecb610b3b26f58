//! Synchronizer state machine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{MutationTransport, TransportResponse};
use crate::verdict::Verdict;
use outflow_protocol::MutationBatch;
use outflow_store::{ChangeLogStore, Subscription};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// The current state of the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Nothing is running; the next notification starts a cycle.
    Idle,
    /// A drain-and-send cycle (or the pause between two) is running.
    Processing,
    /// `stop()` was called; no further cycles will run.
    Stopped,
}

impl SyncStatus {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Processing)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Number of drain cycles run, including empty ones.
    pub cycles: u64,
    /// Number of batches handed to the transport.
    pub batches_sent: u64,
    /// Number of mutations across all sent batches.
    pub mutations_sent: u64,
    /// Batches the remote side accepted.
    pub accepted: u64,
    /// Batches the remote side rejected.
    pub rejected: u64,
    /// Cycles that ended in a retry, including local store failures.
    pub retries: u64,
    /// Verdict of the most recent send.
    pub last_verdict: Option<Verdict>,
    /// Time of the last accepted batch.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

struct Control {
    status: SyncStatus,
    /// Set by notifications that arrive mid-cycle and by retry verdicts.
    dirty: bool,
    should_continue: bool,
    started: bool,
    cursor: u64,
    cancel: CancellationToken,
    runtime: Option<Handle>,
    worker: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
}

struct Shared<S, T> {
    config: SyncConfig,
    store: Arc<S>,
    transport: Arc<T>,
    control: Mutex<Control>,
    stats: RwLock<SyncStats>,
    status_tx: watch::Sender<SyncStatus>,
}

/// Drains the local change log and propagates it to the remote side.
///
/// At most one cycle runs at a time. Notifications that arrive while a cycle
/// is running only mark the synchronizer dirty; the running cycle picks the
/// new work up after [`SyncConfig::retry_delay`].
///
/// # Example
///
/// ```rust,no_run
/// use outflow_store::MemoryChangeLog;
/// use outflow_sync_engine::{HttpTransport, SyncConfig, Synchronizer};
/// use std::sync::Arc;
///
/// # async fn run() -> outflow_sync_engine::SyncResult<()> {
/// let config = SyncConfig::new("http://localhost:4403");
/// let store = Arc::new(MemoryChangeLog::new());
/// let transport = Arc::new(HttpTransport::new(&config));
///
/// let sync = Synchronizer::new(config, store, transport);
/// sync.start()?;
/// // ... local writes are propagated in the background ...
/// sync.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Synchronizer<S: ChangeLogStore, T: MutationTransport> {
    shared: Arc<Shared<S, T>>,
    subscription: Mutex<Option<Subscription>>,
}

impl<S: ChangeLogStore, T: MutationTransport> Synchronizer<S, T> {
    /// Creates a synchronizer. Nothing runs until [`start`](Self::start).
    pub fn new(config: SyncConfig, store: Arc<S>, transport: Arc<T>) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::Idle);
        let cursor = config.initial_position;

        Self {
            shared: Arc::new(Shared {
                config,
                store,
                transport,
                control: Mutex::new(Control {
                    status: SyncStatus::Idle,
                    dirty: false,
                    should_continue: true,
                    started: false,
                    cursor,
                    cancel: CancellationToken::new(),
                    runtime: None,
                    worker: None,
                    poller: None,
                }),
                stats: RwLock::new(SyncStats::default()),
                status_tx,
            }),
            subscription: Mutex::new(None),
        }
    }

    /// Subscribes to change notifications and runs the first cycle.
    ///
    /// Must be called from within a Tokio runtime; cycles are spawned on it.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadyStarted`] if already running
    /// - [`SyncError::Stopped`] after [`stop`](Self::stop)
    /// - [`SyncError::NoRuntime`] outside a Tokio runtime
    /// - [`SyncError::Config`] if the configuration is invalid
    pub fn start(&self) -> SyncResult<()> {
        self.shared.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;

        let mut subscription = self.subscription.lock();
        {
            let mut control = self.shared.control.lock();
            if !control.should_continue {
                return Err(SyncError::Stopped);
            }
            if control.started {
                return Err(SyncError::AlreadyStarted);
            }
            control.started = true;
            control.cancel = CancellationToken::new();
            if let Some(period) = self.shared.config.poll_interval {
                control.poller = Some(runtime.spawn(poll_store(
                    Arc::clone(&self.shared.store),
                    period,
                    control.cancel.clone(),
                )));
            }
            control.runtime = Some(runtime);
        }

        let weak = Arc::downgrade(&self.shared);
        *subscription = Some(self.shared.store.listen(
            &self.shared.config.channel,
            Arc::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.wake();
                }
            }),
        ));

        info!(
            url = %self.shared.config.mutations_url(),
            cursor = self.position(),
            "synchronizer started"
        );
        self.shared.wake();
        Ok(())
    }

    /// Stops the synchronizer.
    ///
    /// Prevents further cycles, cancels an in-flight send, unsubscribes from
    /// change notifications, and waits for the running cycle and the store
    /// poller to wind down.
    /// Safe to call at any time, including more than once.
    pub async fn stop(&self) {
        let (worker, poller) = {
            let mut control = self.shared.control.lock();
            control.should_continue = false;
            control.cancel.cancel();
            if control.status == SyncStatus::Idle {
                control.status = SyncStatus::Stopped;
                self.shared.status_tx.send_replace(SyncStatus::Stopped);
            }
            (control.worker.take(), control.poller.take())
        };

        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }

        for task in [worker, poller].into_iter().flatten() {
            if let Err(e) = task.await {
                warn!(error = %e, "sync task ended abnormally");
            }
        }

        info!(cursor = self.position(), "synchronizer stopped");
    }

    /// Returns the current state.
    pub fn status(&self) -> SyncStatus {
        self.shared.control.lock().status
    }

    /// Returns a receiver that observes every state transition.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Returns the id of the last change known to be accepted.
    pub fn position(&self) -> u64 {
        self.shared.control.lock().cursor
    }

    /// Returns the current stats.
    pub fn stats(&self) -> SyncStats {
        self.shared.stats.read().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }
}

impl<S: ChangeLogStore, T: MutationTransport> Drop for Synchronizer<S, T> {
    fn drop(&mut self) {
        let mut control = self.shared.control.lock();
        control.should_continue = false;
        control.cancel.cancel();
    }
}

impl<S: ChangeLogStore, T: MutationTransport> Shared<S, T> {
    /// Change notification entry point.
    fn wake(self: &Arc<Self>) {
        let mut control = self.control.lock();
        if !control.should_continue || !control.started {
            return;
        }
        if control.status == SyncStatus::Processing {
            control.dirty = true;
            trace!("notified while processing");
            return;
        }
        let Some(runtime) = control.runtime.clone() else {
            return;
        };

        control.status = SyncStatus::Processing;
        self.status_tx.send_replace(SyncStatus::Processing);
        let shared = Arc::clone(self);
        control.worker = Some(runtime.spawn(async move { shared.run().await }));
    }

    async fn run(self: Arc<Self>) {
        loop {
            let (cursor, cancel) = {
                let mut control = self.control.lock();
                if control.cancel.is_cancelled() {
                    self.settle(&mut control);
                    return;
                }
                control.dirty = false;
                (control.cursor, control.cancel.clone())
            };

            self.process(cursor, &cancel).await;

            {
                let mut control = self.control.lock();
                if !(control.dirty && control.should_continue) {
                    self.settle(&mut control);
                    return;
                }
            }

            debug!(
                delay_ms = self.config.retry_delay.as_millis() as u64,
                "more work pending, waiting before next cycle"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_delay) => {}
                _ = cancel.cancelled() => {
                    self.settle(&mut self.control.lock());
                    return;
                }
            }
        }
    }

    /// Leaves `Processing`. Called with the same guard that checked the
    /// dirty flag, so a notification cannot fall between the two.
    fn settle(&self, control: &mut Control) {
        let status = if control.should_continue {
            SyncStatus::Idle
        } else {
            SyncStatus::Stopped
        };
        control.status = status;
        self.status_tx.send_replace(status);
        debug!(status = ?status, cursor = control.cursor, "cycle finished");
    }

    /// One drain, send, and apply pass.
    async fn process(&self, cursor: u64, cancel: &CancellationToken) {
        self.stats.write().cycles += 1;

        let changes = match self.store.changes_after(cursor) {
            Ok(changes) => changes,
            Err(e) => {
                self.store_failed("drain", &SyncError::from(e));
                return;
            }
        };
        let Some(position) = changes.last().map(|c| c.id) else {
            trace!(cursor, "no pending changes");
            return;
        };

        let batch = MutationBatch::from_changes(&changes, &self.config.relation);
        trace!(
            changes = changes.len(),
            mutations = batch.len(),
            position,
            "sending batch"
        );

        let outcome = self.transport.send(&batch, cancel).await;
        if outcome.is_err() && cancel.is_cancelled() {
            self.record_interrupted(&batch);
            return;
        }
        let verdict = Verdict::from_outcome(&outcome);
        self.record_send(&batch, verdict, &outcome);

        match verdict {
            Verdict::Accepted => {
                if let Err(e) = self.proceed(position) {
                    self.store_failed("proceed", &e);
                }
            }
            Verdict::Rejected => {
                if let Err(e) = self.rollback() {
                    self.store_failed("rollback", &e);
                }
            }
            Verdict::Retry => {
                self.control.lock().dirty = true;
            }
        }
    }

    /// Drops acknowledged changes and advances the cursor.
    fn proceed(&self, position: u64) -> SyncResult<()> {
        let removed = self.store.delete_through(position)?;
        let mut control = self.control.lock();
        control.cursor = control.cursor.max(position);
        debug!(cursor = control.cursor, removed, "batch accepted");
        Ok(())
    }

    /// Discards every queued change and all optimistic rows.
    fn rollback(&self) -> SyncResult<()> {
        self.store.discard_all()?;
        debug!("batch rejected, local changes discarded");
        Ok(())
    }

    fn record_send(
        &self,
        batch: &MutationBatch,
        verdict: Verdict,
        outcome: &SyncResult<TransportResponse>,
    ) {
        let mut stats = self.stats.write();
        stats.batches_sent += 1;
        stats.mutations_sent += batch.len() as u64;
        stats.last_verdict = Some(verdict);

        match verdict {
            Verdict::Accepted => {
                stats.accepted += 1;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
            }
            Verdict::Rejected => stats.rejected += 1,
            Verdict::Retry => stats.retries += 1,
        }

        match outcome {
            Ok(response) if verdict != Verdict::Accepted => {
                stats.last_error = Some(format!("remote responded with status {}", response.status));
            }
            Err(e) => stats.last_error = Some(e.to_string()),
            Ok(_) => {}
        }
        debug!(verdict = ?verdict, mutations = batch.len(), "batch sent");
    }

    /// A send cut short by `stop()` decides nothing; the batch stays queued.
    fn record_interrupted(&self, batch: &MutationBatch) {
        let mut stats = self.stats.write();
        stats.batches_sent += 1;
        stats.mutations_sent += batch.len() as u64;
        debug!(mutations = batch.len(), "send interrupted by stop");
    }

    fn store_failed(&self, step: &str, error: &SyncError) {
        warn!(step, error = %error, "local store failed, will retry");
        {
            let mut stats = self.stats.write();
            stats.retries += 1;
            stats.last_error = Some(error.to_string());
        }
        self.control.lock().dirty = true;
    }
}

/// Periodically asks the store for writes made outside this process. A hit
/// notifies the store's channel, which wakes the synchronizer like a local
/// write would.
async fn poll_store<S: ChangeLogStore>(
    store: Arc<S>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = store.poll_external_changes() {
                    warn!(error = %e, "polling for external writes failed");
                }
            }
            _ = cancel.cancelled() => return,
        }
    }
}


