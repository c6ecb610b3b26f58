//! Sync command implementation.

use super::open_store;
use outflow_sync_engine::{HttpTransport, SyncConfig, SyncStats, Synchronizer};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Options for the sync command.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Base URL of the API.
    pub api_base: String,
    /// Relation named in each mutation.
    pub relation: String,
    /// Pause between cycles in milliseconds.
    pub retry_delay_ms: u64,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// How often watch mode checks for writes from other processes.
    pub poll_ms: u64,
    /// Keep running until interrupted.
    pub watch: bool,
}

impl SyncOptions {
    /// Builds the synchronizer configuration.
    pub fn config(&self) -> SyncConfig {
        let mut config = SyncConfig::new(self.api_base.clone())
            .with_relation(self.relation.clone())
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms));
        if let Some(timeout) = self.timeout_ms {
            config = config.with_request_timeout(Duration::from_millis(timeout));
        }
        if self.watch {
            config = config.with_poll_interval(Duration::from_millis(self.poll_ms));
        }
        config
    }
}

/// Runs the sync command.
///
/// Without `watch`, returns once the synchronizer goes idle, meaning the log
/// was either propagated or rolled back. With `watch`, keeps propagating,
/// including writes other processes commit to the same file, until Ctrl-C.
pub async fn run(path: &Path, options: SyncOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = options.config();
    config.validate()?;

    let store = Arc::new(open_store(path)?);
    let transport = Arc::new(HttpTransport::new(&config));
    info!(url = %transport.url(), pending = store.pending_count()?, "starting sync");

    let sync = Synchronizer::new(config, Arc::clone(&store), transport);
    let mut status = sync.watch_status();
    sync.start()?;
    if options.watch {
        info!(
            relation = %sync.config().relation,
            poll_ms = options.poll_ms,
            "watching for local writes"
        );
    }

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if !options.watch && !current.is_active() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    sync.stop().await;
    print_summary(&sync.stats(), sync.position(), store.pending_count()?);
    Ok(())
}

fn print_summary(stats: &SyncStats, position: u64, pending: usize) {
    println!("Sync summary");
    println!("============");
    println!("  Batches sent:  {}", stats.batches_sent);
    println!("  Mutations:     {}", stats.mutations_sent);
    println!("  Accepted:      {}", stats.accepted);
    println!("  Rejected:      {}", stats.rejected);
    println!("  Retries:       {}", stats.retries);
    println!("  Position:      {position}");
    println!("  Still pending: {pending}");
    if let Some(error) = &stats.last_error {
        println!("  Last error:    {error}");
    }
}


