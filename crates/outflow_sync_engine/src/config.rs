//! Configuration for the synchronizer.

use crate::error::{SyncError, SyncResult};
use std::time::Duration;

/// Default pause between consecutive processing cycles.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Configuration for the synchronizer and its HTTP transport.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the API (e.g., "https://example.com/api").
    pub api_base: String,
    /// Path of the mutation-ingestion endpoint, appended to `api_base`.
    pub endpoint: String,
    /// Server-side relation named in every mutation's metadata.
    pub relation: String,
    /// Store notification channel to listen on.
    pub channel: String,
    /// Pause before another cycle when more work arrived or a retry is due.
    pub retry_delay: Duration,
    /// Per-request timeout. `None` leaves the request bounded only by
    /// cancellation.
    pub request_timeout: Option<Duration>,
    /// Cursor to start from. Records with id at or below it are considered
    /// already accepted.
    pub initial_position: u64,
    /// How often to ask the store for writes committed outside this process.
    /// `None` relies on in-process notifications only.
    pub poll_interval: Option<Duration>,
}

impl SyncConfig {
    /// Creates a new configuration for the API at `api_base`.
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            endpoint: "/ingest/mutations".into(),
            relation: "users".into(),
            channel: "changes".into(),
            retry_delay: DEFAULT_RETRY_DELAY,
            request_timeout: None,
            initial_position: 0,
            poll_interval: None,
        }
    }

    /// Sets the ingestion endpoint path.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the relation name.
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = relation.into();
        self
    }

    /// Sets the notification channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Sets the delay between cycles.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the starting cursor.
    pub fn with_initial_position(mut self, position: u64) -> Self {
        self.initial_position = position;
        self
    }

    /// Sets the external-change poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Full URL of the ingestion endpoint.
    pub fn mutations_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> SyncResult<()> {
        if self.api_base.trim().is_empty() {
            return Err(SyncError::Config("api_base must not be empty".into()));
        }
        if self.relation.trim().is_empty() {
            return Err(SyncError::Config("relation must not be empty".into()));
        }
        if self.channel.is_empty() {
            return Err(SyncError::Config("channel must not be empty".into()));
        }
        if self.poll_interval.is_some_and(|i| i.is_zero()) {
            return Err(SyncError::Config("poll_interval must be positive".into()));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::new("https://example.com/api");
        assert_eq!(config.endpoint, "/ingest/mutations");
        assert_eq!(config.relation, "users");
        assert_eq!(config.channel, "changes");
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.initial_position, 0);
        assert_eq!(config.poll_interval, None);
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://example.com/api")
            .with_relation("notes")
            .with_channel("note_changes")
            .with_retry_delay(Duration::from_millis(50))
            .with_request_timeout(Duration::from_secs(10))
            .with_initial_position(42);

        assert_eq!(config.relation, "notes");
        assert_eq!(config.channel, "note_changes");
        assert_eq!(config.retry_delay, Duration::from_millis(50));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.initial_position, 42);
    }

    #[test]
    fn mutations_url_joins_cleanly() {
        let config = SyncConfig::new("http://localhost:4403/");
        assert_eq!(config.mutations_url(), "http://localhost:4403/ingest/mutations");

        let config = SyncConfig::new("http://localhost:4403").with_endpoint("v1/ingest");
        assert_eq!(config.mutations_url(), "http://localhost:4403/v1/ingest");
    }

    #[test]
    fn validation() {
        assert!(SyncConfig::default().validate().is_err());
        assert!(SyncConfig::new("http://x").with_relation(" ").validate().is_err());
        assert!(SyncConfig::new("http://x").validate().is_ok());
        assert!(SyncConfig::new("http://x")
            .with_poll_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(SyncConfig::new("http://x")
            .with_poll_interval(Duration::from_millis(250))
            .validate()
            .is_ok());
    }
}
