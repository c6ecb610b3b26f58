//! Transport layer abstraction for sending mutation batches.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use outflow_protocol::MutationBatch;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Response of the ingestion endpoint, reduced to what the verdict needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
}

impl TransportResponse {
    /// Creates a response with the given status.
    pub fn new(status: u16) -> Self {
        Self { status }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for 4xx statuses.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

/// A mutation transport delivers batches to the ingestion endpoint.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, mock for testing, etc.).
///
/// Implementations must resolve promptly once `cancel` fires, returning
/// [`SyncError::Cancelled`].
#[async_trait]
pub trait MutationTransport: Send + Sync + 'static {
    /// Sends one batch and returns the remote response.
    async fn send(
        &self,
        batch: &MutationBatch,
        cancel: &CancellationToken,
    ) -> SyncResult<TransportResponse>;
}

/// A scripted reply for [`MockTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockReply {
    /// Respond with this status.
    Status(u16),
    /// Fail as if the connection dropped.
    NetworkError,
    /// Never respond; resolve only when cancelled.
    Hang,
}

/// A mock transport for testing.
///
/// Replies are taken from a queue; once it is empty every send gets `200`.
/// The mock records every batch and tracks how many sends overlap.
#[derive(Debug)]
pub struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    latency: Mutex<Duration>,
    sent: Mutex<Vec<MutationBatch>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    cancellations: AtomicUsize,
}

impl MockTransport {
    /// Creates a mock that accepts everything.
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            latency: Mutex::new(Duration::ZERO),
            sent: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
        }
    }

    /// Queues a reply for a future send.
    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().push_back(reply);
    }

    /// Sets a delay applied before every reply.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Returns all batches sent so far.
    pub fn sent(&self) -> Vec<MutationBatch> {
        self.sent.lock().clone()
    }

    /// Returns the number of sends so far.
    pub fn send_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Returns the number of sends currently in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Returns the highest number of sends ever in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Returns the number of sends that ended because they were cancelled.
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    fn cancelled(&self) -> SyncError {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
        SyncError::Cancelled
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MutationTransport for MockTransport {
    async fn send(
        &self,
        batch: &MutationBatch,
        cancel: &CancellationToken,
    ) -> SyncResult<TransportResponse> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        self.sent.lock().push(batch.clone());
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or(MockReply::Status(200));

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(latency) => {}
                _ = cancel.cancelled() => return Err(self.cancelled()),
            }
        }

        match reply {
            MockReply::Status(status) => Ok(TransportResponse::new(status)),
            MockReply::NetworkError => Err(SyncError::transport_retryable("connection reset")),
            MockReply::Hang => {
                cancel.cancelled().await;
                Err(self.cancelled())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn mock_replies_in_order_then_accepts() {
        let transport = MockTransport::new();
        transport.push_reply(MockReply::Status(422));
        transport.push_reply(MockReply::NetworkError);

        let token = CancellationToken::new();
        let batch = MutationBatch::default();

        assert_eq!(transport.send(&batch, &token).await.unwrap().status, 422);
        assert!(matches!(
            transport.send(&batch, &token).await,
            Err(SyncError::Transport { retryable: true, .. })
        ));
        assert!(transport.send(&batch, &token).await.unwrap().is_success());
        assert_eq!(transport.send_count(), 3);
        assert_eq!(transport.in_flight(), 0);
        assert_eq!(transport.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn mock_hang_resolves_on_cancel() {
        let transport = Arc::new(MockTransport::new());
        transport.push_reply(MockReply::Hang);
        let token = CancellationToken::new();

        let task = {
            let transport = Arc::clone(&transport);
            let token = token.clone();
            tokio::spawn(async move { transport.send(&MutationBatch::default(), &token).await })
        };

        while transport.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        token.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert_eq!(transport.cancellations(), 1);
        assert_eq!(transport.in_flight(), 0);
    }

    #[test]
    fn response_success_range() {
        assert!(TransportResponse::new(200).is_success());
        assert!(TransportResponse::new(299).is_success());
        assert!(!TransportResponse::new(300).is_success());
        assert!(!TransportResponse::new(404).is_success());
        assert!(TransportResponse::new(404).is_client_error());
        assert!(!TransportResponse::new(500).is_client_error());
    }
}
