//! Mapping remote responses to reconciliation decisions.

use crate::error::SyncResult;
use crate::transport::TransportResponse;

/// What the synchronizer does with a sent batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The remote side took the batch; drop it from the log and advance.
    Accepted,
    /// The remote side refused the batch; discard all local optimism.
    Rejected,
    /// Nothing is decided; leave the log alone and try again later.
    Retry,
}

impl Verdict {
    /// Maps an HTTP status code.
    ///
    /// 2xx accepts, 4xx rejects, everything else retries.
    pub fn from_status(status: u16) -> Self {
        Self::from_response(&TransportResponse::new(status))
    }

    /// Maps a transport response.
    pub fn from_response(response: &TransportResponse) -> Self {
        if response.is_success() {
            Verdict::Accepted
        } else if response.is_client_error() {
            Verdict::Rejected
        } else {
            Verdict::Retry
        }
    }

    /// Maps the outcome of a transport call. Any error retries.
    pub fn from_outcome(outcome: &SyncResult<TransportResponse>) -> Self {
        match outcome {
            Ok(response) => Self::from_response(response),
            Err(_) => Verdict::Retry,
        }
    }
}


