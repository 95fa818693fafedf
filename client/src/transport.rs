//! Remote replay boundary.
//!
//! The replay agent only ever needs "deliver this operation, tell me if it
//! stuck". Everything that can go wrong on the way - timeout, non-success
//! status, connection refused - is equally retryable, so the error type
//! does not grade failures beyond what the logs want to say.

use async_trait::async_trait;
use reel_engine::{OperationKind, SyncOperation};
use thiserror::Error;

/// Failures delivering one operation. All retryable.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("attempt timed out")]
    Timeout,

    #[error("remote returned status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),
}

/// Delivery seam between the replay agent and the remote API.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Replay one operation against the remote side.
    ///
    /// `Ok(())` means the remote accepted the intent; anything else leaves
    /// the operation queued for retry. The full operation is sent so the
    /// remote can deduplicate on `(device_id, vector_clock)`.
    async fn deliver(&self, op: &SyncOperation) -> Result<(), TransportError>;
}

/// HTTP implementation posting each operation type to its endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the given API base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, kind: &OperationKind) -> String {
        let path = match kind {
            OperationKind::Add { .. } => "watchlist/add",
            OperationKind::Remove { .. } => "watchlist/remove",
            OperationKind::ReviewAdd { .. } => "reviews/add",
            OperationKind::ReviewUpdate { .. } => "reviews/update",
            OperationKind::ReviewDelete { .. } => "reviews/delete",
            OperationKind::ReviewVote { .. } => "reviews/vote",
        };
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn deliver(&self, op: &SyncOperation) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.endpoint(&op.kind))
            .json(op)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_engine::{VectorClock, WatchlistItem};

    #[test]
    fn endpoints_are_per_operation_type() {
        let transport = HttpTransport::new("https://api.reel.example/sync/");

        let add = OperationKind::Add {
            item: WatchlistItem::new(
                "42",
                "user-1",
                "Dune",
                "https://img/dune.jpg",
                2021,
                1000,
                VectorClock::new(),
                "device-a",
            ),
        };
        assert_eq!(
            transport.endpoint(&add),
            "https://api.reel.example/sync/watchlist/add"
        );

        let remove = OperationKind::Remove {
            user_id: "user-1".into(),
            item_id: "42".into(),
        };
        assert_eq!(
            transport.endpoint(&remove),
            "https://api.reel.example/sync/watchlist/remove"
        );
    }
}
