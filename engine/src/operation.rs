//! Replay operations: the durable intents behind every local mutation.
//!
//! A toggle or review action is applied optimistically and then queued as a
//! [`SyncOperation`] for the background agent to replay against the remote
//! API. The operation's clock is a snapshot taken at enqueue time and is
//! never touched again, even if the underlying record keeps changing - a
//! newer operation for the same key coexists in the queue instead.

use crate::{
    error::Result, DeviceId, Error, ItemId, Review, ReviewId, ReviewVote, Timestamp, UserId,
    VectorClock, WatchlistItem,
};
use serde::{Deserialize, Serialize};

/// Unique identifier for a queued operation (queue-local).
pub type OperationId = String;

/// How many delivery attempts an operation gets before it is dead-lettered.
pub const MAX_REPLAY_ATTEMPTS: u32 = 5;

/// Base unit of the exponential backoff schedule.
pub const BACKOFF_BASE_MS: u64 = 1000;

/// The payload of a replay intent, one case per operation type.
///
/// Decoded explicitly at the replay boundary; nothing downstream inspects
/// loose JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum OperationKind {
    /// Add a title to the watchlist; carries the full record so replay
    /// works after the local record has been removed again.
    Add { item: WatchlistItem },
    /// Remove a title from the watchlist.
    Remove { user_id: UserId, item_id: ItemId },
    ReviewAdd { review: Review },
    ReviewUpdate { review: Review },
    ReviewDelete {
        review_id: ReviewId,
        item_id: ItemId,
        user_id: UserId,
    },
    ReviewVote { vote: ReviewVote },
}

impl OperationKind {
    /// The user this operation belongs to.
    pub fn user_id(&self) -> &str {
        match self {
            OperationKind::Add { item } => &item.user_id,
            OperationKind::Remove { user_id, .. } => user_id,
            OperationKind::ReviewAdd { review } | OperationKind::ReviewUpdate { review } => {
                &review.user_id
            }
            OperationKind::ReviewDelete { user_id, .. } => user_id,
            OperationKind::ReviewVote { vote } => &vote.user_id,
        }
    }

    /// The watchlist item this operation targets, when it targets one.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            OperationKind::Add { item } => Some(&item.item_id),
            OperationKind::Remove { item_id, .. } => Some(item_id),
            OperationKind::ReviewAdd { review } | OperationKind::ReviewUpdate { review } => {
                Some(&review.item_id)
            }
            OperationKind::ReviewDelete { item_id, .. } => Some(item_id),
            OperationKind::ReviewVote { .. } => None,
        }
    }

    /// Validate the payload shape before it is allowed into the queue.
    pub fn validate(&self) -> Result<()> {
        fn required(value: &str, field: &'static str) -> Result<()> {
            if value.trim().is_empty() {
                Err(Error::MissingRequiredField(field))
            } else {
                Ok(())
            }
        }

        match self {
            OperationKind::Add { item } => {
                required(&item.user_id, "userId")?;
                required(&item.item_id, "itemId")?;
                required(&item.title, "title")?;
                if let Some(rating) = item.rating {
                    if !(0.0..=10.0).contains(&rating) {
                        return Err(Error::InvalidPayload(format!(
                            "rating {rating} outside 0..=10"
                        )));
                    }
                }
                Ok(())
            }
            OperationKind::Remove { user_id, item_id } => {
                required(user_id, "userId")?;
                required(item_id, "itemId")
            }
            OperationKind::ReviewAdd { review } | OperationKind::ReviewUpdate { review } => {
                required(&review.review_id, "reviewId")?;
                required(&review.user_id, "userId")?;
                required(&review.item_id, "itemId")?;
                required(&review.body, "body")?;
                if !(0.0..=10.0).contains(&review.rating) {
                    return Err(Error::InvalidPayload(format!(
                        "rating {} outside 0..=10",
                        review.rating
                    )));
                }
                Ok(())
            }
            OperationKind::ReviewDelete {
                review_id,
                item_id,
                user_id,
            } => {
                required(review_id, "reviewId")?;
                required(item_id, "itemId")?;
                required(user_id, "userId")
            }
            OperationKind::ReviewVote { vote } => {
                required(&vote.review_id, "reviewId")?;
                required(&vote.user_id, "userId")
            }
        }
    }
}

/// A durable queue entry awaiting replay against the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Queue-local unique identifier
    pub id: OperationId,
    /// The intent payload
    pub kind: OperationKind,
    /// Clock snapshot taken at enqueue time; never mutated afterwards
    pub vector_clock: VectorClock,
    /// Device that enqueued this operation
    pub device_id: DeviceId,
    /// Enqueue time (milliseconds since epoch)
    pub timestamp: Timestamp,
    /// Failed delivery attempts so far
    pub retry_count: u32,
    /// Message of the most recent failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Earliest time the next attempt is due, set after a failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<Timestamp>,
}

impl SyncOperation {
    /// Create a fresh operation with a zeroed retry budget.
    pub fn new(
        id: impl Into<OperationId>,
        kind: OperationKind,
        clock: VectorClock,
        device_id: impl Into<DeviceId>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            vector_clock: clock,
            device_id: device_id.into(),
            timestamp,
            retry_count: 0,
            last_error: None,
            next_retry_at: None,
        }
    }

    /// Record a failed delivery attempt.
    ///
    /// Bumps the retry count and schedules the next attempt at
    /// `now + 2^retry_count * 1000ms`, so the k-th failure backs off by
    /// 2^k seconds (ceiling of 5 attempts => at most ~32s).
    pub fn record_failure(&mut self, error: impl Into<String>, now: Timestamp) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
        self.next_retry_at = Some(now + (1u64 << self.retry_count) * BACKOFF_BASE_MS);
    }

    /// True once the retry budget is spent and the operation must be
    /// dead-lettered instead of attempted.
    pub fn budget_exhausted(&self) -> bool {
        self.retry_count >= MAX_REPLAY_ATTEMPTS
    }
}
