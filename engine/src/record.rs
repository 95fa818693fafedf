//! Record types for the watchlist and the review operation payloads.

use crate::{DeviceId, ItemId, ReviewId, Timestamp, UserId, VectorClock};
use serde::{Deserialize, Serialize};

/// A watchlist entry, keyed by the composite `(user_id, item_id)`.
///
/// Uniqueness is per user, not global: two users saving the same title hold
/// two independent records with independent causal histories. Every
/// mutation a device produces must carry a clock whose entry for that
/// device is >= the entry on the version it replaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistItem {
    /// Catalog identifier of the title
    pub item_id: ItemId,
    /// Owner of this watchlist entry
    pub user_id: UserId,
    /// Display title
    pub title: String,
    /// Poster image URL
    pub poster_url: String,
    /// Release year of the title
    pub release_year: u16,
    /// User rating, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    /// When the record was first created (milliseconds since epoch)
    pub added_at: Timestamp,
    /// When the record was last mutated (milliseconds since epoch)
    pub updated_at: Timestamp,
    /// Causal history of this version
    pub vector_clock: VectorClock,
    /// Device that produced the current version
    pub device_id: DeviceId,
}

impl WatchlistItem {
    /// Create a new record; `added_at` and `updated_at` start equal.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        item_id: impl Into<ItemId>,
        user_id: impl Into<UserId>,
        title: impl Into<String>,
        poster_url: impl Into<String>,
        release_year: u16,
        timestamp: Timestamp,
        clock: VectorClock,
        device_id: impl Into<DeviceId>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            user_id: user_id.into(),
            title: title.into(),
            poster_url: poster_url.into(),
            release_year,
            rating: None,
            added_at: timestamp,
            updated_at: timestamp,
            vector_clock: clock,
            device_id: device_id.into(),
        }
    }

    /// Attach a rating.
    #[must_use]
    pub fn with_rating(mut self, rating: f32) -> Self {
        self.rating = Some(rating);
        self
    }

    /// The composite key this record is stored under.
    pub fn key(&self) -> (&str, &str) {
        (&self.user_id, &self.item_id)
    }

    /// True when `other` is a version of the same keyed record.
    pub fn same_key(&self, other: &WatchlistItem) -> bool {
        self.user_id == other.user_id && self.item_id == other.item_id
    }

    /// Stamp a new version: bump `updated_at`, replace the clock, and
    /// record the mutating device. `added_at` never changes.
    pub fn touch(&mut self, timestamp: Timestamp, clock: VectorClock, device_id: impl Into<DeviceId>) {
        self.updated_at = timestamp;
        self.vector_clock = clock;
        self.device_id = device_id.into();
    }
}

/// A review on a catalog item, carried through the replay queue.
///
/// Reviews are not materialized in the local record store - moderation and
/// voting live behind the remote boundary. The engine only knows the shape
/// well enough to validate and replay it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub review_id: ReviewId,
    pub item_id: ItemId,
    pub user_id: UserId,
    /// Review text
    pub body: String,
    /// Star rating attached to the review
    pub rating: f32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Direction of a review vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

/// A vote cast on someone else's review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewVote {
    pub review_id: ReviewId,
    pub user_id: UserId,
    pub direction: VoteDirection,
}
