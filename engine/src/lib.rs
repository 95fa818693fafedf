//! # Reel Engine
//!
//! The conflict-resolution core for Reel's offline-first watchlist.
//!
//! This crate holds the pure logic of the sync engine: vector clocks for
//! per-device causal ordering, the watchlist record model, the replay
//! operation union, and the deterministic conflict resolver. It has no
//! knowledge of storage, network, or tabs - those live in `reel-client`.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches files, databases, or the network
//! - **Deterministic**: the same inputs always produce the same winner
//! - **Testable**: pure values in, pure values out, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Vector clocks
//!
//! Every mutation a device produces increments that device's entry in the
//! record's [`VectorClock`]. Comparing two clocks yields a [`Causality`]:
//! one version causally dominates the other, or the two are concurrent and
//! must be tie-broken by the resolver.
//!
//! ### Records
//!
//! A [`WatchlistItem`] is keyed by `(user_id, item_id)` - uniqueness is per
//! user, not global. Removal is a hard delete of the keyed record; the
//! queued [`SyncOperation`] is what survives a removal for replay.
//!
//! ### Operations
//!
//! Pending remote-replay intents are expressed as a tagged
//! [`OperationKind`] union (`ADD`, `REMOVE`, and the review family), each
//! case carrying only the fields it needs. Retry bookkeeping
//! ([`SyncOperation::record_failure`]) is part of the value so backoff
//! growth can be tested without a queue.
//!
//! ### Resolution
//!
//! [`resolve`] merges two concurrent versions of the same record:
//! causal dominance wins outright, wall-clock `updated_at` breaks
//! concurrent ties, and the winner always carries the merged clock so
//! causal history is never lost.
//!
//! ## Quick Start
//!
//! ```rust
//! use reel_engine::{resolve, ResolveAction, VectorClock, WatchlistItem};
//!
//! let local = WatchlistItem::new(
//!     "42", "user-1", "Dune", "https://img/dune.jpg", 2021,
//!     100, VectorClock::new().increment("device-a"), "device-a",
//! );
//! let remote = WatchlistItem::new(
//!     "42", "user-1", "Dune (4K remaster)", "https://img/dune.jpg", 2021,
//!     200, VectorClock::new().increment("device-b"), "device-b",
//! );
//!
//! // Concurrent clocks, so the later wall-clock edit wins, and the
//! // winner's clock covers both devices.
//! let resolution = resolve(&local, &remote);
//! assert_eq!(resolution.action, ResolveAction::UpdateFromRemote);
//! assert_eq!(resolution.winner.vector_clock.get("device-a"), 1);
//! assert_eq!(resolution.winner.vector_clock.get("device-b"), 1);
//! ```

pub mod clock;
pub mod error;
pub mod operation;
pub mod record;
pub mod resolve;

// Re-export main types at crate root
pub use clock::{Causality, VectorClock};
pub use error::Error;
pub use operation::{
    OperationId, OperationKind, SyncOperation, BACKOFF_BASE_MS, MAX_REPLAY_ATTEMPTS,
};
pub use record::{Review, ReviewVote, VoteDirection, WatchlistItem};
pub use resolve::{
    resolve, resolve_removal, RemovalNotice, RemovalOutcome, Resolution, ResolveAction,
};

/// Type aliases for clarity
pub type DeviceId = String;
pub type UserId = String;
pub type ItemId = String;
pub type ReviewId = String;
pub type Timestamp = u64;
