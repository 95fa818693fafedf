//! # Reel Client
//!
//! The offline-first sync client for Reel's watchlist. Everything a device
//! needs to let a user add and remove titles while disconnected, keep
//! several open tabs consistent, and eventually reconcile with the remote
//! API - without losing or duplicating intents.
//!
//! ## Architecture
//!
//! - [`RecordStore`] / [`OperationQueue`] - two durable SQLite-backed
//!   stores, one for confirmed records keyed by `(user_id, item_id)` and
//!   one for the replay queue keyed by its own operation id. Both survive
//!   process restarts and are shared by every open view.
//! - [`ReplayAgent`] - a long-lived background task, independent of any
//!   view, that drains the queue against the remote API with a bounded
//!   per-attempt timeout, exponential backoff, and a dead-letter ceiling.
//! - [`TabChannel`] - an advisory broadcast channel carrying "the store
//!   changed, re-read it" notices between open views. Never a source of
//!   truth, never a lock.
//! - [`SessionController`] - the per-view state machine: optimistic toggle,
//!   write-through to both stores, undo toast, and remote-version merging
//!   via the engine's resolver.
//!
//! Conflict resolution itself is pure and lives in [`reel_engine`].
//!
//! ## Correctness model
//!
//! Durability carries the correctness burden, not timing: replay triggers
//! are best-effort and the agent only has to run *eventually*. Local
//! mutation is authoritative from the user's point of view until
//! reconciliation; the UI never blocks or rolls back on network failure.

pub mod channel;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod device;
pub mod error;
pub mod queue;
pub mod replay;
pub mod runtime;
pub mod session;
pub mod store;
pub mod time;
pub mod transport;

pub use channel::{ChangeNotice, StoreEvent, Subscription, TabChannel, TabId};
pub use config::{Config, ConfigError};
pub use connectivity::ConnectivityMonitor;
pub use db::{create_pool, run_migrations, Pool};
pub use device::load_or_create_device_id;
pub use error::{ClientError, Result};
pub use queue::OperationQueue;
pub use replay::{DrainReport, ReplayAgent, ReplayHandle, ReplayTrigger};
pub use runtime::SyncRuntime;
pub use session::{ItemDraft, ReviewAction, SessionController, Toast};
pub use store::RecordStore;
pub use transport::{HttpTransport, SyncTransport, TransportError};
