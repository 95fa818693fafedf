//! Optimistic session controller - the state machine behind one open view.
//!
//! A toggle flips the in-memory list immediately, then writes through to
//! the record store and the replay queue, broadcasts a change notice, and
//! arms an undo toast. No network call happens on this path: durability
//! and eventual replay are fully decoupled from the user-visible action,
//! which completes instantly whatever the connectivity.
//!
//! Merging also happens at this layer: versions arriving from other
//! devices go through the engine's resolver against the stored local
//! version, and the winner (with merged clock) is what gets persisted.

use crate::channel::{ChangeNotice, StoreEvent, Subscription, TabChannel, TabId};
use crate::error::Result;
use crate::queue::OperationQueue;
use crate::replay::ReplayTrigger;
use crate::store::RecordStore;
use crate::time::now_ms;
use reel_engine::{
    resolve, resolve_removal, DeviceId, ItemId, OperationKind, RemovalNotice, RemovalOutcome,
    ResolveAction, Review, ReviewId, ReviewVote, SyncOperation, UserId, VectorClock, VoteDirection,
    WatchlistItem,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Presentation-layer input for a toggle.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub item_id: ItemId,
    pub title: String,
    pub poster_url: String,
    pub release_year: u16,
    pub rating: Option<f32>,
}

/// A review intent from the presentation layer; the session stamps the
/// clock and queues it. Review state itself lives behind the remote
/// boundary.
#[derive(Debug, Clone)]
pub enum ReviewAction {
    Add(Review),
    Update(Review),
    Delete { review_id: ReviewId, item_id: ItemId },
    Vote { review_id: ReviewId, direction: VoteDirection },
}

/// What invoking undo would do.
#[derive(Debug, Clone)]
enum UndoAction {
    /// Re-add the removed record exactly as it was (original `added_at`),
    /// causally after the removal.
    Reinstate {
        item: WatchlistItem,
        removal_clock: VectorClock,
    },
    /// Take back an add.
    Retract { item_id: ItemId },
}

/// Transient feedback for the view, with a time-boxed undo affordance.
#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    expires_at: Instant,
    undo: UndoAction,
}

impl Toast {
    /// Whether undo is still actionable.
    pub fn undo_available(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Per-view controller over the shared durable stores.
///
/// Single-threaded within its view; cross-view safety comes from per-key
/// store atomicity and the resolution algebra, never from this type.
pub struct SessionController {
    user_id: UserId,
    device_id: DeviceId,
    tab_id: TabId,
    store: RecordStore,
    queue: OperationQueue,
    channel: Arc<TabChannel>,
    replay: ReplayTrigger,
    undo_window: Duration,
    items: HashMap<ItemId, WatchlistItem>,
    toast: Option<Toast>,
}

impl SessionController {
    /// Open a session: mint a tab id and do the fresh read of the record
    /// store that the cross-tab channel assumes of every new view.
    pub async fn open(
        user_id: impl Into<UserId>,
        device_id: impl Into<DeviceId>,
        store: RecordStore,
        queue: OperationQueue,
        channel: Arc<TabChannel>,
        replay: ReplayTrigger,
        undo_window: Duration,
    ) -> Result<Self> {
        let mut session = Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            tab_id: uuid::Uuid::new_v4().to_string(),
            store,
            queue,
            channel,
            replay,
            undo_window,
            items: HashMap::new(),
            toast: None,
        };
        session.refresh().await?;
        Ok(session)
    }

    /// This view's identity on the cross-tab channel.
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    /// Subscribe this view to its user's change notices. The caller owns
    /// the pump: feed received notices to [`handle_notice`].
    ///
    /// [`handle_notice`]: SessionController::handle_notice
    pub fn subscribe(&self) -> Subscription {
        self.channel
            .subscribe(ChangeNotice::watchlist_topic(&self.user_id))
    }

    /// Pure in-memory read: is the title on the watchlist right now?
    pub fn is_saved(&self, item_id: &str) -> bool {
        self.items.contains_key(item_id)
    }

    /// Current list, in (added_at, item_id) order.
    pub fn items(&self) -> Vec<&WatchlistItem> {
        let mut listed: Vec<_> = self.items.values().collect();
        listed.sort_by(|a, b| (a.added_at, &a.item_id).cmp(&(b.added_at, &b.item_id)));
        listed
    }

    /// The active toast, if its window has not elapsed.
    pub fn toast(&mut self) -> Option<&Toast> {
        if let Some(toast) = &self.toast {
            if !toast.undo_available() {
                self.toast = None;
            }
        }
        self.toast.as_ref()
    }

    /// Toggle a title: add it if absent, remove it if present.
    ///
    /// Storage errors surface here; everything network-shaped is the
    /// replay agent's problem later.
    pub async fn toggle(&mut self, draft: ItemDraft) -> Result<()> {
        if self.items.contains_key(&draft.item_id) {
            self.remove_item(&draft.item_id).await
        } else {
            self.add_item(draft).await
        }
    }

    async fn add_item(&mut self, draft: ItemDraft) -> Result<()> {
        let now = now_ms();
        let clock = VectorClock::new().increment(&self.device_id);
        let mut item = WatchlistItem::new(
            draft.item_id,
            self.user_id.clone(),
            draft.title,
            draft.poster_url,
            draft.release_year,
            now,
            clock.clone(),
            self.device_id.clone(),
        );
        if let Some(rating) = draft.rating {
            item = item.with_rating(rating);
        }

        let kind = OperationKind::Add { item: item.clone() };
        kind.validate()?;

        // Optimistic flip first; the view sees the add instantly.
        self.items.insert(item.item_id.clone(), item.clone());

        self.store.put(&item).await?;
        self.enqueue_and_wake(kind, clock, now).await?;
        self.broadcast_watchlist_change();

        self.toast = Some(self.make_toast(
            format!("Added \"{}\" to your watchlist", item.title),
            UndoAction::Retract {
                item_id: item.item_id.clone(),
            },
        ));

        Ok(())
    }

    async fn remove_item(&mut self, item_id: &str) -> Result<()> {
        let Some(removed) = self.items.remove(item_id) else {
            return Ok(());
        };

        let now = now_ms();
        let clock = removed.vector_clock.increment(&self.device_id);
        let kind = OperationKind::Remove {
            user_id: self.user_id.clone(),
            item_id: removed.item_id.clone(),
        };
        kind.validate()?;

        self.store.delete(&self.user_id, item_id).await?;
        self.enqueue_and_wake(kind, clock.clone(), now).await?;
        self.broadcast_watchlist_change();

        self.toast = Some(self.make_toast(
            format!("Removed \"{}\" from your watchlist", removed.title),
            UndoAction::Reinstate {
                item: removed,
                removal_clock: clock,
            },
        ));

        Ok(())
    }

    /// Re-run the inverse of the toggle behind the active toast.
    ///
    /// Returns false when the window has already elapsed (or no toast is
    /// armed); the toggle then stands.
    pub async fn undo(&mut self) -> Result<bool> {
        let Some(toast) = self.toast.take() else {
            return Ok(false);
        };
        if !toast.undo_available() {
            return Ok(false);
        }

        match toast.undo {
            UndoAction::Reinstate {
                mut item,
                removal_clock,
            } => {
                // Causally after the removal, but the record itself comes
                // back exactly as it was, original added_at included.
                let now = now_ms();
                let clock = removal_clock.increment(&self.device_id);
                item.touch(now, clock.clone(), self.device_id.clone());

                self.items.insert(item.item_id.clone(), item.clone());
                self.store.put(&item).await?;
                self.enqueue_and_wake(OperationKind::Add { item }, clock, now)
                    .await?;
                self.broadcast_watchlist_change();
            }
            UndoAction::Retract { item_id } => {
                let Some(added) = self.items.remove(&item_id) else {
                    return Ok(false);
                };
                let now = now_ms();
                let clock = added.vector_clock.increment(&self.device_id);

                self.store.delete(&self.user_id, &item_id).await?;
                self.enqueue_and_wake(
                    OperationKind::Remove {
                        user_id: self.user_id.clone(),
                        item_id,
                    },
                    clock,
                    now,
                )
                .await?;
                self.broadcast_watchlist_change();
            }
        }

        Ok(true)
    }

    /// Queue a review intent for replay.
    pub async fn submit_review(&mut self, action: ReviewAction) -> Result<()> {
        let kind = match action {
            ReviewAction::Add(review) => OperationKind::ReviewAdd { review },
            ReviewAction::Update(review) => OperationKind::ReviewUpdate { review },
            ReviewAction::Delete { review_id, item_id } => OperationKind::ReviewDelete {
                review_id,
                item_id,
                user_id: self.user_id.clone(),
            },
            ReviewAction::Vote {
                review_id,
                direction,
            } => OperationKind::ReviewVote {
                vote: ReviewVote {
                    review_id,
                    user_id: self.user_id.clone(),
                    direction,
                },
            },
        };
        kind.validate()?;

        let clock = VectorClock::new().increment(&self.device_id);
        self.enqueue_and_wake(kind, clock, now_ms()).await
    }

    /// React to a cross-tab notice: drop own echoes, re-read on relevant
    /// changes. Returns whether a re-read happened.
    pub async fn handle_notice(&mut self, notice: &ChangeNotice) -> Result<bool> {
        if notice.source == self.tab_id {
            return Ok(false);
        }
        match &notice.event {
            StoreEvent::WatchlistChanged { user_id } if *user_id == self.user_id => {
                self.refresh().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Replace the in-memory list with the durable truth.
    pub async fn refresh(&mut self) -> Result<()> {
        let listed = self.store.get(&self.user_id).await?;
        self.items = listed
            .into_iter()
            .map(|item| (item.item_id.clone(), item))
            .collect();
        Ok(())
    }

    /// Merge a version of a record produced elsewhere (another device, or
    /// the remote authority during reconciliation). The winner is
    /// persisted with the merged clock and broadcast.
    pub async fn ingest_remote(&mut self, remote: WatchlistItem) -> Result<ResolveAction> {
        if remote.user_id != self.user_id {
            return Ok(ResolveAction::KeepLocal);
        }

        let (winner, action) = match self.store.get_one(&self.user_id, &remote.item_id).await? {
            None => (remote, ResolveAction::UpdateFromRemote),
            Some(local) => {
                let resolution = resolve(&local, &remote);
                (resolution.winner, resolution.action)
            }
        };

        // Even a KeepLocal winner carries a merged clock worth persisting.
        self.store.put(&winner).await?;
        self.items.insert(winner.item_id.clone(), winner);
        self.broadcast_watchlist_change();

        Ok(action)
    }

    /// Merge a removal produced elsewhere. Returns true when the record is
    /// gone afterwards.
    pub async fn ingest_remote_removal(&mut self, removal: RemovalNotice) -> Result<bool> {
        if removal.user_id != self.user_id {
            return Ok(false);
        }

        let Some(local) = self.store.get_one(&self.user_id, &removal.item_id).await? else {
            // Already absent; the removal is satisfied.
            return Ok(true);
        };

        match resolve_removal(&local, &removal) {
            RemovalOutcome::Delete => {
                self.store.delete(&self.user_id, &removal.item_id).await?;
                self.items.remove(&removal.item_id);
                self.broadcast_watchlist_change();
                Ok(true)
            }
            RemovalOutcome::KeepLocal { winner } => {
                self.store.put(&winner).await?;
                self.items.insert(winner.item_id.clone(), winner);
                self.broadcast_watchlist_change();
                Ok(false)
            }
        }
    }

    async fn enqueue_and_wake(
        &self,
        kind: OperationKind,
        clock: VectorClock,
        now: u64,
    ) -> Result<()> {
        let op = SyncOperation::new(
            uuid::Uuid::new_v4().to_string(),
            kind,
            clock,
            self.device_id.clone(),
            now,
        );
        self.queue.enqueue(&op).await?;
        // Best-effort: if no agent is listening, the queue still holds the
        // intent for the next one.
        self.replay.wake();
        Ok(())
    }

    fn broadcast_watchlist_change(&self) {
        self.channel.publish(ChangeNotice {
            topic: ChangeNotice::watchlist_topic(&self.user_id),
            source: self.tab_id.clone(),
            event: StoreEvent::WatchlistChanged {
                user_id: self.user_id.clone(),
            },
        });
    }

    fn make_toast(&self, message: String, undo: UndoAction) -> Toast {
        Toast {
            message,
            expires_at: Instant::now() + self.undo_window,
            undo,
        }
    }
}
