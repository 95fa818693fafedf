//! Cross-tab change notifications.
//!
//! Every open view of a user's data subscribes here; whoever mutates the
//! durable stores publishes a notice so the others re-read. Delivery is
//! fire-and-forget, at-most-once per currently subscribed receiver, and
//! nothing is delivered to tabs that subscribe later - a new tab does a
//! fresh read of the record store on mount instead. The channel is a
//! signal to re-read, never the record payload, and never a lock.

use dashmap::DashMap;
use reel_engine::UserId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Identifier of a single open view.
pub type TabId = String;

/// What changed in the durable stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    /// The user's watchlist records changed; re-read the record store.
    WatchlistChanged { user_id: UserId },
}

/// A broadcast message between tabs.
///
/// Carries the sender's tab id so a receiver can drop its own echoes when
/// the same process both publishes and subscribes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotice {
    /// Topic the notice belongs to (one topic per user's watchlist)
    pub topic: String,
    /// Tab that produced the mutation
    pub source: TabId,
    pub event: StoreEvent,
}

impl ChangeNotice {
    /// Topic name for a user's watchlist changes.
    pub fn watchlist_topic(user_id: &str) -> String {
        format!("watchlist:{user_id}")
    }
}

struct Subscriber {
    topic: String,
    sender: mpsc::UnboundedSender<ChangeNotice>,
}

/// In-process broadcast hub connecting every open view.
///
/// Thread-safe and shared via `Arc`; subscriptions unregister themselves
/// on drop.
#[derive(Default)]
pub struct TabChannel {
    subscribers: DashMap<String, Subscriber>,
}

impl TabChannel {
    /// Create a new channel.
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Create a channel wrapped in `Arc` for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Subscribe to a topic. The returned handle receives notices until it
    /// is dropped or `unsubscribe` is called.
    pub fn subscribe(self: &Arc<Self>, topic: impl Into<String>) -> Subscription {
        let id = uuid::Uuid::new_v4().to_string();
        let topic = topic.into();
        let (sender, receiver) = mpsc::unbounded_channel();

        self.subscribers.insert(
            id.clone(),
            Subscriber {
                topic: topic.clone(),
                sender,
            },
        );

        tracing::debug!(subscriber = %id, topic = %topic, "tab subscribed");

        Subscription {
            id,
            channel: Arc::clone(self),
            receiver,
        }
    }

    /// Publish a notice to every current subscriber of its topic,
    /// including the sender's own subscriptions (receivers filter echoes
    /// by `source`). Returns the number of receivers reached.
    pub fn publish(&self, notice: ChangeNotice) -> usize {
        let mut sent = 0;
        for entry in self.subscribers.iter() {
            let subscriber = entry.value();
            if subscriber.topic == notice.topic && subscriber.sender.send(notice.clone()).is_ok() {
                sent += 1;
            }
        }

        tracing::debug!(topic = %notice.topic, recipients = sent, "published change notice");

        sent
    }

    fn unregister(&self, id: &str) {
        if self.subscribers.remove(id).is_some() {
            tracing::debug!(subscriber = %id, "tab unsubscribed");
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// A live subscription; receives notices for one topic.
pub struct Subscription {
    id: String,
    channel: Arc<TabChannel>,
    receiver: mpsc::UnboundedReceiver<ChangeNotice>,
}

impl Subscription {
    /// Await the next notice. Returns `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        self.receiver.recv().await
    }

    /// Non-blocking poll for an already delivered notice.
    pub fn try_recv(&mut self) -> Option<ChangeNotice> {
        self.receiver.try_recv().ok()
    }

    /// Explicitly detach from the channel.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.channel.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(topic: &str, source: &str) -> ChangeNotice {
        ChangeNotice {
            topic: topic.into(),
            source: source.into(),
            event: StoreEvent::WatchlistChanged {
                user_id: "user-1".into(),
            },
        }
    }

    #[tokio::test]
    async fn publish_reaches_topic_subscribers_only() {
        let channel = TabChannel::new_shared();
        let mut watch = channel.subscribe("watchlist:user-1");
        let mut other = channel.subscribe("watchlist:user-2");

        let sent = channel.publish(notice("watchlist:user-1", "tab-a"));

        assert_eq!(sent, 1);
        assert!(watch.try_recv().is_some());
        assert!(other.try_recv().is_none());
    }

    #[tokio::test]
    async fn receivers_can_filter_their_own_echoes() {
        let channel = TabChannel::new_shared();
        let mut sub = channel.subscribe("watchlist:user-1");

        channel.publish(notice("watchlist:user-1", "tab-a"));
        channel.publish(notice("watchlist:user-1", "tab-b"));

        let seen: Vec<_> = std::iter::from_fn(|| sub.try_recv())
            .filter(|n| n.source != "tab-a")
            .collect();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].source, "tab-b");
    }

    #[tokio::test]
    async fn no_delivery_to_late_subscribers() {
        let channel = TabChannel::new_shared();
        channel.publish(notice("watchlist:user-1", "tab-a"));

        let mut late = channel.subscribe("watchlist:user-1");
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let channel = TabChannel::new_shared();
        let sub = channel.subscribe("watchlist:user-1");
        assert_eq!(channel.subscriber_count(), 1);

        drop(sub);
        assert_eq!(channel.subscriber_count(), 0);
        assert_eq!(channel.publish(notice("watchlist:user-1", "tab-a")), 0);
    }
}
