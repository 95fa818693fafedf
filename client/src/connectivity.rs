//! Connectivity signal from the host environment.
//!
//! The host reports binary online/offline transitions; the replay agent
//! fast-fails while offline (preserving the retry budget) and drains when
//! connectivity returns. The monitor never probes the network itself.

use tokio::sync::watch;

/// Shared online/offline flag with awaitable transitions.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    sender: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial state.
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender }
    }

    /// Report a transition from the host environment.
    pub fn set_online(&self, online: bool) {
        // send_if_modified avoids waking watchers on repeated reports.
        let changed = self.sender.send_if_modified(|state| {
            if *state == online {
                false
            } else {
                *state = online;
                true
            }
        });

        if changed {
            if online {
                tracing::info!("connectivity regained");
            } else {
                tracing::warn!("connectivity lost");
            }
        }
    }

    /// Current state.
    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// A receiver for awaiting transitions.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        // Hosts that never report are assumed online.
        Self::new(true)
    }
}
