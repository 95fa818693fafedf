//! Process-level assembly of the sync client.
//!
//! One runtime per process: it opens the database, runs migrations, loads
//! the device identity, and spawns the replay agent. Views then borrow
//! sessions from it. Construction and teardown are explicit - nothing
//! here is a module-level singleton.

use crate::channel::TabChannel;
use crate::config::Config;
use crate::connectivity::ConnectivityMonitor;
use crate::db::{create_pool, run_migrations, Pool};
use crate::device::load_or_create_device_id;
use crate::error::Result;
use crate::queue::OperationQueue;
use crate::replay::{ReplayAgent, ReplayHandle, ReplayTrigger};
use crate::session::SessionController;
use crate::store::RecordStore;
use crate::transport::{HttpTransport, SyncTransport};
use reel_engine::DeviceId;
use std::sync::Arc;

/// Everything a process needs to run the offline watchlist.
pub struct SyncRuntime {
    config: Config,
    pool: Pool,
    store: RecordStore,
    queue: OperationQueue,
    channel: Arc<TabChannel>,
    connectivity: Arc<ConnectivityMonitor>,
    replay: Option<ReplayHandle>,
    device_id: DeviceId,
}

impl SyncRuntime {
    /// Open the database, migrate, load the device identity, and spawn
    /// the background replay agent against the configured endpoint.
    pub async fn start(config: Config) -> Result<Self> {
        let pool = create_pool(&config.database_url).await?;
        run_migrations(&pool).await?;

        let device_id = load_or_create_device_id(&pool).await?;
        tracing::info!(device_id = %device_id, "sync runtime starting");

        let store = RecordStore::new(pool.clone());
        let queue = OperationQueue::new(pool.clone());
        let channel = TabChannel::new_shared();
        let connectivity = Arc::new(ConnectivityMonitor::default());

        let transport: Arc<dyn SyncTransport> =
            Arc::new(HttpTransport::new(&config.sync_endpoint));
        let replay = ReplayAgent::new(
            queue.clone(),
            transport,
            Arc::clone(&connectivity),
            config.attempt_timeout,
            config.replay_interval,
        )
        .spawn();

        Ok(Self {
            config,
            pool,
            store,
            queue,
            channel,
            connectivity,
            replay: Some(replay),
            device_id,
        })
    }

    /// The persisted device identity.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The connectivity monitor for the host to feed online/offline
    /// transitions into.
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Ask the agent to drain now (host background-wake mechanism).
    pub fn wake_replay(&self) {
        if let Some(replay) = &self.replay {
            replay.wake();
        }
    }

    /// Open a session for one view of a user's watchlist.
    pub async fn session(&self, user_id: impl Into<String>) -> Result<SessionController> {
        let trigger = self
            .replay
            .as_ref()
            .map(|handle| handle.trigger())
            .unwrap_or_else(ReplayTrigger::detached);

        SessionController::open(
            user_id,
            self.device_id.clone(),
            self.store.clone(),
            self.queue.clone(),
            Arc::clone(&self.channel),
            trigger,
            self.config.undo_window,
        )
        .await
    }

    /// Stop the agent and close the database.
    pub async fn shutdown(mut self) {
        if let Some(replay) = self.replay.take() {
            replay.stop();
        }
        self.pool.close().await;
        tracing::info!("sync runtime stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ItemDraft;

    #[tokio::test]
    async fn runtime_boots_sessions_against_one_device_identity() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_url: format!("sqlite://{}", dir.path().join("reel.db").display()),
            ..Config::default()
        };

        let runtime = SyncRuntime::start(config).await.unwrap();
        // Stay offline so the spawned agent leaves the queue alone.
        runtime.connectivity().set_online(false);
        let device_id = runtime.device_id().to_string();

        let mut session = runtime.session("user-1").await.unwrap();
        session
            .toggle(ItemDraft {
                item_id: "42".into(),
                title: "Dune".into(),
                poster_url: "https://img/dune.jpg".into(),
                release_year: 2021,
                rating: None,
            })
            .await
            .unwrap();

        assert!(session.is_saved("42"));
        assert_eq!(session.items()[0].device_id, device_id);

        runtime.shutdown().await;
    }
}
