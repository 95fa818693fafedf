//! Background replay agent.
//!
//! Drains the operation queue against the remote API whenever woken: by an
//! explicit trigger, by a connectivity-regained transition, or by the
//! periodic interval. The agent outlives every view - it is constructed
//! once per process and torn down explicitly via [`ReplayHandle::stop`].
//!
//! Failure handling is two-level. A failing operation is converted into
//! retry bookkeeping and never aborts the rest of the cycle; a failure of
//! the queue itself propagates out of [`ReplayAgent::drain_cycle`] so the
//! run loop knows the cycle never really happened and a later wake must
//! redo it. One poisoned operation must never block the queue, but
//! infrastructure failure must stay visible.

use crate::connectivity::ConnectivityMonitor;
use crate::error::Result;
use crate::queue::OperationQueue;
use crate::time::now_ms;
use crate::transport::SyncTransport;
use reel_engine::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Outcome counters for one drain cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Delivery attempts made this cycle
    pub attempted: u64,
    /// Operations delivered and removed from the queue
    pub delivered: u64,
    /// Operations that failed and were rescheduled
    pub failed: u64,
    /// Operations dead-lettered after exhausting their budget
    pub dropped: u64,
    /// Operations left untouched because the device is offline
    pub skipped_offline: u64,
    /// Earliest due time among rescheduled operations
    pub next_retry_at: Option<Timestamp>,
}

/// Handle for waking the agent from anywhere (a session after enqueueing,
/// or the host's background-wake mechanism).
#[derive(Debug, Clone)]
pub struct ReplayTrigger {
    sender: mpsc::UnboundedSender<()>,
}

impl ReplayTrigger {
    /// Request a drain cycle. Best-effort: if the agent is gone the
    /// request is dropped, and durability of the queue carries correctness.
    pub fn wake(&self) {
        let _ = self.sender.send(());
    }

    /// A trigger wired to no agent, for hosts that run replay some other
    /// way (or not at all). Wakes go nowhere; the durable queue still
    /// holds every intent for whichever agent shows up later.
    pub fn detached() -> Self {
        let (sender, _) = mpsc::unbounded_channel();
        Self { sender }
    }
}

/// A running agent: its task plus a trigger.
#[derive(Debug)]
pub struct ReplayHandle {
    trigger: ReplayTrigger,
    task: JoinHandle<()>,
}

impl ReplayHandle {
    /// Request a drain cycle.
    pub fn wake(&self) {
        self.trigger.wake();
    }

    /// A cloneable trigger for sessions to hold.
    pub fn trigger(&self) -> ReplayTrigger {
        self.trigger.clone()
    }

    /// Tear the agent down.
    pub fn stop(self) {
        self.task.abort();
    }
}

/// The queue-draining worker.
pub struct ReplayAgent {
    queue: OperationQueue,
    transport: Arc<dyn SyncTransport>,
    connectivity: Arc<ConnectivityMonitor>,
    attempt_timeout: Duration,
    wake_interval: Duration,
}

impl ReplayAgent {
    /// Create an agent over injected collaborators.
    pub fn new(
        queue: OperationQueue,
        transport: Arc<dyn SyncTransport>,
        connectivity: Arc<ConnectivityMonitor>,
        attempt_timeout: Duration,
        wake_interval: Duration,
    ) -> Self {
        Self {
            queue,
            transport,
            connectivity,
            attempt_timeout,
            wake_interval,
        }
    }

    /// Spawn the long-lived background task and return its handle.
    pub fn spawn(self) -> ReplayHandle {
        let (sender, mut wakes) = mpsc::unbounded_channel::<()>();
        let trigger = ReplayTrigger { sender };
        let retrigger = trigger.clone();

        let task = tokio::spawn(async move {
            let mut online = self.connectivity.watch();
            let mut interval = tokio::time::interval(self.wake_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    wake = wakes.recv() => {
                        if wake.is_none() {
                            // Every trigger dropped; nothing can wake us again.
                            break;
                        }
                    }
                    changed = online.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if !*online.borrow() {
                            continue;
                        }
                        tracing::debug!("draining on regained connectivity");
                    }
                    _ = interval.tick() => {}
                }

                match self.drain_cycle().await {
                    Ok(report) => {
                        if report.failed > 0 {
                            self.schedule_retry_wake(&report, &retrigger);
                        }
                    }
                    Err(e) => {
                        // Queue infrastructure failure: the cycle is void,
                        // a later wake retries it.
                        tracing::error!(error = %e, "drain cycle failed");
                    }
                }
            }
        });

        ReplayHandle { trigger, task }
    }

    /// Run one drain cycle over every pending operation, in enqueue order.
    ///
    /// Per operation: dead-letter it if the budget is spent; skip the
    /// attempt (leaving it queued unchanged) while offline; otherwise
    /// attempt delivery under the hard timeout, deleting on success and
    /// recording retry bookkeeping on failure. Queue errors propagate.
    pub async fn drain_cycle(&self) -> Result<DrainReport> {
        let pending = self.queue.dequeue_all().await?;
        let mut report = DrainReport::default();

        for mut op in pending {
            if op.budget_exhausted() {
                // The one case where local and remote are known to have
                // diverged permanently; logged distinctly, not surfaced.
                tracing::warn!(
                    op_id = %op.id,
                    retry_count = op.retry_count,
                    last_error = op.last_error.as_deref().unwrap_or("unknown"),
                    "dead-lettering operation after exhausting retry budget"
                );
                self.queue.remove(&op.id).await?;
                report.dropped += 1;
                continue;
            }

            if !self.connectivity.is_online() {
                // Attempting now would waste the bounded retry budget.
                report.skipped_offline += 1;
                continue;
            }

            report.attempted += 1;
            let attempt = tokio::time::timeout(self.attempt_timeout, self.transport.deliver(&op));
            let outcome = match attempt.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err("attempt timed out".to_string()),
            };

            match outcome {
                Ok(()) => {
                    self.queue.remove(&op.id).await?;
                    report.delivered += 1;
                    tracing::debug!(op_id = %op.id, "operation replayed");
                }
                Err(error) => {
                    op.record_failure(&error, now_ms());
                    self.queue.update(&op).await?;
                    report.failed += 1;
                    report.next_retry_at = match (report.next_retry_at, op.next_retry_at) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    };
                    tracing::debug!(
                        op_id = %op.id,
                        retry_count = op.retry_count,
                        error = %error,
                        "replay attempt failed; rescheduled"
                    );
                }
            }
        }

        if report.delivered > 0 || report.dropped > 0 {
            tracing::info!(
                delivered = report.delivered,
                failed = report.failed,
                dropped = report.dropped,
                "drain cycle complete"
            );
        }

        Ok(report)
    }

    /// After a failing cycle, arrange one self-wake at the earliest due
    /// time so backoff actually delays the next round of attempts.
    fn schedule_retry_wake(&self, report: &DrainReport, trigger: &ReplayTrigger) {
        let Some(due) = report.next_retry_at else {
            return;
        };
        let delay = Duration::from_millis(due.saturating_sub(now_ms()));
        let trigger = trigger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trigger.wake();
        });
    }
}
