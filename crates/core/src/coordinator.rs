//! The coordinator: accepts planting notifications, runs one scheduler
//! task per block, and reports aggregated results back to the Backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pooler_backend::{BackendClient, WorkCompletionReport, WorkSummary};
use pooler_primitives::{BlockIndex, PlantingNotification};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::scheduler::WorkScheduler;

const LOG_TARGET: &str = "coordinator";

/// Snapshot served by `GET /status/work`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkStatusSnapshot {
    pub pending_blocks: Vec<BlockIndex>,
    pub active_blocks: Vec<BlockIndex>,
    pub miner_running: bool,
}

struct Inner {
    scheduler: WorkScheduler,
    backend: BackendClient,
    /// Notifications held from receipt until the completion report went
    /// out (or was dropped).
    pending: Mutex<HashMap<BlockIndex, PlantingNotification>>,
    /// Handles of in-flight scheduler tasks.
    active: Mutex<HashMap<BlockIndex, JoinHandle<()>>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

/// Cheap-to-clone handle; all clones share the batch state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(
        scheduler: WorkScheduler,
        backend: BackendClient,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                scheduler,
                backend,
                pending: Mutex::new(HashMap::new()),
                active: Mutex::new(HashMap::new()),
                tracker: TaskTracker::new(),
                shutdown,
            }),
        }
    }

    /// Accepts one planting notification and schedules its work batch.
    /// Invalid notifications are logged and dropped; the Backend is
    /// trusted, so the caller still gets a 200.
    pub fn handle_notification(&self, notification: PlantingNotification) {
        if let Err(err) = notification.validate() {
            warn!(target: LOG_TARGET, %err, "Rejected planting notification.");
            return;
        }

        if self.inner.shutdown.is_cancelled() {
            warn!(
                target: LOG_TARGET,
                block = notification.block_index,
                "Shutting down, planting notification ignored."
            );
            return;
        }

        let block = notification.block_index;
        if self.inner.active.lock().contains_key(&block) {
            warn!(target: LOG_TARGET, block, "Work for this block is already scheduled.");
            return;
        }

        info!(
            target: LOG_TARGET,
            block,
            farmers = notification.farmers.len(),
            "Planting notification accepted, scheduling work."
        );

        self.inner.pending.lock().insert(block, notification.clone());

        // the gate defers the task body until its handle is registered,
        // so completion always finds (and removes) the map entries
        let (gate_tx, gate_rx) = oneshot::channel::<()>();
        let inner = Arc::clone(&self.inner);
        let handle = self.inner.tracker.spawn(async move {
            let _ = gate_rx.await;
            inner.run_block(notification).await;
        });

        self.inner.active.lock().insert(block, handle);
        let _ = gate_tx.send(());
    }

    pub fn status(&self) -> WorkStatusSnapshot {
        let mut pending_blocks: Vec<_> = self.inner.pending.lock().keys().copied().collect();
        let mut active_blocks: Vec<_> = self.inner.active.lock().keys().copied().collect();
        pending_blocks.sort_unstable();
        active_blocks.sort_unstable();

        WorkStatusSnapshot {
            pending_blocks,
            active_blocks,
            miner_running: self.inner.scheduler.miner().is_running(),
        }
    }

    /// Emergency stop: cancel everything, drop pending notifications and
    /// wait for in-flight tasks up to the grace window. Results surfacing
    /// after the stop are discarded by the tasks themselves.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.shutdown.cancel();
        self.inner.pending.lock().clear();
        self.inner.tracker.close();

        if tokio::time::timeout(grace, self.inner.tracker.wait()).await.is_err() {
            warn!(
                target: LOG_TARGET,
                grace_secs = grace.as_secs(),
                "Grace window elapsed with scheduler tasks still running."
            );
        }
    }

    /// Wait for all in-flight batches; test hook.
    #[cfg(test)]
    async fn wait_idle(&self) {
        loop {
            if self.inner.active.lock().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Inner {
    async fn run_block(&self, notification: PlantingNotification) {
        let block = notification.block_index;
        let results = self.scheduler.run_batch(&notification, &self.shutdown).await;

        if self.shutdown.is_cancelled() {
            debug!(target: LOG_TARGET, block, "Discarding work results after stop.");
            self.remove(block);
            return;
        }

        let report = WorkCompletionReport {
            block_index: block,
            pooler_id: self.backend.pooler_id().to_string(),
            summary: WorkSummary::from_results(&results),
            work_results: results,
        };

        info!(
            target: LOG_TARGET,
            block,
            successful = report.summary.successful_work,
            failed = report.summary.failed_work,
            "Work batch complete."
        );

        // completion reports are fire-and-forget: a failed POST is logged
        // and dropped, never retried
        if let Err(err) = self.backend.report_work_completed(&report).await {
            warn!(target: LOG_TARGET, block, %err, "Completion report dropped.");
        }

        self.remove(block);
    }

    fn remove(&self, block: BlockIndex) {
        self.pending.lock().remove(&block);
        self.active.lock().remove(&block);
    }
}
