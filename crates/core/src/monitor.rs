//! The block monitor: a long-running poll loop over the chain reader that
//! detects farm-index advances and notifies the Backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pooler_backend::types::{iso_from_unix, iso_now};
use pooler_backend::{BackendClient, BlockData, BlockDiscovered, DiscoveryMetadata, StartupBlockDiscovered};
use pooler_chain::{BlockchainReader, ChainSnapshot};
use pooler_primitives::{BlockIndex, Entropy};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::stats::{MonitorState, MonitorStats};

const LOG_TARGET: &str = "monitor";

/// A block is plantable while its age sits inside this window (seconds).
const PLANTABLE_MIN_AGE: i64 = 30;
const PLANTABLE_MAX_AGE: i64 = 240;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub initial_delay: Duration,
    /// Consecutive failing polls before the monitor halts itself.
    pub max_error_count: u32,
    /// Forward jumps larger than this log a missed-blocks warning.
    pub max_missed_blocks: u32,
    /// Initial blocks younger than this get the startup discovery shortcut.
    pub startup_notify_max_age: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            initial_delay: Duration::from_secs(10),
            max_error_count: 10,
            max_missed_blocks: 5,
            startup_notify_max_age: Duration::from_secs(120),
        }
    }
}

pub struct BlockMonitor {
    reader: Arc<dyn BlockchainReader>,
    backend: BackendClient,
    stats: Arc<MonitorStats>,
    config: MonitorConfig,
}

impl BlockMonitor {
    pub fn new(
        reader: Arc<dyn BlockchainReader>,
        backend: BackendClient,
        stats: Arc<MonitorStats>,
        config: MonitorConfig,
    ) -> Self {
        Self { reader, backend, stats, config }
    }

    /// Runs until the shutdown token fires or the consecutive-error
    /// ceiling halts the monitor.
    pub async fn run(self, shutdown: CancellationToken) {
        let Some(mut cursor) = self.seed(&shutdown).await else {
            return;
        };

        info!(target: LOG_TARGET, cursor, "Block monitor running.");

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(self.config.initial_delay) => {}
        }

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = interval.tick() => {}
            }

            match self.poll(&mut cursor).await {
                Ok(()) => self.stats.reset_errors(),
                Err(err) => {
                    let errors = self.stats.record_error();
                    error!(
                        target: LOG_TARGET,
                        %err,
                        consecutive = errors,
                        "Chain poll failed."
                    );
                    if errors >= self.config.max_error_count {
                        error!(
                            target: LOG_TARGET,
                            ceiling = self.config.max_error_count,
                            "Consecutive-error ceiling reached, halting the block monitor."
                        );
                        self.stats.set_state(MonitorState::Halted);
                        return;
                    }
                }
            }
        }
    }

    /// Initial chain read: seeds the cursor, flips the state to running
    /// and fires the one-shot startup discovery check. Read failures count
    /// against the same error ceiling as regular polls.
    async fn seed(&self, shutdown: &CancellationToken) -> Option<BlockIndex> {
        loop {
            if shutdown.is_cancelled() {
                return None;
            }

            match self.reader.snapshot().await {
                Ok(snapshot) => {
                    self.stats.reset_errors();
                    self.stats.set_state(MonitorState::Running);
                    self.startup_check(&snapshot).await;
                    return Some(snapshot.index);
                }
                Err(err) => {
                    let errors = self.stats.record_error();
                    warn!(target: LOG_TARGET, %err, consecutive = errors, "Initial chain read failed.");
                    if errors >= self.config.max_error_count {
                        self.stats.set_state(MonitorState::Halted);
                        return None;
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    async fn poll(&self, cursor: &mut BlockIndex) -> Result<(), pooler_chain::ChainError> {
        let snapshot = self.reader.snapshot().await?;

        if snapshot.index > *cursor {
            if snapshot.index - *cursor > self.config.max_missed_blocks {
                warn!(
                    target: LOG_TARGET,
                    cursor = *cursor,
                    index = snapshot.index,
                    "Farm index jumped past the missed-block threshold."
                );
            }

            let now = Utc::now().timestamp();
            let body = self.build_discovery(&snapshot, now);
            // missing timestamps follow the same tie-break as the body:
            // substitute the observation time
            let block_timestamp = snapshot
                .block
                .as_ref()
                .and_then(|block| block.timestamp)
                .unwrap_or(now.max(0) as u64);

            match self.backend.notify_block_discovered(&body).await {
                Ok(()) => {
                    info!(
                        target: LOG_TARGET,
                        block = snapshot.index,
                        age = body.block_data.block_age,
                        plantable = body.block_data.plantable,
                        "New block discovered."
                    );
                    *cursor = snapshot.index;
                    self.stats.record_discovery(block_timestamp);
                }
                Err(err) => {
                    // keep the cursor so the next poll re-attempts the
                    // notification for the same index
                    warn!(
                        target: LOG_TARGET,
                        block = snapshot.index,
                        %err,
                        "Discovery notification failed, holding cursor."
                    );
                }
            }
        } else if snapshot.index < *cursor {
            warn!(
                target: LOG_TARGET,
                cursor = *cursor,
                index = snapshot.index,
                "Farm index regressed, assuming chain reorg."
            );
            *cursor = snapshot.index;
        }

        Ok(())
    }

    /// One-shot check right after startup: a freshly minted initial block
    /// is announced as if newly seen, with the flat startup body. The
    /// seeded cursor already covers the index, so the regular path cannot
    /// re-notify it.
    async fn startup_check(&self, snapshot: &ChainSnapshot) {
        let Some(block) = snapshot.block.as_ref() else {
            return;
        };

        let now = Utc::now().timestamp();
        let (timestamp, age) = match block.timestamp {
            Some(ts) => (ts, now.saturating_sub(ts as i64)),
            None => (now as u64, 0),
        };

        if age >= self.config.startup_notify_max_age.as_secs() as i64 {
            return;
        }

        let body = StartupBlockDiscovered {
            pooler_id: self.backend.pooler_id().to_string(),
            block_index: snapshot.index,
            entropy: block.entropy.unwrap_or(Entropy::ZERO).to_hex(),
            block_timestamp: timestamp,
            block_age: age,
            discovered_at: iso_now(),
            source: StartupBlockDiscovered::SOURCE,
        };

        match self.backend.notify_startup_block(&body).await {
            Ok(()) => {
                info!(target: LOG_TARGET, block = snapshot.index, age, "Startup block announced.");
                self.stats.record_discovery(timestamp);
            }
            Err(err) => {
                warn!(target: LOG_TARGET, block = snapshot.index, %err, "Startup block notification failed.");
            }
        }
    }

    /// Assembles the rich discovery body; `now` is unix seconds.
    fn build_discovery(&self, snapshot: &ChainSnapshot, now: i64) -> BlockDiscovered {
        let block = snapshot.block.as_ref();

        let (timestamp, age) = match block.and_then(|b| b.timestamp) {
            Some(ts) => (ts, now.saturating_sub(ts as i64)),
            // missing timestamp: substitute now and treat the block as new
            None => (now as u64, 0),
        };

        let entropy = block.and_then(|b| b.entropy).unwrap_or(Entropy::ZERO);

        BlockDiscovered {
            event: BlockDiscovered::EVENT,
            pooler_id: self.backend.pooler_id().to_string(),
            block_index: snapshot.index,
            block_data: BlockData {
                index: snapshot.index,
                timestamp: iso_from_unix(timestamp),
                entropy: entropy.to_hex(),
                block_age: age,
                plantable: (PLANTABLE_MIN_AGE..PLANTABLE_MAX_AGE).contains(&age),
                min_stake: block.map(|b| b.min_stake).unwrap_or(0).to_string(),
                max_stake: block.map(|b| b.max_stake).unwrap_or(0).to_string(),
                min_zeros: block.map(|b| b.min_zeros).unwrap_or(0),
                max_zeros: block.map(|b| b.max_zeros).unwrap_or(0),
                min_gap: block.map(|b| b.min_gap).unwrap_or(0),
                max_gap: block.map(|b| b.max_gap).unwrap_or(0),
            },
            metadata: DiscoveryMetadata {
                discovered_at: iso_now(),
                pooler_uptime: self.stats.uptime_ms(),
                total_blocks_discovered: self.stats.total_blocks_discovered(),
            },
        }
    }
}
