//! Wire shapes of the Backend notifications. Field casing is part of the
//! contract: envelopes are camelCase but the stake/zero/gap bounds inside
//! `blockData` stay snake_case, and stakes travel as strings.

use chrono::{DateTime, SecondsFormat, Utc};
use pooler_primitives::{BlockIndex, WorkResult, WorkStatus};
use serde::Serialize;

/// Renders a unix timestamp (seconds) as the ISO-8601 form the Backend
/// expects. Out-of-range values collapse to the epoch.
pub fn iso_from_unix(secs: u64) -> String {
    DateTime::<Utc>::from_timestamp(secs as i64, 0)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `POST /pooler/block-discovered`, regular polling variant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDiscovered {
    pub event: &'static str,
    pub pooler_id: String,
    pub block_index: BlockIndex,
    pub block_data: BlockData,
    pub metadata: DiscoveryMetadata,
}

impl BlockDiscovered {
    pub const EVENT: &'static str = "new_block_discovered";
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockData {
    pub index: BlockIndex,
    /// ISO-8601.
    pub timestamp: String,
    /// 64 hex characters.
    pub entropy: String,
    #[serde(rename = "blockAge")]
    pub block_age: i64,
    pub plantable: bool,
    pub min_stake: String,
    pub max_stake: String,
    pub min_zeros: u32,
    pub max_zeros: u32,
    pub min_gap: u32,
    pub max_gap: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryMetadata {
    pub discovered_at: String,
    /// Milliseconds since the pooler process started.
    pub pooler_uptime: u64,
    pub total_blocks_discovered: u64,
}

/// `POST /pooler/block-discovered`, flat startup-shortcut variant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupBlockDiscovered {
    pub pooler_id: String,
    pub block_index: BlockIndex,
    pub entropy: String,
    /// Seconds since epoch, unlike the regular variant.
    pub block_timestamp: u64,
    pub block_age: i64,
    pub discovered_at: String,
    pub source: &'static str,
}

impl StartupBlockDiscovered {
    pub const SOURCE: &'static str = "startup_check";
}

/// `POST /pooler/work-completed`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkCompletionReport {
    pub block_index: BlockIndex,
    pub pooler_id: String,
    pub work_results: Vec<WorkResult>,
    pub summary: WorkSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSummary {
    pub total_farmers: usize,
    pub successful_work: usize,
    pub failed_work: usize,
    /// Milliseconds, summed over all farmers in the batch.
    pub total_work_time: u64,
    pub timestamp: String,
}

impl WorkSummary {
    /// Recovered work reached the chain, so it counts as successful.
    pub fn from_results(results: &[WorkResult]) -> Self {
        let failed =
            results.iter().filter(|result| result.status == WorkStatus::Failed).count();
        Self {
            total_farmers: results.len(),
            successful_work: results.len() - failed,
            failed_work: failed,
            total_work_time: results.iter().map(|result| result.work_time_ms).sum(),
            timestamp: iso_now(),
        }
    }
}
