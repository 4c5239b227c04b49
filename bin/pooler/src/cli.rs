use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser};
use pooler_node::Config;
use url::Url;

/// KALE pool work coordinator: watches the farm contract for new blocks,
/// schedules per-farmer hash searches and submits the proofs through the
/// relay.
#[derive(Parser, Debug)]
#[command(name = "pooler", version)]
pub struct Cli {
    /// Port for the inbound Backend API.
    #[arg(long, env = "POOLER_PORT", default_value_t = 3001)]
    pub port: u16,

    /// Identifier this pooler reports to the Backend.
    #[arg(long, env = "POOLER_ID")]
    pub pooler_id: String,

    /// Bearer token required on /backend/planted-farmers.
    #[arg(long, env = "POOLER_AUTH_TOKEN")]
    pub auth_token: String,

    #[command(flatten)]
    pub chain: ChainOptions,

    #[command(flatten)]
    pub backend: BackendOptions,

    #[command(flatten)]
    pub relay: RelayOptions,

    #[command(flatten)]
    pub monitor: MonitorOptions,

    #[command(flatten)]
    pub work: WorkOptions,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Chain options")]
pub struct ChainOptions {
    /// Soroban RPC endpoint.
    #[arg(long, env = "RPC_URL", value_name = "URL")]
    pub rpc_url: Url,

    /// C… strkey of the farm contract.
    #[arg(long, env = "CONTRACT_ID")]
    pub contract_id: String,

    #[arg(long, env = "NETWORK_PASSPHRASE")]
    pub network_passphrase: String,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Backend options")]
pub struct BackendOptions {
    #[arg(long = "backend.url", env = "BACKEND_API_URL", value_name = "URL")]
    pub backend_url: Url,

    /// Timeout for Backend POSTs.
    #[arg(long = "backend.timeout", env = "BACKEND_TIMEOUT", value_name = "MILLISECONDS")]
    #[arg(default_value_t = 30_000)]
    pub backend_timeout_ms: u64,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Relay options")]
pub struct RelayOptions {
    #[arg(long = "relay.url", env = "LAUNCHTUBE_URL", value_name = "URL")]
    pub launchtube_url: Url,

    #[arg(long = "relay.jwt", env = "LAUNCHTUBE_JWT")]
    pub launchtube_jwt: String,

    /// Total submission attempts per work proof.
    #[arg(long = "relay.retry-attempts", env = "RETRY_ATTEMPTS", default_value_t = 3)]
    pub retry_attempts: u32,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Block monitor options")]
pub struct MonitorOptions {
    #[arg(long = "monitor.poll-interval", env = "BLOCK_POLL_INTERVAL_MS")]
    #[arg(value_name = "MILLISECONDS", default_value_t = 5_000)]
    pub block_poll_interval_ms: u64,

    #[arg(long = "monitor.initial-delay", env = "INITIAL_BLOCK_CHECK_DELAY_MS")]
    #[arg(value_name = "MILLISECONDS", default_value_t = 10_000)]
    pub initial_block_check_delay_ms: u64,

    /// Consecutive failing polls before the monitor halts.
    #[arg(long = "monitor.max-errors", env = "MAX_ERROR_COUNT", default_value_t = 10)]
    pub max_error_count: u32,

    /// Forward index jumps beyond this log a missed-blocks warning.
    #[arg(long = "monitor.max-missed-blocks", env = "MAX_MISSED_BLOCKS", default_value_t = 5)]
    pub max_missed_blocks: u32,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Work options")]
pub struct WorkOptions {
    /// Path of the hash-search executable.
    #[arg(long = "work.miner-bin", env = "MINER_BIN", value_name = "PATH")]
    pub miner_bin: PathBuf,

    /// Wall-clock limit for one miner invocation.
    #[arg(long = "work.miner-timeout", env = "MINER_TIMEOUT_MS")]
    #[arg(value_name = "MILLISECONDS", default_value_t = 300_000)]
    pub miner_timeout_ms: u64,

    /// Delay from the block timestamp to the mining start.
    #[arg(long = "work.delay", env = "WORK_DELAY_MS")]
    #[arg(value_name = "MILLISECONDS", default_value_t = 150_000)]
    pub work_delay_ms: u64,

    /// Nonce count handed to the miner.
    #[arg(long = "work.nonce-count", env = "MINER_NONCE_COUNT", default_value_t = 10_000_000)]
    pub nonce_count: u64,

    /// Extra miner attempts after a timeout or unparseable output.
    #[arg(long = "work.max-recovery-attempts", env = "MAX_RECOVERY_ATTEMPTS", default_value_t = 3)]
    pub max_recovery_attempts: u32,
}

impl Cli {
    pub fn into_config(self) -> Config {
        Config {
            port: self.port,
            pooler_id: self.pooler_id,
            auth_token: self.auth_token,
            rpc_url: self.chain.rpc_url,
            contract_id: self.chain.contract_id,
            network_passphrase: self.chain.network_passphrase,
            backend_url: self.backend.backend_url,
            backend_timeout: Duration::from_millis(self.backend.backend_timeout_ms),
            relay_url: self.relay.launchtube_url,
            relay_jwt: self.relay.launchtube_jwt,
            retry_attempts: self.relay.retry_attempts,
            poll_interval: Duration::from_millis(self.monitor.block_poll_interval_ms),
            initial_delay: Duration::from_millis(self.monitor.initial_block_check_delay_ms),
            max_error_count: self.monitor.max_error_count,
            max_missed_blocks: self.monitor.max_missed_blocks,
            miner_bin: self.work.miner_bin,
            miner_timeout: Duration::from_millis(self.work.miner_timeout_ms),
            work_delay: Duration::from_millis(self.work.work_delay_ms),
            nonce_count: self.work.nonce_count,
            max_recovery_attempts: self.work.max_recovery_attempts,
        }
    }
}
