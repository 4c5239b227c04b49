use std::path::PathBuf;
use std::time::Duration;

use pooler_primitives::strkey;
use url::Url;

/// Fixed backoff between relay submission attempts.
pub const RELAY_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Bound on how long a graceful shutdown may take.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Nonce-count widening per miner recovery attempt.
pub const RECOVERY_NONCE_STEP: u64 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("contract id is not a valid C… strkey: {0}")]
    Contract(strkey::StrkeyError),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Process-wide immutable configuration, assembled from the CLI/env by
/// the binary and validated once before launch.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub pooler_id: String,
    pub auth_token: String,

    pub rpc_url: Url,
    pub contract_id: String,
    pub network_passphrase: String,

    pub backend_url: Url,
    pub backend_timeout: Duration,

    pub relay_url: Url,
    pub relay_jwt: String,
    pub retry_attempts: u32,

    pub poll_interval: Duration,
    pub initial_delay: Duration,
    pub max_error_count: u32,
    pub max_missed_blocks: u32,

    pub miner_bin: PathBuf,
    pub miner_timeout: Duration,
    pub work_delay: Duration,
    pub nonce_count: u64,
    pub max_recovery_attempts: u32,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pooler_id.is_empty() {
            return Err(ConfigError::Empty("pooler id"));
        }
        if self.auth_token.is_empty() {
            return Err(ConfigError::Empty("auth token"));
        }
        if self.relay_jwt.is_empty() {
            return Err(ConfigError::Empty("launchtube jwt"));
        }
        if self.network_passphrase.is_empty() {
            return Err(ConfigError::Empty("network passphrase"));
        }
        if self.miner_bin.as_os_str().is_empty() {
            return Err(ConfigError::Empty("miner binary path"));
        }

        strkey::decode_contract(&self.contract_id).map_err(ConfigError::Contract)?;

        if self.retry_attempts == 0 {
            return Err(ConfigError::Zero { field: "retry attempts" });
        }
        if self.max_error_count == 0 {
            return Err(ConfigError::Zero { field: "max error count" });
        }
        if self.nonce_count == 0 {
            return Err(ConfigError::Zero { field: "nonce count" });
        }

        Ok(())
    }
}
