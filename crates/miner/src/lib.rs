//! Supervision of the external hash-search executable.
//!
//! The miner is CPU-saturating, so at most one child process is alive per
//! pooler at any time: every invocation goes through a process-wide async
//! mutex, and schedulers for later blocks queue behind it naturally.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const LOG_TARGET: &str = "miner";

/// Default hard wall-clock limit for one miner invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct MinerConfig {
    /// Path of the hash-search executable; machine-specific and therefore
    /// always supplied by configuration.
    pub bin: PathBuf,
    pub timeout: Duration,
}

/// Parsed terminal output of a successful hash search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinerOutput {
    pub nonce: u64,
    /// Hex digest as printed by the miner.
    pub hash: String,
    /// Leading `'0'` characters of the hash.
    pub zeros: u32,
}

/// How one supervised invocation ended. Timeouts and unparseable output
/// are expected operational outcomes, not errors; they feed the caller's
/// recovery loop.
#[derive(Debug, Clone)]
pub enum MinerOutcome {
    Solved(MinerOutput),
    TimedOut { stderr: String },
    Malformed { stderr: String },
}

#[derive(Debug, thiserror::Error)]
pub enum MinerError {
    #[error("failed to spawn miner {bin}: {source}")]
    Spawn { bin: String, source: std::io::Error },

    #[error("miner io: {0}")]
    Io(#[from] std::io::Error),

    #[error("miner invocation cancelled by shutdown")]
    Cancelled,
}

/// Handle to the single-miner slot. Cheap to clone; all clones share the
/// spawn mutex and the running flag.
#[derive(Debug, Clone)]
pub struct MinerRunner {
    config: Arc<MinerConfig>,
    slot: Arc<Mutex<()>>,
    running: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl MinerRunner {
    pub fn new(config: MinerConfig, shutdown: CancellationToken) -> Self {
        Self {
            config: Arc::new(config),
            slot: Arc::new(Mutex::new(())),
            running: Arc::new(AtomicBool::new(false)),
            shutdown,
        }
    }

    /// Whether a miner child is currently alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Runs one hash search to completion, timeout or cancellation.
    ///
    /// Blocks until the process-wide miner slot is free.
    pub async fn run(
        &self,
        farmer_hex: &str,
        block_index: u32,
        entropy_hex: &str,
        nonce_count: u64,
    ) -> Result<MinerOutcome, MinerError> {
        let _slot = self.slot.lock().await;

        self.running.store(true, Ordering::Relaxed);
        let result = self.run_child(farmer_hex, block_index, entropy_hex, nonce_count).await;
        self.running.store(false, Ordering::Relaxed);
        result
    }

    async fn run_child(
        &self,
        farmer_hex: &str,
        block_index: u32,
        entropy_hex: &str,
        nonce_count: u64,
    ) -> Result<MinerOutcome, MinerError> {
        debug!(
            target: LOG_TARGET,
            block = block_index,
            nonce_count,
            "Spawning miner."
        );

        let mut child = Command::new(&self.config.bin)
            .arg(farmer_hex)
            .arg(block_index.to_string())
            .arg(entropy_hex)
            .arg(nonce_count.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MinerError::Spawn {
                bin: self.config.bin.display().to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(read_stream(stdout));
        let stderr_task = tokio::spawn(read_stream(stderr));

        let status = tokio::select! {
            status = child.wait() => Some(status?),
            _ = sleep(self.config.timeout) => None,
            _ = self.shutdown.cancelled() => {
                let _ = child.kill().await;
                return Err(MinerError::Cancelled);
            }
        };

        let Some(status) = status else {
            let _ = child.kill().await;
            let stderr = stderr_task.await.unwrap_or_default();
            warn!(
                target: LOG_TARGET,
                block = block_index,
                timeout_secs = self.config.timeout.as_secs(),
                "Miner hit the wall-clock limit and was killed."
            );
            return Ok(MinerOutcome::TimedOut { stderr });
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        match parse_terminal_line(&stdout) {
            Some(output) => Ok(MinerOutcome::Solved(output)),
            None => {
                warn!(
                    target: LOG_TARGET,
                    block = block_index,
                    exit = ?status.code(),
                    "Miner exited without a parseable solution."
                );
                Ok(MinerOutcome::Malformed { stderr })
            }
        }
    }
}

/// Parses the final non-empty stdout line as the `[nonce, hashHex]` pair.
fn parse_terminal_line(stdout: &str) -> Option<MinerOutput> {
    let line = stdout.lines().rev().find(|line| !line.trim().is_empty())?;
    let (nonce, hash): (u64, String) = serde_json::from_str(line.trim()).ok()?;
    let zeros = hash.chars().take_while(|c| *c == '0').count() as u32;
    Some(MinerOutput { nonce, hash, zeros })
}

async fn read_stream(stream: Option<impl AsyncRead + Unpin>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}
