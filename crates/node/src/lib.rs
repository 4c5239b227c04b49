//! Assembles the pooler from its parts and owns the process lifecycle:
//! build, launch, wait for a shutdown signal, unwind within the grace
//! window.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use pooler_backend::{BackendClient, BackendConfig};
use pooler_chain::{RpcClient, SorobanReader};
use pooler_core::{
    BlockMonitor, Coordinator, MonitorConfig, MonitorStats, WorkConfig, WorkScheduler,
};
use pooler_miner::{MinerConfig, MinerRunner};
use pooler_relay::{LaunchtubeSubmitter, RelayConfig};
use pooler_server::{PoolerServer, PoolerServerHandle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod config;
pub mod logger;

pub use config::{Config, ConfigError};

const LOG_TARGET: &str = "node";

pub struct Node;

impl Node {
    /// Validates the configuration, wires every component together and
    /// starts the monitor loop and the inbound server.
    pub async fn launch(config: Config) -> Result<LaunchedNode> {
        config.validate().context("invalid configuration")?;

        let shutdown = CancellationToken::new();
        let rpc = RpcClient::new(config.rpc_url.clone());

        let reader = SorobanReader::new(rpc.clone(), &config.contract_id)
            .context("failed to build the chain reader")?;

        let backend = BackendClient::new(BackendConfig {
            base_url: config.backend_url.clone(),
            pooler_id: config.pooler_id.clone(),
            auth_token: config.auth_token.clone(),
            timeout: config.backend_timeout,
        })
        .context("failed to build the backend client")?;

        let submitter = LaunchtubeSubmitter::new(
            rpc,
            RelayConfig {
                relay_url: config.relay_url.clone(),
                jwt: config.relay_jwt.clone(),
                contract: config.contract_id.clone(),
                network_passphrase: config.network_passphrase.clone(),
                attempts: config.retry_attempts,
                backoff: config::RELAY_RETRY_BACKOFF,
            },
        )
        .context("failed to build the relay submitter")?;

        let miner = MinerRunner::new(
            MinerConfig { bin: config.miner_bin.clone(), timeout: config.miner_timeout },
            shutdown.clone(),
        );

        let scheduler = WorkScheduler::new(
            miner,
            Arc::new(submitter),
            WorkConfig {
                work_delay: config.work_delay,
                nonce_count: config.nonce_count,
                recovery_nonce_step: config::RECOVERY_NONCE_STEP,
                max_recovery_attempts: config.max_recovery_attempts,
            },
        );

        let coordinator = Coordinator::new(scheduler, backend.clone(), shutdown.clone());
        let stats = Arc::new(MonitorStats::new());

        let monitor = BlockMonitor::new(
            Arc::new(reader),
            backend,
            stats.clone(),
            MonitorConfig {
                poll_interval: config.poll_interval,
                initial_delay: config.initial_delay,
                max_error_count: config.max_error_count,
                max_missed_blocks: config.max_missed_blocks,
                ..MonitorConfig::default()
            },
        );
        let monitor_task = tokio::spawn(monitor.run(shutdown.clone()));

        let server =
            PoolerServer::new(coordinator.clone(), stats.clone(), config.auth_token.clone(), config.max_error_count);
        let server_handle = server
            .start(SocketAddr::from(([0, 0, 0, 0], config.port)))
            .await
            .context("failed to start the inbound server")?;

        info!(
            target: LOG_TARGET,
            pooler = %config.pooler_id,
            addr = %server_handle.addr(),
            "Pooler launched."
        );

        Ok(LaunchedNode { coordinator, stats, server: server_handle, monitor: monitor_task, shutdown })
    }
}

/// Handle to a running pooler.
pub struct LaunchedNode {
    pub coordinator: Coordinator,
    pub stats: Arc<MonitorStats>,
    server: PoolerServerHandle,
    monitor: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl LaunchedNode {
    /// The actual inbound address, useful when the port was 0.
    pub fn addr(&self) -> SocketAddr {
        self.server.addr()
    }

    /// Blocks until SIGINT or SIGTERM, then unwinds.
    pub async fn run_until_shutdown(self) -> Result<()> {
        wait_for_signal().await;
        info!(target: LOG_TARGET, "Shutdown signal received.");
        self.stop().await
    }

    /// Graceful stop: refuse new inbound requests, cancel the monitor and
    /// any live miner child, let in-flight batches unwind inside the
    /// grace window.
    pub async fn stop(self) -> Result<()> {
        self.server.stop()?;
        self.coordinator.shutdown(config::SHUTDOWN_GRACE).await;

        // the coordinator cancelled the shared token; the monitor loop
        // observes it on its next tick
        let _ = tokio::time::timeout(config::SHUTDOWN_GRACE, self.monitor).await;
        self.server.stopped().await;

        info!(target: LOG_TARGET, "Pooler stopped.");
        Ok(())
    }

    /// Trigger cancellation without consuming the handle; test hook.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// Resolves on SIGINT, or SIGTERM where the platform has it.
async fn wait_for_signal() {
    use tokio::signal;

    #[cfg(unix)]
    let sigterm = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())?.recv().await;
        Ok::<(), std::io::Error>(())
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<Result<(), std::io::Error>>();

    tokio::select! {
        _ = signal::ctrl_c() => {}
        _ = sigterm => {}
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    use pooler_primitives::strkey;
    use serde_json::json;
    use url::Url;

    use super::*;

    fn test_config(chain_url: &str, backend_url: &str) -> Config {
        Config {
            port: 0,
            pooler_id: "pool-test".into(),
            auth_token: "token".into(),
            rpc_url: Url::parse(chain_url).unwrap(),
            contract_id: strkey::encode_contract(&[1u8; 32]),
            network_passphrase: "Test SDF Network ; September 2015".into(),
            backend_url: Url::parse(backend_url).unwrap(),
            backend_timeout: Duration::from_secs(2),
            relay_url: Url::parse("http://127.0.0.1:9/relay").unwrap(),
            relay_jwt: "jwt".into(),
            retry_attempts: 3,
            poll_interval: Duration::from_millis(50),
            initial_delay: Duration::from_millis(20),
            max_error_count: 10,
            max_missed_blocks: 5,
            miner_bin: PathBuf::from("/bin/false"),
            miner_timeout: Duration::from_secs(1),
            work_delay: Duration::from_secs(0),
            nonce_count: 10_000_000,
            max_recovery_attempts: 0,
        }
    }

    fn empty_chain_body() -> String {
        json!({ "jsonrpc": "2.0", "id": 1, "result": { "entries": [] } }).to_string()
    }

    #[tokio::test]
    async fn launch_serves_health_and_stops_cleanly() {
        let mut chain = mockito::Server::new_async().await;
        let backend = mockito::Server::new_async().await;
        let _chain_mock = chain
            .mock("POST", "/")
            .with_body(empty_chain_body())
            .create_async()
            .await;

        let node = Node::launch(test_config(&chain.url(), &backend.url())).await.unwrap();
        let health_url = format!("http://{}/health", node.addr());

        // give the monitor time to seed off the empty chain
        tokio::time::sleep(Duration::from_millis(150)).await;
        let response = reqwest::Client::new().get(&health_url).send().await.unwrap();
        assert_eq!(response.status(), 200);

        let started = Instant::now();
        node.stop().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));

        // no new inbound requests after the stop
        assert!(reqwest::Client::new().get(&health_url).send().await.is_err());
    }

    #[tokio::test]
    async fn invalid_config_fails_launch() {
        let mut config = test_config("http://127.0.0.1:9", "http://127.0.0.1:9");
        config.contract_id = "bogus".into();

        assert!(Node::launch(config).await.is_err());
    }
}
