//! Outbound half of the Backend boundary: the HTTP client that delivers
//! block-discovery and work-completion notifications.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;
use url::Url;

pub mod types;

pub use types::{
    BlockData, BlockDiscovered, DiscoveryMetadata, StartupBlockDiscovered, WorkCompletionReport,
    WorkSummary,
};

const LOG_TARGET: &str = "backend";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend replied {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: Url,
    pub pooler_id: String,
    pub auth_token: String,
    /// Per-request timeout; spec default is 30 s.
    pub timeout: Duration,
}

/// HTTP client for the cooperating Backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    discovered_url: Url,
    completed_url: Url,
    pooler_id: String,
    auth_token: String,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("kale-pooler/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            discovered_url: join(&config.base_url, "pooler/block-discovered")?,
            completed_url: join(&config.base_url, "pooler/work-completed")?,
            pooler_id: config.pooler_id,
            auth_token: config.auth_token,
        })
    }

    pub fn pooler_id(&self) -> &str {
        &self.pooler_id
    }

    /// Regular discovery notification, emitted by the block monitor.
    pub async fn notify_block_discovered(
        &self,
        body: &BlockDiscovered,
    ) -> Result<(), BackendError> {
        debug!(target: LOG_TARGET, block = body.block_index, "Posting block discovery.");
        self.post(self.discovered_url.clone(), body, false).await
    }

    /// Startup-shortcut variant, same endpoint with a flat body.
    pub async fn notify_startup_block(
        &self,
        body: &StartupBlockDiscovered,
    ) -> Result<(), BackendError> {
        debug!(target: LOG_TARGET, block = body.block_index, "Posting startup block check.");
        self.post(self.discovered_url.clone(), body, false).await
    }

    /// Per-block completion report; authenticated.
    pub async fn report_work_completed(
        &self,
        report: &WorkCompletionReport,
    ) -> Result<(), BackendError> {
        debug!(
            target: LOG_TARGET,
            block = report.block_index,
            farmers = report.work_results.len(),
            "Posting work completion report."
        );
        self.post(self.completed_url.clone(), report, true).await
    }

    async fn post<B: Serialize>(
        &self,
        url: Url,
        body: &B,
        authenticated: bool,
    ) -> Result<(), BackendError> {
        let mut request = self.http.post(url).json(body);
        if authenticated {
            request = request
                .bearer_auth(&self.auth_token)
                .header("X-Pooler-ID", &self.pooler_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status: status.as_u16(), body });
        }

        Ok(())
    }
}

fn join(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{}/{}", base.as_str().trim_end_matches('/'), path))
}
