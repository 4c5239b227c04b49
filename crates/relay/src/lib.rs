//! Relay-facing side of the pooler: turns a mined `(hash, nonce)` proof
//! into a signed `work` transaction and pushes it through the Launchtube
//! gateway, retrying transient failures.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pooler_chain::rpc::RpcClient;
use pooler_chain::ChainError;
use pooler_primitives::{strkey, PlantedFarmer, StrkeyError};
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

pub mod envelope;
pub mod retry;

use envelope::WorkCall;

const LOG_TARGET: &str = "relay";

const CLIENT_NAME: &str = "kale-pooler";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The host call failed in simulation; never retried.
    #[error("simulation failed: {0}")]
    Simulation(String),

    #[error("relay rejected submission ({status}): {body}")]
    Relay { status: u16, body: String },

    #[error("relay transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Strkey(#[from] StrkeyError),

    #[error("malformed simulation response: {0}")]
    MalformedSimulation(String),
}

impl SubmitError {
    /// Transient errors re-enter the retry loop; simulation outcomes are
    /// domain errors and always terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubmitError::Simulation(_) => false,
            other => retry::is_retryable_message(&other.to_string()),
        }
    }
}

/// Successful relay submission.
#[derive(Debug, Clone)]
pub struct WorkSubmission {
    /// Hash the relay reported for the forwarded transaction.
    pub tx_hash: Option<String>,
}

/// Proof submission boundary, abstracted so the work scheduler and its
/// tests can substitute scripted submitters.
#[async_trait]
pub trait WorkSubmitter: Send + Sync {
    async fn submit_work(
        &self,
        farmer: &PlantedFarmer,
        hash: [u8; 32],
        nonce: u64,
    ) -> Result<WorkSubmission, SubmitError>;
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub relay_url: Url,
    pub jwt: String,
    /// `C…` strkey of the farm contract.
    pub contract: String,
    pub network_passphrase: String,
    /// Total attempts per submission, transient failures included.
    pub attempts: u32,
    pub backoff: Duration,
}

/// Production submitter: simulate against the chain RPC, sign with the
/// farmer's custodial seed, POST the envelope to Launchtube.
pub struct LaunchtubeSubmitter {
    http: reqwest::Client,
    rpc: RpcClient,
    config: RelayConfig,
    contract_id: [u8; 32],
}

impl LaunchtubeSubmitter {
    pub fn new(rpc: RpcClient, config: RelayConfig) -> Result<Self, SubmitError> {
        let contract_id = strkey::decode_contract(&config.contract)?;
        let http = reqwest::Client::builder()
            .user_agent(format!("{CLIENT_NAME}/{CLIENT_VERSION}"))
            .build()?;
        Ok(Self { http, rpc, config, contract_id })
    }

    async fn try_submit(
        &self,
        farmer: &PlantedFarmer,
        hash: [u8; 32],
        nonce: u64,
    ) -> Result<WorkSubmission, SubmitError> {
        let signing_key = farmer.custodial_secret_key.signing_key()?;
        let farmer_public_key = strkey::decode_account(&farmer.custodial_wallet)?;

        let sequence = self.rpc.get_account_sequence(&farmer.custodial_wallet).await? + 1;
        let call = WorkCall { contract_id: self.contract_id, farmer_public_key, hash, nonce };

        let simulation = self
            .rpc
            .simulate_transaction(&envelope::build_unsigned(&call, sequence))
            .await?;
        if let Some(error) = simulation.error {
            return Err(SubmitError::Simulation(error));
        }

        let soroban_data = simulation
            .transaction_data
            .as_deref()
            .map(|data| BASE64.decode(data))
            .transpose()
            .map_err(|err| SubmitError::MalformedSimulation(err.to_string()))?
            .ok_or_else(|| SubmitError::MalformedSimulation("missing transactionData".into()))?;
        let resource_fee = simulation.min_resource_fee.map(|fee| fee.0).unwrap_or(0);

        let signed = envelope::build_signed(
            &call,
            sequence,
            &soroban_data,
            resource_fee,
            &self.config.network_passphrase,
            &signing_key,
        );

        let form = reqwest::multipart::Form::new().text("xdr", signed);
        let response = self
            .http
            .post(self.config.relay_url.clone())
            .bearer_auth(&self.config.jwt)
            .header("X-Client-Name", CLIENT_NAME)
            .header("X-Client-Version", CLIENT_VERSION)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SubmitError::Relay { status: status.as_u16(), body });
        }

        let tx_hash = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .get("transactionHash")
                    .or_else(|| value.get("hash"))
                    .and_then(|hash| hash.as_str())
                    .map(str::to_owned)
            });

        debug!(target: LOG_TARGET, farmer = %farmer.farmer_id, tx_hash = ?tx_hash, "Work submitted.");
        Ok(WorkSubmission { tx_hash })
    }
}

#[async_trait]
impl WorkSubmitter for LaunchtubeSubmitter {
    async fn submit_work(
        &self,
        farmer: &PlantedFarmer,
        hash: [u8; 32],
        nonce: u64,
    ) -> Result<WorkSubmission, SubmitError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_submit(farmer, hash, nonce).await {
                Ok(submission) => return Ok(submission),
                Err(err) if attempt < self.config.attempts && err.is_retryable() => {
                    warn!(
                        target: LOG_TARGET,
                        farmer = %farmer.farmer_id,
                        attempt,
                        %err,
                        "Transient submission failure, backing off."
                    );
                    sleep(self.config.backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
