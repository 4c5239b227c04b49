use std::fmt;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::block::Entropy;
use crate::{strkey, BlockIndex};

/// An `S…` custodial secret seed, forwarded by the Backend per planting
/// notification. Lives in memory only; the Debug impl redacts it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretSeed(String);

impl SecretSeed {
    pub fn new(seed: impl Into<String>) -> Self {
        Self(seed.into())
    }

    /// The ed25519 signing key the seed encodes.
    pub fn signing_key(&self) -> Result<SigningKey, strkey::StrkeyError> {
        let seed = strkey::decode_seed(&self.0)?;
        Ok(SigningKey::from_bytes(&seed))
    }

    /// Raw 32-byte public key of the signing key.
    pub fn public_key(&self) -> Result<[u8; 32], strkey::StrkeyError> {
        Ok(self.signing_key()?.verifying_key().to_bytes())
    }

    /// Lowercase-hex public key, the form the miner executable takes.
    pub fn public_key_hex(&self) -> Result<String, strkey::StrkeyError> {
        Ok(hex::encode(self.public_key()?))
    }
}

impl fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretSeed(<redacted>)")
    }
}

/// One farmer the Backend planted for a block, with the custodial material
/// the pooler needs to mine and submit on its behalf.
#[derive(Debug, Clone, Deserialize)]
pub struct PlantedFarmer {
    #[serde(alias = "farmerId")]
    pub farmer_id: String,

    #[serde(alias = "custodialWallet")]
    pub custodial_wallet: String,

    #[serde(alias = "custodialSecretKey")]
    pub custodial_secret_key: SecretSeed,

    #[serde(alias = "stakeAmount")]
    pub stake_amount: String,

    /// Informational only; shape is up to the Backend.
    #[serde(default, alias = "plantingTime")]
    pub planting_time: Option<serde_json::Value>,
}

/// Normalized planting notification: which farmers planted against which
/// block, plus the entropy the miner needs.
#[derive(Debug, Clone)]
pub struct PlantingNotification {
    pub block_index: BlockIndex,
    pub entropy: Entropy,
    /// Block close time, seconds since epoch.
    pub block_timestamp: u64,
    pub farmers: Vec<PlantedFarmer>,
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidNotification {
    #[error("planting notification for block {0} carries no farmers")]
    NoFarmers(BlockIndex),
}

impl PlantingNotification {
    pub fn validate(&self) -> Result<(), InvalidNotification> {
        if self.farmers.is_empty() {
            return Err(InvalidNotification::NoFarmers(self.block_index));
        }
        Ok(())
    }
}

/// One (block, farmer) pair in flight. The scheduler owns the job while it
/// runs and accumulates attempts and elapsed time into it.
#[derive(Debug, Clone)]
pub struct WorkJob {
    pub block_index: BlockIndex,
    pub farmer: PlantedFarmer,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl WorkJob {
    pub fn new(block_index: BlockIndex, farmer: PlantedFarmer) -> Self {
        Self { block_index, farmer, attempts: 0, elapsed_ms: 0 }
    }
}

/// Terminal per-farmer outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Success,
    /// At least one earlier attempt for the same job failed.
    Recovered,
    Failed,
}

/// Per-farmer outcome reported back to the Backend.
///
/// Constructed only through [`WorkResult::success`], [`WorkResult::recovered`]
/// and the `failed*` constructors so that `compensation_required` always
/// equals `status == Failed`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkResult {
    pub farmer_id: String,
    pub custodial_wallet: String,
    pub status: WorkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zeros: Option<u32>,
    /// Unknown until the gap-derivation rule is settled; always absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap: Option<u32>,
    #[serde(rename = "workTime")]
    pub work_time_ms: u64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub compensation_required: bool,
}

impl WorkResult {
    pub fn success(job: &WorkJob, nonce: u64, hash: String, zeros: u32) -> Self {
        Self::completed(job, WorkStatus::Success, nonce, hash, zeros)
    }

    pub fn recovered(job: &WorkJob, nonce: u64, hash: String, zeros: u32) -> Self {
        debug_assert!(job.attempts >= 2, "recovered implies a prior failing attempt");
        Self::completed(job, WorkStatus::Recovered, nonce, hash, zeros)
    }

    /// A failure with no proof to show (miner produced nothing usable).
    pub fn failed(job: &WorkJob, error: impl Into<String>) -> Self {
        Self {
            farmer_id: job.farmer.farmer_id.clone(),
            custodial_wallet: job.farmer.custodial_wallet.clone(),
            status: WorkStatus::Failed,
            nonce: None,
            hash: None,
            zeros: None,
            gap: None,
            work_time_ms: job.elapsed_ms,
            attempts: job.attempts,
            error: Some(error.into()),
            compensation_required: true,
        }
    }

    /// A failure after a successful hash search: the proof is retained for
    /// diagnostics even though it never reached the chain.
    pub fn failed_with_proof(
        job: &WorkJob,
        nonce: u64,
        hash: String,
        zeros: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            nonce: Some(nonce),
            hash: Some(hash),
            zeros: Some(zeros),
            ..Self::failed(job, error)
        }
    }

    fn completed(job: &WorkJob, status: WorkStatus, nonce: u64, hash: String, zeros: u32) -> Self {
        Self {
            farmer_id: job.farmer.farmer_id.clone(),
            custodial_wallet: job.farmer.custodial_wallet.clone(),
            status,
            nonce: Some(nonce),
            hash: Some(hash),
            zeros: Some(zeros),
            gap: None,
            work_time_ms: job.elapsed_ms,
            attempts: job.attempts,
            error: None,
            compensation_required: false,
        }
    }
}
