//! Chain-facing side of the pooler: a thin Soroban RPC client plus the
//! typed reads of the farm contract's storage (`FarmIndex` and the
//! per-index `Block` entries).

use async_trait::async_trait;
use pooler_primitives::{BlockIndex, BlockRecord, StrkeyError};

pub mod rpc;
pub mod scval;
pub mod xdr;

mod reader;

pub use reader::SorobanReader;
pub use rpc::{RpcClient, SimulateResponse};

/// Result of one chain poll: the current farm index, and the block entry
/// at that index when it exists.
#[derive(Debug, Clone)]
pub struct ChainSnapshot {
    pub index: BlockIndex,
    pub block: Option<BlockRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("chain rpc transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chain rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("chain decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Strkey(#[from] StrkeyError),

    #[error("account {0} not found on chain")]
    AccountNotFound(String),
}

/// Read access to the farm contract, abstracted so the block monitor and
/// tests can substitute scripted readers.
#[async_trait]
pub trait BlockchainReader: Send + Sync {
    async fn snapshot(&self) -> Result<ChainSnapshot, ChainError>;
}
