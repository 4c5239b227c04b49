//! Core value types shared across the pooler: on-chain block records,
//! planting notifications received from the Backend, per-farmer work
//! outcomes, and the Stellar strkey text codec.

pub mod block;
pub mod strkey;
pub mod work;

pub use block::{BlockRecord, Entropy, InvalidBlockRecord};
pub use strkey::StrkeyError;
pub use work::{
    InvalidNotification, PlantedFarmer, PlantingNotification, SecretSeed, WorkJob, WorkResult,
    WorkStatus,
};

/// Index of a block in the farm contract. The genesis index is 0 and real
/// blocks start at 1.
pub type BlockIndex = u32;
