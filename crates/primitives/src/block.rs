use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::BlockIndex;

/// The 32-byte entropy value a block carries, mixed into the hash-search
/// input of the next block.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entropy([u8; 32]);

impl Entropy {
    pub const ZERO: Entropy = Entropy([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, always 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, InvalidEntropy> {
        let bytes = hex::decode(s).map_err(|_| InvalidEntropy(s.len()))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| InvalidEntropy(s.len()))?;
        Ok(Self(bytes))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("entropy must be 64 hex characters, got input of length {0}")]
pub struct InvalidEntropy(pub usize);

impl fmt::Display for Entropy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Entropy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entropy({})", self.to_hex())
    }
}

impl FromStr for Entropy {
    type Err = InvalidEntropy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Entropy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Entropy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Entropy::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Decoded state of one on-chain block.
///
/// Produced fresh by each chain poll; nothing except the index outlives the
/// poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub index: BlockIndex,
    /// Seconds since epoch. Absent on malformed or not-yet-closed entries.
    pub timestamp: Option<u64>,
    pub entropy: Option<Entropy>,
    pub min_gap: u32,
    pub max_gap: u32,
    /// Stroop precision.
    pub min_stake: u128,
    pub max_stake: u128,
    pub min_zeros: u32,
    pub max_zeros: u32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidBlockRecord {
    #[error("block {index}: min_{field} {min} exceeds max_{field} {max}")]
    Bounds { index: BlockIndex, field: &'static str, min: u128, max: u128 },

    #[error("block {index}: zeros bound {zeros} exceeds 64")]
    ZerosRange { index: BlockIndex, zeros: u32 },
}

impl BlockRecord {
    /// Checks the element-wise `min <= max` invariants and the zeros range.
    pub fn validate(&self) -> Result<(), InvalidBlockRecord> {
        let checks: [(&'static str, u128, u128); 3] = [
            ("gap", self.min_gap as u128, self.max_gap as u128),
            ("stake", self.min_stake, self.max_stake),
            ("zeros", self.min_zeros as u128, self.max_zeros as u128),
        ];

        for (field, min, max) in checks {
            if min > max {
                return Err(InvalidBlockRecord::Bounds { index: self.index, field, min, max });
            }
        }

        if self.max_zeros > 64 {
            return Err(InvalidBlockRecord::ZerosRange { index: self.index, zeros: self.max_zeros });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn record() -> BlockRecord {
        BlockRecord {
            index: 101,
            timestamp: Some(1_722_470_400),
            entropy: Some(Entropy::new([7u8; 32])),
            min_gap: 0,
            max_gap: 30,
            min_stake: 10_000_000,
            max_stake: 100_000_000,
            min_zeros: 6,
            max_zeros: 9,
        }
    }

    #[test]
    fn entropy_hex_round_trip() {
        let entropy = Entropy::new([0xab; 32]);
        let hex = entropy.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Entropy::from_hex(&hex).unwrap(), entropy);
    }

    #[test]
    fn entropy_rejects_short_input() {
        assert_matches!(Entropy::from_hex("abcd"), Err(InvalidEntropy(4)));
    }

    #[test]
    fn valid_record_passes() {
        record().validate().unwrap();
    }

    #[test]
    fn inverted_stake_bounds_rejected() {
        let mut rec = record();
        rec.min_stake = 200_000_000;
        assert_matches!(rec.validate(), Err(InvalidBlockRecord::Bounds { field: "stake", .. }));
    }

    #[test]
    fn zeros_above_64_rejected() {
        let mut rec = record();
        rec.min_zeros = 65;
        rec.max_zeros = 70;
        assert_matches!(rec.validate(), Err(InvalidBlockRecord::ZerosRange { zeros: 70, .. }));
    }
}
