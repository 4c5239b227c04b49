//! Serde model of the JSON representation Soroban RPC returns for ledger
//! entries when asked for `xdrFormat: "json"`. Only the value shapes the
//! farm contract actually stores are modeled; anything else fails decode
//! at the call site that required it.

use serde::{Deserialize, Deserializer};

/// 64-bit values arrive as JSON numbers or decimal strings depending on
/// the RPC build; fold both at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U64(pub u64);

impl<'de> Deserialize<'de> for U64 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(U64(n)),
            Raw::Str(s) => s.parse().map(U64).map_err(serde::de::Error::custom),
        }
    }
}

/// Signed companion of [`U64`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I64(pub i64);

impl<'de> Deserialize<'de> for I64 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(i64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(I64(n)),
            Raw::Str(s) => s.parse().map(I64).map_err(serde::de::Error::custom),
        }
    }
}

/// An i128 split into high/low halves, the XDR-JSON form.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Int128Parts {
    pub hi: I64,
    pub lo: U64,
}

impl Int128Parts {
    pub fn as_i128(&self) -> i128 {
        ((self.hi.0 as i128) << 64) | self.lo.0 as i128
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScMapEntry {
    pub key: ScVal,
    pub val: ScVal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScContractInstance {
    #[serde(default)]
    pub executable: serde_json::Value,
    #[serde(default)]
    pub storage: Option<Vec<ScMapEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScVal {
    Bool(bool),
    Void,
    U32(u32),
    I32(i32),
    U64(U64),
    I64(I64),
    Timepoint(U64),
    Duration(U64),
    U128(Int128Parts),
    I128(Int128Parts),
    /// Hex-encoded.
    Bytes(String),
    String(String),
    Symbol(String),
    Vec(Option<Vec<ScVal>>),
    Map(Option<Vec<ScMapEntry>>),
    Address(String),
    ContractInstance(ScContractInstance),
    LedgerKeyContractInstance,
}

impl ScVal {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            ScVal::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ScVal::U64(v) | ScVal::Timepoint(v) | ScVal::Duration(v) => Some(v.0),
            ScVal::U32(v) => Some(*v as u64),
            _ => None,
        }
    }

    /// Non-negative 128-bit values; a negative i128 is treated as absent.
    pub fn as_u128(&self) -> Option<u128> {
        match self {
            ScVal::U128(parts) | ScVal::I128(parts) => {
                let v = parts.as_i128();
                (v >= 0).then_some(v as u128)
            }
            ScVal::U64(v) => Some(v.0 as u128),
            ScVal::U32(v) => Some(*v as u128),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            ScVal::Bytes(s) => hex::decode(s).ok(),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            ScVal::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[ScMapEntry]> {
        match self {
            ScVal::Map(Some(entries)) => Some(entries),
            _ => None,
        }
    }
}

/// Looks up `symbol` among a map's symbol keys.
pub fn map_get<'a>(entries: &'a [ScMapEntry], symbol: &str) -> Option<&'a ScVal> {
    entries.iter().find(|e| e.key.as_symbol() == Some(symbol)).map(|e| &e.val)
}
