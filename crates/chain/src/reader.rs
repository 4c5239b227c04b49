use async_trait::async_trait;
use pooler_primitives::{strkey, BlockIndex, BlockRecord, Entropy};
use tracing::trace;

use crate::rpc::{LedgerEntryData, RpcClient};
use crate::scval::{map_get, ScMapEntry, ScVal};
use crate::{xdr, BlockchainReader, ChainError, ChainSnapshot};

const LOG_TARGET: &str = "chain";

/// Farm-contract reader backed by Soroban RPC.
#[derive(Debug, Clone)]
pub struct SorobanReader {
    rpc: RpcClient,
    contract_id: [u8; 32],
}

impl SorobanReader {
    /// `contract` is the `C…` strkey of the farm contract.
    pub fn new(rpc: RpcClient, contract: &str) -> Result<Self, ChainError> {
        let contract_id = strkey::decode_contract(contract)?;
        Ok(Self { rpc, contract_id })
    }

    /// Current `FarmIndex` from the contract instance storage. An absent
    /// instance entry or storage key reads as 0.
    pub async fn farm_index(&self) -> Result<BlockIndex, ChainError> {
        let key = xdr::contract_instance_key(&self.contract_id);
        let entries = self.rpc.get_ledger_entries(&[key]).await?;

        let Some(data) = entries.into_iter().next() else {
            return Ok(0);
        };

        let LedgerEntryData::ContractData(entry) = data else {
            return Err(ChainError::Decode("instance key yielded a non-contract entry".into()));
        };

        let ScVal::ContractInstance(instance) = entry.val else {
            return Err(ChainError::Decode("instance entry does not hold a contract instance".into()));
        };

        let Some(storage) = instance.storage else {
            return Ok(0);
        };

        match map_get(&storage, "FarmIndex") {
            None => Ok(0),
            Some(value) => value
                .as_u32()
                .ok_or_else(|| ChainError::Decode("FarmIndex is not a u32".into())),
        }
    }

    /// The `("Block", index)` temporary entry, or `None` when the chain
    /// has not (or no longer) stored one at that index.
    pub async fn block_entry(&self, index: BlockIndex) -> Result<Option<BlockRecord>, ChainError> {
        let key = xdr::block_entry_key(&self.contract_id, index);
        let entries = self.rpc.get_ledger_entries(&[key]).await?;

        let Some(data) = entries.into_iter().next() else {
            return Ok(None);
        };

        let LedgerEntryData::ContractData(entry) = data else {
            return Err(ChainError::Decode("block key yielded a non-contract entry".into()));
        };

        let Some(map) = entry.val.as_map() else {
            return Err(ChainError::Decode(format!("block {index} entry is not a map")));
        };

        let record = decode_block(index, map)?;
        record.validate().map_err(|err| ChainError::Decode(err.to_string()))?;
        Ok(Some(record))
    }
}

fn decode_block(index: BlockIndex, map: &[ScMapEntry]) -> Result<BlockRecord, ChainError> {
    let entropy = match map_get(map, "entropy") {
        None => None,
        Some(value) => {
            let bytes = value
                .as_bytes()
                .ok_or_else(|| ChainError::Decode(format!("block {index}: entropy is not bytes")))?;
            let bytes: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
                ChainError::Decode(format!("block {index}: entropy is {} bytes", bytes.len()))
            })?;
            Some(Entropy::new(bytes))
        }
    };

    let u32_field = |name: &str| map_get(map, name).and_then(ScVal::as_u32).unwrap_or(0);
    let u128_field = |name: &str| map_get(map, name).and_then(ScVal::as_u128).unwrap_or(0);

    Ok(BlockRecord {
        index,
        timestamp: map_get(map, "timestamp").and_then(ScVal::as_u64),
        entropy,
        min_gap: u32_field("min_gap"),
        max_gap: u32_field("max_gap"),
        min_stake: u128_field("min_stake"),
        max_stake: u128_field("max_stake"),
        min_zeros: u32_field("min_zeros"),
        max_zeros: u32_field("max_zeros"),
    })
}

#[async_trait]
impl BlockchainReader for SorobanReader {
    async fn snapshot(&self) -> Result<ChainSnapshot, ChainError> {
        let index = self.farm_index().await?;
        trace!(target: LOG_TARGET, index, "Read farm index.");

        let block = if index > 0 { self.block_entry(index).await? } else { None };
        Ok(ChainSnapshot { index, block })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    const CONTRACT: [u8; 32] = [0x42u8; 32];

    fn contract_strkey() -> String {
        strkey::encode_contract(&CONTRACT)
    }

    async fn reader_for(server: &mockito::ServerGuard) -> SorobanReader {
        let url = url::Url::parse(&server.url()).unwrap();
        SorobanReader::new(RpcClient::new(url), &contract_strkey()).unwrap()
    }

    fn rpc_result(result: serde_json::Value) -> String {
        json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
    }

    fn instance_entries(storage: serde_json::Value) -> serde_json::Value {
        json!({
            "entries": [{
                "keyJson": "ledger_key_contract_instance",
                "dataJson": {
                    "contract_data": {
                        "contract": contract_strkey(),
                        "key": "ledger_key_contract_instance",
                        "durability": "persistent",
                        "val": { "contract_instance": { "executable": {}, "storage": storage } }
                    }
                }
            }]
        })
    }

    #[tokio::test]
    async fn farm_index_reads_instance_storage() {
        let mut server = mockito::Server::new_async().await;
        let storage = json!([{ "key": { "symbol": "FarmIndex" }, "val": { "u32": 101 } }]);
        let _mock = server
            .mock("POST", "/")
            .with_body(rpc_result(instance_entries(storage)))
            .create_async()
            .await;

        let reader = reader_for(&server).await;
        assert_eq!(reader.farm_index().await.unwrap(), 101);
    }

    #[tokio::test]
    async fn absent_instance_entry_reads_as_zero() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_body(rpc_result(json!({ "entries": [] })))
            .create_async()
            .await;

        let reader = reader_for(&server).await;
        assert_eq!(reader.farm_index().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_farm_index_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let storage = json!([{ "key": { "symbol": "FarmIndex" }, "val": { "symbol": "oops" } }]);
        let _mock = server
            .mock("POST", "/")
            .with_body(rpc_result(instance_entries(storage)))
            .create_async()
            .await;

        let reader = reader_for(&server).await;
        assert_matches!(reader.farm_index().await, Err(ChainError::Decode(_)));
    }

    #[tokio::test]
    async fn block_entry_decodes_record() {
        let mut server = mockito::Server::new_async().await;
        let entropy_hex = hex::encode([7u8; 32]);
        let block = json!({
            "entries": [{
                "dataJson": {
                    "contract_data": {
                        "contract": contract_strkey(),
                        "key": { "vec": [{ "symbol": "Block" }, { "u32": 101 }] },
                        "durability": "temporary",
                        "val": { "map": [
                            { "key": { "symbol": "timestamp" }, "val": { "u64": "1722470400" } },
                            { "key": { "symbol": "entropy" }, "val": { "bytes": entropy_hex } },
                            { "key": { "symbol": "min_gap" }, "val": { "u32": 0 } },
                            { "key": { "symbol": "max_gap" }, "val": { "u32": 30 } },
                            { "key": { "symbol": "min_stake" }, "val": { "i128": { "hi": 0, "lo": 10000000 } } },
                            { "key": { "symbol": "max_stake" }, "val": { "i128": { "hi": 0, "lo": 100000000 } } },
                            { "key": { "symbol": "min_zeros" }, "val": { "u32": 6 } },
                            { "key": { "symbol": "max_zeros" }, "val": { "u32": 9 } },
                        ] }
                    }
                }
            }]
        });
        let _mock =
            server.mock("POST", "/").with_body(rpc_result(block)).create_async().await;

        let reader = reader_for(&server).await;
        let record = reader.block_entry(101).await.unwrap().unwrap();

        assert_eq!(record.index, 101);
        assert_eq!(record.timestamp, Some(1_722_470_400));
        assert_eq!(record.entropy, Some(Entropy::new([7u8; 32])));
        assert_eq!(record.min_stake, 10_000_000);
        assert_eq!(record.max_zeros, 9);
    }

    #[tokio::test]
    async fn missing_block_entry_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_body(rpc_result(json!({ "entries": [] })))
            .create_async()
            .await;

        let reader = reader_for(&server).await;
        assert!(reader.block_entry(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rpc_level_error_surfaces() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "jsonrpc": "2.0", "id": 1,
            "error": { "code": -32600, "message": "invalid request" }
        });
        let _mock =
            server.mock("POST", "/").with_body(body.to_string()).create_async().await;

        let reader = reader_for(&server).await;
        assert_matches!(
            reader.farm_index().await,
            Err(ChainError::Rpc { code: -32600, .. })
        );
    }
}
