//! JSON-RPC 2.0 client for the Soroban RPC endpoint. Ledger-entry reads
//! request the JSON XDR representation; simulation keeps the base64 form
//! because its `transactionData` is spliced back into the envelope as-is.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::scval::{ScVal, I64, U64};
use crate::ChainError;

#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: Url,
}

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    id: u32,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    #[serde(default)]
    result: Option<R>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// One decoded ledger entry, as returned with `xdrFormat: "json"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryData {
    Account(AccountEntry),
    ContractData(ContractDataEntry),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountEntry {
    pub account_id: String,
    pub seq_num: I64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractDataEntry {
    pub contract: String,
    pub key: ScVal,
    pub durability: String,
    pub val: ScVal,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetLedgerEntriesResponse {
    #[serde(default)]
    entries: Option<Vec<RawLedgerEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLedgerEntry {
    #[serde(default)]
    data_json: Option<LedgerEntryData>,
}

/// Simulation outcome for a transaction envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    /// Present iff the host call failed; the raw diagnostic string.
    #[serde(default)]
    pub error: Option<String>,
    /// Base64 `SorobanTransactionData` to splice into the envelope ext.
    #[serde(default)]
    pub transaction_data: Option<String>,
    #[serde(default)]
    pub min_resource_fee: Option<U64>,
}

impl RpcClient {
    pub fn new(url: Url) -> Self {
        Self { http: reqwest::Client::new(), url }
    }

    /// Fetches and decodes ledger entries for the given base64 XDR keys.
    /// Missing entries are simply absent from the result.
    pub async fn get_ledger_entries(
        &self,
        keys: &[String],
    ) -> Result<Vec<LedgerEntryData>, ChainError> {
        let params = json!({ "keys": keys, "xdrFormat": "json" });
        let response: GetLedgerEntriesResponse = self.call("getLedgerEntries", params).await?;

        Ok(response
            .entries
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| entry.data_json)
            .collect())
    }

    /// Current sequence number of an ed25519 account, by `G…` strkey.
    pub async fn get_account_sequence(&self, account: &str) -> Result<i64, ChainError> {
        let public_key = pooler_primitives::strkey::decode_account(account)?;
        let key = crate::xdr::account_key(&public_key);

        let entries = self.get_ledger_entries(&[key]).await?;
        match entries.into_iter().next() {
            Some(LedgerEntryData::Account(entry)) => Ok(entry.seq_num.0),
            Some(_) => Err(ChainError::Decode("account key yielded a non-account entry".into())),
            None => Err(ChainError::AccountNotFound(account.to_string())),
        }
    }

    /// Simulates a base64 transaction envelope.
    pub async fn simulate_transaction(
        &self,
        envelope_b64: &str,
    ) -> Result<SimulateResponse, ChainError> {
        self.call("simulateTransaction", json!({ "transaction": envelope_b64 })).await
    }

    async fn call<P: Serialize, R: DeserializeOwned + Default>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, ChainError> {
        let request = RpcRequest { jsonrpc: "2.0", id: 1, method, params };

        let response = self
            .http
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<RpcResponse<R>>()
            .await?;

        if let Some(error) = response.error {
            return Err(ChainError::Rpc { code: error.code, message: error.message });
        }

        response
            .result
            .ok_or_else(|| ChainError::Decode(format!("{method}: response carries no result")))
    }
}
