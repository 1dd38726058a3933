//! Block-explorer API client
//!
//! Etherscan-style read API: paged token-transfer lists, block-by-time
//! lookups and contract-creation metadata. The `TransferSource` trait is the
//! seam the pipeline depends on, so tests can substitute an in-memory fake.

use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;

use crate::snapshot_core::address;
use crate::snapshot_core::types::TransferEvent;

use super::http::HttpJson;
use super::FetchError;

/// Maximum rows returned by a single transfer-list call.
pub const TXN_BATCH_SIZE: usize = 10_000;

const HTTP_TIMEOUT_SECS: u64 = 30;

/// One transfer row as returned by the explorer API (all fields are strings
/// on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawTransfer {
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "timeStamp")]
    pub time_stamp: String,
    pub from: String,
    pub to: String,
    pub value: String,
}

impl RawTransfer {
    /// Parse into a core event.
    ///
    /// Unparseable addresses become `None` sides; a row with an unparseable
    /// number is dropped entirely.
    pub fn to_event(&self) -> Option<TransferEvent> {
        Some(TransferEvent {
            block_number: self.block_number.trim().parse().ok()?,
            timestamp: self.time_stamp.trim().parse().ok()?,
            from: address::normalize(&self.from),
            to: address::normalize(&self.to),
            value: self.value.trim().parse().ok()?,
        })
    }
}

/// Read side of a block-explorer API.
#[async_trait]
pub trait TransferSource: Send + Sync {
    /// Token transfers touching `holder` (a pool contract), ascending by
    /// block; both range ends are included in the response.
    async fn token_transfers(
        &self,
        holder: Option<Address>,
        token: Address,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<RawTransfer>, FetchError>;

    /// Number of the first block at or after a unix timestamp.
    async fn block_by_time(&self, timestamp: i64) -> Result<u64, FetchError>;

    /// Deployer address of a contract, when the explorer knows it.
    async fn contract_creator(&self, contract: Address) -> Result<Option<Address>, FetchError>;

    /// Timestamp of the contract's first internal transaction (creation).
    async fn creation_timestamp(&self, contract: Address) -> Result<Option<i64>, FetchError>;
}

pub struct ExplorerClient {
    http: HttpJson,
    api_url: String,
    api_key: String,
    chain_id: String,
    call_delay: Duration,
}

impl ExplorerClient {
    pub fn new(
        api_url: String,
        api_key: String,
        chain_id: String,
        call_delay: Duration,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpJson::new(HTTP_TIMEOUT_SECS)?,
            api_url,
            api_key,
            chain_id,
            call_delay,
        })
    }

    fn base_params(&self, module: &str, action: &str) -> Vec<(&'static str, String)> {
        vec![
            ("chainid", self.chain_id.clone()),
            ("apikey", self.api_key.clone()),
            ("module", module.to_string()),
            ("action", action.to_string()),
        ]
    }

    /// GET and unwrap the API's `result` envelope.
    async fn result_field(&self, params: &[(&'static str, String)]) -> Result<Value, FetchError> {
        sleep(self.call_delay).await;
        let mut body = self.http.get_json(&self.api_url, params, None).await?;
        match body.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(FetchError::MissingField {
                field: "result".to_string(),
            }),
        }
    }
}

#[async_trait]
impl TransferSource for ExplorerClient {
    async fn token_transfers(
        &self,
        holder: Option<Address>,
        token: Address,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<RawTransfer>, FetchError> {
        let mut params = self.base_params("account", "tokentx");
        params.push(("contractaddress", address::checksum(&token)));
        params.push(("startblock", start_block.to_string()));
        params.push(("endblock", end_block.to_string()));
        params.push(("sort", "asc".to_string()));
        if let Some(holder) = holder {
            params.push(("address", address::checksum(&holder)));
        }

        let result = self.result_field(&params).await?;
        // The API reports "no records" as an empty array, and errors as a
        // plain string in the same field.
        if let Some(message) = result.as_str() {
            log::warn!("Explorer returned no transfer list: {}", message);
            return Ok(Vec::new());
        }
        serde_json::from_value(result).map_err(|e| FetchError::Decode {
            detail: format!("transfer list: {}", e),
        })
    }

    async fn block_by_time(&self, timestamp: i64) -> Result<u64, FetchError> {
        let mut params = self.base_params("block", "getblocknobytime");
        params.push(("timestamp", timestamp.to_string()));
        params.push(("closest", "after".to_string()));

        let result = self.result_field(&params).await?;
        result
            .as_str()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| FetchError::Decode {
                detail: format!("block number for timestamp {}", timestamp),
            })
    }

    async fn contract_creator(&self, contract: Address) -> Result<Option<Address>, FetchError> {
        let mut params = self.base_params("contract", "getcontractcreation");
        params.push(("contractaddresses", address::checksum(&contract)));

        let result = self.result_field(&params).await?;
        Ok(result
            .get(0)
            .and_then(|entry| entry.get("contractCreator"))
            .and_then(Value::as_str)
            .and_then(address::normalize))
    }

    async fn creation_timestamp(&self, contract: Address) -> Result<Option<i64>, FetchError> {
        let mut params = self.base_params("account", "txlistinternal");
        params.push(("address", address::checksum(&contract)));
        params.push(("startblock", "0".to_string()));
        params.push(("sort", "asc".to_string()));

        let result = self.result_field(&params).await?;
        Ok(result
            .get(0)
            .and_then(|entry| entry.get("timeStamp"))
            .and_then(Value::as_str)
            .and_then(|s| s.trim().parse().ok()))
    }
}
