//! JSON-RPC pair-state reads at historical blocks
//!
//! Reads `token0()`, `token1()`, `totalSupply()` and `getReserves()` from an
//! LP pair contract via `eth_call`, rotating across the configured RPC
//! nodes with a bounded total-attempt budget.

use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::sleep;

use crate::snapshot_core::address;

use super::FetchError;

const TOKEN0_SELECTOR: &str = "0x0dfe1681";
const TOKEN1_SELECTOR: &str = "0xd21220a7";
const TOTAL_SUPPLY_SELECTOR: &str = "0x18160ddd";
const GET_RESERVES_SELECTOR: &str = "0x0902f1ac";

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Historical pair state needed for LP ratio samples.
#[async_trait]
pub trait PairStateSource: Send + Sync {
    /// The two token contracts of an LP pair.
    async fn pair_tokens(&self, lp: Address) -> Result<(Address, Address), FetchError>;

    /// Total LP supply and the reserve at `reserve_index` (0 or 1) at a
    /// historical block.
    async fn supply_and_reserve(
        &self,
        lp: Address,
        block: u64,
        reserve_index: usize,
    ) -> Result<(u128, u128), FetchError>;
}

pub struct RpcClient {
    http: reqwest::Client,
    nodes: Vec<String>,
    current: Mutex<usize>,
    max_attempts: u32,
    call_delay: Duration,
}

impl RpcClient {
    /// `max_tries_per_node` bounds the total budget across all nodes.
    pub fn new(
        nodes: Vec<String>,
        max_tries_per_node: u32,
        call_delay: Duration,
    ) -> Result<Self, FetchError> {
        if nodes.is_empty() {
            return Err(FetchError::Decode {
                detail: "no RPC nodes configured".to_string(),
            });
        }
        let max_attempts = max_tries_per_node.max(1) * nodes.len() as u32;
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
                .build()?,
            nodes,
            current: Mutex::new(0),
            max_attempts,
            call_delay,
        })
    }

    fn next_node(&self) -> String {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let node = self.nodes[*current % self.nodes.len()].clone();
        *current = (*current + 1) % self.nodes.len();
        node
    }

    /// `eth_call` returning the raw hex result, rotating nodes on failure.
    async fn eth_call(
        &self,
        to: Address,
        data: &str,
        block: Option<u64>,
    ) -> Result<String, FetchError> {
        let block_tag = block
            .map(|b| format!("0x{:x}", b))
            .unwrap_or_else(|| "latest".to_string());

        for _ in 0..self.max_attempts {
            sleep(self.call_delay).await;
            let node = self.next_node();
            let payload = json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_call",
                "params": [
                    { "to": address::checksum(&to), "data": data },
                    block_tag,
                ],
            });

            let response = match self.http.post(&node).json(&payload).send().await {
                Ok(response) => response,
                Err(e) => {
                    log::warn!("RPC node {} failed: {}, rotating", node, e);
                    continue;
                }
            };
            let body: Value = match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    log::warn!("RPC node {} returned malformed JSON: {}, rotating", node, e);
                    continue;
                }
            };
            match body.get("result").and_then(Value::as_str) {
                Some(result) => return Ok(result.to_string()),
                None => {
                    log::warn!(
                        "RPC node {} returned no result: {}, rotating",
                        node,
                        body.get("error").cloned().unwrap_or(Value::Null)
                    );
                    continue;
                }
            }
        }

        Err(FetchError::RpcNodesExhausted {
            attempts: self.max_attempts,
        })
    }
}

#[async_trait]
impl PairStateSource for RpcClient {
    async fn pair_tokens(&self, lp: Address) -> Result<(Address, Address), FetchError> {
        let token0 = self.eth_call(lp, TOKEN0_SELECTOR, None).await?;
        let token1 = self.eth_call(lp, TOKEN1_SELECTOR, None).await?;
        Ok((
            decode_address(&token0).ok_or_else(|| FetchError::Decode {
                detail: format!("token0 word '{}'", token0),
            })?,
            decode_address(&token1).ok_or_else(|| FetchError::Decode {
                detail: format!("token1 word '{}'", token1),
            })?,
        ))
    }

    async fn supply_and_reserve(
        &self,
        lp: Address,
        block: u64,
        reserve_index: usize,
    ) -> Result<(u128, u128), FetchError> {
        let supply_word = self.eth_call(lp, TOTAL_SUPPLY_SELECTOR, Some(block)).await?;
        let supply = decode_uint(&supply_word, 0).ok_or_else(|| FetchError::Decode {
            detail: format!("totalSupply word '{}'", supply_word),
        })?;

        let reserves = self.eth_call(lp, GET_RESERVES_SELECTOR, Some(block)).await?;
        let reserve = decode_uint(&reserves, reserve_index).ok_or_else(|| FetchError::Decode {
            detail: format!("reserve {} of '{}'", reserve_index, reserves),
        })?;

        Ok((supply, reserve))
    }
}

fn strip_hex(raw: &str) -> &str {
    raw.strip_prefix("0x").unwrap_or(raw)
}

/// Address packed into the low 20 bytes of a 32-byte return word.
fn decode_address(raw: &str) -> Option<Address> {
    let hex = strip_hex(raw);
    if hex.len() != 64 {
        return None;
    }
    Address::from_str(&format!("0x{}", &hex[24..])).ok()
}

/// Unsigned integer from the `index`-th 32-byte return word.
fn decode_uint(raw: &str, index: usize) -> Option<u128> {
    let hex = strip_hex(raw);
    let word = hex.get(index * 64..(index + 1) * 64)?;
    u128::from_str_radix(word, 16).ok()
}
