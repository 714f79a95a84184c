//! JSON-RPC transport for EVM-compatible chains.
//!
//! Each provider instance talks to exactly one endpoint and performs no
//! retries; primary/secondary failover is the orchestrator's concern, which
//! keeps this a swappable transport adapter.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use alloy::primitives::U256;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use crate::{
    constants::{RECEIPT_POLL_INTERVAL_MS, RECEIPT_POLL_MAX_ATTEMPTS},
    models::{ProviderError, TransactionReceipt},
};

#[cfg(test)]
use mockall::automock;

/// Interface for the chain interactions the relay core needs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EvmProviderTrait: Send + Sync {
    /// Current network gas price in wei.
    async fn get_gas_price(&self) -> Result<u128, ProviderError>;

    /// Pending-state transaction count for an address. Read while the wallet
    /// is leased so no concurrent relay observes the same nonce.
    async fn get_transaction_count(&self, address: &str) -> Result<u64, ProviderError>;

    async fn get_balance(&self, address: &str) -> Result<U256, ProviderError>;

    /// Submits raw signed transaction bytes and waits for the receipt.
    async fn send_raw_transaction(&self, raw: &[u8])
        -> Result<TransactionReceipt, ProviderError>;
}

/// Parses a 0x-prefixed hex quantity from a JSON-RPC response.
pub fn parse_quantity(value: &str) -> Result<u128, ProviderError> {
    let stripped = value.trim_start_matches("0x");
    u128::from_str_radix(stripped, 16)
        .map_err(|e| ProviderError::BadResponse(format!("invalid hex quantity {value:?}: {e}")))
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

pub struct EvmProvider {
    url: String,
    client: Client,
    request_id: AtomicU64,
}

impl EvmProvider {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.to_string(),
            client,
            request_id: AtomicU64::new(1),
        })
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ProviderError> {
        self.rpc_optional(method, params)
            .await?
            .ok_or_else(|| ProviderError::BadResponse(format!("{method} returned no result")))
    }

    /// Sends one JSON-RPC request. A null `result` maps to `None`, which is a
    /// meaningful answer for methods like `eth_getTransactionReceipt`.
    async fn rpc_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, ProviderError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!("rpc {} -> {}", method, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::Rpc(format!(
                "{} (code {})",
                error.message, error.code
            )));
        }
        Ok(parsed.result)
    }
}

#[async_trait]
impl EvmProviderTrait for EvmProvider {
    async fn get_gas_price(&self) -> Result<u128, ProviderError> {
        let hex: String = self.rpc("eth_gasPrice", json!([])).await?;
        parse_quantity(&hex)
    }

    async fn get_transaction_count(&self, address: &str) -> Result<u64, ProviderError> {
        let hex: String = self
            .rpc("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        Ok(parse_quantity(&hex)? as u64)
    }

    async fn get_balance(&self, address: &str) -> Result<U256, ProviderError> {
        let hex: String = self.rpc("eth_getBalance", json!([address, "latest"])).await?;
        let stripped = hex.trim_start_matches("0x");
        U256::from_str_radix(stripped, 16)
            .map_err(|e| ProviderError::BadResponse(format!("invalid balance {hex:?}: {e}")))
    }

    async fn send_raw_transaction(
        &self,
        raw: &[u8],
    ) -> Result<TransactionReceipt, ProviderError> {
        let raw_hex = format!("0x{}", hex::encode(raw));
        let tx_hash: String = self.rpc("eth_sendRawTransaction", json!([raw_hex])).await?;
        debug!("submitted {}, polling for receipt", tx_hash);

        // The caller expects a mined receipt, matching web3's
        // sendSignedTransaction semantics.
        for _ in 0..RECEIPT_POLL_MAX_ATTEMPTS {
            let receipt: Option<TransactionReceipt> = self
                .rpc_optional("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            tokio::time::sleep(Duration::from_millis(RECEIPT_POLL_INTERVAL_MS)).await;
        }
        Err(ProviderError::ReceiptTimeout(tx_hash))
    }
}
