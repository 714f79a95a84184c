//! Relay request, persisted transaction record and audit entry models.

use chrono::Utc;
use serde::{Deserialize, Serialize, Serializer};
use sha3::{Digest, Keccak256};

/// A request to relay one pre-built contract call. Immutable, consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRequest {
    pub contract_registry_key: String,
    pub contract_address: String,
    /// ABI-encoded call data, 0x-prefixed hex. Doubles as the idempotency key
    /// since payloads embed a signature/nonce that cannot recur.
    pub encoded_payload: String,
    pub sender_address: String,
    pub gas_limit: Option<u64>,
}

impl RelayRequest {
    /// Keccak hash of the normalized payload, used as the unique record key.
    pub fn payload_hash(&self) -> String {
        let normalized = self
            .encoded_payload
            .trim_start_matches("0x")
            .to_lowercase();
        let digest = Keccak256::digest(normalized.as_bytes());
        format!("0x{}", hex::encode(digest))
    }

    pub fn decoded_payload(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(self.encoded_payload.trim_start_matches("0x"))
    }

    /// Best-effort label for the called function: the 4-byte selector.
    pub fn function_selector(&self) -> Option<String> {
        let bytes = self.decoded_payload().ok()?;
        if bytes.len() < 4 {
            return None;
        }
        Some(format!("0x{}", hex::encode(&bytes[..4])))
    }
}

/// Receipt as returned by the chain, kept in RPC wire casing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub gas_used: Option<String>,
}

/// Persisted once per successfully submitted payload; never mutated or
/// deleted. `payload_hash` carries the unique constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub payload_hash: String,
    pub encoded_payload: String,
    pub contract_registry_key: String,
    pub function_selector: Option<String>,
    pub contract_address: String,
    pub sender_address: String,
    pub receipt: TransactionReceipt,
    pub created_at: i64,
}

impl TransactionRecord {
    pub fn from_request(request: &RelayRequest, receipt: TransactionReceipt) -> Self {
        Self {
            payload_hash: request.payload_hash(),
            encoded_payload: request.encoded_payload.clone(),
            contract_registry_key: request.contract_registry_key.clone(),
            function_selector: request.function_selector(),
            contract_address: request.contract_address.clone(),
            sender_address: request.sender_address.clone(),
            receipt,
            created_at: Utc::now().timestamp(),
        }
    }
}

fn serialize_hex<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(data)))
}

/// Final parameters a transaction was signed with. Logged for forensics; the
/// payload is serialized as hex.
#[derive(Debug, Clone, Serialize)]
pub struct TxParams {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: String,
    pub value: u128,
    #[serde(serialize_with = "serialize_hex")]
    pub data: Vec<u8>,
}

/// Append-only observability record. No read-path correctness dependency.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: i64,
    pub request_hash: String,
    pub sender_address: String,
    pub tx_params: Option<TxParams>,
    pub nonce: Option<u64>,
}

impl AuditEntry {
    pub fn new(request_hash: &str, sender_address: &str, tx_params: Option<TxParams>) -> Self {
        let nonce = tx_params.as_ref().map(|p| p.nonce);
        Self {
            timestamp: Utc::now().timestamp(),
            request_hash: request_hash.to_string(),
            sender_address: sender_address.to_string(),
            tx_params,
            nonce,
        }
    }
}
