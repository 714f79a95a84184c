//! Relayer wallet handle.
//!
//! Key material is owned exclusively by the wallet pool, zeroized on drop and
//! never serialized, logged or exposed outside the signing step.

use std::fmt;

use zeroize::Zeroizing;

use super::SignerError;

pub struct RelayerWallet {
    pub address: String,
    pub chain_id: u64,
    key: Zeroizing<Vec<u8>>,
}

impl RelayerWallet {
    /// Builds a wallet from a configured address and hex-encoded private key.
    pub fn new(address: &str, private_key_hex: &str, chain_id: u64) -> Result<Self, SignerError> {
        let key = hex::decode(private_key_hex.trim_start_matches("0x"))
            .map_err(|e| SignerError::InvalidKey(format!("private key is not valid hex: {e}")))?;
        if key.len() != 32 {
            return Err(SignerError::InvalidKey(format!(
                "private key must be 32 bytes, got {}",
                key.len()
            )));
        }
        Ok(Self {
            address: address.to_lowercase(),
            chain_id,
            key: Zeroizing::new(key),
        })
    }

    /// Raw key bytes, exposed only to the signer.
    pub(crate) fn key_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl fmt::Debug for RelayerWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayerWallet")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn accepts_valid_key() {
        let wallet = RelayerWallet::new("0xAbC0000000000000000000000000000000000001", KEY, 99)
            .expect("valid wallet");
        assert_eq!(wallet.address, "0xabc0000000000000000000000000000000000001");
        assert_eq!(wallet.key_bytes().len(), 32);
    }

    #[test]
    fn rejects_short_key() {
        let err = RelayerWallet::new("0xabc", "deadbeef", 99).unwrap_err();
        assert!(matches!(err, SignerError::InvalidKey(_)));
    }

    #[test]
    fn rejects_non_hex_key() {
        let err = RelayerWallet::new("0xabc", "zz", 99).unwrap_err();
        assert!(matches!(err, SignerError::InvalidKey(_)));
    }

    #[test]
    fn debug_redacts_key_material() {
        let wallet = RelayerWallet::new("0xabc0000000000000000000000000000000000001", KEY, 99)
            .expect("valid wallet");
        let printed = format!("{:?}", wallet);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains(KEY));
    }
}
