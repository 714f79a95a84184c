//! Builds and signs legacy EVM transactions for a leased relayer wallet.

use alloy::{
    consensus::{SignableTransaction, TxLegacy},
    network::TxSigner,
    primitives::{Address as AlloyAddress, Bytes, FixedBytes, TxKind, U256},
    signers::{k256::ecdsa::SigningKey, local::LocalSigner as AlloyLocalSigner},
};
use log::info;

use crate::models::{RelayerWallet, SignerError, TxParams};

#[derive(Debug)]
pub struct SignedTransaction {
    pub hash: String,
    pub raw: Vec<u8>,
}

#[derive(Clone)]
pub struct TransactionSigner {
    chain_id: u64,
}

impl TransactionSigner {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    /// Derives the wallet's address from its key material and signs the
    /// transaction. A mismatch between derived and configured address means
    /// the pool was misconfigured and is fatal.
    pub async fn build_and_sign(
        &self,
        wallet: &RelayerWallet,
        params: &TxParams,
    ) -> Result<SignedTransaction, SignerError> {
        let key_bytes: FixedBytes<32> = FixedBytes::from_slice(wallet.key_bytes());
        let signer = AlloyLocalSigner::<SigningKey>::from_bytes(&key_bytes)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;

        let configured: AlloyAddress = wallet
            .address
            .parse()
            .map_err(|e| SignerError::InvalidKey(format!("bad wallet address: {e}")))?;
        let derived = signer.address();
        if derived != configured {
            return Err(SignerError::AddressMismatch {
                configured: wallet.address.clone(),
                derived: derived.to_string().to_lowercase(),
            });
        }

        let to: AlloyAddress = params
            .to
            .parse()
            .map_err(|e| SignerError::InvalidKey(format!("bad destination address: {e}")))?;

        let mut tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: params.nonce,
            gas_price: params.gas_price,
            gas_limit: params.gas_limit,
            to: TxKind::Call(to),
            value: U256::from(params.value),
            input: Bytes::from(params.data.clone()),
        };

        let signature = signer
            .sign_transaction(&mut tx)
            .await
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        let signed = tx.into_signed(signature);

        let mut raw = Vec::new();
        signed.rlp_encode(&mut raw);

        // Address and non-sensitive parameters only; key material never hits
        // the log.
        info!(
            "signed tx {} from {} to {} nonce {} gas_price {} gas_limit {}",
            signed.hash(),
            wallet.address,
            params.to,
            params.nonce,
            params.gas_price,
            params.gas_limit
        );

        Ok(SignedTransaction {
            hash: signed.hash().to_string(),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Address derived from this well-known test key.
    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const ADDRESS: &str = "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23";

    fn params() -> TxParams {
        TxParams {
            nonce: 3,
            gas_price: 10_000_000_000,
            gas_limit: 1_011_968,
            to: "0x0000000000000000000000000000000000000010".to_string(),
            value: 0,
            data: vec![0xa2, 0x2c, 0xb4, 0x65],
        }
    }

    #[tokio::test]
    async fn signs_when_address_matches() {
        let wallet = RelayerWallet::new(ADDRESS, KEY, 99).unwrap();
        let signer = TransactionSigner::new(99);

        let signed = signer.build_and_sign(&wallet, &params()).await.unwrap();
        assert!(signed.hash.starts_with("0x"));
        assert!(!signed.raw.is_empty());
    }

    #[tokio::test]
    async fn signing_is_deterministic() {
        let wallet = RelayerWallet::new(ADDRESS, KEY, 99).unwrap();
        let signer = TransactionSigner::new(99);

        let a = signer.build_and_sign(&wallet, &params()).await.unwrap();
        let b = signer.build_and_sign(&wallet, &params()).await.unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.raw, b.raw);
    }

    #[tokio::test]
    async fn rejects_address_mismatch() {
        let wallet =
            RelayerWallet::new("0x0000000000000000000000000000000000000bad", KEY, 99).unwrap();
        let signer = TransactionSigner::new(99);

        let err = signer.build_and_sign(&wallet, &params()).await.unwrap_err();
        match err {
            SignerError::AddressMismatch { derived, .. } => {
                assert_eq!(derived, ADDRESS);
            }
            other => panic!("expected address mismatch, got {other:?}"),
        }
    }
}
