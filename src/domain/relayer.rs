//! Relay orchestrator.
//!
//! Per-request state machine:
//!
//! ```text
//! RECEIVED -> IDEMPOTENCY_CHECK -> (CACHED_RETURN | WALLET_LEASE)
//!          -> BUILD_SIGN -> SUBMIT_PRIMARY -> (SUCCESS | SUBMIT_SECONDARY)
//!          -> (SUCCESS | FAILED)
//! ```
//!
//! The secondary endpoint is attempted at most once, as an explicit second
//! step rather than recursion, and the wallet is released on every exit path
//! out of the lease. Audit entries are written before the wallet is released.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::{
    models::{
        AuditEntry, RelayRequest, RelayerError, RelayerWallet, RepositoryError,
        TransactionReceipt, TransactionRecord, TxParams,
    },
    repositories::{AuditLogTrait, TransactionRepositoryTrait},
    services::{EvmProviderTrait, GasPriceOracleTrait, TransactionSigner},
};

use super::pool::WalletPool;

pub struct RelayOrchestrator<P: EvmProviderTrait> {
    chain_label: String,
    default_gas_limit: u64,
    pool: Arc<WalletPool>,
    oracle: Arc<dyn GasPriceOracleTrait>,
    signer: TransactionSigner,
    primary: Arc<P>,
    secondary: Arc<P>,
    transactions: Arc<dyn TransactionRepositoryTrait>,
    audit: Arc<dyn AuditLogTrait>,
}

impl<P: EvmProviderTrait> Clone for RelayOrchestrator<P> {
    fn clone(&self) -> Self {
        Self {
            chain_label: self.chain_label.clone(),
            default_gas_limit: self.default_gas_limit,
            pool: self.pool.clone(),
            oracle: self.oracle.clone(),
            signer: self.signer.clone(),
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
            transactions: self.transactions.clone(),
            audit: self.audit.clone(),
        }
    }
}

impl<P: EvmProviderTrait + 'static> RelayOrchestrator<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain_label: &str,
        chain_id: u64,
        default_gas_limit: u64,
        pool: Arc<WalletPool>,
        oracle: Arc<dyn GasPriceOracleTrait>,
        primary: Arc<P>,
        secondary: Arc<P>,
        transactions: Arc<dyn TransactionRepositoryTrait>,
        audit: Arc<dyn AuditLogTrait>,
    ) -> Self {
        Self {
            chain_label: chain_label.to_string(),
            default_gas_limit,
            pool,
            oracle,
            signer: TransactionSigner::new(chain_id),
            primary,
            secondary,
            transactions,
            audit,
        }
    }

    /// Relays one request and returns the receipt.
    ///
    /// Terminal outcomes: the cached receipt for an already-relayed payload,
    /// a receipt from the primary or secondary endpoint, or an error after
    /// the secondary also failed (or a fatal configuration problem).
    ///
    /// The lease/submit/release cycle runs in its own task, so a caller that
    /// stops waiting for the result cannot cancel it mid-flight: the
    /// submission still runs to completion, the outcome is audited and
    /// persisted, and the wallet is always released.
    pub async fn relay(&self, request: RelayRequest) -> Result<TransactionReceipt, RelayerError> {
        let payload_hash = request.payload_hash();

        // Idempotency check comes before any wallet work: a retrying caller
        // resubmitting a well-formed payload must not replay it on-chain.
        if let Some(existing) = self.transactions.find_by_payload_hash(&payload_hash).await? {
            info!(
                "{} - relay - returning cached receipt for {}",
                self.chain_label, payload_hash
            );
            return Ok(existing.receipt);
        }

        let this = self.clone();
        let worker = tokio::spawn(async move {
            let wallet = this.pool.lease().await;
            debug!(
                "{} - relay - selected wallet {} for sender {}",
                this.chain_label, wallet.address, request.sender_address
            );
            this.write_attempt(&payload_hash, &request.sender_address)
                .await;

            let outcome = this
                .relay_with_wallet(&wallet, &request, &payload_hash)
                .await;

            // Release happens on every exit path out of the lease, after the
            // audit record for the outcome has been written.
            this.pool.release(&wallet).await;
            outcome
        });
        match worker.await {
            Ok(outcome) => outcome,
            Err(e) => Err(RelayerError::Configuration(format!(
                "relay worker task failed: {e}"
            ))),
        }
    }

    async fn relay_with_wallet(
        &self,
        wallet: &RelayerWallet,
        request: &RelayRequest,
        payload_hash: &str,
    ) -> Result<TransactionReceipt, RelayerError> {
        let data = request.decoded_payload().map_err(|e| {
            RelayerError::Configuration(format!("encoded payload is not valid hex: {e}"))
        })?;
        let gas_limit = request.gas_limit.unwrap_or(self.default_gas_limit);

        match self
            .submit_via(&self.primary, wallet, request, &data, gas_limit)
            .await
        {
            Ok((receipt, params)) => {
                self.finish_success(request, payload_hash, receipt, params)
                    .await
            }
            Err(primary_err) if primary_err.is_transient() => {
                warn!(
                    "{} - relay - primary submission failed ({primary_err}), retrying with \
                     secondary endpoint",
                    self.chain_label
                );
                // Exactly one secondary attempt, rebuilt against the
                // secondary endpoint's own nonce view.
                match self
                    .submit_via(&self.secondary, wallet, request, &data, gas_limit)
                    .await
                {
                    Ok((receipt, params)) => {
                        self.finish_success(request, payload_hash, receipt, params)
                            .await
                    }
                    Err(secondary_err) => {
                        let err = RelayerError::Submission {
                            primary: primary_err.to_string(),
                            secondary: secondary_err.to_string(),
                        };
                        self.finish_failure(request, payload_hash, &err).await;
                        Err(err)
                    }
                }
            }
            Err(fatal) => {
                // Misconfiguration, not transient RPC trouble; no retry.
                self.finish_failure(request, payload_hash, &fatal).await;
                Err(fatal)
            }
        }
    }

    /// BUILD_SIGN and SUBMIT against one endpoint: gas price, nonce read
    /// under the lease, sign, send.
    async fn submit_via(
        &self,
        provider: &Arc<P>,
        wallet: &RelayerWallet,
        request: &RelayRequest,
        data: &[u8],
        gas_limit: u64,
    ) -> Result<(TransactionReceipt, TxParams), RelayerError> {
        let gas_price = self.oracle.gas_price().await?;
        let nonce = provider.get_transaction_count(&wallet.address).await?;

        let params = TxParams {
            nonce,
            gas_price,
            gas_limit,
            to: request.contract_address.clone(),
            value: 0,
            data: data.to_vec(),
        };
        let signed = self.signer.build_and_sign(wallet, &params).await?;

        info!(
            "{} - relay - sending tx for wallet {} to {}, nonce {}, gas_price {}, gas_limit {}",
            self.chain_label, wallet.address, request.contract_address, nonce, gas_price, gas_limit
        );
        let receipt = provider.send_raw_transaction(&signed.raw).await?;
        Ok((receipt, params))
    }

    async fn finish_success(
        &self,
        request: &RelayRequest,
        payload_hash: &str,
        receipt: TransactionReceipt,
        params: TxParams,
    ) -> Result<TransactionReceipt, RelayerError> {
        let entry = AuditEntry::new(payload_hash, &request.sender_address, Some(params));
        if let Err(e) = self.audit.log_success(&entry).await {
            warn!("{} - relay - success audit write failed: {e}", self.chain_label);
        }
        if let Err(e) = self
            .audit
            .map_tx_hash_to_sender(&receipt.transaction_hash, &request.sender_address)
            .await
        {
            warn!("{} - relay - tx hash map write failed: {e}", self.chain_label);
        }

        let record = TransactionRecord::from_request(request, receipt.clone());
        match self.transactions.create(record).await {
            Ok(()) => {}
            // A concurrent duplicate lost the race to persist first; the
            // unique constraint doing its job is not a relay failure.
            Err(RepositoryError::AlreadyExists(_)) => {
                debug!(
                    "{} - relay - record for {} already persisted",
                    self.chain_label, payload_hash
                );
            }
            Err(e) => return Err(e.into()),
        }

        info!("{} - relay - success, req {}", self.chain_label, payload_hash);
        Ok(receipt)
    }

    async fn finish_failure(&self, request: &RelayRequest, payload_hash: &str, err: &RelayerError) {
        error!(
            "{} - relay - failed for req {}: {err}",
            self.chain_label, payload_hash
        );
        let entry = AuditEntry::new(payload_hash, &request.sender_address, None);
        if let Err(e) = self.audit.log_failure(&entry).await {
            warn!("{} - relay - failure audit write failed: {e}", self.chain_label);
        }
    }

    async fn write_attempt(&self, payload_hash: &str, sender_address: &str) {
        let entry = AuditEntry::new(payload_hash, sender_address, None);
        if let Err(e) = self.audit.log_attempt(&entry).await {
            warn!("{} - relay - attempt audit write failed: {e}", self.chain_label);
        }
    }
}
