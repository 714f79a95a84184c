//! Out-of-band relayer wallet balance monitoring.
//!
//! Development chains get topped up automatically from a configured funder
//! account. In production an underfunded wallet is an operational error that
//! must be raised loudly, since it would otherwise surface later as silent
//! submission failures.

use std::{sync::Arc, time::Duration};

use alloy::primitives::U256;
use log::{error, info};

use crate::{
    config::Environment,
    constants::TRANSFER_GAS_LIMIT,
    models::{RelayerError, RelayerWallet, TxParams},
    services::{EvmProviderTrait, GasPriceOracleTrait, TransactionSigner},
};

use super::pool::WalletPool;

pub struct FundingMonitor<P: EvmProviderTrait> {
    chain_label: String,
    provider: Arc<P>,
    oracle: Arc<dyn GasPriceOracleTrait>,
    signer: TransactionSigner,
    pool: Arc<WalletPool>,
    funder: Option<Arc<RelayerWallet>>,
    minimum_balance: u128,
    environment: Environment,
}

impl<P: EvmProviderTrait> FundingMonitor<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain_label: &str,
        chain_id: u64,
        provider: Arc<P>,
        oracle: Arc<dyn GasPriceOracleTrait>,
        pool: Arc<WalletPool>,
        funder: Option<RelayerWallet>,
        minimum_balance: u128,
        environment: Environment,
    ) -> Self {
        Self {
            chain_label: chain_label.to_string(),
            provider,
            oracle,
            signer: TransactionSigner::new(chain_id),
            pool,
            funder: funder.map(Arc::new),
            minimum_balance,
            environment,
        }
    }

    /// Checks every pool wallet against the minimum balance. Development
    /// shortfalls are topped up; the first production shortfall is returned
    /// as an error.
    pub async fn check_and_fund(&self) -> Result<(), RelayerError> {
        let minimum = U256::from(self.minimum_balance);
        for wallet in self.pool.wallets() {
            let balance = self.provider.get_balance(&wallet.address).await?;
            if balance >= minimum {
                continue;
            }

            if self.environment.is_development() {
                info!(
                    "{} - funding - wallet {} below minimum ({} < {}), funding",
                    self.chain_label, wallet.address, balance, minimum
                );
                self.fund(wallet).await?;
            } else {
                error!(
                    "{} - funding - wallet {} below minimum ({} < {}) in production",
                    self.chain_label, wallet.address, balance, minimum
                );
                return Err(RelayerError::FundingShortfall {
                    address: wallet.address.clone(),
                    balance: balance.to_string(),
                    minimum: minimum.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn fund(&self, wallet: &RelayerWallet) -> Result<(), RelayerError> {
        let funder = self.funder.as_ref().ok_or_else(|| {
            RelayerError::Configuration("no funder account configured for auto-funding".into())
        })?;

        let gas_price = self.oracle.gas_price().await?;
        let nonce = self.provider.get_transaction_count(&funder.address).await?;
        let params = TxParams {
            nonce,
            gas_price,
            gas_limit: TRANSFER_GAS_LIMIT,
            to: wallet.address.clone(),
            value: self.minimum_balance,
            data: Vec::new(),
        };
        let signed = self.signer.build_and_sign(funder, &params).await?;
        let receipt = self.provider.send_raw_transaction(&signed.raw).await?;
        info!(
            "{} - funding - transferred {} wei from {} to {} in tx {}",
            self.chain_label,
            self.minimum_balance,
            funder.address,
            wallet.address,
            receipt.transaction_hash
        );
        Ok(())
    }

    /// Periodic monitor loop; errors are logged, not propagated, so one bad
    /// cycle does not stop monitoring.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.check_and_fund().await {
                error!("{} - funding - check failed: {e}", self.chain_label);
            }
        }
    }
}
