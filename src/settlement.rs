use std::{marker::PhantomData, time::Duration};

use alloy::{
    network::{Ethereum, ReceiptResponse},
    primitives::{Address, TxHash, I256, U256},
    providers::Provider,
    transports::Transport,
};
use eyre::{bail, OptionExt, WrapErr};
use starknet::core::types::Felt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    bindings::{felt_to_u256, StarknetCoreContract, StarknetEthBridge},
    chain::{SettlementChain, StateCommitment},
};

/// How long a submitted transaction may take to confirm. The submission lock
/// is held for the whole wait.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Ethereum settlement layer reached through a wallet-filled alloy provider.
pub struct EthereumSettlement<P, T> {
    provider: P,
    funder: Address,
    bridge: Option<Address>,
    confirmation_timeout: Duration,
    // One funding wallet: submissions are serialized so nonces never race.
    submit: Mutex<()>,
    _phantom: PhantomData<T>,
}

impl<P, T> EthereumSettlement<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    pub fn new(provider: P, funder: Address) -> Self {
        Self {
            provider,
            funder,
            bridge: None,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            submit: Mutex::new(()),
            _phantom: PhantomData,
        }
    }

    /// Sets the L1 bridge used by [`SettlementChain::deposit`].
    pub fn with_bridge(mut self, bridge: Address) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }
}

impl<P, T> SettlementChain for EthereumSettlement<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    async fn funder_balance(&self) -> eyre::Result<U256> {
        self.provider
            .get_balance(self.funder)
            .await
            .wrap_err("failed to read funder balance")
    }

    async fn deposit(&self, recipient: Felt, amount: U256, value: U256) -> eyre::Result<TxHash> {
        let bridge = self.bridge.ok_or_eyre("no bridge contract configured")?;
        let bridge = StarknetEthBridge::new(bridge, &self.provider);
        let _guard = self.submit.lock().await;

        let pending = bridge
            .deposit(amount, felt_to_u256(recipient))
            .value(value)
            .send()
            .await
            .wrap_err("failed to send bridge deposit")?;
        let tx_hash = *pending.tx_hash();
        debug!(%tx_hash, "deposit submitted");

        let receipt = pending
            .with_required_confirmations(1)
            .with_timeout(Some(self.confirmation_timeout))
            .get_receipt()
            .await
            .wrap_err_with(|| format!("failed to confirm deposit {tx_hash}"))?;
        if !receipt.status() {
            bail!("deposit transaction {tx_hash} reverted");
        }
        info!(%tx_hash, %amount, "deposit confirmed on settlement chain");

        Ok(tx_hash)
    }

    async fn override_core_state(
        &self,
        core_contract: Address,
        commitment: &StateCommitment,
    ) -> eyre::Result<TxHash> {
        let core = StarknetCoreContract::new(core_contract, &self.provider);
        let block_number = I256::from_raw(U256::from(commitment.block_number));
        let _guard = self.submit.lock().await;

        let receipt = core
            .updateStateOverride(
                felt_to_u256(commitment.global_root),
                block_number,
                felt_to_u256(commitment.block_hash),
            )
            .send()
            .await
            .wrap_err("failed to send state override")?
            .with_timeout(Some(self.confirmation_timeout))
            .get_receipt()
            .await
            .wrap_err("failed to confirm state override")?;
        if !receipt.status() {
            bail!("state override {} reverted", receipt.transaction_hash);
        }

        Ok(receipt.transaction_hash)
    }
}
