use alloy::primitives::{Address, TxHash, U256};
use starknet::core::types::Felt;

use crate::keys::AccountKeys;

/// Settlement-chain (L1) side of a devnet: funds bridge deposits and owns
/// the core contract.
#[allow(async_fn_in_trait)]
pub trait SettlementChain {
    /// Native balance of the funding wallet.
    async fn funder_balance(&self) -> eyre::Result<U256>;

    /// Calls `deposit(amount, recipient)` on the bridge with `value` attached
    /// and returns once the transaction has one confirmation.
    async fn deposit(&self, recipient: Felt, amount: U256, value: U256) -> eyre::Result<TxHash>;

    /// Forces the core contract's view of the app-chain state.
    async fn override_core_state(
        &self,
        core_contract: Address,
        commitment: &StateCommitment,
    ) -> eyre::Result<TxHash>;
}

/// Application-chain (L2) side of a devnet.
#[allow(async_fn_in_trait)]
pub trait AppChain {
    async fn chain_id(&self) -> eyre::Result<Felt>;

    /// ERC20 `balanceOf(account)` on `token`.
    async fn balance_of(&self, token: Felt, account: Felt) -> eyre::Result<U256>;

    /// Submits a deploy-account transaction signed by `keys` and returns its hash.
    async fn deploy_account(&self, keys: &AccountKeys, class_hash: Felt) -> eyre::Result<Felt>;

    /// Waits for `tx_hash` to be included and returns its execution outcome.
    async fn wait_for_transaction(&self, tx_hash: Felt) -> eyre::Result<AppReceipt>;

    async fn latest_block_number(&self) -> eyre::Result<u64>;

    /// State root and hash of a confirmed block.
    async fn state_commitment(&self, block_number: u64) -> eyre::Result<StateCommitment>;
}

/// Execution outcome of an app-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppReceipt {
    pub transaction_hash: Felt,
    pub revert_reason: Option<String>,
}

impl AppReceipt {
    pub fn is_success(&self) -> bool {
        self.revert_reason.is_none()
    }
}

/// What the core contract needs to resume settlement after `block_number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateCommitment {
    pub block_number: u64,
    pub global_root: Felt,
    pub block_hash: Felt,
}
