use std::{future::Future, time::Duration};

use alloy::primitives::U256;
use eyre::{bail, OptionExt, WrapErr};
use starknet::{
    accounts::{AccountFactory, OpenZeppelinAccountFactory},
    core::types::{
        BlockId, BlockTag, ExecutionResult, Felt, FunctionCall, MaybePendingStateUpdate,
        StarknetError,
    },
    macros::selector,
    providers::{jsonrpc::HttpTransport, JsonRpcClient, Provider, ProviderError},
    signers::LocalWallet,
};
use tracing::{debug, trace};
use url::Url;

use crate::{
    bindings::u256_from_halves,
    chain::{AppChain, AppReceipt, StateCommitment},
    keys::AccountKeys,
};

/// How long to wait for an app-chain receipt before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_attempts: 120,
        }
    }
}

/// Calls `fetch` until the node knows `tx_hash`, at most
/// `policy.max_attempts` times. Only `TransactionHashNotFound` is retried.
async fn poll_receipt<R, F, Fut>(
    policy: ReceiptPolicy,
    tx_hash: Felt,
    mut fetch: F,
) -> eyre::Result<R>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, ProviderError>>,
{
    for attempt in 1..=policy.max_attempts {
        match fetch().await {
            Ok(receipt) => return Ok(receipt),
            Err(ProviderError::StarknetError(StarknetError::TransactionHashNotFound)) => {
                trace!(attempt, "receipt not available yet");
            }
            Err(err) => {
                return Err(err).wrap_err_with(|| {
                    format!("failed to fetch receipt {}", tx_hash.to_fixed_hex_string())
                })
            }
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    bail!(
        "transaction {} not included after {} attempts",
        tx_hash.to_fixed_hex_string(),
        policy.max_attempts
    )
}

/// Starknet-compatible app chain over JSON-RPC.
pub struct StarknetAppChain {
    url: Url,
    provider: JsonRpcClient<HttpTransport>,
    receipts: ReceiptPolicy,
}

impl StarknetAppChain {
    pub fn new(url: Url, receipts: ReceiptPolicy) -> Self {
        let provider = JsonRpcClient::new(HttpTransport::new(url.clone()));
        Self {
            url,
            provider,
            receipts,
        }
    }
}

impl AppChain for StarknetAppChain {
    async fn chain_id(&self) -> eyre::Result<Felt> {
        self.provider
            .chain_id()
            .await
            .wrap_err("failed to read app-chain id")
    }

    async fn balance_of(&self, token: Felt, account: Felt) -> eyre::Result<U256> {
        let call = FunctionCall {
            contract_address: token,
            entry_point_selector: selector!("balanceOf"),
            calldata: vec![account],
        };
        let result = self
            .provider
            .call(call, BlockId::Tag(BlockTag::Latest))
            .await
            .wrap_err("balanceOf call failed")?;

        let low = *result.first().ok_or_eyre("balanceOf returned no data")?;
        let high = result.get(1).copied().unwrap_or(Felt::ZERO);
        Ok(u256_from_halves(low, high))
    }

    async fn deploy_account(&self, keys: &AccountKeys, class_hash: Felt) -> eyre::Result<Felt> {
        let chain_id = self.chain_id().await?;
        let signer = LocalWallet::from_signing_key(keys.signing_key());
        // The factory takes its provider by value.
        let provider = JsonRpcClient::new(HttpTransport::new(self.url.clone()));

        let factory = OpenZeppelinAccountFactory::new(class_hash, chain_id, signer, provider)
            .await
            .wrap_err("failed to build account factory")?;
        let deployment = factory.deploy_v1(keys.salt());
        let expected = deployment.address();
        if expected != keys.address {
            bail!(
                "factory would deploy to {} instead of {}",
                expected.to_fixed_hex_string(),
                keys.address.to_fixed_hex_string()
            );
        }

        let result = deployment
            .send()
            .await
            .wrap_err("deploy-account transaction rejected")?;
        debug!(
            tx_hash = %result.transaction_hash.to_fixed_hex_string(),
            "deploy-account submitted"
        );
        Ok(result.transaction_hash)
    }

    async fn wait_for_transaction(&self, tx_hash: Felt) -> eyre::Result<AppReceipt> {
        let provider = &self.provider;
        let receipt = poll_receipt(self.receipts, tx_hash, move || {
            provider.get_transaction_receipt(tx_hash)
        })
        .await?;

        let revert_reason = match receipt.receipt.execution_result() {
            ExecutionResult::Succeeded => None,
            ExecutionResult::Reverted { reason } => Some(reason.clone()),
        };
        Ok(AppReceipt {
            transaction_hash: tx_hash,
            revert_reason,
        })
    }

    async fn latest_block_number(&self) -> eyre::Result<u64> {
        self.provider
            .block_number()
            .await
            .wrap_err("failed to read app-chain block number")
    }

    async fn state_commitment(&self, block_number: u64) -> eyre::Result<StateCommitment> {
        let update = self
            .provider
            .get_state_update(BlockId::Number(block_number))
            .await
            .wrap_err_with(|| format!("failed to read state update of block {block_number}"))?;

        match update {
            MaybePendingStateUpdate::Update(update) => Ok(StateCommitment {
                block_number,
                global_root: update.new_root,
                block_hash: update.block_hash,
            }),
            MaybePendingStateUpdate::PendingUpdate(_) => {
                bail!("block {block_number} is still pending")
            }
        }
    }
}
