use alloy::primitives::{Address, TxHash};
use tracing::info;

use crate::chain::{AppChain, SettlementChain, StateCommitment};

/// Points the core contract at an app-chain block so settlement resumes
/// after it. Uses the latest block unless `block` is given.
pub async fn override_state<S, A>(
    settlement: &S,
    app: &A,
    core_contract: Address,
    block: Option<u64>,
) -> eyre::Result<(StateCommitment, TxHash)>
where
    S: SettlementChain,
    A: AppChain,
{
    let block_number = match block {
        Some(block) => block,
        None => app.latest_block_number().await?,
    };
    let commitment = app.state_commitment(block_number).await?;
    info!(
        block_number,
        global_root = %commitment.global_root.to_fixed_hex_string(),
        block_hash = %commitment.block_hash.to_fixed_hex_string(),
        %core_contract,
        "overriding core contract state"
    );

    let tx_hash = settlement
        .override_core_state(core_contract, &commitment)
        .await?;
    Ok((commitment, tx_hash))
}
