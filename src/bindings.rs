use alloy::{primitives::U256, sol};
use starknet::core::types::Felt;

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface StarknetEthBridge {
        function deposit(uint256 amount, uint256 l2Recipient) external payable;
    }
);

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface StarknetCoreContract {
        function updateStateOverride(uint256 globalRoot, int256 blockNumber, uint256 blockHash) external;
    }
);

/// Widens a field element into the EVM word that carries it in calldata.
pub fn felt_to_u256(felt: Felt) -> U256 {
    U256::from_be_bytes(felt.to_bytes_be())
}

/// Joins the `(low, high)` halves of a Cairo `u256` returned by an ERC20 view.
pub fn u256_from_halves(low: Felt, high: Felt) -> U256 {
    (felt_to_u256(high) << 128) | felt_to_u256(low)
}
