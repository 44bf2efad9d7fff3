use starknet::core::types::Felt;
use tracing::info;

use crate::{
    chain::{AppChain, AppReceipt},
    error::DeploymentError,
    keys::AccountKeys,
};

/// Turns generated keys into a live account contract.
///
/// The target address must already hold enough balance for the deployment
/// fee; a shortfall surfaces as [`DeploymentError::Submit`].
pub struct AccountProvisioner<'a, A> {
    app: &'a A,
    class_hash: Felt,
}

impl<'a, A: AppChain> AccountProvisioner<'a, A> {
    pub fn new(app: &'a A, class_hash: Felt) -> Self {
        Self { app, class_hash }
    }

    pub async fn deploy(&self, keys: &AccountKeys) -> Result<AppReceipt, DeploymentError> {
        info!(address = %keys.address.to_fixed_hex_string(), "deploying account");

        let tx_hash = self
            .app
            .deploy_account(keys, self.class_hash)
            .await
            .map_err(|err| DeploymentError::Submit {
                address: keys.address,
                reason: format!("{err:#}"),
            })?;

        let receipt = self
            .app
            .wait_for_transaction(tx_hash)
            .await
            .map_err(|err| DeploymentError::Confirmation {
                tx_hash,
                reason: format!("{err:#}"),
            })?;

        if let Some(reason) = &receipt.revert_reason {
            return Err(DeploymentError::Reverted {
                tx_hash,
                reason: reason.clone(),
            });
        }

        info!(tx_hash = %tx_hash.to_fixed_hex_string(), "account deployed");
        Ok(receipt)
    }
}
