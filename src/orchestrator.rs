//! Batch account provisioning.
//!
//! Every account runs generate → bridge → deploy → balance read on its own.
//! Failures are captured in that account's [`ProvisioningResult`] and never
//! stop the batch. Results come back in request order.

use std::{collections::HashSet, fmt::Write as _};

use alloy::primitives::{utils::format_ether, U256};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::{
    bridge::BridgeCoordinator,
    chain::{AppChain, SettlementChain},
    config::ProvisioningConfig,
    error::ProvisionError,
    keys::{AccountKeys, KeySource},
    provisioner::AccountProvisioner,
};

/// Outcome of one requested account.
#[derive(Debug)]
pub struct ProvisioningResult {
    /// 0-based position in the batch.
    pub index: usize,
    pub keys: AccountKeys,
    pub final_balance: Option<U256>,
    pub error: Option<ProvisionError>,
}

impl ProvisioningResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Orchestrator<'a, S, A> {
    settlement: &'a S,
    app: &'a A,
    config: &'a ProvisioningConfig,
}

impl<'a, S, A> Orchestrator<'a, S, A>
where
    S: SettlementChain,
    A: AppChain,
{
    pub fn new(settlement: &'a S, app: &'a A, config: &'a ProvisioningConfig) -> Self {
        Self {
            settlement,
            app,
            config,
        }
    }

    /// Provisions `account_count` accounts, at most `concurrency` at a time.
    pub async fn run<K: KeySource>(&self, key_source: &mut K) -> Vec<ProvisioningResult> {
        let count = self.config.account_count;
        info!(count, "creating and funding accounts");

        let mut seen = HashSet::new();
        let planned: Vec<_> = (0..count)
            .map(|index| {
                let keys = AccountKeys::from_signing_key(
                    &key_source.next_key(),
                    self.config.account_class_hash,
                );
                let unique = seen.insert(keys.private_key);
                (index, keys, unique)
            })
            .collect();

        stream::iter(planned)
            .map(|(index, keys, unique)| {
                let span = info_span!("account", index = index + 1, of = count);
                self.provision(index, keys, unique).instrument(span)
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    async fn provision(&self, index: usize, keys: AccountKeys, unique: bool) -> ProvisioningResult {
        let outcome = if unique {
            self.pipeline(&keys).await
        } else {
            Err(ProvisionError::KeyCollision {
                address: keys.address,
            })
        };

        match outcome {
            Ok(balance) => {
                info!(
                    address = %keys.address.to_fixed_hex_string(),
                    balance = %format_ether(balance),
                    "account created"
                );
                ProvisioningResult {
                    index,
                    keys,
                    final_balance: Some(balance),
                    error: None,
                }
            }
            Err(err) => {
                warn!(error = %err, "account failed");
                ProvisioningResult {
                    index,
                    keys,
                    final_balance: None,
                    error: Some(err),
                }
            }
        }
    }

    async fn pipeline(&self, keys: &AccountKeys) -> Result<U256, ProvisionError> {
        BridgeCoordinator::new(
            self.settlement,
            self.app,
            self.config.token_address,
            self.config.bridge_policy,
        )
        .bridge(keys.address, self.config.deposit_amount)
        .await?;

        AccountProvisioner::new(self.app, self.config.account_class_hash)
            .deploy(keys)
            .await?;

        self.app
            .balance_of(self.config.token_address, keys.address)
            .await
            .map_err(|err| ProvisionError::FinalBalance(format!("{err:#}")))
    }
}

/// Human-readable report of a finished batch.
pub fn summary(results: &[ProvisioningResult]) -> String {
    let succeeded = results.iter().filter(|r| r.succeeded()).count();
    let mut out = String::new();

    let _ = writeln!(out, "Summary: {succeeded}/{} accounts created", results.len());
    for result in results {
        let _ = writeln!(out);
        let _ = writeln!(out, "Account {}:", result.index + 1);
        let _ = writeln!(out, "  Address:     {}", result.keys.address.to_fixed_hex_string());
        let _ = writeln!(out, "  Private Key: {}", result.keys.private_key.to_fixed_hex_string());
        match (&result.error, result.final_balance) {
            (None, Some(balance)) => {
                let _ = writeln!(out, "  Balance:     {} ETH", format_ether(balance));
            }
            (Some(err), _) => {
                let _ = writeln!(out, "  FAILED:      {err}");
            }
            (None, None) => {}
        }
    }

    out
}

/// Serializable view of a result for `--output`.
#[derive(Debug, Serialize)]
pub struct AccountRecord {
    pub index: usize,
    pub address: String,
    pub public_key: String,
    pub private_key: String,
    pub balance_wei: Option<String>,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl From<&ProvisioningResult> for AccountRecord {
    fn from(result: &ProvisioningResult) -> Self {
        Self {
            index: result.index,
            address: result.keys.address.to_fixed_hex_string(),
            public_key: result.keys.public_key.to_fixed_hex_string(),
            private_key: result.keys.private_key.to_fixed_hex_string(),
            balance_wei: result.final_balance.map(|b| b.to_string()),
            succeeded: result.succeeded(),
            error: result.error.as_ref().map(ToString::to_string),
        }
    }
}
