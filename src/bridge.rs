//! Settlement-to-app-chain funding.
//!
//! The bridge relay gives no completion signal. A deposit is submitted on
//! the settlement chain, then the recipient's app-chain balance is polled
//! on a timer until it rises above the balance read before the deposit.

use std::time::Duration;

use alloy::primitives::{TxHash, U256};
use starknet::core::types::Felt;
use tracing::{debug, info};

use crate::{
    chain::{AppChain, SettlementChain},
    error::BridgeError,
};

/// 0.01 ETH on top of the bridged amount to cover the L1→L2 message fee.
pub const DEPOSIT_FEE_MARGIN_WEI: u128 = 10_000_000_000_000_000;

/// Retry budget of a single bridge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgePolicy {
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub fee_margin: U256,
}

impl Default for BridgePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
            max_polls: 10,
            fee_margin: U256::from(DEPOSIT_FEE_MARGIN_WEI),
        }
    }
}

/// State of one bridge call, dropped when the call returns.
#[derive(Debug)]
struct BridgeAttempt {
    recipient: Felt,
    initial_balance: U256,
    poll_count: u32,
    max_polls: u32,
}

impl BridgeAttempt {
    fn exhausted(&self) -> bool {
        self.poll_count >= self.max_polls
    }

    /// Only a strict increase over this attempt's own baseline counts.
    fn arrived(&self, balance: U256) -> bool {
        balance > self.initial_balance
    }
}

/// A deposit whose funds were observed on the app chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeReceipt {
    pub deposit_tx: TxHash,
    pub initial_balance: U256,
    pub balance: U256,
    pub polls: u32,
}

pub struct BridgeCoordinator<'a, S, A> {
    settlement: &'a S,
    app: &'a A,
    token: Felt,
    policy: BridgePolicy,
}

impl<'a, S, A> BridgeCoordinator<'a, S, A>
where
    S: SettlementChain,
    A: AppChain,
{
    pub fn new(settlement: &'a S, app: &'a A, token: Felt, policy: BridgePolicy) -> Self {
        Self {
            settlement,
            app,
            token,
            policy,
        }
    }

    /// Deposits `amount` for `recipient` and waits for it to land.
    ///
    /// Exactly one deposit is submitted once the baseline read succeeds. A
    /// [`BridgeError::Timeout`] means the deposit confirmed but the credit
    /// was not seen within `max_polls` reads; it may still arrive.
    pub async fn bridge(&self, recipient: Felt, amount: U256) -> Result<BridgeReceipt, BridgeError> {
        let initial_balance = self
            .app
            .balance_of(self.token, recipient)
            .await
            .map_err(|err| BridgeError::InitialBalance {
                recipient,
                reason: format!("{err:#}"),
            })?;
        debug!(%initial_balance, "initial app-chain balance");

        let value = amount
            .checked_add(self.policy.fee_margin)
            .ok_or(BridgeError::AmountOverflow)?;
        let deposit_tx = self
            .settlement
            .deposit(recipient, amount, value)
            .await
            .map_err(|err| BridgeError::Deposit {
                recipient,
                reason: format!("{err:#}"),
            })?;

        let mut attempt = BridgeAttempt {
            recipient,
            initial_balance,
            poll_count: 0,
            max_polls: self.policy.max_polls,
        };

        loop {
            attempt.poll_count += 1;
            let balance = self
                .app
                .balance_of(self.token, attempt.recipient)
                .await
                .map_err(|err| BridgeError::Poll {
                    recipient,
                    attempt: attempt.poll_count,
                    deposit_tx,
                    reason: format!("{err:#}"),
                })?;

            if attempt.arrived(balance) {
                info!(%balance, polls = attempt.poll_count, "funds arrived on app chain");
                return Ok(BridgeReceipt {
                    deposit_tx,
                    initial_balance,
                    balance,
                    polls: attempt.poll_count,
                });
            }
            if attempt.exhausted() {
                return Err(BridgeError::Timeout {
                    recipient,
                    attempts: attempt.poll_count,
                    deposit_tx,
                });
            }

            debug!(poll = attempt.poll_count, "waiting for funds to arrive on app chain");
            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }
}
