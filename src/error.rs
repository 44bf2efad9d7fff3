//! Error taxonomy for a provisioning run.
//!
//! Only [`ConfigError`] is fatal. Everything else is scoped to a single
//! account and ends up inside that account's result.

use alloy::primitives::TxHash;
use starknet::core::types::Felt;
use thiserror::Error;

/// Missing or malformed configuration, detected before any chain interaction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration value `{0}`")]
    Missing(&'static str),

    /// A key was provided but could not be parsed or is out of range.
    #[error("invalid value for `{key}`: {reason}")]
    Invalid {
        key: &'static str,
        reason: String,
    },

    #[error("failed to load config file {path}: {reason}")]
    File {
        path: String,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl ToString) -> Self {
        Self::Invalid { key, reason: reason.to_string() }
    }
}

/// Failure to move funds from the settlement chain onto an app-chain address.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Reading the baseline balance failed; nothing was submitted.
    #[error("failed to read initial balance of {}: {reason}", .recipient.to_fixed_hex_string())]
    InitialBalance {
        recipient: Felt,
        reason: String,
    },

    /// Deposit value plus fee margin does not fit in a uint256.
    #[error("deposit amount overflows uint256 once the fee margin is added")]
    AmountOverflow,

    /// The deposit transaction itself failed to submit or confirm.
    #[error("deposit for {} failed on the settlement chain: {reason}", .recipient.to_fixed_hex_string())]
    Deposit {
        recipient: Felt,
        reason: String,
    },

    /// The deposit confirmed but no balance increase was observed in the
    /// polling budget. The funds may still arrive; re-poll `recipient`.
    #[error(
        "balance of {} did not increase after {attempts} polls (deposit tx {deposit_tx})",
        .recipient.to_fixed_hex_string()
    )]
    Timeout {
        recipient: Felt,
        /// Balance reads performed after the deposit.
        attempts: u32,
        deposit_tx: TxHash,
    },

    /// A balance read failed while polling after a confirmed deposit.
    #[error(
        "balance poll {attempt} for {} failed (deposit tx {deposit_tx}): {reason}",
        .recipient.to_fixed_hex_string()
    )]
    Poll {
        recipient: Felt,
        attempt: u32,
        deposit_tx: TxHash,
        reason: String,
    },
}

/// Failure to deploy a generated account on the app chain.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("failed to submit deployment for {}: {reason}", .address.to_fixed_hex_string())]
    Submit {
        address: Felt,
        reason: String,
    },

    /// Waiting for the receipt failed.
    #[error("failed to confirm deployment tx {}: {reason}", .tx_hash.to_fixed_hex_string())]
    Confirmation {
        tx_hash: Felt,
        reason: String,
    },

    #[error("failed to deploy account - {}: {reason}", .tx_hash.to_fixed_hex_string())]
    Reverted {
        tx_hash: Felt,
        reason: String,
    },
}

/// Why a single account's pipeline did not complete.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The key source produced a private key already used in this run.
    #[error("generated private key for {} collides with an earlier account", .address.to_fixed_hex_string())]
    KeyCollision { address: Felt },

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Deployment(#[from] DeploymentError),

    #[error("failed to read final balance: {0}")]
    FinalBalance(String),
}
