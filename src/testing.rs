//! In-memory doubles for the chain clients and the job store.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::Mutex,
};

use alloy::primitives::{keccak256, Address, TxHash, U256};
use eyre::{bail, eyre};
use starknet::{core::types::Felt, signers::SigningKey};

use crate::{
    chain::{AppChain, AppReceipt, SettlementChain, StateCommitment},
    jobs::{JobStore, StateTransitionJob},
    keys::{AccountKeys, KeySource},
};

pub const CLASS_HASH: Felt =
    Felt::from_hex_unchecked("0x1484c93b9d6cf61614d698ed069b3c6992c32549194fc3465258c2194734189");

pub fn felt(value: u64) -> Felt {
    Felt::from(value)
}

pub fn keys_for(secret: u64) -> AccountKeys {
    AccountKeys::from_signing_key(&SigningKey::from_secret_scalar(felt(secret)), CLASS_HASH)
}

/// Hands out the given secrets in order.
pub struct FixedKeys(pub VecDeque<u64>);

impl FixedKeys {
    pub fn new(secrets: impl IntoIterator<Item = u64>) -> Self {
        Self(secrets.into_iter().collect())
    }
}

impl KeySource for FixedKeys {
    fn next_key(&mut self) -> SigningKey {
        let secret = self.0.pop_front().expect("fixed key source exhausted");
        SigningKey::from_secret_scalar(felt(secret))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub recipient: Felt,
    pub amount: U256,
    pub value: U256,
    pub tx_hash: TxHash,
}

#[derive(Default)]
pub struct MockSettlement {
    deposits: Mutex<Vec<Deposit>>,
    failing: Mutex<HashSet<Felt>>,
    overrides: Mutex<Vec<(Address, StateCommitment)>>,
}

impl MockSettlement {
    pub fn fail_deposits_to(&self, recipient: Felt) {
        self.failing.lock().unwrap().insert(recipient);
    }

    pub fn deposits(&self) -> Vec<Deposit> {
        self.deposits.lock().unwrap().clone()
    }

    pub fn overrides(&self) -> Vec<(Address, StateCommitment)> {
        self.overrides.lock().unwrap().clone()
    }
}

impl SettlementChain for MockSettlement {
    async fn funder_balance(&self) -> eyre::Result<U256> {
        Ok(U256::from(10u64).pow(U256::from(21)))
    }

    async fn deposit(&self, recipient: Felt, amount: U256, value: U256) -> eyre::Result<TxHash> {
        if self.failing.lock().unwrap().contains(&recipient) {
            bail!("execution reverted: insufficient funds");
        }
        let mut deposits = self.deposits.lock().unwrap();
        let tx_hash = keccak256((deposits.len() as u64).to_be_bytes());
        deposits.push(Deposit {
            recipient,
            amount,
            value,
            tx_hash,
        });
        Ok(tx_hash)
    }

    async fn override_core_state(
        &self,
        core_contract: Address,
        commitment: &StateCommitment,
    ) -> eyre::Result<TxHash> {
        self.overrides
            .lock()
            .unwrap()
            .push((core_contract, *commitment));
        Ok(keccak256(commitment.block_number.to_be_bytes()))
    }
}

#[derive(Default)]
struct Balances {
    // Each read pops the front; the last value repeats forever.
    scripts: HashMap<Felt, VecDeque<U256>>,
    reads: HashMap<Felt, usize>,
    // Reads past this count fail.
    read_limits: HashMap<Felt, usize>,
}

#[derive(Default)]
pub struct MockAppChain {
    balances: Mutex<Balances>,
    deployed: Mutex<Vec<(Felt, Felt)>>,
    reverting: Mutex<HashSet<Felt>>,
    rejecting: Mutex<HashSet<Felt>>,
    unconfirmed: Mutex<HashSet<Felt>>,
    pub block_number: u64,
}

impl MockAppChain {
    pub fn with_block_number(block_number: u64) -> Self {
        Self {
            block_number,
            ..Default::default()
        }
    }

    pub fn script_balances(&self, account: Felt, balances: impl IntoIterator<Item = u64>) {
        let script = balances.into_iter().map(U256::from).collect();
        self.balances.lock().unwrap().scripts.insert(account, script);
    }

    /// Lets the first `reads` balance reads of `account` succeed and fails
    /// every later one.
    pub fn fail_balance_reads_after(&self, account: Felt, reads: usize) {
        self.balances
            .lock()
            .unwrap()
            .read_limits
            .insert(account, reads);
    }

    pub fn balance_reads(&self, account: Felt) -> usize {
        self.balances
            .lock()
            .unwrap()
            .reads
            .get(&account)
            .copied()
            .unwrap_or_default()
    }

    pub fn revert_deployment_of(&self, address: Felt) {
        self.reverting.lock().unwrap().insert(address);
    }

    pub fn reject_deployment_of(&self, address: Felt) {
        self.rejecting.lock().unwrap().insert(address);
    }

    /// The deployment of `address` is accepted but its receipt never loads.
    pub fn fail_receipt_of(&self, address: Felt) {
        self.unconfirmed.lock().unwrap().insert(address);
    }

    pub fn deployed(&self) -> Vec<(Felt, Felt)> {
        self.deployed.lock().unwrap().clone()
    }

    pub fn deploy_tx_hash(address: Felt) -> Felt {
        address + Felt::ONE
    }
}

impl AppChain for MockAppChain {
    async fn chain_id(&self) -> eyre::Result<Felt> {
        Ok(Felt::from_bytes_be_slice(b"MADARA_DEVNET"))
    }

    async fn balance_of(&self, _token: Felt, account: Felt) -> eyre::Result<U256> {
        let mut balances = self.balances.lock().unwrap();
        let reads = balances.reads.entry(account).or_default();
        *reads += 1;
        let reads = *reads;
        if balances
            .read_limits
            .get(&account)
            .is_some_and(|limit| reads > *limit)
        {
            bail!("connection reset by peer");
        }

        let script = balances
            .scripts
            .get_mut(&account)
            .ok_or_else(|| eyre!("contract not found"))?;
        let balance = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().copied()
        };
        balance.ok_or_else(|| eyre!("empty balance script"))
    }

    async fn deploy_account(&self, keys: &AccountKeys, class_hash: Felt) -> eyre::Result<Felt> {
        if self.rejecting.lock().unwrap().contains(&keys.address) {
            bail!("account validation failed: insufficient max fee");
        }
        self.deployed
            .lock()
            .unwrap()
            .push((keys.address, class_hash));
        Ok(Self::deploy_tx_hash(keys.address))
    }

    async fn wait_for_transaction(&self, tx_hash: Felt) -> eyre::Result<AppReceipt> {
        let lost = self
            .unconfirmed
            .lock()
            .unwrap()
            .iter()
            .any(|address| Self::deploy_tx_hash(*address) == tx_hash);
        if lost {
            bail!("transaction not included after 120 attempts");
        }

        let reverted = self
            .reverting
            .lock()
            .unwrap()
            .iter()
            .any(|address| Self::deploy_tx_hash(*address) == tx_hash);

        Ok(AppReceipt {
            transaction_hash: tx_hash,
            revert_reason: reverted.then(|| "insufficient balance for fee".to_string()),
        })
    }

    async fn latest_block_number(&self) -> eyre::Result<u64> {
        Ok(self.block_number)
    }

    async fn state_commitment(&self, block_number: u64) -> eyre::Result<StateCommitment> {
        if block_number > self.block_number {
            bail!("block {block_number} not found");
        }
        Ok(StateCommitment {
            block_number,
            global_root: felt(0x1000 + block_number),
            block_hash: felt(0x2000 + block_number),
        })
    }
}

#[derive(Default)]
pub struct MemoryJobStore {
    pub jobs: Mutex<BTreeMap<u64, StateTransitionJob>>,
}

impl JobStore for MemoryJobStore {
    async fn clear(&self) -> eyre::Result<u64> {
        let mut jobs = self.jobs.lock().unwrap();
        let removed = jobs.len() as u64;
        jobs.clear();
        Ok(removed)
    }

    async fn ensure_settled(&self, job: &StateTransitionJob) -> eyre::Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&job.block_number) {
            return Ok(false);
        }
        jobs.insert(job.block_number, job.clone());
        Ok(true)
    }
}
