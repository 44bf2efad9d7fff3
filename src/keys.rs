use starknet::{
    core::{types::Felt, utils::get_contract_address},
    signers::SigningKey,
};

/// Deploy-account transactions have no deployer.
const DEPLOYER_ADDRESS: Felt = Felt::ZERO;

/// A fresh Stark keypair and the address its account contract will occupy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKeys {
    pub address: Felt,
    pub public_key: Felt,
    pub private_key: Felt,
}

impl AccountKeys {
    pub fn from_signing_key(signing_key: &SigningKey, class_hash: Felt) -> Self {
        let public_key = signing_key.verifying_key().scalar();

        Self {
            address: account_address(public_key, class_hash),
            public_key,
            private_key: signing_key.secret_scalar(),
        }
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_secret_scalar(self.private_key)
    }

    /// Constructor calldata of the account contract.
    pub fn constructor_calldata(&self) -> [Felt; 1] {
        [self.public_key]
    }

    /// Deployment salt; equals the public key so the address is unique per key.
    pub fn salt(&self) -> Felt {
        self.public_key
    }
}

/// Address of an account of `class_hash` whose constructor takes only the
/// public key, deployed with the public key as salt.
pub fn account_address(public_key: Felt, class_hash: Felt) -> Felt {
    get_contract_address(public_key, class_hash, &[public_key], DEPLOYER_ADDRESS)
}

/// Where private keys come from.
pub trait KeySource {
    fn next_key(&mut self) -> SigningKey;
}

/// Cryptographically random keys from the OS RNG.
#[derive(Debug, Default)]
pub struct RandomKeys;

impl KeySource for RandomKeys {
    fn next_key(&mut self) -> SigningKey {
        SigningKey::from_random()
    }
}
