//! Configuration loading and validation.
//!
//! Values come from an optional YAML file and are overridden by flags or
//! their environment variables. Validation turns the merged strings into
//! typed, immutable configs before anything talks to a chain.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use alloy::primitives::{utils::parse_ether, Address, B256, U256};
use clap::Args;
use serde::Deserialize;
use starknet::core::types::Felt;
use url::Url;

use crate::{appchain::ReceiptPolicy, bridge::BridgePolicy, error::ConfigError};

const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const DEFAULT_AMOUNT: &str = "10";
const DEFAULT_MONGODB_URI: &str = "mongodb://mongodb:27017";
const DEFAULT_DATABASE: &str = "orchestrator";
/// Upper bound on `num_accounts`; every key is generated before the first deposit.
pub const MAX_ACCOUNTS: usize = 1000;

/// A YAML scalar that may be written as a number or a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn text(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(v) => v.trim().to_string(),
        }
    }
}

/// Shape of `config.yaml`. Every key is optional here; requirements are
/// enforced per command.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub eth_rpc_url: Option<String>,
    pub starknet_rpc_url: Option<String>,
    pub l1_bridge_address: Option<String>,
    pub eth_token_address: Option<String>,
    pub num_accounts: Option<Scalar>,
    pub eth_private_key: Option<String>,
    pub oz_account_cairo_1_class_hash: Option<String>,
    pub amount: Option<Scalar>,
    pub starknet_contract_address: Option<String>,
    pub mongodb_uri: Option<String>,
    pub concurrency: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub max_polls: Option<u32>,
}

impl FileConfig {
    /// Reads `path`, or `config.yaml` in the working directory when no path
    /// is given and that file exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = std::fs::read_to_string(&path).map_err(|err| ConfigError::File {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Self::parse(&contents).map_err(|err| match err {
            ConfigError::File { reason, .. } => ConfigError::File {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|err| ConfigError::File {
            path: String::new(),
            reason: err.to_string(),
        })
    }
}

/// Connection settings shared by every command.
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    /// Settlement-chain (L1) JSON-RPC endpoint.
    #[arg(long, env = "ETH_RPC_URL", global = true)]
    pub eth_rpc_url: Option<String>,

    /// App-chain (L2) JSON-RPC endpoint.
    #[arg(long, env = "STARKNET_RPC_URL", global = true)]
    pub starknet_rpc_url: Option<String>,

    /// L1 private key funding deposits and signing admin transactions.
    #[arg(long, env = "ETH_PRIVATE_KEY", global = true, hide_env_values = true)]
    pub eth_private_key: Option<String>,
}

/// Settings of `init-accounts`.
#[derive(Debug, Clone, Default, Args)]
pub struct InitAccountsArgs {
    /// L1 ETH bridge contract.
    #[arg(long, env = "L1_BRIDGE_ADDRESS")]
    pub l1_bridge_address: Option<String>,

    /// ETH ERC20 on the app chain.
    #[arg(long, env = "ETH_TOKEN_ADDRESS")]
    pub eth_token_address: Option<String>,

    /// Class hash of the OpenZeppelin Cairo 1 account.
    #[arg(long, env = "OZ_ACCOUNT_CAIRO_1_CLASS_HASH")]
    pub oz_account_cairo_1_class_hash: Option<String>,

    /// Number of accounts to create.
    #[arg(long, env = "NUM_ACCOUNTS")]
    pub num_accounts: Option<String>,

    /// ETH to bridge to each account.
    #[arg(long, env = "AMOUNT")]
    pub amount: Option<String>,

    /// Accounts provisioned at the same time.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Delay between app-chain balance polls.
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Balance polls before a bridge attempt times out.
    #[arg(long)]
    pub max_polls: Option<u32>,

    /// Write the results as JSON to this file.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Settings of `override-state`.
#[derive(Debug, Clone, Default, Args)]
pub struct OverrideStateArgs {
    /// Core contract on the settlement chain.
    #[arg(long, env = "STARKNET_CONTRACT_ADDRESS")]
    pub core_contract_address: Option<String>,

    /// App-chain block to anchor; defaults to the latest block.
    #[arg(long)]
    pub block: Option<u64>,
}

/// Settings of `settle-genesis-range`.
#[derive(Debug, Clone, Default, Args)]
pub struct SettleRangeArgs {
    /// Orchestrator job store.
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// Database holding the `jobs` collection.
    #[arg(long, default_value = DEFAULT_DATABASE)]
    pub database: String,

    /// Last block to mark settled; defaults to the app chain's latest block.
    #[arg(long)]
    pub last_block: Option<u64>,

    /// Delete every existing job first.
    #[arg(long)]
    pub reset: bool,
}

/// Everything `init-accounts` needs, validated.
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    pub settlement_rpc_url: Url,
    pub application_rpc_url: Url,
    pub bridge_contract_address: Address,
    pub token_address: Felt,
    pub signer_private_key: B256,
    pub account_class_hash: Felt,
    pub account_count: usize,
    /// Per-account deposit in wei.
    pub deposit_amount: U256,
    pub concurrency: usize,
    pub bridge_policy: BridgePolicy,
}

impl ProvisioningConfig {
    pub fn resolve(
        file: &FileConfig,
        conn: &ConnectionArgs,
        args: &InitAccountsArgs,
    ) -> Result<Self, ConfigError> {
        let settlement_rpc_url = parse_url(
            "eth_rpc_url",
            pick(&conn.eth_rpc_url, &file.eth_rpc_url),
        )?;
        let application_rpc_url = parse_url(
            "starknet_rpc_url",
            pick(&conn.starknet_rpc_url, &file.starknet_rpc_url),
        )?;
        let bridge_contract_address = parse_required(
            "l1_bridge_address",
            pick(&args.l1_bridge_address, &file.l1_bridge_address),
        )?;
        let token_address = parse_felt(
            "eth_token_address",
            pick(&args.eth_token_address, &file.eth_token_address),
        )?;
        let signer_private_key = parse_required(
            "eth_private_key",
            pick(&conn.eth_private_key, &file.eth_private_key),
        )?;
        let account_class_hash = parse_felt(
            "oz_account_cairo_1_class_hash",
            pick(
                &args.oz_account_cairo_1_class_hash,
                &file.oz_account_cairo_1_class_hash,
            ),
        )?;

        let account_count = args
            .num_accounts
            .clone()
            .or_else(|| file.num_accounts.as_ref().map(Scalar::text))
            .ok_or(ConfigError::Missing("num_accounts"))
            .and_then(|raw| parse_account_count(&raw))?;
        let deposit_amount = args
            .amount
            .clone()
            .or_else(|| file.amount.as_ref().map(Scalar::text))
            .map_or_else(|| parse_amount(DEFAULT_AMOUNT), |raw| parse_amount(&raw))?;

        let concurrency = args.concurrency.or(file.concurrency).unwrap_or(1);
        if concurrency == 0 {
            return Err(ConfigError::invalid("concurrency", "must be at least 1"));
        }

        let defaults = BridgePolicy::default();
        let max_polls = args.max_polls.or(file.max_polls).unwrap_or(defaults.max_polls);
        if max_polls == 0 {
            return Err(ConfigError::invalid("max_polls", "must be at least 1"));
        }
        let poll_interval = args
            .poll_interval_ms
            .or(file.poll_interval_ms)
            .map_or(defaults.poll_interval, Duration::from_millis);

        Ok(Self {
            settlement_rpc_url,
            application_rpc_url,
            bridge_contract_address,
            token_address,
            signer_private_key,
            account_class_hash,
            account_count,
            deposit_amount,
            concurrency,
            bridge_policy: BridgePolicy {
                poll_interval,
                max_polls,
                ..defaults
            },
        })
    }

    pub fn receipt_policy(&self) -> ReceiptPolicy {
        ReceiptPolicy::default()
    }
}

/// Everything `override-state` needs, validated.
#[derive(Debug, Clone)]
pub struct StateOverrideConfig {
    pub settlement_rpc_url: Url,
    pub application_rpc_url: Url,
    pub signer_private_key: B256,
    pub core_contract_address: Address,
    pub block: Option<u64>,
}

impl StateOverrideConfig {
    pub fn resolve(
        file: &FileConfig,
        conn: &ConnectionArgs,
        args: &OverrideStateArgs,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            settlement_rpc_url: parse_url(
                "eth_rpc_url",
                pick(&conn.eth_rpc_url, &file.eth_rpc_url),
            )?,
            application_rpc_url: parse_url(
                "starknet_rpc_url",
                pick(&conn.starknet_rpc_url, &file.starknet_rpc_url),
            )?,
            signer_private_key: parse_required(
                "eth_private_key",
                pick(&conn.eth_private_key, &file.eth_private_key),
            )?,
            core_contract_address: parse_required(
                "starknet_contract_address",
                pick(&args.core_contract_address, &file.starknet_contract_address),
            )?,
            block: args.block,
        })
    }
}

/// Where the end of the settled range comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastBlock {
    Given(u64),
    /// Latest block of the app chain at this RPC.
    LatestOn(Url),
}

/// Everything `settle-genesis-range` needs, validated.
#[derive(Debug, Clone)]
pub struct JobStoreConfig {
    pub last_block: LastBlock,
    pub mongodb_uri: String,
    pub database: String,
    pub reset: bool,
}

impl JobStoreConfig {
    pub fn resolve(
        file: &FileConfig,
        conn: &ConnectionArgs,
        args: &SettleRangeArgs,
    ) -> Result<Self, ConfigError> {
        // The RPC is only needed to discover the last block.
        let last_block = match args.last_block {
            Some(block) => LastBlock::Given(block),
            None => LastBlock::LatestOn(parse_url(
                "starknet_rpc_url",
                pick(&conn.starknet_rpc_url, &file.starknet_rpc_url),
            )?),
        };
        let mongodb_uri = pick(&args.mongodb_uri, &file.mongodb_uri)
            .unwrap_or(DEFAULT_MONGODB_URI)
            .to_string();
        if !mongodb_uri.starts_with("mongodb://") && !mongodb_uri.starts_with("mongodb+srv://") {
            return Err(ConfigError::invalid("mongodb_uri", "expected a mongodb:// URI"));
        }

        Ok(Self {
            last_block,
            mongodb_uri,
            database: args.database.clone(),
            reset: args.reset,
        })
    }
}

/// Flag or environment value first, then the file.
fn pick<'a>(flag: &'a Option<String>, file: &'a Option<String>) -> Option<&'a str> {
    flag.as_deref()
        .or(file.as_deref())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_required<T>(key: &'static str, raw: Option<&str>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.ok_or(ConfigError::Missing(key))?
        .parse()
        .map_err(|err| ConfigError::invalid(key, err))
}

fn parse_url(key: &'static str, raw: Option<&str>) -> Result<Url, ConfigError> {
    let url: Url = parse_required(key, raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::invalid(key, format!("unsupported scheme `{other}`"))),
    }
}

fn parse_felt(key: &'static str, raw: Option<&str>) -> Result<Felt, ConfigError> {
    let raw = raw.ok_or(ConfigError::Missing(key))?;
    Felt::from_hex(raw).map_err(|err| ConfigError::invalid(key, err))
}

fn parse_account_count(raw: &str) -> Result<usize, ConfigError> {
    let count: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid("num_accounts", "must be a positive integer"))?;
    if count <= 0 {
        return Err(ConfigError::invalid("num_accounts", "must be a positive integer"));
    }
    match usize::try_from(count) {
        Ok(count) if count <= MAX_ACCOUNTS => Ok(count),
        _ => Err(ConfigError::invalid(
            "num_accounts",
            format!("at most {MAX_ACCOUNTS} accounts per run"),
        )),
    }
}

/// ETH amount to wei. Accepts integers and decimals up to 18 places.
fn parse_amount(raw: &str) -> Result<U256, ConfigError> {
    let raw = raw.trim();
    if raw.starts_with('-') {
        return Err(ConfigError::invalid("amount", "must be positive"));
    }
    let wei = parse_ether(raw).map_err(|err| ConfigError::invalid("amount", err))?;
    if wei.is_zero() {
        return Err(ConfigError::invalid("amount", "must be positive"));
    }
    Ok(wei)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
eth_rpc_url: "http://localhost:8545"
starknet_rpc_url: "http://localhost:9945"
l1_bridge_address: "0x8a791620dd6260079bf849dc5567adc3f2fdc318"
eth_token_address: "0x49d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7"
num_accounts: 2
eth_private_key: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
oz_account_cairo_1_class_hash: "0x1484c93b9d6cf61614d698ed069b3c6992c32549194fc3465258c2194734189"
amount: 10
"#;

    fn resolve(file: &str, args: InitAccountsArgs) -> Result<ProvisioningConfig, ConfigError> {
        let file = FileConfig::parse(file).unwrap();
        ProvisioningConfig::resolve(&file, &ConnectionArgs::default(), &args)
    }

    fn ether(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18))
    }

    #[test]
    fn resolves_complete_file() {
        let config = resolve(FULL, InitAccountsArgs::default()).unwrap();

        assert_eq!(config.account_count, 2);
        assert_eq!(config.deposit_amount, ether(10));
        assert_eq!(config.settlement_rpc_url.as_str(), "http://localhost:8545/");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.bridge_policy, BridgePolicy::default());
        assert_eq!(
            config.bridge_contract_address,
            "0x8a791620dd6260079bf849dc5567adc3f2fdc318".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn missing_num_accounts_is_fatal() {
        let file = FULL.replace("num_accounts: 2\n", "");
        let err = resolve(&file, InitAccountsArgs::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("num_accounts")));
    }

    #[test]
    fn non_positive_num_accounts_is_rejected() {
        for bad in ["0", "-3", "two", "1.5"] {
            let args = InitAccountsArgs {
                num_accounts: Some(bad.to_string()),
                ..Default::default()
            };
            let err = resolve(FULL, args).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: "num_accounts", .. }),
                "{bad}: {err:?}"
            );
        }
    }

    #[test]
    fn num_accounts_is_capped() {
        let args = |count: &str| InitAccountsArgs {
            num_accounts: Some(count.to_string()),
            ..Default::default()
        };
        let config = resolve(FULL, args(&MAX_ACCOUNTS.to_string())).unwrap();
        assert_eq!(config.account_count, MAX_ACCOUNTS);

        for bad in [(MAX_ACCOUNTS + 1).to_string(), i64::MAX.to_string()] {
            let err = resolve(FULL, args(&bad)).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: "num_accounts", .. }),
                "{bad}: {err:?}"
            );
        }
    }

    #[test]
    fn amount_must_be_positive() {
        for bad in ["0", "-1", "abc", "0.0"] {
            let args = InitAccountsArgs {
                amount: Some(bad.to_string()),
                ..Default::default()
            };
            let err = resolve(FULL, args).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: "amount", .. }), "{bad}: {err:?}");
        }
    }

    #[test]
    fn amount_defaults_to_ten_ether() {
        let file = FULL.replace("amount: 10\n", "");
        let config = resolve(&file, InitAccountsArgs::default()).unwrap();
        assert_eq!(config.deposit_amount, ether(10));
    }

    #[test]
    fn decimal_amount_is_converted_to_wei() {
        let file = FULL.replace("amount: 10", "amount: 0.5");
        let config = resolve(&file, InitAccountsArgs::default()).unwrap();
        assert_eq!(config.deposit_amount, ether(1) / U256::from(2));
    }

    #[test]
    fn flags_override_file() {
        let args = InitAccountsArgs {
            num_accounts: Some("5".into()),
            amount: Some("1".into()),
            concurrency: Some(3),
            max_polls: Some(4),
            poll_interval_ms: Some(250),
            ..Default::default()
        };
        let config = resolve(FULL, args).unwrap();

        assert_eq!(config.account_count, 5);
        assert_eq!(config.deposit_amount, ether(1));
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.bridge_policy.max_polls, 4);
        assert_eq!(config.bridge_policy.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn missing_url_is_reported_by_key() {
        let file = FULL.replace("starknet_rpc_url: \"http://localhost:9945\"\n", "");
        let err = resolve(&file, InitAccountsArgs::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("starknet_rpc_url")));
    }

    #[test]
    fn malformed_address_is_invalid() {
        let file = FULL.replace("0x8a791620dd6260079bf849dc5567adc3f2fdc318", "0x1234");
        let err = resolve(&file, InitAccountsArgs::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "l1_bridge_address", .. }));
    }

    #[test]
    fn zero_polls_are_rejected() {
        let args = InitAccountsArgs {
            max_polls: Some(0),
            ..Default::default()
        };
        let err = resolve(FULL, args).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "max_polls", .. }));
    }

    #[test]
    fn override_state_requires_core_contract() {
        let file = FileConfig::parse(FULL).unwrap();
        let err = StateOverrideConfig::resolve(
            &file,
            &ConnectionArgs::default(),
            &OverrideStateArgs::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("starknet_contract_address")));
    }

    #[test]
    fn job_store_defaults_to_devnet_mongodb() {
        let file = FileConfig::parse(FULL).unwrap();
        let args = SettleRangeArgs {
            database: DEFAULT_DATABASE.to_string(),
            ..Default::default()
        };
        let config = JobStoreConfig::resolve(&file, &ConnectionArgs::default(), &args).unwrap();
        assert_eq!(config.mongodb_uri, DEFAULT_MONGODB_URI);
        assert_eq!(config.database, "orchestrator");
        assert!(!config.reset);
        assert_eq!(
            config.last_block,
            LastBlock::LatestOn("http://localhost:9945".parse().unwrap())
        );
    }

    #[test]
    fn latest_block_needs_the_app_chain_rpc() {
        let args = SettleRangeArgs {
            database: DEFAULT_DATABASE.to_string(),
            ..Default::default()
        };
        let err = JobStoreConfig::resolve(&FileConfig::default(), &ConnectionArgs::default(), &args)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("starknet_rpc_url")));
    }

    #[test]
    fn explicit_last_block_needs_no_rpc() {
        let args = SettleRangeArgs {
            database: DEFAULT_DATABASE.to_string(),
            last_block: Some(12),
            ..Default::default()
        };
        let config =
            JobStoreConfig::resolve(&FileConfig::default(), &ConnectionArgs::default(), &args)
                .unwrap();
        assert_eq!(config.last_block, LastBlock::Given(12));
    }
}
