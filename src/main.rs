use std::path::PathBuf;

use alloy::{
    network::EthereumWallet,
    primitives::{utils::format_ether, Address, B256},
    providers::{Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    transports::http::{Client, Http},
};
use appchain::{ReceiptPolicy, StarknetAppChain};
use chain::{AppChain, SettlementChain};
use clap::{Parser, Subcommand};
use config::{
    ConnectionArgs, FileConfig, InitAccountsArgs, JobStoreConfig, LastBlock, OverrideStateArgs,
    ProvisioningConfig, SettleRangeArgs, StateOverrideConfig,
};
use error::ConfigError;
use eyre::WrapErr;
use jobs::MongoJobStore;
use keys::RandomKeys;
use logging::LoggingArgs;
use orchestrator::{AccountRecord, Orchestrator};
use settlement::EthereumSettlement;
use tracing::{info, warn};
use url::Url;

mod appchain;
mod bindings;
mod bridge;
mod chain;
mod config;
mod error;
mod jobs;
mod keys;
mod logging;
mod orchestrator;
mod provisioner;
mod settlement;
mod state_override;
#[cfg(test)]
mod testing;

#[derive(Parser)]
#[command(name = "devnet-provisioner", version)]
#[command(about = "Bootstrap and fund a local L1/L2 devnet")]
struct Cli {
    /// YAML config file; `config.yaml` is used when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(flatten)]
    logging: LoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create, fund through the bridge, and deploy app-chain accounts.
    InitAccounts(InitAccountsArgs),
    /// Override the core contract state with an app-chain block.
    OverrideState(OverrideStateArgs),
    /// Record blocks 0..=N as settled in the orchestrator job store.
    SettleGenesisRange(SettleRangeArgs),
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    cli.logging.init()?;

    let file = FileConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::InitAccounts(args) => init_accounts(&file, &cli.connection, &args).await,
        Command::OverrideState(args) => override_state(&file, &cli.connection, &args).await,
        Command::SettleGenesisRange(args) => {
            settle_genesis_range(&file, &cli.connection, &args).await
        }
    }
}

/// Wallet-filled provider for the settlement chain and the funder address.
fn settlement_provider(
    url: Url,
    private_key: &B256,
) -> Result<(impl Provider<Http<Client>>, Address), ConfigError> {
    let signer = PrivateKeySigner::from_bytes(private_key)
        .map_err(|err| ConfigError::invalid("eth_private_key", err))?;
    let funder = signer.address();
    let provider = ProviderBuilder::new()
        .with_recommended_fillers()
        .wallet(EthereumWallet::from(signer))
        .on_http(url);

    Ok((provider, funder))
}

async fn init_accounts(
    file: &FileConfig,
    conn: &ConnectionArgs,
    args: &InitAccountsArgs,
) -> eyre::Result<()> {
    let config = ProvisioningConfig::resolve(file, conn, args)?;
    let (provider, funder) =
        settlement_provider(config.settlement_rpc_url.clone(), &config.signer_private_key)?;
    let settlement = EthereumSettlement::<_, Http<Client>>::new(provider, funder)
        .with_bridge(config.bridge_contract_address);
    let app = StarknetAppChain::new(config.application_rpc_url.clone(), config.receipt_policy());

    match settlement.funder_balance().await {
        Ok(balance) => info!(%funder, balance = %format_ether(balance), "settlement funder"),
        Err(err) => warn!(%funder, "could not read funder balance: {err:#}"),
    }
    match app.chain_id().await {
        Ok(id) => info!(chain_id = %id.to_fixed_hex_string(), "app chain"),
        Err(err) => warn!("could not read app-chain id: {err:#}"),
    }

    let results = Orchestrator::new(&settlement, &app, &config)
        .run(&mut RandomKeys)
        .await;
    println!("{}", orchestrator::summary(&results));

    if let Some(path) = &args.output {
        let records: Vec<AccountRecord> = results.iter().map(AccountRecord::from).collect();
        let json = serde_json::to_string_pretty(&records)?;
        std::fs::write(path, json)
            .wrap_err_with(|| format!("failed to write results to {}", path.display()))?;
        println!("Results written to {}", path.display());
    }

    Ok(())
}

async fn override_state(
    file: &FileConfig,
    conn: &ConnectionArgs,
    args: &OverrideStateArgs,
) -> eyre::Result<()> {
    let config = StateOverrideConfig::resolve(file, conn, args)?;
    let (provider, funder) =
        settlement_provider(config.settlement_rpc_url.clone(), &config.signer_private_key)?;
    let settlement = EthereumSettlement::<_, Http<Client>>::new(provider, funder);
    let app = StarknetAppChain::new(config.application_rpc_url.clone(), ReceiptPolicy::default());

    let (commitment, tx_hash) = state_override::override_state(
        &settlement,
        &app,
        config.core_contract_address,
        config.block,
    )
    .await?;
    println!(
        "Core contract state overridden to block {} (tx {tx_hash})",
        commitment.block_number
    );

    Ok(())
}

async fn settle_genesis_range(
    file: &FileConfig,
    conn: &ConnectionArgs,
    args: &SettleRangeArgs,
) -> eyre::Result<()> {
    let config = JobStoreConfig::resolve(file, conn, args)?;

    let last_block = match &config.last_block {
        LastBlock::Given(block) => *block,
        LastBlock::LatestOn(url) => {
            StarknetAppChain::new(url.clone(), ReceiptPolicy::default())
                .latest_block_number()
                .await?
        }
    };
    info!(last_block, "app-chain blocks to mark as settled");

    let store = MongoJobStore::connect(&config.mongodb_uri, &config.database)
        .await
        .wrap_err("failed to connect to job store")?;
    let summary = jobs::mark_range_settled(&store, last_block, config.reset).await?;
    println!(
        "Blocks 0..={last_block}: {} inserted, {} already settled{}",
        summary.inserted,
        summary.already_settled,
        if config.reset {
            format!(", {} removed", summary.removed)
        } else {
            String::new()
        }
    );

    Ok(())
}
