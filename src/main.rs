//! escrow-swap command line
//!
//! Each subcommand runs exactly one workflow (or a local query) and prints
//! the resulting record as JSON on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use escrow_swap::config::{parse_pubkey, Config};
use escrow_swap::derive::escrow_address;
use escrow_swap::escrow_config::{EscrowConfigUpdate, EscrowInit};
use escrow_swap::id_pool::IdentifierPool;
use escrow_swap::ledger::RpcLedgerClient;
use escrow_swap::metrics::metrics;
use escrow_swap::wallet::Wallet;
use escrow_swap::workflow::{
    CollectionRequest, EscrowTarget, MintRequest, SwapRecord, SwapRequest, SwapWorkflow, TokenDeposit,
};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,

    /// Collection address (overrides program.collection)
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Token mint (overrides program.token)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the escrow address derived for the collection
    EscrowAddress,

    /// Show identifier pool usage
    PoolStatus {
        /// Start from an empty pool if the store is corrupt (a backup is kept)
        #[arg(long)]
        reset_corrupt_pool: bool,
    },

    /// Pay the mint fee and mint the next pooled asset
    Mint {
        /// Owner of the new asset (defaults to the payer)
        #[arg(long)]
        owner: Option<String>,

        /// Start from an empty pool if the store is corrupt (a backup is kept)
        #[arg(long)]
        reset_corrupt_pool: bool,
    },

    /// Pay tokens into escrow and receive an escrowed asset
    Capture {
        #[arg(long)]
        asset: String,
    },

    /// Return an asset to escrow and receive tokens
    Release {
        #[arg(long)]
        asset: String,
    },

    /// Fund the escrow token account
    DepositTokens {
        /// Amount in base units
        #[arg(long)]
        amount: u64,
    },

    /// Move an owned asset into the escrow
    DepositAsset {
        #[arg(long)]
        asset: String,
    },

    /// Create the escrow for the collection
    InitEscrow(InitEscrowArgs),

    /// Change selected fields of the escrow
    UpdateEscrow(UpdateEscrowArgs),

    /// Create a new asset collection
    CreateCollection {
        #[arg(long)]
        name: String,
        #[arg(long)]
        uri: String,
        /// Collection update authority (defaults to the payer)
        #[arg(long)]
        update_authority: Option<String>,
    },

    /// Add the escrow as update delegate of the collection
    DelegateCollection,

    /// Hand the update authority of an asset to another account
    SetUpdateAuthority {
        #[arg(long)]
        asset: String,
        #[arg(long)]
        new_authority: String,
    },
}

#[derive(ClapArgs, Debug)]
struct InitEscrowArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    uri: String,
    #[arg(long, default_value_t = 1)]
    min: u64,
    #[arg(long)]
    max: u64,
    /// Tokens per asset, base units
    #[arg(long)]
    amount: u64,
    /// Token fee per swap, base units
    #[arg(long)]
    fee_amount: u64,
    #[arg(long, default_value_t = 0)]
    sol_fee_amount: u64,
    #[arg(long, default_value_t = 0)]
    path: u16,
    /// Token fee destination (defaults to the payer)
    #[arg(long)]
    fee_location: Option<String>,
}

#[derive(ClapArgs, Debug)]
struct UpdateEscrowArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    uri: Option<String>,
    #[arg(long)]
    min: Option<u64>,
    #[arg(long)]
    max: Option<u64>,
    #[arg(long)]
    amount: Option<u64>,
    #[arg(long)]
    fee_amount: Option<u64>,
    #[arg(long)]
    sol_fee_amount: Option<u64>,
    #[arg(long)]
    path: Option<u16>,
    /// Current token fee destination (defaults to the payer)
    #[arg(long)]
    fee_location: Option<String>,
    /// New token mint
    #[arg(long)]
    new_token: Option<String>,
    /// New token fee destination
    #[arg(long)]
    new_fee_location: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.json)?;

    let config = load_config(&args.config)?;
    config.validate().context("Invalid configuration")?;

    let outcome = run(&args, &config).await;

    if args.print_metrics {
        eprintln!("{}", metrics().render()?);
    }
    outcome
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "escrow_swap=debug,info"
    } else {
        "escrow_swap=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path).with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        dotenvy::dotenv().ok();
        let mut config = Config::default();
        config.apply_env();
        Ok(config)
    }
}

fn required(field: &str, cli: &Option<String>, configured: Option<Pubkey>) -> Result<Pubkey> {
    match cli {
        Some(value) => parse_pubkey(field, value),
        None => configured.with_context(|| format!("--{field} is required (or set program.{field})")),
    }
}

fn open_pool(config: &Config, reset_corrupt_pool: bool) -> Result<IdentifierPool> {
    let store = config.pool_store(reset_corrupt_pool);
    IdentifierPool::open(store).with_context(|| {
        format!(
            "Failed to open identifier pool at {}",
            config.pool.store_path.display()
        )
    })
}

fn print_record(record: &SwapRecord) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

async fn run(args: &Args, config: &Config) -> Result<()> {
    let settings = config.workflow_settings()?;
    let collection = || required("collection", &args.collection, config.collection()?);
    let token = || required("token", &args.token, config.token()?);

    match &args.command {
        Command::EscrowAddress => {
            let derived = escrow_address(&settings.escrow_program, &collection()?)?;
            println!(
                "{}",
                serde_json::json!({
                    "escrow": derived.address.to_string(),
                    "bump": derived.bump,
                    "program": settings.escrow_program.to_string(),
                })
            );
            return Ok(());
        }
        Command::PoolStatus { reset_corrupt_pool } => {
            let status = open_pool(config, *reset_corrupt_pool)?.status();
            println!(
                "{}",
                serde_json::json!({
                    "capacity": status.capacity,
                    "allocated": status.allocated,
                    "in_flight": status.in_flight,
                    "free": status.free,
                    "next_free": status.next_free,
                })
            );
            return Ok(());
        }
        _ => {}
    }

    let wallet = Wallet::from_file(&config.wallet.keypair_path).context("Failed to load wallet")?;
    info!(payer = %wallet.pubkey(), endpoint = %config.rpc.endpoint, "Wallet loaded");
    let payer = wallet.pubkey();

    let ledger = Arc::new(RpcLedgerClient::new(
        config.rpc.endpoint.clone(),
        Duration::from_secs(config.rpc.timeout_secs),
        config.rpc.commitment,
    ));
    let workflow = SwapWorkflow::new(ledger, wallet.keypair_arc(), settings);
    let fee_project_account = config.fee_project_account()?.unwrap_or(payer);

    let record = match &args.command {
        Command::Mint {
            owner,
            reset_corrupt_pool,
        } => {
            let workflow = workflow.with_pool(open_pool(config, *reset_corrupt_pool)?);
            let request = MintRequest {
                collection: collection()?,
                token: token()?,
                decimals: config.program.token_decimals,
                fee_amount: config.mint.fee_amount,
                fee_recipient: config.paid_mint_recipient(&payer)?,
                owner: owner.as_deref().map(|o| parse_pubkey("owner", o)).transpose()?,
                metadata: config.metadata_template(),
            };
            workflow.mint_paid(&request).await.context("Mint failed")?
        }
        Command::Capture { asset } | Command::Release { asset } => {
            let request = SwapRequest {
                asset: parse_pubkey("asset", asset)?,
                collection: collection()?,
                token: token()?,
                fee_project_account,
            };
            if matches!(args.command, Command::Capture { .. }) {
                workflow.capture(&request).await.context("Capture failed")?
            } else {
                workflow.release(&request).await.context("Release failed")?
            }
        }
        Command::DepositTokens { amount } => {
            let deposit = TokenDeposit {
                collection: collection()?,
                token: token()?,
                amount: *amount,
                decimals: config.program.token_decimals,
            };
            workflow.deposit_tokens(&deposit).await.context("Token deposit failed")?
        }
        Command::DepositAsset { asset } => workflow
            .deposit_asset(&parse_pubkey("asset", asset)?, &collection()?)
            .await
            .context("Asset deposit failed")?,
        Command::InitEscrow(a) => {
            let target = EscrowTarget {
                collection: collection()?,
                token: token()?,
                fee_location: optional(&a.fee_location, "fee_location")?.unwrap_or(payer),
            };
            let init = EscrowInit {
                name: a.name.clone(),
                uri: a.uri.clone(),
                max: a.max,
                min: a.min,
                amount: a.amount,
                fee_amount: a.fee_amount,
                sol_fee_amount: a.sol_fee_amount,
                path: a.path,
            };
            workflow.init_escrow(&target, &init).await.context("Escrow creation failed")?
        }
        Command::UpdateEscrow(a) => {
            let target = EscrowTarget {
                collection: collection()?,
                token: token()?,
                fee_location: optional(&a.fee_location, "fee_location")?.unwrap_or(payer),
            };
            let update = EscrowConfigUpdate {
                name: a.name.clone(),
                uri: a.uri.clone(),
                max: a.max,
                min: a.min,
                amount: a.amount,
                fee_amount: a.fee_amount,
                sol_fee_amount: a.sol_fee_amount,
                path: a.path,
                token: optional(&a.new_token, "new_token")?,
                fee_location: optional(&a.new_fee_location, "new_fee_location")?,
            };
            workflow.update_escrow(&target, &update).await.context("Escrow update failed")?
        }
        Command::CreateCollection {
            name,
            uri,
            update_authority,
        } => {
            let request = CollectionRequest {
                name: name.clone(),
                uri: uri.clone(),
                update_authority: optional(update_authority, "update_authority")?,
            };
            workflow
                .create_collection(&request)
                .await
                .context("Collection creation failed")?
        }
        Command::DelegateCollection => workflow
            .delegate_collection(&collection()?)
            .await
            .context("Collection delegation failed")?,
        Command::SetUpdateAuthority { asset, new_authority } => workflow
            .set_update_authority(
                &parse_pubkey("asset", asset)?,
                &collection()?,
                &parse_pubkey("new_authority", new_authority)?,
            )
            .await
            .context("Update authority change failed")?,
        Command::EscrowAddress | Command::PoolStatus { .. } => return Ok(()),
    };

    print_record(&record)
}

fn optional(value: &Option<String>, field: &str) -> Result<Option<Pubkey>> {
    value.as_deref().map(|v| parse_pubkey(field, v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_update_escrow() {
        let args = Args::try_parse_from([
            "escrow-swap",
            "--collection",
            "11111111111111111111111111111111",
            "update-escrow",
            "--fee-amount",
            "100",
        ])
        .unwrap();
        match args.command {
            Command::UpdateEscrow(a) => {
                assert_eq!(a.fee_amount, Some(100));
                assert!(a.name.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_set_update_authority() {
        let asset = Pubkey::new_unique().to_string();
        let authority = Pubkey::new_unique().to_string();
        let args = Args::try_parse_from([
            "escrow-swap",
            "set-update-authority",
            "--asset",
            &asset,
            "--new-authority",
            &authority,
        ])
        .unwrap();
        match args.command {
            Command::SetUpdateAuthority { asset: a, new_authority } => {
                assert_eq!(a, asset);
                assert_eq!(new_authority, authority);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let args = Args::try_parse_from(["escrow-swap", "create-collection", "--name", "Drops", "--uri", "https://x"])
            .unwrap();
        assert!(matches!(
            args.command,
            Command::CreateCollection { update_authority: None, .. }
        ));
    }

    #[test]
    fn test_required_prefers_cli_value() {
        let configured = Pubkey::new_unique();
        let cli = Some(Pubkey::new_unique().to_string());
        assert_ne!(required("collection", &cli, Some(configured)).unwrap(), configured);
        assert_eq!(required("collection", &None, Some(configured)).unwrap(), configured);
        assert!(required("collection", &None, None).is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool.capacity, 1000);
    }
}
