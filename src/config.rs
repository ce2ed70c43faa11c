//! Configuration module for the escrow swap tool
//!
//! This module handles configuration loading from TOML files and
//! environment variables, and converts it into the typed settings the
//! workflow and pool consume.

use crate::id_pool::{CorruptionPolicy, PoolStore};
use crate::instructions::escrow::{ESCROW_PROGRAM_ID, PROTOCOL_FEE_WALLET};
use crate::ledger::CommitmentLevel;
use crate::workflow::{Backoff, MetadataTemplate, RetryPolicy, WorkflowSettings};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Overrides `rpc.endpoint`
pub const ENV_RPC_URL: &str = "ESCROW_SWAP_RPC_URL";
/// Overrides `wallet.keypair_path`
pub const ENV_KEYPAIR: &str = "ESCROW_SWAP_KEYPAIR";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub wallet: WalletConfig,

    /// On-chain programs and accounts the swaps act on
    #[serde(default)]
    pub program: ProgramConfig,

    /// Identifier pool persistence
    #[serde(default)]
    pub pool: PoolConfig,

    /// Confirmation and observability polling
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub mint: MintConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Commitment a transaction must reach before its result is read back
    #[serde(default = "default_commitment")]
    pub commitment: CommitmentLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to keypair file
    #[serde(default = "default_keypair_path")]
    pub keypair_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Escrow program id; the published program when unset
    #[serde(default)]
    pub escrow_program: Option<String>,

    /// Lamport fee recipient of capture/release
    #[serde(default)]
    pub fee_sol_account: Option<String>,

    /// Collection the escrow serves
    #[serde(default)]
    pub collection: Option<String>,

    /// Token mint exchanged against assets
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,

    /// Token fee recipient of capture/release; the payer when unset
    #[serde(default)]
    pub fee_project_account: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Highest identifier handed out; ids run from 1
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Start from an empty set when the store is corrupt (backup kept)
    #[serde(default)]
    pub reset_on_corrupt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    #[serde(default = "default_backoff")]
    pub backoff: Backoff,

    /// Jitter factor (0.0 to 1.0)
    #[serde(default)]
    pub jitter_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintConfig {
    /// Metadata host; asset `n` points at `{base_uri}/{uri_prefix}{n}.json`
    #[serde(default = "default_base_uri")]
    pub base_uri: String,

    #[serde(default = "default_uri_prefix")]
    pub uri_prefix: String,

    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Mint fee in base units of `program.token`
    #[serde(default = "default_mint_fee")]
    pub fee_amount: u64,

    /// Admin account receiving the mint fee; required when `fee_amount` is non-zero
    #[serde(default)]
    pub fee_recipient: Option<String>,
}

// Default value functions
fn default_rpc_endpoint() -> String { "https://api.devnet.solana.com".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_commitment() -> CommitmentLevel { CommitmentLevel::Finalized }
fn default_keypair_path() -> String { "~/.config/solana/id.json".to_string() }
fn default_token_decimals() -> u8 { 9 }
fn default_store_path() -> PathBuf { PathBuf::from("created_assets.json") }
fn default_capacity() -> u32 { 1000 }
fn default_max_attempts() -> u32 { 5 }
fn default_delay_ms() -> u64 { 3000 }
fn default_backoff() -> Backoff { Backoff::Fixed }
fn default_base_uri() -> String { "https://example.com/metadata".to_string() }
fn default_uri_prefix() -> String { "IKI_".to_string() }
fn default_name_prefix() -> String { "IKIGAI NFT #".to_string() }
fn default_mint_fee() -> u64 { 5_000_000_000 }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_secs: default_rpc_timeout(),
            commitment: default_commitment(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            escrow_program: None,
            fee_sol_account: None,
            collection: None,
            token: None,
            token_decimals: default_token_decimals(),
            fee_project_account: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            capacity: default_capacity(),
            reset_on_corrupt: false,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            backoff: default_backoff(),
            jitter_factor: 0.0,
        }
    }
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            base_uri: default_base_uri(),
            uri_prefix: default_uri_prefix(),
            name_prefix: default_name_prefix(),
            fee_amount: default_mint_fee(),
            fee_recipient: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            wallet: WalletConfig::default(),
            program: ProgramConfig::default(),
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            mint: MintConfig::default(),
        }
    }
}

/// Parse an optional base58 address, naming the field on failure
pub fn parse_pubkey(field: &str, value: &str) -> anyhow::Result<Pubkey> {
    Pubkey::from_str(value.trim()).with_context(|| format!("{field}: invalid address {value:?}"))
}

fn optional_pubkey(field: &str, value: &Option<String>) -> anyhow::Result<Option<Pubkey>> {
    value.as_deref().map(|v| parse_pubkey(field, v)).transpose()
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {path}"))?;
        let config: Config = toml::from_str(&content).with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load configuration with `.env` and environment variable overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Apply `ESCROW_SWAP_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_RPC_URL) {
            self.rpc.endpoint = url;
        }
        if let Ok(path) = std::env::var(ENV_KEYPAIR) {
            self.wallet.keypair_path = path;
        }
    }

    /// Reject values no run could succeed with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.endpoint.trim().is_empty() {
            bail!("rpc.endpoint is empty");
        }
        if self.rpc.timeout_secs == 0 {
            bail!("rpc.timeout_secs must be positive");
        }
        if self.pool.capacity == 0 {
            bail!("pool.capacity must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            bail!("retry.jitter_factor must be within 0.0..=1.0");
        }
        if let Backoff::Exponential { max_delay_ms } = self.retry.backoff {
            if max_delay_ms < self.retry.delay_ms {
                bail!("retry.backoff.max_delay_ms is below retry.delay_ms");
            }
        }
        optional_pubkey("program.escrow_program", &self.program.escrow_program)?;
        optional_pubkey("program.fee_sol_account", &self.program.fee_sol_account)?;
        optional_pubkey("program.collection", &self.program.collection)?;
        optional_pubkey("program.token", &self.program.token)?;
        optional_pubkey("program.fee_project_account", &self.program.fee_project_account)?;
        optional_pubkey("mint.fee_recipient", &self.mint.fee_recipient)?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            delay: Duration::from_millis(self.retry.delay_ms),
            backoff: self.retry.backoff,
            jitter_factor: self.retry.jitter_factor,
        }
    }

    pub fn workflow_settings(&self) -> anyhow::Result<WorkflowSettings> {
        Ok(WorkflowSettings {
            escrow_program: optional_pubkey("program.escrow_program", &self.program.escrow_program)?
                .unwrap_or(ESCROW_PROGRAM_ID),
            fee_sol_account: optional_pubkey("program.fee_sol_account", &self.program.fee_sol_account)?
                .unwrap_or(PROTOCOL_FEE_WALLET),
            commitment: self.rpc.commitment,
            retry: self.retry_policy(),
        })
    }

    /// Pool store as configured; `force_reset` stands in for `reset_on_corrupt`
    pub fn pool_store(&self, force_reset: bool) -> PoolStore {
        let policy = if force_reset || self.pool.reset_on_corrupt {
            CorruptionPolicy::ResetToEmpty
        } else {
            CorruptionPolicy::Abort
        };
        PoolStore::new(self.pool.store_path.clone(), self.pool.capacity, policy)
    }

    pub fn metadata_template(&self) -> MetadataTemplate {
        MetadataTemplate {
            base_uri: self.mint.base_uri.clone(),
            uri_prefix: self.mint.uri_prefix.clone(),
            name_prefix: self.mint.name_prefix.clone(),
        }
    }

    pub fn collection(&self) -> anyhow::Result<Option<Pubkey>> {
        optional_pubkey("program.collection", &self.program.collection)
    }

    pub fn token(&self) -> anyhow::Result<Option<Pubkey>> {
        optional_pubkey("program.token", &self.program.token)
    }

    pub fn fee_project_account(&self) -> anyhow::Result<Option<Pubkey>> {
        optional_pubkey("program.fee_project_account", &self.program.fee_project_account)
    }

    pub fn mint_fee_recipient(&self) -> anyhow::Result<Option<Pubkey>> {
        optional_pubkey("mint.fee_recipient", &self.mint.fee_recipient)
    }

    /// Recipient for a paid mint by `payer`. A charged fee must go to a
    /// configured account other than the payer.
    pub fn paid_mint_recipient(&self, payer: &Pubkey) -> anyhow::Result<Pubkey> {
        match self.mint_fee_recipient()? {
            Some(recipient) if self.mint.fee_amount > 0 && recipient == *payer => {
                bail!("mint.fee_recipient is the payer, the mint fee would be paid to itself")
            }
            Some(recipient) => Ok(recipient),
            None if self.mint.fee_amount == 0 => Ok(*payer),
            None => bail!("mint.fee_recipient must be set when mint.fee_amount is non-zero"),
        }
    }
}
