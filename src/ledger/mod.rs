//! Ledger RPC boundary
//!
//! The workflow talks to the ledger only through [`LedgerClient`]. The
//! boundary is treated as unreliable and eventually consistent: a signature
//! may stay unknown for a while, and an account written by a confirmed
//! transaction may not be readable yet.

use async_trait::async_trait;
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey,
    signature::Signature, transaction::Transaction,
};
use std::fmt;

pub mod ledger_errors;
pub mod rpc_ledger;

#[cfg(any(test, feature = "test_utils"))]
pub mod mock_ledger;

pub use ledger_errors::{LedgerError, LedgerResult};
pub use rpc_ledger::RpcLedgerClient;

#[cfg(any(test, feature = "test_utils"))]
pub use mock_ledger::MockLedger;

/// Durability requested from a confirmation query, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentLevel {
    Processed,
    Confirmed,
    Finalized,
}

impl CommitmentLevel {
    pub fn as_config(self) -> CommitmentConfig {
        match self {
            CommitmentLevel::Processed => CommitmentConfig::processed(),
            CommitmentLevel::Confirmed => CommitmentConfig::confirmed(),
            CommitmentLevel::Finalized => CommitmentConfig::finalized(),
        }
    }
}

impl fmt::Display for CommitmentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitmentLevel::Processed => write!(f, "processed"),
            CommitmentLevel::Confirmed => write!(f, "confirmed"),
            CommitmentLevel::Finalized => write!(f, "finalized"),
        }
    }
}

/// What the ledger currently reports about a submitted signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationState {
    /// Seen by the leader (processed) but not yet voted on
    Submitted,
    Confirmed,
    Finalized,
    /// Not visible yet, or the query timed out
    Unknown,
}

impl ConfirmationState {
    /// Whether this state meets or exceeds `level`
    pub fn satisfies(self, level: CommitmentLevel) -> bool {
        let reached = match self {
            ConfirmationState::Unknown => return false,
            ConfirmationState::Submitted => CommitmentLevel::Processed,
            ConfirmationState::Confirmed => CommitmentLevel::Confirmed,
            ConfirmationState::Finalized => CommitmentLevel::Finalized,
        };
        reached >= level
    }
}

impl fmt::Display for ConfirmationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfirmationState::Submitted => "submitted",
            ConfirmationState::Confirmed => "confirmed",
            ConfirmationState::Finalized => "finalized",
            ConfirmationState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Remote ledger operations used by the workflow.
///
/// `submit` is never retried by the implementation; a resend must be a
/// freshly built transaction. `confirm` and `fetch_account` are idempotent
/// and safe to poll.
#[async_trait]
pub trait LedgerClient: Send + Sync + fmt::Debug {
    /// Recent blockhash for building a new transaction
    async fn latest_blockhash(&self) -> LedgerResult<Hash>;

    /// Submit a signed transaction
    async fn submit(&self, transaction: &Transaction) -> LedgerResult<Signature>;

    /// Current confirmation state of `signature`, queried at `level`
    async fn confirm(&self, signature: &Signature, level: CommitmentLevel) -> LedgerResult<ConfirmationState>;

    /// Fetch an account; `Ok(None)` when the ledger has no account there (yet)
    async fn fetch_account(&self, address: &Pubkey) -> LedgerResult<Option<Account>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_ordering() {
        use CommitmentLevel::*;
        assert!(ConfirmationState::Finalized.satisfies(Finalized));
        assert!(ConfirmationState::Finalized.satisfies(Processed));
        assert!(ConfirmationState::Confirmed.satisfies(Confirmed));
        assert!(!ConfirmationState::Confirmed.satisfies(Finalized));
        assert!(ConfirmationState::Submitted.satisfies(Processed));
        assert!(!ConfirmationState::Submitted.satisfies(Confirmed));
        assert!(!ConfirmationState::Unknown.satisfies(Processed));
    }

    #[test]
    fn test_commitment_level_parses_lowercase() {
        let level: CommitmentLevel = serde_json::from_str("\"finalized\"").unwrap();
        assert_eq!(level, CommitmentLevel::Finalized);
        assert_eq!(level.as_config(), CommitmentConfig::finalized());
    }
}
