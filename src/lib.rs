//! Escrow swap orchestrator
//!
//! Coordinates token and asset swaps against an on-chain escrow program:
//! deterministic address derivation, a crash-safe identifier pool, and a
//! submit / confirm / observe workflow over an eventually consistent ledger.

pub mod config;
pub mod derive;
pub mod escrow_config;
pub mod id_pool;
pub mod instructions;
pub mod ledger;
pub mod metrics;
pub mod wallet;
pub mod workflow;

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};

#[cfg(test)]
mod tests {
    mod config_validation;
    mod pool_persistence_tests;
    mod test_helpers;
    mod workflow_tests;
}
