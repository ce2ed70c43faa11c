//! Deterministic address derivation
//!
//! Program-derived addresses are computed exactly the way the ledger does it
//! (seeds + bump, first off-curve candidate), so an address derived here is
//! the address the escrow program itself will check against.
//!
//! Nothing in this module touches the network: a derived address says
//! nothing about whether an account has been initialised there.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Maximum length of a single seed accepted by the ledger
pub const MAX_SEED_LEN: usize = 32;

/// Maximum number of caller seeds; the ledger allows 16 including the bump
pub const MAX_SEEDS: usize = 15;

/// Namespace tag the escrow program uses for its per-collection escrow
pub const ESCROW_SEED: &[u8] = b"escrow";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeriveError {
    #[error("Seed {index} is {len} bytes, maximum is {max}", max = MAX_SEED_LEN)]
    SeedTooLong { index: usize, len: usize },

    #[error("Too many seeds: {count} (maximum {max})", max = MAX_SEEDS)]
    TooManySeeds { count: usize },

    #[error("No bump seed produces an off-curve address for program {program}")]
    NoViableBump { program: Pubkey },
}

/// A program-derived address together with the bump that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DerivedAddress {
    pub address: Pubkey,
    pub bump: u8,
}

/// Derive a program address from an ordered list of seeds.
///
/// Pure and deterministic: the same `(program_id, seeds)` always yields the
/// same address, across calls and across processes.
pub fn derive_address(program_id: &Pubkey, seeds: &[&[u8]]) -> Result<DerivedAddress, DeriveError> {
    if seeds.len() > MAX_SEEDS {
        return Err(DeriveError::TooManySeeds { count: seeds.len() });
    }
    if let Some((index, seed)) = seeds.iter().enumerate().find(|(_, s)| s.len() > MAX_SEED_LEN) {
        return Err(DeriveError::SeedTooLong {
            index,
            len: seed.len(),
        });
    }

    Pubkey::try_find_program_address(seeds, program_id)
        .map(|(address, bump)| DerivedAddress { address, bump })
        .ok_or(DeriveError::NoViableBump {
            program: *program_id,
        })
}

/// Escrow address for a collection: seeds `["escrow", collection]`.
///
/// The tag is serialized as raw bytes with no length prefix, matching the
/// escrow program's own seed constraint.
pub fn escrow_address(escrow_program: &Pubkey, collection: &Pubkey) -> Result<DerivedAddress, DeriveError> {
    derive_address(escrow_program, &[ESCROW_SEED, collection.as_ref()])
}

/// Canonical associated token account of `owner` for `mint`
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address(owner, mint)
}
