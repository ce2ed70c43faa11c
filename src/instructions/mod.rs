//! Instruction builders for the external programs
//!
//! The token, associated-token, asset and escrow programs are reached only
//! through their published instruction layouts. Builders here are pure:
//! no signing, no network.

use solana_sdk::{pubkey, pubkey::Pubkey};
use thiserror::Error;

pub mod asset;
pub mod escrow;
pub mod token;

pub(crate) const SYSTEM_PROGRAM_ID: Pubkey = pubkey!("11111111111111111111111111111111");

/// Failure to encode an instruction for an external program
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Instruction build error (program={program}): {reason}")]
pub struct InstructionBuildError {
    /// The program the instruction targets
    pub program: String,
    /// Detailed reason for the failure
    pub reason: String,
}

impl InstructionBuildError {
    pub(crate) fn new(program: &Pubkey, reason: impl Into<String>) -> Self {
        Self {
            program: program.to_string(),
            reason: reason.into(),
        }
    }
}
