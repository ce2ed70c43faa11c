//! Escrow configuration: creation parameters and partial updates
//!
//! An update names every mutable field explicitly. Unset fields are sent as
//! "unchanged", so the caller never has to read the current configuration
//! and echo it back.

use crate::instructions::asset::{MAX_NAME_LEN, MAX_URI_LEN};
use crate::instructions::escrow::{InitEscrowArgs, UpdateEscrowArgs};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EscrowConfigError {
    #[error("Escrow name must be 1..={max} bytes, got {0}", max = MAX_NAME_LEN)]
    InvalidName(usize),

    #[error("Escrow uri must be at most {max} bytes, got {0}", max = MAX_URI_LEN)]
    UriTooLong(usize),

    #[error("Invalid asset range: min {min} max {max} (need 1 <= min <= max)")]
    InvalidRange { min: u64, max: u64 },

    #[error("Update changes nothing")]
    EmptyUpdate,
}

/// Parameters of a new escrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowInit {
    pub name: String,
    pub uri: String,
    /// Highest asset index the escrow will hand out
    pub max: u64,
    /// Lowest asset index
    pub min: u64,
    /// Tokens exchanged per asset (base units)
    pub amount: u64,
    /// Token fee per swap (base units)
    pub fee_amount: u64,
    /// Lamport fee per swap
    #[serde(default)]
    pub sol_fee_amount: u64,
    /// Swap path selector understood by the escrow program
    #[serde(default)]
    pub path: u16,
}

impl EscrowInit {
    pub fn validate(&self) -> Result<(), EscrowConfigError> {
        check_name(&self.name)?;
        check_uri(&self.uri)?;
        check_range(self.min, self.max)
    }

    pub fn to_args(&self) -> Result<InitEscrowArgs, EscrowConfigError> {
        self.validate()?;
        Ok(InitEscrowArgs {
            name: self.name.clone(),
            uri: self.uri.clone(),
            max: self.max,
            min: self.min,
            amount: self.amount,
            fee_amount: self.fee_amount,
            sol_fee_amount: self.sol_fee_amount,
            path: self.path,
        })
    }
}

/// Partial update of an existing escrow.
///
/// Account-level fields (`token`, `fee_location`) are carried
/// as instruction accounts; when unset the currently configured ones are used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowConfigUpdate {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub max: Option<u64>,
    pub min: Option<u64>,
    pub amount: Option<u64>,
    pub fee_amount: Option<u64>,
    pub sol_fee_amount: Option<u64>,
    pub path: Option<u16>,
    #[serde(skip)]
    pub token: Option<Pubkey>,
    #[serde(skip)]
    pub fee_location: Option<Pubkey>,
}

impl EscrowConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self == &EscrowConfigUpdate::default()
    }

    /// Field-level checks. When only one bound of the range changes, the
    /// other is validated on-chain against the stored value.
    pub fn validate(&self) -> Result<(), EscrowConfigError> {
        if self.is_empty() {
            return Err(EscrowConfigError::EmptyUpdate);
        }
        if let Some(name) = &self.name {
            check_name(name)?;
        }
        if let Some(uri) = &self.uri {
            check_uri(uri)?;
        }
        match (self.min, self.max) {
            (Some(min), Some(max)) => check_range(min, max)?,
            (Some(0), None) => return Err(EscrowConfigError::InvalidRange { min: 0, max: 0 }),
            _ => {}
        }
        Ok(())
    }

    pub fn to_args(&self) -> Result<UpdateEscrowArgs, EscrowConfigError> {
        self.validate()?;
        Ok(UpdateEscrowArgs {
            name: self.name.clone(),
            uri: self.uri.clone(),
            max: self.max,
            min: self.min,
            amount: self.amount,
            fee_amount: self.fee_amount,
            sol_fee_amount: self.sol_fee_amount,
            path: self.path,
        })
    }
}

fn check_name(name: &str) -> Result<(), EscrowConfigError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(EscrowConfigError::InvalidName(name.len()));
    }
    Ok(())
}

fn check_uri(uri: &str) -> Result<(), EscrowConfigError> {
    if uri.len() > MAX_URI_LEN {
        return Err(EscrowConfigError::UriTooLong(uri.len()));
    }
    Ok(())
}

fn check_range(min: u64, max: u64) -> Result<(), EscrowConfigError> {
    if min == 0 || min > max {
        return Err(EscrowConfigError::InvalidRange { min, max });
    }
    Ok(())
}
