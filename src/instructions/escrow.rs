//! Escrow program instructions
//!
//! The escrow program is an Anchor program: instruction data starts with
//! `sha256("global:<instruction>")[..8]` followed by Borsh-encoded arguments.

use super::{InstructionBuildError, SYSTEM_PROGRAM_ID};
use crate::derive::associated_token_address;
use borsh::BorshSerialize;
use sha2::{Digest, Sha256};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
    sysvar,
};

use super::asset::ASSET_PROGRAM_ID;

pub const ESCROW_PROGRAM_ID: Pubkey = pubkey!("MPL4o4wMzndgh8T1NVDxELQCj5UQfYTYEkabX3wNKtb");

/// Protocol fee wallet the escrow program charges on every swap
pub const PROTOCOL_FEE_WALLET: Pubkey = pubkey!("GjF4LqmEhV33riVyAwHwiEeAHx4XXFn2yMY3fmMigoP3");

pub fn anchor_discriminator(instruction: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{}", instruction).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

fn encode<T: BorshSerialize>(
    program: &Pubkey,
    instruction: &str,
    args: &T,
) -> Result<Vec<u8>, InstructionBuildError> {
    let mut data = anchor_discriminator(instruction).to_vec();
    args.serialize(&mut data)
        .map_err(|e| InstructionBuildError::new(program, e.to_string()))?;
    Ok(data)
}

/// Arguments of `init_escrow_v1`
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct InitEscrowArgs {
    pub name: String,
    pub uri: String,
    pub max: u64,
    pub min: u64,
    pub amount: u64,
    pub fee_amount: u64,
    pub sol_fee_amount: u64,
    pub path: u16,
}

/// Arguments of `update_escrow_v1`; `None` leaves the field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize)]
pub struct UpdateEscrowArgs {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub max: Option<u64>,
    pub min: Option<u64>,
    pub amount: Option<u64>,
    pub fee_amount: Option<u64>,
    pub sol_fee_amount: Option<u64>,
    pub path: Option<u16>,
}

/// Accounts identifying one escrow configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowAccounts {
    pub program: Pubkey,
    pub escrow: Pubkey,
    pub collection: Pubkey,
    pub token: Pubkey,
    pub fee_location: Pubkey,
}

pub fn init_escrow(
    accounts: &EscrowAccounts,
    authority: &Pubkey,
    args: &InitEscrowArgs,
) -> Result<Instruction, InstructionBuildError> {
    let fee_ata = associated_token_address(&accounts.fee_location, &accounts.token);
    Ok(Instruction {
        program_id: accounts.program,
        accounts: vec![
            AccountMeta::new(accounts.escrow, false),
            AccountMeta::new(*authority, true),
            AccountMeta::new_readonly(accounts.collection, false),
            AccountMeta::new_readonly(accounts.token, false),
            AccountMeta::new_readonly(accounts.fee_location, false),
            AccountMeta::new(fee_ata, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data: encode(&accounts.program, "init_escrow_v1", args)?,
    })
}

pub fn update_escrow(
    accounts: &EscrowAccounts,
    authority: &Pubkey,
    args: &UpdateEscrowArgs,
) -> Result<Instruction, InstructionBuildError> {
    Ok(Instruction {
        program_id: accounts.program,
        accounts: vec![
            AccountMeta::new(*authority, true),
            AccountMeta::new(accounts.escrow, false),
            AccountMeta::new_readonly(accounts.collection, false),
            AccountMeta::new_readonly(accounts.token, false),
            AccountMeta::new_readonly(accounts.fee_location, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
        data: encode(&accounts.program, "update_escrow_v1", args)?,
    })
}

/// Accounts of a capture or release swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapAccounts {
    pub program: Pubkey,
    pub owner: Pubkey,
    pub authority: Pubkey,
    pub escrow: Pubkey,
    pub asset: Pubkey,
    pub collection: Pubkey,
    pub token: Pubkey,
    pub fee_project_account: Pubkey,
    pub fee_sol_account: Pubkey,
}

impl SwapAccounts {
    fn leading_metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(self.owner, true),
            AccountMeta::new(self.authority, true),
            AccountMeta::new(self.escrow, false),
            AccountMeta::new(self.asset, false),
            AccountMeta::new(self.collection, false),
            AccountMeta::new(associated_token_address(&self.owner, &self.token), false),
            AccountMeta::new(associated_token_address(&self.escrow, &self.token), false),
            AccountMeta::new_readonly(self.token, false),
            AccountMeta::new(
                associated_token_address(&self.fee_project_account, &self.token),
                false,
            ),
            AccountMeta::new(self.fee_sol_account, false),
            AccountMeta::new(self.fee_project_account, false),
        ]
    }

    fn trailing_metas() -> [AccountMeta; 4] {
        [
            AccountMeta::new_readonly(ASSET_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(spl_associated_token_account::id(), false),
        ]
    }
}

/// Capture: the owner pays tokens into escrow and receives an escrowed asset
pub fn capture(accounts: &SwapAccounts) -> Result<Instruction, InstructionBuildError> {
    let mut metas = accounts.leading_metas();
    metas.push(AccountMeta::new_readonly(sysvar::slot_hashes::id(), false));
    metas.extend(SwapAccounts::trailing_metas());
    Ok(Instruction {
        program_id: accounts.program,
        accounts: metas,
        data: encode(&accounts.program, "capture_v1", &())?,
    })
}

/// Release: the owner hands the asset back to escrow and receives tokens
pub fn release(accounts: &SwapAccounts) -> Result<Instruction, InstructionBuildError> {
    let mut metas = accounts.leading_metas();
    metas.extend(SwapAccounts::trailing_metas());
    Ok(Instruction {
        program_id: accounts.program,
        accounts: metas,
        data: encode(&accounts.program, "release_v1", &())?,
    })
}
