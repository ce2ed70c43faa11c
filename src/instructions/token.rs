//! SPL token legs: checked transfers between associated token accounts

use super::InstructionBuildError;
use crate::derive::associated_token_address;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};

/// `transfer_checked` from `from_owner`'s token account to `to_owner`'s.
///
/// `amount` is in base units; `decimals` must match the mint or the token
/// program rejects the transfer.
pub fn transfer_checked(
    mint: &Pubkey,
    from_owner: &Pubkey,
    to_owner: &Pubkey,
    amount: u64,
    decimals: u8,
) -> Result<Instruction, InstructionBuildError> {
    if amount == 0 {
        return Err(InstructionBuildError::new(&spl_token::id(), "transfer amount is zero"));
    }
    let source = associated_token_address(from_owner, mint);
    let destination = associated_token_address(to_owner, mint);
    spl_token::instruction::transfer_checked(
        &spl_token::id(),
        &source,
        mint,
        &destination,
        from_owner,
        &[],
        amount,
        decimals,
    )
    .map_err(|e| InstructionBuildError::new(&spl_token::id(), e.to_string()))
}

/// Create `owner`'s token account for `mint` unless it already exists
pub fn create_token_account_if_missing(payer: &Pubkey, owner: &Pubkey, mint: &Pubkey) -> Instruction {
    spl_associated_token_account::instruction::create_associated_token_account_idempotent(
        payer,
        owner,
        mint,
        &spl_token::id(),
    )
}
