//! Run state machine and the record a successful run produces
//!
//! ```text
//! Init -> TokenMoved -> AssetMutated -> Confirmed -> Recorded
//!   \________\_____________\______________\________-> Failed
//! ```

use crate::ledger::ConfirmationState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::fmt;
use uuid::Uuid;

use super::workflow_errors::{WorkflowError, WorkflowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Init,
    TokenMoved,
    AssetMutated,
    Confirmed,
    Recorded,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Recorded | WorkflowState::Failed)
    }

    /// Forward edges only; `Failed` is reachable from any non-terminal state
    pub fn can_advance_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        match (self, next) {
            (Init, TokenMoved)
            | (TokenMoved, AssetMutated)
            | (AssetMutated, Confirmed)
            | (Confirmed, Recorded) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowState::Init => "init",
            WorkflowState::TokenMoved => "token_moved",
            WorkflowState::AssetMutated => "asset_mutated",
            WorkflowState::Confirmed => "confirmed",
            WorkflowState::Recorded => "recorded",
            WorkflowState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapOperation {
    /// Pay the mint fee, then create a new asset with a pooled identifier
    PaidMint,
    Capture,
    Release,
    DepositTokens,
    DepositAsset,
    InitEscrow,
    UpdateEscrow,
    CreateCollection,
    /// Register the escrow as the collection's update delegate
    DelegateCollection,
    SetUpdateAuthority,
}

impl fmt::Display for SwapOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwapOperation::PaidMint => "paid_mint",
            SwapOperation::Capture => "capture",
            SwapOperation::Release => "release",
            SwapOperation::DepositTokens => "deposit_tokens",
            SwapOperation::DepositAsset => "deposit_asset",
            SwapOperation::InitEscrow => "init_escrow",
            SwapOperation::UpdateEscrow => "update_escrow",
            SwapOperation::CreateCollection => "create_collection",
            SwapOperation::DelegateCollection => "delegate_collection",
            SwapOperation::SetUpdateAuthority => "set_update_authority",
        };
        f.write_str(s)
    }
}

/// Accounts a run acts on, fixed when the run starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwapParties {
    #[serde(with = "display")]
    pub owner: Pubkey,
    #[serde(with = "display")]
    pub collection: Pubkey,
    #[serde(with = "display")]
    pub token: Pubkey,
    #[serde(with = "display")]
    pub escrow: Pubkey,
}

/// In-progress run
#[derive(Debug, Clone)]
pub struct SwapRun {
    pub run_id: Uuid,
    pub operation: SwapOperation,
    pub parties: SwapParties,
    state: WorkflowState,
    history: Vec<WorkflowState>,
    pub asset_id: Option<u32>,
    pub asset_address: Option<Pubkey>,
    pub token_signature: Option<Signature>,
    pub asset_signature: Option<Signature>,
    pub confirmation: ConfirmationState,
    pub observe_attempts: u32,
    pub failure: Option<String>,
}

impl SwapRun {
    pub fn new(operation: SwapOperation, parties: SwapParties) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            operation,
            parties,
            state: WorkflowState::Init,
            history: vec![WorkflowState::Init],
            asset_id: None,
            asset_address: None,
            token_signature: None,
            asset_signature: None,
            confirmation: ConfirmationState::Unknown,
            observe_attempts: 0,
            failure: None,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// States visited so far, starting with `Init`
    pub fn history(&self) -> &[WorkflowState] {
        &self.history
    }

    pub fn advance(&mut self, next: WorkflowState) -> WorkflowResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(WorkflowError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Move to `Failed`; a no-op once the run is terminal
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = WorkflowState::Failed;
        self.history.push(WorkflowState::Failed);
        self.failure = Some(reason.into());
    }

    /// Snapshot of a run that reached `Recorded`
    pub fn record(&self) -> WorkflowResult<SwapRecord> {
        if self.state != WorkflowState::Recorded {
            return Err(WorkflowError::InvalidTransition {
                from: self.state,
                to: WorkflowState::Recorded,
            });
        }
        Ok(SwapRecord {
            run_id: self.run_id,
            operation: self.operation,
            parties: self.parties,
            asset_id: self.asset_id,
            asset_address: self.asset_address,
            token_signature: self.token_signature,
            asset_signature: self.asset_signature,
            confirmation: self.confirmation.to_string(),
            observe_attempts: self.observe_attempts,
            recorded_at: Utc::now(),
        })
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapRecord {
    pub run_id: Uuid,
    pub operation: SwapOperation,
    pub parties: SwapParties,
    pub asset_id: Option<u32>,
    #[serde(with = "display_opt")]
    pub asset_address: Option<Pubkey>,
    #[serde(with = "display_opt")]
    pub token_signature: Option<Signature>,
    #[serde(with = "display_opt")]
    pub asset_signature: Option<Signature>,
    pub confirmation: String,
    /// Reads it took before the written account was observed
    pub observe_attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

mod display {
    use serde::Serializer;
    use std::fmt::Display;

    pub fn serialize<T: Display, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(value)
    }
}

mod display_opt {
    use serde::Serializer;
    use std::fmt::Display;

    pub fn serialize<T: Display, S: Serializer>(value: &Option<T>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.collect_str(v),
            None => s.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parties() -> SwapParties {
        SwapParties {
            owner: Pubkey::new_unique(),
            collection: Pubkey::new_unique(),
            token: Pubkey::new_unique(),
            escrow: Pubkey::new_unique(),
        }
    }

    #[test]
    fn test_forward_path() {
        let mut run = SwapRun::new(SwapOperation::PaidMint, parties());
        run.advance(WorkflowState::TokenMoved).unwrap();
        run.advance(WorkflowState::AssetMutated).unwrap();
        run.advance(WorkflowState::Confirmed).unwrap();
        run.advance(WorkflowState::Recorded).unwrap();
        assert_eq!(run.history().len(), 5);
        assert!(run.record().is_ok());
    }

    #[test]
    fn test_no_skipping_or_backtracking() {
        let mut run = SwapRun::new(SwapOperation::Capture, parties());
        assert!(run.advance(WorkflowState::Confirmed).is_err());
        run.advance(WorkflowState::TokenMoved).unwrap();
        assert!(run.advance(WorkflowState::Init).is_err());
        assert!(run.record().is_err());
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut run = SwapRun::new(SwapOperation::Release, parties());
        run.fail("rejected");
        assert_eq!(run.state(), WorkflowState::Failed);
        assert!(run.advance(WorkflowState::TokenMoved).is_err());
        run.fail("again");
        assert_eq!(run.failure.as_deref(), Some("rejected"));
        assert!(!WorkflowState::Recorded.can_advance_to(WorkflowState::Failed));
    }

    #[test]
    fn test_record_serializes_addresses_as_base58() {
        let mut run = SwapRun::new(SwapOperation::DepositAsset, parties());
        let asset = Pubkey::new_unique();
        run.asset_address = Some(asset);
        for s in [
            WorkflowState::TokenMoved,
            WorkflowState::AssetMutated,
            WorkflowState::Confirmed,
            WorkflowState::Recorded,
        ] {
            run.advance(s).unwrap();
        }
        let json = serde_json::to_value(run.record().unwrap()).unwrap();
        assert_eq!(json["asset_address"], asset.to_string());
        assert_eq!(json["operation"], "deposit_asset");
        assert!(json["token_signature"].is_null());
    }
}
