use crate::derive::DeriveError;
use crate::escrow_config::EscrowConfigError;
use crate::id_pool::PoolError;
use crate::instructions::InstructionBuildError;
use crate::ledger::{CommitmentLevel, LedgerError};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use super::state::WorkflowState;

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Stage of a run a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowStep {
    Reserve,
    TokenTransfer,
    AssetMutation,
    Confirmation,
    Observation,
    Record,
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStep::Reserve => "reserve",
            WorkflowStep::TokenTransfer => "token_transfer",
            WorkflowStep::AssetMutation => "asset_mutation",
            WorkflowStep::Confirmation => "confirmation",
            WorkflowStep::Observation => "observation",
            WorkflowStep::Record => "record",
        };
        f.write_str(s)
    }
}

/// Why a workflow run ended in `Failed`
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The ledger refused the transaction; nothing landed
    #[error("Submission rejected during {step}: {source}")]
    RejectedAtSubmission {
        step: WorkflowStep,
        #[source]
        source: LedgerError,
    },

    /// Submission failed in transit (timeout, dropped connection). The
    /// transaction was signed, so it may still land under `signature`.
    #[error("Submission of {signature} during {step} has unknown outcome: {source}")]
    SubmissionUnknown {
        step: WorkflowStep,
        signature: Signature,
        #[source]
        source: LedgerError,
    },

    /// The signature never reached the requested commitment.
    ///
    /// The transaction may still land; the on-chain outcome is unknown.
    #[error("Transaction {signature} not {level} after {attempts} attempts during {step}: {last_reason}")]
    ConfirmationTimeout {
        step: WorkflowStep,
        signature: Signature,
        level: CommitmentLevel,
        attempts: u32,
        last_reason: String,
    },

    /// The write was confirmed but the account never read back as expected
    #[error("Account {address} not observable after {attempts} attempts (transaction {signature} confirmed): {last_reason}")]
    ObservabilityTimeout {
        address: Pubkey,
        signature: Signature,
        attempts: u32,
        last_reason: String,
    },

    /// The transaction landed and failed on-chain
    #[error("Transaction {signature} failed during {step}: {reason}")]
    ExecutionFailed {
        step: WorkflowStep,
        signature: Signature,
        reason: String,
    },

    #[error("Identifier pool exhausted (capacity: {capacity})")]
    PoolExhausted { capacity: u32 },

    #[error("Identifier store {path} is corrupt: {reason}")]
    StorageCorrupt { path: PathBuf, reason: String },

    /// The asset is on-chain but its identifier could not be made durable
    #[error("Asset {asset} observed but identifier {id} was not recorded: {source}")]
    RecordFailed {
        id: u32,
        asset: Pubkey,
        #[source]
        source: PoolError,
    },

    #[error("Identifier pool error: {0}")]
    Pool(PoolError),

    #[error("Minting needs an identifier pool")]
    NoPool,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Non-submission ledger failure (blockhash fetch, hard read error)
    #[error("Ledger error during {step}: {source}")]
    Ledger {
        step: WorkflowStep,
        #[source]
        source: LedgerError,
    },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Instruction(#[from] InstructionBuildError),

    #[error(transparent)]
    Derive(#[from] DeriveError),

    #[error(transparent)]
    EscrowConfig(#[from] EscrowConfigError),

    #[error("Invalid state transition {from} -> {to}")]
    InvalidTransition { from: WorkflowState, to: WorkflowState },
}

impl From<PoolError> for WorkflowError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Exhausted { capacity } => WorkflowError::PoolExhausted { capacity },
            PoolError::StorageCorrupt { path, reason } => WorkflowError::StorageCorrupt { path, reason },
            other => WorkflowError::Pool(other),
        }
    }
}

/// Outcome tag reported for every finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    RejectedAtSubmission,
    SubmissionUnknown,
    ConfirmationTimeout,
    ObservabilityTimeout,
    PoolExhausted,
    StorageCorrupt,
    Failed,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeKind::Success => "success",
            OutcomeKind::RejectedAtSubmission => "rejected_at_submission",
            OutcomeKind::SubmissionUnknown => "submission_unknown",
            OutcomeKind::ConfirmationTimeout => "confirmation_timeout",
            OutcomeKind::ObservabilityTimeout => "observability_timeout",
            OutcomeKind::PoolExhausted => "pool_exhausted",
            OutcomeKind::StorageCorrupt => "storage_corrupt",
            OutcomeKind::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl WorkflowError {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            WorkflowError::RejectedAtSubmission { .. } => OutcomeKind::RejectedAtSubmission,
            WorkflowError::SubmissionUnknown { .. } => OutcomeKind::SubmissionUnknown,
            WorkflowError::ConfirmationTimeout { .. } => OutcomeKind::ConfirmationTimeout,
            WorkflowError::ObservabilityTimeout { .. } => OutcomeKind::ObservabilityTimeout,
            WorkflowError::PoolExhausted { .. } => OutcomeKind::PoolExhausted,
            WorkflowError::StorageCorrupt { .. } => OutcomeKind::StorageCorrupt,
            _ => OutcomeKind::Failed,
        }
    }

    /// Signature involved in the failure, if a transaction was submitted
    pub fn signature(&self) -> Option<Signature> {
        match self {
            WorkflowError::SubmissionUnknown { signature, .. }
            | WorkflowError::ConfirmationTimeout { signature, .. }
            | WorkflowError::ObservabilityTimeout { signature, .. }
            | WorkflowError::ExecutionFailed { signature, .. } => Some(*signature),
            _ => None,
        }
    }

    /// The ledger state after this failure cannot be known without a manual check
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            WorkflowError::SubmissionUnknown { .. }
                | WorkflowError::ConfirmationTimeout { .. }
                | WorkflowError::RecordFailed { .. }
        )
    }
}
