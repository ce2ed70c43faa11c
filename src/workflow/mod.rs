//! Swap workflow: state machine, bounded polling and the orchestrator

pub mod retry;
pub mod state;
pub mod swap_workflow;
pub mod workflow_errors;

pub use retry::{poll_until, Backoff, PollError, PollStatus, RetryPolicy};
pub use state::{SwapOperation, SwapParties, SwapRecord, SwapRun, WorkflowState};
pub use swap_workflow::{
    CollectionRequest, EscrowTarget, MetadataTemplate, MintRequest, SwapRequest, SwapWorkflow, TokenDeposit, WorkflowSettings,
};
pub use workflow_errors::{OutcomeKind, WorkflowError, WorkflowResult, WorkflowStep};
