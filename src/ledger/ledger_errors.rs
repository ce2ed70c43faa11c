use solana_rpc_client_api::client_error::{Error as ClientError, ErrorKind as ClientErrorKind};
use solana_rpc_client_api::request::{RpcError, RpcResponseErrorData};
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::TransactionError};
use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors crossing the ledger RPC boundary
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Request did not complete in time
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// Preflight or the node refused the transaction
    #[error("Transaction rejected: {reason} (endpoint: {endpoint})")]
    Rejected { endpoint: String, reason: String },

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    #[error("Insufficient funds (endpoint: {endpoint})")]
    InsufficientFunds { endpoint: String },

    /// The transaction landed but its execution failed on-chain
    #[error("Transaction {signature} failed on-chain: {reason}")]
    TransactionFailed { signature: Signature, reason: String },

    #[error("Account not found: {account} (endpoint: {endpoint})")]
    AccountNotFound { account: Pubkey, endpoint: String },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Transient failures that a polling loop may wait out.
    ///
    /// Submission errors are never retried with the same bytes regardless of
    /// this flag.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Transport { .. } => true,
            LedgerError::Timeout { .. } => true,
            LedgerError::AccountNotFound { .. } => true,
            LedgerError::RpcResponse { code, .. } => {
                matches!(code, Some(c) if (500..600).contains(c))
            }

            LedgerError::Rejected { .. } => false,
            LedgerError::BlockhashNotFound { .. } => false,
            LedgerError::InsufficientFunds { .. } => false,
            LedgerError::TransactionFailed { .. } => false,
            LedgerError::Internal(_) => false,
        }
    }

    /// Whether a submission failed in a way that proves nothing landed
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::Rejected { .. }
                | LedgerError::BlockhashNotFound { .. }
                | LedgerError::InsufficientFunds { .. }
                | LedgerError::TransactionFailed { .. }
        )
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            LedgerError::Transport { endpoint, .. }
            | LedgerError::Timeout { endpoint, .. }
            | LedgerError::Rejected { endpoint, .. }
            | LedgerError::BlockhashNotFound { endpoint }
            | LedgerError::InsufficientFunds { endpoint }
            | LedgerError::AccountNotFound { endpoint, .. }
            | LedgerError::RpcResponse { endpoint, .. } => Some(endpoint),
            LedgerError::TransactionFailed { .. } | LedgerError::Internal(_) => None,
        }
    }

    /// Classify a solana client error by its kind
    pub fn from_client_error(err: &ClientError, endpoint: &str) -> Self {
        let endpoint = endpoint.to_string();

        match err.kind() {
            ClientErrorKind::TransactionError(TransactionError::BlockhashNotFound) => {
                LedgerError::BlockhashNotFound { endpoint }
            }
            ClientErrorKind::TransactionError(
                TransactionError::InsufficientFundsForFee | TransactionError::InsufficientFundsForRent { .. },
            ) => LedgerError::InsufficientFunds { endpoint },
            ClientErrorKind::TransactionError(e) => LedgerError::Rejected {
                endpoint,
                reason: e.to_string(),
            },
            ClientErrorKind::RpcError(RpcError::RpcResponseError {
                message,
                data: RpcResponseErrorData::SendTransactionPreflightFailure(_),
                ..
            }) => {
                if message.contains("Blockhash not found") {
                    LedgerError::BlockhashNotFound { endpoint }
                } else {
                    LedgerError::Rejected {
                        endpoint,
                        reason: message.clone(),
                    }
                }
            }
            ClientErrorKind::RpcError(RpcError::RpcResponseError { code, message, .. }) => {
                LedgerError::RpcResponse {
                    endpoint,
                    message: message.clone(),
                    code: Some(*code),
                }
            }
            ClientErrorKind::Reqwest(e) if e.is_timeout() => LedgerError::Timeout {
                endpoint,
                timeout_ms: 0,
            },
            ClientErrorKind::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => LedgerError::Timeout {
                endpoint,
                timeout_ms: 0,
            },
            ClientErrorKind::Reqwest(_) | ClientErrorKind::Io(_) => LedgerError::Transport {
                endpoint,
                message: err.to_string(),
            },
            ClientErrorKind::SigningError(e) => LedgerError::Internal(format!("signing: {e}")),
            _ => LedgerError::RpcResponse {
                endpoint,
                message: err.to_string(),
                code: None,
            },
        }
    }
}
