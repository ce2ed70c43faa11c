//! JSON-RPC backed ledger client

use super::ledger_errors::{LedgerError, LedgerResult};
use super::{CommitmentLevel, ConfirmationState, LedgerClient};
use crate::metrics::{metrics, Timer};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::{
    account::Account, hash::Hash, pubkey::Pubkey, signature::Signature, transaction::Transaction,
};
use solana_transaction_status::TransactionConfirmationStatus;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Ledger client over a single RPC endpoint
pub struct RpcLedgerClient {
    client: RpcClient,
    endpoint: String,
    commitment: CommitmentLevel,
}

impl std::fmt::Debug for RpcLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedgerClient")
            .field("endpoint", &self.endpoint)
            .field("commitment", &self.commitment)
            .finish_non_exhaustive()
    }
}

impl RpcLedgerClient {
    /// `commitment` is used for preflight and account reads
    pub fn new(endpoint: impl Into<String>, timeout: Duration, commitment: CommitmentLevel) -> Self {
        let endpoint = endpoint.into();
        Self {
            client: RpcClient::new_with_timeout_and_commitment(
                endpoint.clone(),
                timeout,
                commitment.as_config(),
            ),
            endpoint,
            commitment,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(&self, err: solana_rpc_client_api::client_error::Error) -> LedgerError {
        let classified = LedgerError::from_client_error(&err, &self.endpoint);
        debug!(endpoint = %self.endpoint, error = %classified, "RPC call failed");
        classified
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn latest_blockhash(&self) -> LedgerResult<Hash> {
        let timer = Timer::new();
        let result = self.client.get_latest_blockhash().await;
        timer.observe_duration(&metrics().rpc_latency);
        result.map_err(|e| self.classify(e))
    }

    #[instrument(skip(self, transaction), fields(endpoint = %self.endpoint))]
    async fn submit(&self, transaction: &Transaction) -> LedgerResult<Signature> {
        let config = RpcSendTransactionConfig {
            preflight_commitment: Some(self.commitment.as_config().commitment),
            ..RpcSendTransactionConfig::default()
        };
        let timer = Timer::new();
        let result = self
            .client
            .send_transaction_with_config(transaction, config)
            .await;
        timer.observe_duration(&metrics().rpc_latency);

        match result {
            Ok(signature) => {
                debug!(%signature, "Transaction submitted");
                Ok(signature)
            }
            Err(e) => {
                let err = self.classify(e);
                warn!(error = %err, "Transaction submission failed");
                Err(err)
            }
        }
    }

    async fn confirm(&self, signature: &Signature, level: CommitmentLevel) -> LedgerResult<ConfirmationState> {
        let timer = Timer::new();
        // Finalized signatures can fall out of the recent status cache
        let response = if level == CommitmentLevel::Finalized {
            self.client
                .get_signature_statuses_with_history(&[*signature])
                .await
        } else {
            self.client.get_signature_statuses(&[*signature]).await
        };
        timer.observe_duration(&metrics().rpc_latency);
        let response = response.map_err(|e| self.classify(e))?;

        let Some(status) = response.value.into_iter().next().flatten() else {
            debug!(%signature, %level, "Signature not visible yet");
            return Ok(ConfirmationState::Unknown);
        };

        if let Some(err) = status.err {
            return Err(LedgerError::TransactionFailed {
                signature: *signature,
                reason: err.to_string(),
            });
        }

        let state = match status.confirmation_status {
            Some(TransactionConfirmationStatus::Processed) => ConfirmationState::Submitted,
            Some(TransactionConfirmationStatus::Confirmed) => ConfirmationState::Confirmed,
            Some(TransactionConfirmationStatus::Finalized) => ConfirmationState::Finalized,
            // Older nodes omit the status; a missing confirmation count means rooted
            None if status.confirmations.is_none() => ConfirmationState::Finalized,
            None => ConfirmationState::Submitted,
        };
        debug!(%signature, %level, %state, "Signature status");
        Ok(state)
    }

    async fn fetch_account(&self, address: &Pubkey) -> LedgerResult<Option<Account>> {
        let timer = Timer::new();
        let result = self
            .client
            .get_account_with_commitment(address, self.commitment.as_config())
            .await;
        timer.observe_duration(&metrics().rpc_latency);
        result.map(|r| r.value).map_err(|e| self.classify(e))
    }
}
