//! Scripted in-memory ledger for tests and offline dry runs
//!
//! Each operation pops the next scripted response; once a script runs dry the
//! ledger behaves like a healthy cluster (submissions accepted, signatures
//! finalized, accounts served from the registered set or the default account).

use super::ledger_errors::{LedgerError, LedgerResult};
use super::{CommitmentLevel, ConfirmationState, LedgerClient};
use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    account::Account, hash::Hash, pubkey::Pubkey, signature::Signature, transaction::Transaction,
};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
struct MockState {
    submit_script: VecDeque<LedgerError>,
    confirm_script: VecDeque<LedgerResult<ConfirmationState>>,
    fetch_script: VecDeque<LedgerResult<Option<Account>>>,
    accounts: HashMap<Pubkey, Account>,
    default_account: Option<Account>,
    submitted: Vec<Transaction>,
    blockhash_calls: usize,
    confirm_calls: usize,
    fetch_calls: usize,
}

#[derive(Debug, Default)]
pub struct MockLedger {
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next submission with `err` (one entry per submission)
    pub fn push_submit_error(&self, err: LedgerError) {
        self.state.lock().submit_script.push_back(err);
    }

    pub fn push_confirmation(&self, state: ConfirmationState) {
        self.state.lock().confirm_script.push_back(Ok(state));
    }

    pub fn push_confirm_error(&self, err: LedgerError) {
        self.state.lock().confirm_script.push_back(Err(err));
    }

    /// Next fetch reports the account as missing
    pub fn push_not_found(&self) {
        self.state.lock().fetch_script.push_back(Ok(None));
    }

    pub fn push_fetch(&self, result: LedgerResult<Option<Account>>) {
        self.state.lock().fetch_script.push_back(result);
    }

    pub fn set_account(&self, address: Pubkey, account: Account) {
        self.state.lock().accounts.insert(address, account);
    }

    /// Account served for any address without a registered account
    pub fn set_default_account(&self, account: Account) {
        self.state.lock().default_account = Some(account);
    }

    pub fn submitted(&self) -> Vec<Transaction> {
        self.state.lock().submitted.clone()
    }

    pub fn submit_calls(&self) -> usize {
        self.state.lock().submitted.len()
    }

    pub fn confirm_calls(&self) -> usize {
        self.state.lock().confirm_calls
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.lock().fetch_calls
    }

    /// Total remote calls of any kind
    pub fn total_calls(&self) -> usize {
        let s = self.state.lock();
        s.blockhash_calls + s.submitted.len() + s.confirm_calls + s.fetch_calls
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn latest_blockhash(&self) -> LedgerResult<Hash> {
        self.state.lock().blockhash_calls += 1;
        Ok(Hash::new_unique())
    }

    async fn submit(&self, transaction: &Transaction) -> LedgerResult<Signature> {
        let mut s = self.state.lock();
        if let Some(err) = s.submit_script.pop_front() {
            return Err(err);
        }
        s.submitted.push(transaction.clone());
        transaction
            .signatures
            .first()
            .copied()
            .ok_or_else(|| LedgerError::Internal("unsigned transaction".to_string()))
    }

    async fn confirm(&self, _signature: &Signature, _level: CommitmentLevel) -> LedgerResult<ConfirmationState> {
        let mut s = self.state.lock();
        s.confirm_calls += 1;
        s.confirm_script
            .pop_front()
            .unwrap_or(Ok(ConfirmationState::Finalized))
    }

    async fn fetch_account(&self, address: &Pubkey) -> LedgerResult<Option<Account>> {
        let mut s = self.state.lock();
        s.fetch_calls += 1;
        if let Some(scripted) = s.fetch_script.pop_front() {
            return scripted;
        }
        Ok(s
            .accounts
            .get(address)
            .cloned()
            .or_else(|| s.default_account.clone()))
    }
}
