//! Multi-step swap orchestration over the ledger boundary
//!
//! Every run walks the same state machine. A transaction is submitted once;
//! only the confirmation and account reads that follow are polled. Nothing
//! is recorded locally until the written account has been read back.

use crate::derive::{associated_token_address, escrow_address};
use crate::escrow_config::{EscrowConfigUpdate, EscrowInit};
use crate::id_pool::IdentifierPool;
use crate::instructions::asset::{self, asset_owner, asset_update_authority, decode_collection, UpdateAuthority};
use crate::instructions::escrow::{
    self, EscrowAccounts, SwapAccounts, ESCROW_PROGRAM_ID, PROTOCOL_FEE_WALLET,
};
use crate::instructions::token;
use crate::ledger::{CommitmentLevel, ConfirmationState, LedgerClient, LedgerError};
use crate::metrics::{metrics, Timer};
use solana_sdk::{
    account::Account,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::Transaction,
};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use super::retry::{poll_until, PollError, PollStatus, RetryPolicy};
use super::state::{SwapOperation, SwapParties, SwapRecord, SwapRun, WorkflowState};
use super::workflow_errors::{OutcomeKind, WorkflowError, WorkflowResult, WorkflowStep};

/// Knobs shared by every run
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub escrow_program: Pubkey,
    /// Lamport fee recipient passed to capture and release
    pub fee_sol_account: Pubkey,
    /// Commitment a signature must reach before the account is read back
    pub commitment: CommitmentLevel,
    pub retry: RetryPolicy,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            escrow_program: ESCROW_PROGRAM_ID,
            fee_sol_account: PROTOCOL_FEE_WALLET,
            commitment: CommitmentLevel::Finalized,
            retry: RetryPolicy::default(),
        }
    }
}

/// Name and metadata URI of a newly minted asset, derived from its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTemplate {
    pub base_uri: String,
    pub uri_prefix: String,
    pub name_prefix: String,
}

impl MetadataTemplate {
    pub fn uri_for(&self, id: u32) -> String {
        format!("{}/{}{}.json", self.base_uri.trim_end_matches('/'), self.uri_prefix, id)
    }

    pub fn name_for(&self, id: u32) -> String {
        format!("{}{}", self.name_prefix, id)
    }
}

#[derive(Debug, Clone)]
pub struct MintRequest {
    pub collection: Pubkey,
    /// Mint of the fee token
    pub token: Pubkey,
    pub decimals: u8,
    /// Fee in base units; zero skips the fee transfer
    pub fee_amount: u64,
    pub fee_recipient: Pubkey,
    /// Owner of the new asset; the payer when unset
    pub owner: Option<Pubkey>,
    pub metadata: MetadataTemplate,
}

#[derive(Debug, Clone, Copy)]
pub struct SwapRequest {
    pub asset: Pubkey,
    pub collection: Pubkey,
    pub token: Pubkey,
    pub fee_project_account: Pubkey,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenDeposit {
    pub collection: Pubkey,
    pub token: Pubkey,
    pub amount: u64,
    pub decimals: u8,
}

/// Escrow being created or reconfigured
#[derive(Debug, Clone, Copy)]
pub struct EscrowTarget {
    pub collection: Pubkey,
    pub token: Pubkey,
    pub fee_location: Pubkey,
}

#[derive(Debug, Clone)]
pub struct CollectionRequest {
    pub name: String,
    pub uri: String,
    /// Update authority of the new collection; the payer when unset
    pub update_authority: Option<Pubkey>,
}

/// What a confirmed write must look like when read back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expectation {
    Exists,
    AssetOwnedBy(Pubkey),
    AssetAuthority(UpdateAuthority),
    CollectionAuthority(Pubkey),
    CollectionDelegate(Pubkey),
}

impl Expectation {
    fn check(self, account: &Account) -> Result<(), String> {
        match self {
            Expectation::Exists => Ok(()),
            Expectation::AssetOwnedBy(expected) => match asset_owner(&account.data) {
                Some(owner) if owner == expected => Ok(()),
                Some(owner) => Err(format!("asset owned by {owner}, expecting {expected}")),
                None => Err("account is not an asset yet".to_string()),
            },
            Expectation::AssetAuthority(expected) => match asset_update_authority(&account.data) {
                Some(authority) if authority == expected => Ok(()),
                Some(authority) => Err(format!("asset update authority is {authority:?}, expecting {expected:?}")),
                None => Err("account is not an asset yet".to_string()),
            },
            Expectation::CollectionAuthority(expected) => match decode_collection(&account.data) {
                Some(c) if c.update_authority == expected => Ok(()),
                Some(c) => Err(format!("collection authority is {}, expecting {expected}", c.update_authority)),
                None => Err("account is not a collection yet".to_string()),
            },
            Expectation::CollectionDelegate(delegate) => match decode_collection(&account.data) {
                Some(c) if c.update_delegates.contains(&delegate) => Ok(()),
                Some(_) => Err(format!("{delegate} is not an update delegate yet")),
                None => Err("account is not a collection".to_string()),
            },
        }
    }
}

/// How the token half of a run relates to its main transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenLeg {
    /// Already moved (and confirmed) by an earlier transaction
    Settled,
    /// Moves inside the main transaction
    Atomic,
    /// No tokens involved
    Absent,
}

pub struct SwapWorkflow {
    ledger: Arc<dyn LedgerClient>,
    payer: Arc<Keypair>,
    pool: Option<IdentifierPool>,
    settings: WorkflowSettings,
}

impl SwapWorkflow {
    pub fn new(ledger: Arc<dyn LedgerClient>, payer: Arc<Keypair>, settings: WorkflowSettings) -> Self {
        Self {
            ledger,
            payer,
            pool: None,
            settings,
        }
    }

    pub fn with_pool(mut self, pool: IdentifierPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn payer(&self) -> Pubkey {
        self.payer.pubkey()
    }

    pub fn pool(&self) -> Option<&IdentifierPool> {
        self.pool.as_ref()
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn escrow_for(&self, collection: &Pubkey) -> WorkflowResult<Pubkey> {
        Ok(escrow_address(&self.settings.escrow_program, collection)?.address)
    }

    /// Pay the mint fee, then create an asset named after a fresh pooled id.
    ///
    /// The id is reserved before any ledger contact, so an exhausted pool
    /// fails without spending anything. It becomes durable only once the
    /// asset reads back with the expected owner.
    pub async fn mint_paid(&self, req: &MintRequest) -> WorkflowResult<SwapRecord> {
        let parties = SwapParties {
            owner: req.owner.unwrap_or_else(|| self.payer()),
            collection: req.collection,
            token: req.token,
            escrow: self.escrow_for(&req.collection)?,
        };
        let mut run = SwapRun::new(SwapOperation::PaidMint, parties);
        let (span, timer) = self.begin(&run);
        let result = self.run_mint(&mut run, req).instrument(span.clone()).await;
        self.finish(run, result, span, timer)
    }

    /// Pay tokens into escrow and take an escrowed asset
    pub async fn capture(&self, req: &SwapRequest) -> WorkflowResult<SwapRecord> {
        self.swap(SwapOperation::Capture, req).await
    }

    /// Hand an asset back to escrow and take tokens
    pub async fn release(&self, req: &SwapRequest) -> WorkflowResult<SwapRecord> {
        self.swap(SwapOperation::Release, req).await
    }

    /// Fund the escrow's token account, creating it if needed
    pub async fn deposit_tokens(&self, deposit: &TokenDeposit) -> WorkflowResult<SwapRecord> {
        let payer = self.payer();
        let escrow = self.escrow_for(&deposit.collection)?;
        let parties = SwapParties {
            owner: payer,
            collection: deposit.collection,
            token: deposit.token,
            escrow,
        };
        let mut run = SwapRun::new(SwapOperation::DepositTokens, parties);
        let (span, timer) = self.begin(&run);
        let result = async {
            let instructions = vec![
                token::create_token_account_if_missing(&payer, &escrow, &deposit.token),
                token::transfer_checked(&deposit.token, &payer, &escrow, deposit.amount, deposit.decimals)?,
            ];
            let escrow_tokens = associated_token_address(&escrow, &deposit.token);
            self.mutate_and_observe(
                &mut run,
                instructions,
                &[],
                TokenLeg::Atomic,
                escrow_tokens,
                Expectation::Exists,
            )
            .await?;
            run.advance(WorkflowState::Recorded)
        }
        .instrument(span.clone())
        .await;
        self.finish(run, result, span, timer)
    }

    /// Move an asset the payer owns into the escrow
    pub async fn deposit_asset(&self, asset_address: &Pubkey, collection: &Pubkey) -> WorkflowResult<SwapRecord> {
        let payer = self.payer();
        let escrow = self.escrow_for(collection)?;
        let parties = SwapParties {
            owner: payer,
            collection: *collection,
            token: Pubkey::default(),
            escrow,
        };
        let mut run = SwapRun::new(SwapOperation::DepositAsset, parties);
        run.asset_address = Some(*asset_address);
        let ix = asset::transfer_asset(asset_address, collection, &payer, &escrow)?;
        self.run_single(run, ix, &[], *asset_address, Expectation::AssetOwnedBy(escrow))
            .await
    }

    /// Create a collection under a fresh address; the record carries it in
    /// `parties.collection`
    pub async fn create_collection(&self, req: &CollectionRequest) -> WorkflowResult<SwapRecord> {
        let payer = self.payer();
        let authority = req.update_authority.unwrap_or(payer);
        let collection_signer = Keypair::new();
        let collection = collection_signer.pubkey();
        let parties = SwapParties {
            owner: authority,
            collection,
            token: Pubkey::default(),
            escrow: self.escrow_for(&collection)?,
        };
        let run = SwapRun::new(SwapOperation::CreateCollection, parties);
        let ix = asset::create_collection(&collection, &authority, &payer, &req.name, &req.uri)?;
        let extra: [&dyn Signer; 1] = [&collection_signer];
        self.run_single(run, ix, &extra, collection, Expectation::CollectionAuthority(authority))
            .await
    }

    /// Make the collection's escrow an update delegate of the collection.
    /// The payer must be the collection's update authority.
    pub async fn delegate_collection(&self, collection: &Pubkey) -> WorkflowResult<SwapRecord> {
        let payer = self.payer();
        let escrow = self.escrow_for(collection)?;
        let parties = SwapParties {
            owner: payer,
            collection: *collection,
            token: Pubkey::default(),
            escrow,
        };
        let run = SwapRun::new(SwapOperation::DelegateCollection, parties);
        let ix = asset::add_update_delegate(collection, &payer, &payer, &escrow)?;
        self.run_single(run, ix, &[], *collection, Expectation::CollectionDelegate(escrow))
            .await
    }

    /// Hand the asset's update authority to `new_authority`
    pub async fn set_update_authority(
        &self,
        asset_address: &Pubkey,
        collection: &Pubkey,
        new_authority: &Pubkey,
    ) -> WorkflowResult<SwapRecord> {
        let payer = self.payer();
        let parties = SwapParties {
            owner: payer,
            collection: *collection,
            token: Pubkey::default(),
            escrow: self.escrow_for(collection)?,
        };
        let mut run = SwapRun::new(SwapOperation::SetUpdateAuthority, parties);
        run.asset_address = Some(*asset_address);
        let authority = UpdateAuthority::Address(*new_authority);
        let ix = asset::set_update_authority(asset_address, Some(collection), &payer, &payer, authority)?;
        self.run_single(run, ix, &[], *asset_address, Expectation::AssetAuthority(authority))
            .await
    }

    pub async fn init_escrow(&self, target: &EscrowTarget, init: &EscrowInit) -> WorkflowResult<SwapRecord> {
        let args = init.to_args()?;
        let accounts = self.escrow_accounts(target, None, None)?;
        let ix = escrow::init_escrow(&accounts, &self.payer(), &args)?;
        self.configure(SwapOperation::InitEscrow, accounts, ix).await
    }

    /// Apply a partial update; fields left unset keep their on-chain value
    pub async fn update_escrow(&self, target: &EscrowTarget, update: &EscrowConfigUpdate) -> WorkflowResult<SwapRecord> {
        let args = update.to_args()?;
        let accounts = self.escrow_accounts(target, update.token, update.fee_location)?;
        let ix = escrow::update_escrow(&accounts, &self.payer(), &args)?;
        self.configure(SwapOperation::UpdateEscrow, accounts, ix).await
    }

    async fn run_mint(&self, run: &mut SwapRun, req: &MintRequest) -> WorkflowResult<()> {
        let payer = self.payer();
        if req.fee_amount > 0 && req.fee_recipient == payer {
            return Err(WorkflowError::InvalidRequest(
                "mint fee recipient is the payer".to_string(),
            ));
        }
        let pool = self.pool.as_ref().ok_or(WorkflowError::NoPool)?;
        let reservation = pool.reserve()?;
        let id = reservation.id();
        run.asset_id = Some(id);
        debug!(id, "Identifier reserved");

        if req.fee_amount > 0 {
            let instructions = vec![
                token::create_token_account_if_missing(&payer, &req.fee_recipient, &req.token),
                token::transfer_checked(&req.token, &payer, &req.fee_recipient, req.fee_amount, req.decimals)?,
            ];
            let signature = self.submit(WorkflowStep::TokenTransfer, instructions, &[]).await?;
            run.token_signature = Some(signature);
            self.await_confirmation(WorkflowStep::TokenTransfer, signature).await?;
            info!(%signature, amount = req.fee_amount, "Mint fee paid");
        }
        run.advance(WorkflowState::TokenMoved)?;

        let owner = run.parties.owner;
        let asset_signer = Keypair::new();
        let asset_address = asset_signer.pubkey();
        run.asset_address = Some(asset_address);
        let ix = asset::create_asset(
            &asset_address,
            &req.collection,
            &payer,
            &owner,
            &req.metadata.name_for(id),
            &req.metadata.uri_for(id),
        )?;
        let extra: [&dyn Signer; 1] = [&asset_signer];
        self.mutate_and_observe(
            run,
            vec![ix],
            &extra,
            TokenLeg::Settled,
            asset_address,
            Expectation::AssetOwnedBy(owner),
        )
        .await?;

        reservation.commit_async().await.map_err(|source| WorkflowError::RecordFailed {
            id,
            asset: asset_address,
            source,
        })?;
        run.advance(WorkflowState::Recorded)
    }

    async fn swap(&self, operation: SwapOperation, req: &SwapRequest) -> WorkflowResult<SwapRecord> {
        let payer = self.payer();
        let escrow = self.escrow_for(&req.collection)?;
        let parties = SwapParties {
            owner: payer,
            collection: req.collection,
            token: req.token,
            escrow,
        };
        let mut run = SwapRun::new(operation, parties);
        run.asset_address = Some(req.asset);
        let (span, timer) = self.begin(&run);
        let result = async {
            let accounts = SwapAccounts {
                program: self.settings.escrow_program,
                owner: payer,
                authority: payer,
                escrow,
                asset: req.asset,
                collection: req.collection,
                token: req.token,
                fee_project_account: req.fee_project_account,
                fee_sol_account: self.settings.fee_sol_account,
            };
            let (ix, new_owner) = match operation {
                SwapOperation::Release => (escrow::release(&accounts)?, escrow),
                _ => (escrow::capture(&accounts)?, payer),
            };
            self.mutate_and_observe(
                &mut run,
                vec![ix],
                &[],
                TokenLeg::Atomic,
                req.asset,
                Expectation::AssetOwnedBy(new_owner),
            )
            .await?;
            run.advance(WorkflowState::Recorded)
        }
        .instrument(span.clone())
        .await;
        self.finish(run, result, span, timer)
    }

    async fn configure(
        &self,
        operation: SwapOperation,
        accounts: EscrowAccounts,
        ix: Instruction,
    ) -> WorkflowResult<SwapRecord> {
        let parties = SwapParties {
            owner: self.payer(),
            collection: accounts.collection,
            token: accounts.token,
            escrow: accounts.escrow,
        };
        let run = SwapRun::new(operation, parties);
        self.run_single(run, ix, &[], accounts.escrow, Expectation::Exists)
            .await
    }

    /// One tokenless transaction, observed at `target`
    async fn run_single(
        &self,
        mut run: SwapRun,
        ix: Instruction,
        extra_signers: &[&dyn Signer],
        target: Pubkey,
        expect: Expectation,
    ) -> WorkflowResult<SwapRecord> {
        let (span, timer) = self.begin(&run);
        let result = async {
            self.mutate_and_observe(&mut run, vec![ix], extra_signers, TokenLeg::Absent, target, expect)
                .await?;
            run.advance(WorkflowState::Recorded)
        }
        .instrument(span.clone())
        .await;
        self.finish(run, result, span, timer)
    }

    fn escrow_accounts(
        &self,
        target: &EscrowTarget,
        token: Option<Pubkey>,
        fee_location: Option<Pubkey>,
    ) -> WorkflowResult<EscrowAccounts> {
        Ok(EscrowAccounts {
            program: self.settings.escrow_program,
            escrow: self.escrow_for(&target.collection)?,
            collection: target.collection,
            token: token.unwrap_or(target.token),
            fee_location: fee_location.unwrap_or(target.fee_location),
        })
    }

    /// Submit the main transaction, wait for it, then read the target back.
    /// Leaves the run in `Confirmed`.
    async fn mutate_and_observe(
        &self,
        run: &mut SwapRun,
        instructions: Vec<Instruction>,
        extra_signers: &[&dyn Signer],
        token_leg: TokenLeg,
        target: Pubkey,
        expect: Expectation,
    ) -> WorkflowResult<()> {
        let signature = self
            .submit(WorkflowStep::AssetMutation, instructions, extra_signers)
            .await?;
        run.asset_signature = Some(signature);
        match token_leg {
            TokenLeg::Settled => {}
            TokenLeg::Atomic => {
                run.token_signature = Some(signature);
                run.advance(WorkflowState::TokenMoved)?;
            }
            TokenLeg::Absent => run.advance(WorkflowState::TokenMoved)?,
        }
        run.advance(WorkflowState::AssetMutated)?;

        let (state, attempts) = self
            .await_confirmation(WorkflowStep::Confirmation, signature)
            .await?;
        run.confirmation = state;
        run.advance(WorkflowState::Confirmed)?;
        debug!(%signature, %state, attempts, "Transaction confirmed");

        run.observe_attempts = self.observe(target, signature, expect).await?;
        Ok(())
    }

    /// Build, sign and submit a fresh transaction. Never resent.
    async fn submit(
        &self,
        step: WorkflowStep,
        instructions: Vec<Instruction>,
        extra_signers: &[&dyn Signer],
    ) -> WorkflowResult<Signature> {
        let blockhash = self
            .ledger
            .latest_blockhash()
            .await
            .map_err(|source| WorkflowError::Ledger { step, source })?;

        let payer: &Keypair = &self.payer;
        let mut signers: Vec<&dyn Signer> = Vec::with_capacity(1 + extra_signers.len());
        signers.push(payer);
        signers.extend_from_slice(extra_signers);

        let mut transaction = Transaction::new_with_payer(&instructions, Some(&payer.pubkey()));
        transaction
            .try_sign(&signers, blockhash)
            .map_err(|e| WorkflowError::Signing(e.to_string()))?;
        let signature = transaction
            .signatures
            .first()
            .copied()
            .ok_or_else(|| WorkflowError::Signing("transaction carries no signature".to_string()))?;

        match self.ledger.submit(&transaction).await {
            Ok(landed) => {
                debug!(%step, signature = %landed, "Transaction submitted");
                Ok(landed)
            }
            Err(source) if source.is_rejection() => Err(WorkflowError::RejectedAtSubmission { step, source }),
            Err(source) => {
                warn!(%step, %signature, error = %source, "Submission outcome unknown, transaction may still land");
                Err(WorkflowError::SubmissionUnknown {
                    step,
                    signature,
                    source,
                })
            }
        }
    }

    async fn await_confirmation(
        &self,
        step: WorkflowStep,
        signature: Signature,
    ) -> WorkflowResult<(ConfirmationState, u32)> {
        let ledger = self.ledger.as_ref();
        let level = self.settings.commitment;
        let result = poll_until("confirm", &self.settings.retry, move |_| async move {
            match ledger.confirm(&signature, level).await {
                Ok(state) if state.satisfies(level) => Ok(PollStatus::Ready(state)),
                Ok(state) => Ok(PollStatus::Pending(format!("signature is {state}"))),
                Err(err) if err.is_retryable() => Ok(PollStatus::Pending(err.to_string())),
                Err(err) => Err(err),
            }
        })
        .await;

        match result {
            Ok(ready) => Ok(ready),
            Err(PollError::Exhausted { attempts, last_reason }) => Err(WorkflowError::ConfirmationTimeout {
                step,
                signature,
                level,
                attempts,
                last_reason,
            }),
            Err(PollError::Aborted {
                error: LedgerError::TransactionFailed { reason, .. },
                ..
            }) => Err(WorkflowError::ExecutionFailed {
                step,
                signature,
                reason,
            }),
            Err(PollError::Aborted { error, .. }) => Err(WorkflowError::Ledger { step, source: error }),
        }
    }

    /// Read `address` until it matches `expect`; returns the attempts used
    async fn observe(&self, address: Pubkey, signature: Signature, expect: Expectation) -> WorkflowResult<u32> {
        let ledger = self.ledger.as_ref();
        let result = poll_until("observe", &self.settings.retry, move |_| async move {
            match ledger.fetch_account(&address).await {
                Ok(Some(account)) => Ok(match expect.check(&account) {
                    Ok(()) => PollStatus::Ready(()),
                    Err(reason) => PollStatus::Pending(reason),
                }),
                Ok(None) => Ok(PollStatus::Pending(format!("account {address} not found"))),
                Err(err) if err.is_retryable() => Ok(PollStatus::Pending(err.to_string())),
                Err(err) => Err(err),
            }
        })
        .await;

        match result {
            Ok(((), attempts)) => Ok(attempts),
            Err(PollError::Exhausted { attempts, last_reason }) => Err(WorkflowError::ObservabilityTimeout {
                address,
                signature,
                attempts,
                last_reason,
            }),
            Err(PollError::Aborted { error, .. }) => Err(WorkflowError::Ledger {
                step: WorkflowStep::Observation,
                source: error,
            }),
        }
    }

    fn begin(&self, run: &SwapRun) -> (Span, Timer) {
        metrics().workflows_started.inc();
        let span = info_span!(
            "swap_workflow",
            run_id = %run.run_id,
            operation = %run.operation,
            collection = %run.parties.collection,
        );
        span.in_scope(|| debug!(owner = %run.parties.owner, escrow = %run.parties.escrow, "Workflow started"));
        (span, Timer::new())
    }

    fn finish(
        &self,
        mut run: SwapRun,
        result: WorkflowResult<()>,
        span: Span,
        timer: Timer,
    ) -> WorkflowResult<SwapRecord> {
        let _enter = span.enter();
        timer.observe_duration(&metrics().workflow_latency);

        match result.and_then(|()| run.record()) {
            Ok(record) => {
                metrics().workflows_succeeded.inc();
                info!(
                    outcome = %OutcomeKind::Success,
                    asset_id = ?record.asset_id,
                    asset = ?record.asset_address,
                    signature = ?record.asset_signature,
                    observe_attempts = record.observe_attempts,
                    "Workflow recorded"
                );
                Ok(record)
            }
            Err(err) => {
                let reached = run.state();
                run.fail(err.to_string());
                metrics().workflows_failed.inc();
                match err.kind() {
                    OutcomeKind::RejectedAtSubmission => metrics().submissions_rejected.inc(),
                    OutcomeKind::SubmissionUnknown => metrics().submissions_unknown.inc(),
                    OutcomeKind::ConfirmationTimeout => metrics().confirmation_timeouts.inc(),
                    OutcomeKind::ObservabilityTimeout => metrics().observability_timeouts.inc(),
                    OutcomeKind::PoolExhausted => metrics().pool_exhausted.inc(),
                    _ => {}
                }
                if err.is_ambiguous() {
                    error!(
                        outcome = %err.kind(),
                        reached = %reached,
                        asset_id = ?run.asset_id,
                        signature = ?err.signature(),
                        error = %err,
                        "Workflow failed with unknown ledger state, manual reconciliation needed"
                    );
                } else {
                    warn!(
                        outcome = %err.kind(),
                        reached = %reached,
                        asset_id = ?run.asset_id,
                        error = %err,
                        "Workflow failed"
                    );
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::asset::encode_asset_account;

    #[test]
    fn test_metadata_template() {
        let t = MetadataTemplate {
            base_uri: "https://nft.example/meta/".into(),
            uri_prefix: "IKI_".into(),
            name_prefix: "IKIGAI NFT #".into(),
        };
        assert_eq!(t.uri_for(42), "https://nft.example/meta/IKI_42.json");
        assert_eq!(t.name_for(42), "IKIGAI NFT #42");
    }

    #[test]
    fn test_expectation_checks_asset_owner() {
        let owner = Pubkey::new_unique();
        let account = Account {
            data: encode_asset_account(&owner, &Pubkey::new_unique()),
            ..Account::default()
        };
        assert!(Expectation::AssetOwnedBy(owner).check(&account).is_ok());
        assert!(Expectation::AssetOwnedBy(Pubkey::new_unique()).check(&account).is_err());
        assert!(Expectation::AssetOwnedBy(owner).check(&Account::default()).is_err());
        assert!(Expectation::Exists.check(&Account::default()).is_ok());
    }
}
