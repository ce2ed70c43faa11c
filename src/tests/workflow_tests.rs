//! Workflow scenarios against the scripted ledger
//!
//! All tests run on a paused clock, so the 3s polling delays cost nothing
//! and elapsed time can be asserted exactly.

#[cfg(test)]
mod workflow_tests {
    use crate::derive::escrow_address;
    use crate::escrow_config::{EscrowConfigError, EscrowConfigUpdate, EscrowInit};
    use crate::instructions::escrow::{anchor_discriminator, ESCROW_PROGRAM_ID};
    use crate::ledger::{ConfirmationState, LedgerError};
    use crate::instructions::asset::ASSET_PROGRAM_ID;
    use crate::tests::test_helpers::{
        asset_account, asset_with_authority, collection_account, fixture, fixture_with, Fixture,
    };
    use crate::workflow::{
        CollectionRequest, EscrowTarget, OutcomeKind, SwapOperation, SwapRequest, SwapWorkflow, TokenDeposit,
        WorkflowError, WorkflowSettings, WorkflowStep,
    };
    use solana_sdk::{account::Account, pubkey::Pubkey, signature::Signature};
    use std::time::Duration;
    use tokio::time::Instant;

    fn rejected() -> LedgerError {
        LedgerError::Rejected {
            endpoint: "mock".into(),
            reason: "Transaction simulation failed".into(),
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_paid_mint_records_first_id() {
        let f = fixture();
        f.serve_assets_owned_by(&f.payer_key());

        let record = f.workflow.mint_paid(&f.mint_request(5_000_000_000)).await.unwrap();

        assert_eq!(record.operation, SwapOperation::PaidMint);
        assert_eq!(record.asset_id, Some(1));
        assert_eq!(record.observe_attempts, 1);
        assert!(record.token_signature.is_some());
        assert_ne!(record.token_signature, record.asset_signature);
        assert_eq!(f.pool.allocated(), vec![1]);
        assert_eq!(std::fs::read_to_string(&f.store_path).unwrap(), "[1]");

        // fee transfer, then asset creation
        let submitted = f.ledger.submitted();
        assert_eq!(submitted.len(), 2);
        let create = &submitted[1].message.instructions[0].data;
        assert!(contains(create, b"https://nft.example/meta/IKI_1.json"));
        assert!(contains(create, b"IKIGAI NFT #1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_mints_take_consecutive_ids() {
        let f = fixture_with(1000, &[1, 2, 4]);
        f.serve_assets_owned_by(&f.payer_key());

        let first = f.workflow.mint_paid(&f.mint_request(1)).await.unwrap();
        let second = f.workflow.mint_paid(&f.mint_request(1)).await.unwrap();

        assert_eq!(first.asset_id, Some(3));
        assert_eq!(second.asset_id, Some(5));
        assert_ne!(first.asset_address, second.asset_address);
        assert_eq!(f.pool.allocated(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_mints_never_share_an_id() {
        let f = fixture();
        f.serve_assets_owned_by(&f.payer_key());
        let req = f.mint_request(1);

        let (a, b, c) = tokio::join!(
            f.workflow.mint_paid(&req),
            f.workflow.mint_paid(&req),
            f.workflow.mint_paid(&req)
        );
        let mut ids: Vec<u32> = [a, b, c]
            .into_iter()
            .map(|r| r.unwrap().asset_id.unwrap())
            .collect();
        ids.sort_unstable();

        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(f.pool.allocated(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observation_lag_succeeds_on_fourth_read() {
        let f = fixture();
        f.serve_assets_owned_by(&f.payer_key());
        for _ in 0..3 {
            f.ledger.push_not_found();
        }
        let started = Instant::now();

        let record = f.workflow.mint_paid(&f.mint_request(0)).await.unwrap();

        assert_eq!(record.observe_attempts, 4);
        assert_eq!(f.ledger.fetch_calls(), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(9));
        assert_eq!(f.pool.allocated(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observability_timeout_leaves_id_free() {
        let f = fixture();
        for _ in 0..5 {
            f.ledger.push_not_found();
        }

        let err = f.workflow.mint_paid(&f.mint_request(0)).await.unwrap_err();

        match &err {
            WorkflowError::ObservabilityTimeout { attempts, .. } => assert_eq!(*attempts, 5),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(err.kind(), OutcomeKind::ObservabilityTimeout);
        assert!(err.signature().is_some());
        assert_eq!(f.ledger.fetch_calls(), 5);
        assert!(f.pool.allocated().is_empty());
        assert_eq!(f.pool.status().in_flight, 0);
        assert!(!f.store_path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_read_errors_count_as_lag() {
        let f = fixture();
        f.serve_assets_owned_by(&f.payer_key());
        f.ledger.push_fetch(Err(LedgerError::Timeout {
            endpoint: "mock".into(),
            timeout_ms: 30_000,
        }));

        let record = f.workflow.mint_paid(&f.mint_request(0)).await.unwrap();
        assert_eq!(record.observe_attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_read_error_aborts_observation() {
        let f = fixture();
        f.ledger
            .push_fetch(Err(LedgerError::Internal("decode failure".into())));

        let err = f.workflow.mint_paid(&f.mint_request(0)).await.unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::Ledger {
                step: WorkflowStep::Observation,
                ..
            }
        ));
        assert_eq!(f.ledger.fetch_calls(), 1);
        assert!(f.pool.allocated().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_pool_fails_without_ledger_contact() {
        let f = fixture_with(3, &[1, 2, 3]);

        let err = f.workflow.mint_paid(&f.mint_request(5_000_000_000)).await.unwrap_err();

        assert!(matches!(err, WorkflowError::PoolExhausted { capacity: 3 }));
        assert_eq!(err.kind(), OutcomeKind::PoolExhausted);
        assert_eq!(f.ledger.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_fee_transfer_commits_nothing() {
        let f = fixture();
        f.serve_assets_owned_by(&f.payer_key());
        f.ledger.push_submit_error(rejected());

        let err = f.workflow.mint_paid(&f.mint_request(5_000_000_000)).await.unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::RejectedAtSubmission {
                step: WorkflowStep::TokenTransfer,
                ..
            }
        ));
        assert!(!err.is_ambiguous());
        assert_eq!(f.ledger.confirm_calls(), 0);
        assert!(f.pool.allocated().is_empty());

        // the reservation was released, so the next run gets the same id
        let record = f.workflow.mint_paid(&f.mint_request(5_000_000_000)).await.unwrap();
        assert_eq!(record.asset_id, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_asset_creation_is_not_resubmitted() {
        let f = fixture();
        f.ledger.push_submit_error(rejected());

        let err = f.workflow.mint_paid(&f.mint_request(0)).await.unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::RejectedAtSubmission {
                step: WorkflowStep::AssetMutation,
                ..
            }
        ));
        assert_eq!(f.ledger.submit_calls(), 0);
        assert_eq!(f.ledger.fetch_calls(), 0);
        assert_eq!(f.pool.status().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_signature_times_out_after_five_polls() {
        let f = fixture();
        for _ in 0..5 {
            f.ledger.push_confirmation(ConfirmationState::Submitted);
        }
        let started = Instant::now();

        let err = f.workflow.mint_paid(&f.mint_request(0)).await.unwrap_err();

        match &err {
            WorkflowError::ConfirmationTimeout { attempts, step, .. } => {
                assert_eq!(*attempts, 5);
                assert_eq!(*step, WorkflowStep::Confirmation);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_ambiguous());
        assert_eq!(f.ledger.confirm_calls(), 5);
        assert_eq!(f.ledger.fetch_calls(), 0);
        assert_eq!(f.ledger.submit_calls(), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(12));
        assert!(f.pool.allocated().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_onchain_failure_is_not_polled_further() {
        let f = fixture();
        f.ledger.push_confirm_error(LedgerError::TransactionFailed {
            signature: Default::default(),
            reason: "custom program error: 0x1".into(),
        });

        let err = f.workflow.mint_paid(&f.mint_request(0)).await.unwrap_err();

        assert!(matches!(err, WorkflowError::ExecutionFailed { .. }));
        assert_eq!(f.ledger.confirm_calls(), 1);
        assert!(f.pool.allocated().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mint_without_pool_is_refused() {
        let f = fixture();
        let workflow = SwapWorkflow::new(f.ledger.clone(), f.payer.clone(), WorkflowSettings::default());

        let err = workflow.mint_paid(&f.mint_request(0)).await.unwrap_err();

        assert!(matches!(err, WorkflowError::NoPool));
        assert_eq!(f.ledger.total_calls(), 0);
    }

    fn swap_request(f: &Fixture, asset: Pubkey) -> SwapRequest {
        SwapRequest {
            asset,
            collection: f.collection,
            token: f.token,
            fee_project_account: f.payer_key(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_moves_asset_to_payer() {
        let f = fixture();
        let asset = Pubkey::new_unique();
        f.ledger
            .set_account(asset, asset_account(&f.payer_key(), &f.collection));

        let record = f.workflow.capture(&swap_request(&f, asset)).await.unwrap();

        assert_eq!(record.operation, SwapOperation::Capture);
        assert_eq!(record.asset_id, None);
        assert_eq!(record.asset_address, Some(asset));
        assert_eq!(record.token_signature, record.asset_signature);
        let escrow = escrow_address(&ESCROW_PROGRAM_ID, &f.collection).unwrap().address;
        assert_eq!(record.parties.escrow, escrow);

        let tx = &f.ledger.submitted()[0];
        assert_eq!(tx.message.instructions.len(), 1);
        assert_eq!(
            &tx.message.instructions[0].data[..8],
            &anchor_discriminator("capture_v1")
        );
        assert!(f.pool.allocated().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_waits_for_escrow_ownership() {
        let f = fixture();
        let asset = Pubkey::new_unique();
        let escrow = escrow_address(&ESCROW_PROGRAM_ID, &f.collection).unwrap().address;
        // stale reads still show the payer as owner
        for _ in 0..2 {
            f.ledger
                .push_fetch(Ok(Some(asset_account(&f.payer_key(), &f.collection))));
        }
        f.ledger.set_account(asset, asset_account(&escrow, &f.collection));

        let record = f.workflow.release(&swap_request(&f, asset)).await.unwrap();

        assert_eq!(record.observe_attempts, 3);
        assert_eq!(
            &f.ledger.submitted()[0].message.instructions[0].data[..8],
            &anchor_discriminator("release_v1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_rejection_reports_step() {
        let f = fixture();
        f.ledger.push_submit_error(LedgerError::InsufficientFunds {
            endpoint: "mock".into(),
        });

        let err = f
            .workflow
            .capture(&swap_request(&f, Pubkey::new_unique()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), OutcomeKind::RejectedAtSubmission);
        assert_eq!(f.ledger.confirm_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_submit_timeout_is_unknown_not_rejected() {
        let f = fixture();
        f.ledger.push_submit_error(LedgerError::Timeout {
            endpoint: "mock".into(),
            timeout_ms: 30_000,
        });

        let err = f
            .workflow
            .capture(&swap_request(&f, Pubkey::new_unique()))
            .await
            .unwrap_err();

        match &err {
            WorkflowError::SubmissionUnknown { step, signature, .. } => {
                assert_eq!(*step, WorkflowStep::AssetMutation);
                assert_ne!(*signature, Signature::default());
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(err.kind(), OutcomeKind::SubmissionUnknown);
        assert!(err.is_ambiguous());
        assert!(err.signature().is_some());
        // the transaction may be in flight; nothing is resent or polled
        assert_eq!(f.ledger.confirm_calls(), 0);
        assert_eq!(f.ledger.fetch_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fee_transfer_lost_in_transit_frees_the_id() {
        let f = fixture();
        f.ledger.push_submit_error(LedgerError::Transport {
            endpoint: "mock".into(),
            message: "connection reset".into(),
        });

        let err = f.workflow.mint_paid(&f.mint_request(5_000_000_000)).await.unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::SubmissionUnknown {
                step: WorkflowStep::TokenTransfer,
                ..
            }
        ));
        assert_eq!(f.pool.status().in_flight, 0);
        assert!(f.pool.allocated().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mint_fee_paid_to_payer_is_refused() {
        let f = fixture();
        let mut req = f.mint_request(5_000_000_000);
        req.fee_recipient = f.payer_key();

        let err = f.workflow.mint_paid(&req).await.unwrap_err();

        assert!(matches!(err, WorkflowError::InvalidRequest(_)));
        assert_eq!(f.ledger.total_calls(), 0);
        assert_eq!(f.pool.status().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deposit_tokens_creates_escrow_account_first() {
        let f = fixture();
        f.ledger.set_default_account(Account::default());

        let record = f
            .workflow
            .deposit_tokens(&TokenDeposit {
                collection: f.collection,
                token: f.token,
                amount: 1_000_000_000,
                decimals: 9,
            })
            .await
            .unwrap();

        assert_eq!(record.operation, SwapOperation::DepositTokens);
        let tx = &f.ledger.submitted()[0];
        assert_eq!(tx.message.instructions.len(), 2);
        let programs: Vec<Pubkey> = tx
            .message
            .instructions
            .iter()
            .map(|ix| tx.message.account_keys[ix.program_id_index as usize])
            .collect();
        assert_eq!(programs, vec![spl_associated_token_account::id(), spl_token::id()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deposit_tokens_rejects_zero_amount_locally() {
        let f = fixture();

        let err = f
            .workflow
            .deposit_tokens(&TokenDeposit {
                collection: f.collection,
                token: f.token,
                amount: 0,
                decimals: 9,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Instruction(_)));
        assert_eq!(f.ledger.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deposit_asset_to_escrow() {
        let f = fixture();
        let asset = Pubkey::new_unique();
        let escrow = escrow_address(&ESCROW_PROGRAM_ID, &f.collection).unwrap().address;
        f.ledger.set_account(asset, asset_account(&escrow, &f.collection));

        let record = f.workflow.deposit_asset(&asset, &f.collection).await.unwrap();

        assert_eq!(record.operation, SwapOperation::DepositAsset);
        assert_eq!(record.parties.escrow, escrow);
        assert_eq!(record.token_signature, None);
    }

    fn target(f: &Fixture) -> EscrowTarget {
        EscrowTarget {
            collection: f.collection,
            token: f.token,
            fee_location: f.payer_key(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_escrow_observes_escrow_account() {
        let f = fixture();
        let escrow = escrow_address(&ESCROW_PROGRAM_ID, &f.collection).unwrap().address;
        f.ledger.push_not_found();
        f.ledger.set_account(escrow, Account::default());

        let init = EscrowInit {
            name: "IKIGAI NFT".into(),
            uri: "https://nft.example/collection.json".into(),
            max: 1000,
            min: 1,
            amount: 5_000_000_000,
            fee_amount: 3_000_000_000,
            sol_fee_amount: 0,
            path: 0,
        };
        let record = f.workflow.init_escrow(&target(&f), &init).await.unwrap();

        assert_eq!(record.operation, SwapOperation::InitEscrow);
        assert_eq!(record.observe_attempts, 2);
        assert_eq!(
            &f.ledger.submitted()[0].message.instructions[0].data[..8],
            &anchor_discriminator("init_escrow_v1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_escrow_config_never_reaches_ledger() {
        let f = fixture();
        let init = EscrowInit {
            name: "x".repeat(40),
            uri: "u".into(),
            max: 10,
            min: 1,
            amount: 1,
            fee_amount: 0,
            sol_fee_amount: 0,
            path: 0,
        };

        let err = f.workflow.init_escrow(&target(&f), &init).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::EscrowConfig(EscrowConfigError::InvalidName(40))
        ));

        let err = f
            .workflow
            .update_escrow(&target(&f), &EscrowConfigUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::EscrowConfig(EscrowConfigError::EmptyUpdate)
        ));
        assert_eq!(f.ledger.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_escrow_swaps_fee_location_account() {
        let f = fixture();
        f.ledger.set_default_account(Account::default());
        let new_fee_location = Pubkey::new_unique();

        let update = EscrowConfigUpdate {
            fee_amount: Some(100_000_000),
            fee_location: Some(new_fee_location),
            ..EscrowConfigUpdate::default()
        };
        let record = f.workflow.update_escrow(&target(&f), &update).await.unwrap();

        assert_eq!(record.operation, SwapOperation::UpdateEscrow);
        let tx = &f.ledger.submitted()[0];
        assert!(tx.message.account_keys.contains(&new_fee_location));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mint_for_other_owner_checks_that_owner() {
        let f = fixture();
        let owner_key = Pubkey::new_unique();
        f.serve_assets_owned_by(&owner_key);

        let mut req = f.mint_request(0);
        req.owner = Some(owner_key);
        let record = f.workflow.mint_paid(&req).await.unwrap();

        assert_eq!(record.parties.owner, owner_key);
        assert_eq!(record.observe_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_collection_under_payer_authority() {
        let f = fixture();
        f.ledger
            .set_default_account(collection_account(&f.payer_key(), None));

        let record = f
            .workflow
            .create_collection(&CollectionRequest {
                name: "IKIGAI NFT Collection".into(),
                uri: "https://nft.example/media/collection.json".into(),
                update_authority: None,
            })
            .await
            .unwrap();

        assert_eq!(record.operation, SwapOperation::CreateCollection);
        let tx = &f.ledger.submitted()[0];
        // payer and the new collection both sign
        assert_eq!(tx.signatures.len(), 2);
        assert!(tx.message.account_keys.contains(&record.parties.collection));
        assert_eq!(tx.message.instructions[0].data[0], 1);
        assert_eq!(
            record.parties.escrow,
            escrow_address(&ESCROW_PROGRAM_ID, &record.parties.collection).unwrap().address
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_collection_waits_for_requested_authority() {
        let f = fixture();
        let authority = Pubkey::new_unique();
        f.ledger
            .push_fetch(Ok(Some(collection_account(&f.payer_key(), None))));
        f.ledger.set_default_account(collection_account(&authority, None));

        let record = f
            .workflow
            .create_collection(&CollectionRequest {
                name: "IKIGAI NFT Collection".into(),
                uri: "https://nft.example/media/collection.json".into(),
                update_authority: Some(authority),
            })
            .await
            .unwrap();

        assert_eq!(record.parties.owner, authority);
        assert_eq!(record.observe_attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delegate_collection_to_escrow() {
        let f = fixture();
        let escrow = escrow_address(&ESCROW_PROGRAM_ID, &f.collection).unwrap().address;
        // plugin not visible on the first read
        f.ledger
            .push_fetch(Ok(Some(collection_account(&f.payer_key(), None))));
        f.ledger
            .set_account(f.collection, collection_account(&f.payer_key(), Some(&escrow)));

        let record = f.workflow.delegate_collection(&f.collection).await.unwrap();

        assert_eq!(record.operation, SwapOperation::DelegateCollection);
        assert_eq!(record.observe_attempts, 2);
        let tx = &f.ledger.submitted()[0];
        let ix = &tx.message.instructions[0];
        assert_eq!(tx.message.account_keys[ix.program_id_index as usize], ASSET_PROGRAM_ID);
        assert!(contains(&ix.data, escrow.as_ref()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delegate_collection_times_out_without_plugin() {
        let f = fixture();
        f.ledger
            .set_account(f.collection, collection_account(&f.payer_key(), None));

        let err = f.workflow.delegate_collection(&f.collection).await.unwrap_err();

        assert_eq!(err.kind(), OutcomeKind::ObservabilityTimeout);
        assert_eq!(f.ledger.fetch_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_update_authority_observes_new_authority() {
        let f = fixture();
        let asset = Pubkey::new_unique();
        let new_authority = Pubkey::new_unique();
        f.ledger
            .push_fetch(Ok(Some(asset_account(&f.payer_key(), &f.collection))));
        f.ledger
            .set_account(asset, asset_with_authority(&f.payer_key(), &new_authority));

        let record = f
            .workflow
            .set_update_authority(&asset, &f.collection, &new_authority)
            .await
            .unwrap();

        assert_eq!(record.operation, SwapOperation::SetUpdateAuthority);
        assert_eq!(record.asset_address, Some(asset));
        assert_eq!(record.observe_attempts, 2);
        let data = &f.ledger.submitted()[0].message.instructions[0].data;
        assert_eq!(data[0], 30);
        assert!(contains(data, new_authority.as_ref()));
    }
}
