//! End-to-end mint flows against the in-memory store and fake backend

mod common;

use common::*;
use nutmint::database::MintDatabase;
use nutmint::lightning::fake::{SendOutcome, StatusOutcome};
use nutmint::lightning::PaymentStatus;
use nutmint::mint::{MintConfig, MintLimits};
use nutmint::nuts::{MeltQuoteState, MintQuoteState, ProofsMethods, State};
use nutmint::{Amount, Error, Mint};

#[tokio::test]
async fn test_mint_happy_path() {
    let test = setup_mint(MintConfig::default()).await;

    let quote = test
        .mint
        .request_mint_quote("bolt11", Amount::from(10_000), "sat")
        .await
        .unwrap();
    assert_eq!(quote.state, MintQuoteState::Unpaid);

    // Not paid yet
    let state = test
        .mint
        .get_mint_quote_state("bolt11", &quote.id)
        .await
        .unwrap();
    assert_eq!(state.state, MintQuoteState::Unpaid);

    let pre_mint = blinded_messages(Amount::from(10_000), test.mint.active_keyset_id());
    assert!(matches!(
        test.mint
            .mint_tokens("bolt11", &quote.id, &pre_mint.outputs)
            .await,
        Err(Error::MintQuoteNotPaid)
    ));

    // Wallet pays the invoice
    test.backend.settle_invoice(&quote.payment_hash).await;
    let state = test
        .mint
        .get_mint_quote_state("bolt11", &quote.id)
        .await
        .unwrap();
    assert_eq!(state.state, MintQuoteState::Paid);

    let signatures = test
        .mint
        .mint_tokens("bolt11", &quote.id, &pre_mint.outputs)
        .await
        .unwrap();

    let issued = Amount::try_sum(signatures.iter().map(|s| s.amount)).unwrap();
    assert_eq!(issued, Amount::from(10_000));

    // Signatures come back in input order and carry a valid DLEQ
    let keys = active_keys(&test.mint);
    for (signature, output) in signatures.iter().zip(&pre_mint.outputs) {
        assert_eq!(signature.amount, output.amount);
        let mint_key = keys.amount_key(signature.amount).unwrap();
        signature
            .verify_dleq(&mint_key, &output.blinded_secret)
            .unwrap();
    }

    let state = test
        .mint
        .get_mint_quote_state("bolt11", &quote.id)
        .await
        .unwrap();
    assert_eq!(state.state, MintQuoteState::Issued);

    // The unblinded proofs pass a swap, i.e. they verify
    let proofs = to_proofs(&test.mint, signatures, pre_mint);
    let next = blinded_messages(Amount::from(10_000), test.mint.active_keyset_id());
    test.mint.swap(proofs, next.outputs).await.unwrap();
}

#[tokio::test]
async fn test_double_mint_rejected() {
    let test = setup_mint(MintConfig::default()).await;

    let quote = test
        .mint
        .request_mint_quote("bolt11", Amount::from(1_000), "sat")
        .await
        .unwrap();
    test.backend.settle_invoice(&quote.payment_hash).await;

    let pre_mint = blinded_messages(Amount::from(1_000), test.mint.active_keyset_id());
    test.mint
        .mint_tokens("bolt11", &quote.id, &pre_mint.outputs)
        .await
        .unwrap();

    // Same quote, fresh outputs
    let again = blinded_messages(Amount::from(1_000), test.mint.active_keyset_id());
    assert!(matches!(
        test.mint
            .mint_tokens("bolt11", &quote.id, &again.outputs)
            .await,
        Err(Error::MintQuoteAlreadyIssued)
    ));
}

#[tokio::test]
async fn test_mint_outputs_over_quote_amount() {
    let test = setup_mint(MintConfig::default()).await;

    let quote = test
        .mint
        .request_mint_quote("bolt11", Amount::from(100), "sat")
        .await
        .unwrap();
    test.backend.settle_invoice(&quote.payment_hash).await;

    let pre_mint = blinded_messages(Amount::from(101), test.mint.active_keyset_id());
    assert!(matches!(
        test.mint
            .mint_tokens("bolt11", &quote.id, &pre_mint.outputs)
            .await,
        Err(Error::OutputsOverQuoteAmount)
    ));
}

#[tokio::test]
async fn test_blinded_message_replay_rejected() {
    let test = setup_mint(MintConfig::default()).await;

    let quote = test
        .mint
        .request_mint_quote("bolt11", Amount::from(64), "sat")
        .await
        .unwrap();
    test.backend.settle_invoice(&quote.payment_hash).await;

    let pre_mint = blinded_messages(Amount::from(64), test.mint.active_keyset_id());
    test.mint
        .mint_tokens("bolt11", &quote.id, &pre_mint.outputs)
        .await
        .unwrap();

    // The same B_ presented on a new quote is refused
    let quote2 = test
        .mint
        .request_mint_quote("bolt11", Amount::from(64), "sat")
        .await
        .unwrap();
    test.backend.settle_invoice(&quote2.payment_hash).await;
    assert!(matches!(
        test.mint
            .mint_tokens("bolt11", &quote2.id, &pre_mint.outputs)
            .await,
        Err(Error::BlindedMessageAlreadySigned)
    ));
}

#[tokio::test]
async fn test_swap_with_fees() {
    let config = MintConfig {
        input_fee_ppk: 100,
        ..Default::default()
    };
    let test = setup_mint(config).await;

    // 5000 sats over 8 proofs, fee = ceil(8 * 100 / 1000) = 1
    let amounts = [2048, 1024, 1024, 512, 256, 64, 64, 8];
    let proofs = mint_proofs_with_amounts(&test, &amounts).await;
    assert_eq!(proofs.total_amount().unwrap(), Amount::from(5_000));

    let outputs = blinded_messages(Amount::from(4_999), test.mint.active_keyset_id());
    let signatures = test.mint.swap(proofs, outputs.outputs).await.unwrap();
    assert_eq!(
        Amount::try_sum(signatures.iter().map(|s| s.amount)).unwrap(),
        Amount::from(4_999)
    );

    // A second batch cannot swap for its full value
    let proofs = mint_proofs_with_amounts(&test, &amounts).await;
    let outputs = blinded_messages(Amount::from(5_000), test.mint.active_keyset_id());
    assert!(matches!(
        test.mint.swap(proofs, outputs.outputs).await,
        Err(Error::InsufficientProofsAmount)
    ));
}

#[tokio::test]
async fn test_swap_double_spend_rejected() {
    let test = setup_mint(MintConfig::default()).await;

    let proofs = mint_proofs(&test, Amount::from(100)).await;

    let outputs = blinded_messages(Amount::from(100), test.mint.active_keyset_id());
    test.mint
        .swap(proofs.clone(), outputs.outputs)
        .await
        .unwrap();

    let outputs = blinded_messages(Amount::from(100), test.mint.active_keyset_id());
    assert!(matches!(
        test.mint.swap(proofs, outputs.outputs).await,
        Err(Error::ProofAlreadyUsed)
    ));
}

#[tokio::test]
async fn test_swap_duplicate_proofs_rejected() {
    let test = setup_mint(MintConfig::default()).await;

    let proofs = mint_proofs_with_amounts(&test, &[8, 8]).await;
    let doubled = vec![proofs[0].clone(), proofs[0].clone()];

    let outputs = blinded_messages(Amount::from(16), test.mint.active_keyset_id());
    assert!(matches!(
        test.mint.swap(doubled, outputs.outputs).await,
        Err(Error::DuplicateProofs)
    ));
}

#[tokio::test]
async fn test_melt_happy_path() {
    let test = setup_mint(MintConfig::default()).await;

    let proofs = mint_proofs(&test, Amount::from(6_500)).await;

    let payable = test.backend.add_payable_invoice(Amount::from(6_000)).await;
    let quote = test
        .mint
        .request_melt_quote("bolt11", &payable.payment_request, "sat")
        .await
        .unwrap();
    assert_eq!(quote.amount, Amount::from(6_000));
    assert_eq!(quote.state, MeltQuoteState::Unpaid);

    let ys = proofs.ys().unwrap();
    let melted = test
        .mint
        .melt_tokens("bolt11", &quote.id, proofs)
        .await
        .unwrap();

    assert_eq!(melted.state, MeltQuoteState::Paid);
    assert_eq!(melted.preimage, Some(payable.preimage));

    // Inputs are burned
    let states = test.mint.check_proofs_state(&ys).await.unwrap();
    assert!(states.iter().all(|s| s.state == State::Spent));

    // 6500 minted, 6000 melted
    let balance = test.db.get_balance().await.unwrap();
    assert_eq!(balance, Amount::from(500));
}

#[tokio::test]
async fn test_melt_insufficient_proofs() {
    let test = setup_mint(MintConfig::default()).await;

    let proofs = mint_proofs(&test, Amount::from(6_000)).await;

    // fee reserve of 60 sats makes 6000 of proofs insufficient
    let payable = test.backend.add_payable_invoice(Amount::from(6_000)).await;
    let quote = test
        .mint
        .request_melt_quote("bolt11", &payable.payment_request, "sat")
        .await
        .unwrap();
    assert_eq!(quote.fee_reserve, Amount::from(60));

    assert!(matches!(
        test.mint.melt_tokens("bolt11", &quote.id, proofs).await,
        Err(Error::InsufficientProofsAmount)
    ));
}

#[tokio::test]
async fn test_melt_payment_error_unlocks_proofs() {
    let test = setup_mint(MintConfig::default()).await;

    let proofs = mint_proofs(&test, Amount::from(2_000)).await;

    let payable = test.backend.add_payable_invoice(Amount::from(1_000)).await;
    let quote = test
        .mint
        .request_melt_quote("bolt11", &payable.payment_request, "sat")
        .await
        .unwrap();

    test.backend.script_send_outcome(SendOutcome::PaymentError).await;

    let melted = test
        .mint
        .melt_tokens("bolt11", &quote.id, proofs.clone())
        .await
        .unwrap();
    assert_eq!(melted.state, MeltQuoteState::Unpaid);
    assert_eq!(melted.preimage, None);

    // The proofs are free again and the melt can be retried
    let melted = test
        .mint
        .melt_tokens("bolt11", &quote.id, proofs)
        .await
        .unwrap();
    assert_eq!(melted.state, MeltQuoteState::Paid);
}

#[tokio::test]
async fn test_melt_ambiguous_send_converges_via_probe() {
    let test = setup_mint(MintConfig::default()).await;

    let proofs = mint_proofs(&test, Amount::from(2_000)).await;
    let ys = proofs.ys().unwrap();

    let payable = test.backend.add_payable_invoice(Amount::from(1_000)).await;
    let quote = test
        .mint
        .request_melt_quote("bolt11", &payable.payment_request, "sat")
        .await
        .unwrap();

    // The send's outcome is unknown, the immediate probe says in flight
    test.backend
        .script_send_outcome(SendOutcome::ConnectionError)
        .await;
    test.backend
        .script_status_outcome(StatusOutcome::Status(PaymentStatus::Pending))
        .await;

    let melted = test
        .mint
        .melt_tokens("bolt11", &quote.id, proofs.clone())
        .await
        .unwrap();
    assert_eq!(melted.state, MeltQuoteState::Pending);

    // While pending, the proofs are locked and a re-melt is refused
    assert!(matches!(
        test.mint
            .melt_tokens("bolt11", &quote.id, proofs.clone())
            .await,
        Err(Error::MeltQuotePending)
    ));

    // The payment turns out to have succeeded
    test.backend
        .script_status_outcome(StatusOutcome::Status(PaymentStatus::Succeeded))
        .await;
    let state = test
        .mint
        .get_melt_quote_state("bolt11", &quote.id)
        .await
        .unwrap();
    assert_eq!(state.state, MeltQuoteState::Paid);
    assert_eq!(state.preimage, Some(payable.preimage));

    let states = test.mint.check_proofs_state(&ys).await.unwrap();
    assert!(states.iter().all(|s| s.state == State::Spent));
}

#[tokio::test]
async fn test_melt_failed_send_and_probe_unlocks() {
    let test = setup_mint(MintConfig::default()).await;

    let proofs = mint_proofs(&test, Amount::from(2_000)).await;
    let ys = proofs.ys().unwrap();

    let payable = test.backend.add_payable_invoice(Amount::from(1_000)).await;
    let quote = test
        .mint
        .request_melt_quote("bolt11", &payable.payment_request, "sat")
        .await
        .unwrap();

    test.backend
        .script_send_outcome(SendOutcome::Status(PaymentStatus::Failed))
        .await;
    test.backend
        .script_status_outcome(StatusOutcome::PaymentFailed)
        .await;

    let melted = test
        .mint
        .melt_tokens("bolt11", &quote.id, proofs)
        .await
        .unwrap();
    assert_eq!(melted.state, MeltQuoteState::Unpaid);

    let states = test.mint.check_proofs_state(&ys).await.unwrap();
    assert!(states.iter().all(|s| s.state == State::Unspent));
}

#[tokio::test]
async fn test_internal_settlement() {
    let test = setup_mint(MintConfig::default()).await;

    let proofs = mint_proofs(&test, Amount::from(5_000)).await;
    let sends_before = test.backend.send_payment_calls();

    // Mint quote A, paid externally
    let mint_quote = test
        .mint
        .request_mint_quote("bolt11", Amount::from(5_000), "sat")
        .await
        .unwrap();
    test.backend.settle_invoice(&mint_quote.payment_hash).await;

    // Melt quote B for the very same invoice: priced with zero fee reserve
    let melt_quote = test
        .mint
        .request_melt_quote("bolt11", &mint_quote.payment_request, "sat")
        .await
        .unwrap();
    assert_eq!(melt_quote.fee_reserve, Amount::ZERO);
    assert_eq!(melt_quote.payment_hash, mint_quote.payment_hash);

    let melted = test
        .mint
        .melt_tokens("bolt11", &melt_quote.id, proofs)
        .await
        .unwrap();
    assert_eq!(melted.state, MeltQuoteState::Paid);
    assert!(melted.preimage.is_some());

    // No payment ever went over the network
    assert_eq!(test.backend.send_payment_calls(), sends_before);

    // Both quotes end up paid
    let mint_state = test
        .mint
        .get_mint_quote_state("bolt11", &mint_quote.id)
        .await
        .unwrap();
    assert_eq!(mint_state.state, MintQuoteState::Paid);
}

#[tokio::test]
async fn test_restore_is_idempotent() {
    let test = setup_mint(MintConfig::default()).await;

    let quote = test
        .mint
        .request_mint_quote("bolt11", Amount::from(300), "sat")
        .await
        .unwrap();
    test.backend.settle_invoice(&quote.payment_hash).await;

    let pre_mint = blinded_messages(Amount::from(300), test.mint.active_keyset_id());
    let signatures = test
        .mint
        .mint_tokens("bolt11", &quote.id, &pre_mint.outputs)
        .await
        .unwrap();

    // Unknown outputs are skipped, never invented
    let unknown = blinded_messages(Amount::from(300), test.mint.active_keyset_id());
    let mut request = pre_mint.outputs.clone();
    request.extend(unknown.outputs);

    let restored = test.mint.restore(request.clone()).await.unwrap();
    assert_eq!(restored.outputs, pre_mint.outputs);
    assert_eq!(restored.signatures, signatures);

    let restored_again = test.mint.restore(request).await.unwrap();
    assert_eq!(restored_again, restored);
}

#[tokio::test]
async fn test_proof_state_query() {
    let test = setup_mint(MintConfig::default()).await;

    let proofs = mint_proofs_with_amounts(&test, &[16, 16]).await;
    let ys = proofs.ys().unwrap();

    let states = test.mint.check_proofs_state(&ys).await.unwrap();
    assert!(states.iter().all(|s| s.state == State::Unspent));
    assert_eq!(states[0].y, ys[0]);

    let outputs = blinded_messages(Amount::from(32), test.mint.active_keyset_id());
    test.mint.swap(proofs, outputs.outputs).await.unwrap();

    let states = test.mint.check_proofs_state(&ys).await.unwrap();
    assert!(states.iter().all(|s| s.state == State::Spent));
}

#[tokio::test]
async fn test_method_and_unit_validation() {
    let test = setup_mint(MintConfig::default()).await;

    assert!(matches!(
        test.mint
            .request_mint_quote("bolt12", Amount::from(1), "sat")
            .await,
        Err(Error::PaymentMethodNotSupported)
    ));
    assert!(matches!(
        test.mint
            .request_mint_quote("bolt11", Amount::from(1), "usd")
            .await,
        Err(Error::UnitNotSupported)
    ));
    assert!(matches!(
        test.mint.get_mint_quote_state("bolt11", "no-such-id").await,
        Err(Error::UnknownQuote)
    ));
    assert!(matches!(
        test.mint.get_melt_quote_state("bolt11", "no-such-id").await,
        Err(Error::UnknownQuote)
    ));
}

#[tokio::test]
async fn test_minting_limits() {
    let config = MintConfig {
        limits: MintLimits {
            mint_max_amount: Amount::from(1_000),
            max_balance: Amount::from(1_500),
            melt_max_amount: Amount::from(500),
        },
        ..Default::default()
    };
    let test = setup_mint(config).await;

    assert!(matches!(
        test.mint
            .request_mint_quote("bolt11", Amount::from(1_001), "sat")
            .await,
        Err(Error::MintAmountExceeded)
    ));

    // Fill the balance close to the cap, then overflow it
    let quote = test
        .mint
        .request_mint_quote("bolt11", Amount::from(1_000), "sat")
        .await
        .unwrap();
    test.backend.settle_invoice(&quote.payment_hash).await;
    test.mint
        .get_mint_quote_state("bolt11", &quote.id)
        .await
        .unwrap();

    assert!(matches!(
        test.mint
            .request_mint_quote("bolt11", Amount::from(600), "sat")
            .await,
        Err(Error::MintingDisabled)
    ));

    let payable = test.backend.add_payable_invoice(Amount::from(501)).await;
    assert!(matches!(
        test.mint
            .request_melt_quote("bolt11", &payable.payment_request, "sat")
            .await,
        Err(Error::MeltAmountExceeded)
    ));
}

#[tokio::test]
async fn test_keyset_rotation() {
    let backend = std::sync::Arc::new(nutmint::lightning::fake::FakeLightning::new());
    let db = std::sync::Arc::new(nutmint::database::memory::MintMemoryDatabase::new());

    let mint = Mint::new(MintConfig::default(), db.clone(), backend.clone())
        .await
        .unwrap();
    let old_keyset_id = mint.active_keyset_id();

    let test = TestMint {
        mint,
        backend: backend.clone(),
        db: db.clone(),
    };
    let proofs = mint_proofs(&test, Amount::from(100)).await;
    let old_outputs = blinded_messages(Amount::from(100), old_keyset_id);
    drop(test);

    // Reload with a rotated derivation path index
    let config = MintConfig {
        derivation_path_index: 1,
        ..Default::default()
    };
    let mint = Mint::new(config, db, backend).await.unwrap();
    let new_keyset_id = mint.active_keyset_id();
    assert_ne!(old_keyset_id, new_keyset_id);

    // Both keysets are listed, only the new one is active
    let keysets = mint.keysets().keysets;
    assert_eq!(keysets.len(), 2);
    assert!(keysets.iter().any(|k| k.id == new_keyset_id && k.active));
    assert!(keysets.iter().any(|k| k.id == old_keyset_id && !k.active));

    // Proofs from the old keyset still verify and can be swapped into the
    // new keyset, but new outputs on the old keyset are refused
    assert!(matches!(
        mint.swap(proofs.clone(), old_outputs.outputs).await,
        Err(Error::InactiveKeyset)
    ));

    let outputs = blinded_messages(Amount::from(100), new_keyset_id);
    mint.swap(proofs, outputs.outputs).await.unwrap();
}
