//! Shared helpers for the integration tests
#![allow(dead_code)]

use std::sync::Arc;

use nutmint::database::memory::MintMemoryDatabase;
use nutmint::dhke::{blind_message, construct_proofs};
use nutmint::lightning::fake::FakeLightning;
use nutmint::mint::MintConfig;
use nutmint::nuts::{BlindSignature, BlindedMessage, Id, Keys, Proofs, SecretKey};
use nutmint::secret::Secret;
use nutmint::{Amount, Mint};

/// A mint wired to an in-memory store and the fake Lightning backend
pub struct TestMint {
    pub mint: Mint,
    pub backend: Arc<FakeLightning>,
    pub db: Arc<MintMemoryDatabase>,
}

pub async fn setup_mint(config: MintConfig) -> TestMint {
    let backend = Arc::new(FakeLightning::new());
    let db = Arc::new(MintMemoryDatabase::new());

    let mint = Mint::new(config, db.clone(), backend.clone())
        .await
        .expect("mint loads");

    TestMint { mint, backend, db }
}

/// Wallet-side state for a batch of blinded messages
pub struct PreMint {
    pub outputs: Vec<BlindedMessage>,
    pub rs: Vec<SecretKey>,
    pub secrets: Vec<Secret>,
}

/// Blind one fresh random secret per power-of-two part of `amount`
pub fn blinded_messages(amount: Amount, keyset_id: Id) -> PreMint {
    let secrets: Vec<Secret> = amount.split().iter().map(|_| Secret::generate()).collect();
    blinded_messages_for_secrets(secrets, amount.split(), keyset_id)
}

/// Blind one fresh random secret per given amount
pub fn blinded_messages_with_amounts(amounts: &[u64], keyset_id: Id) -> PreMint {
    let amounts: Vec<Amount> = amounts.iter().copied().map(Amount::from).collect();
    let secrets: Vec<Secret> = amounts.iter().map(|_| Secret::generate()).collect();
    blinded_messages_for_secrets(secrets, amounts, keyset_id)
}

/// Blind the given secrets, pairing them with `amounts`
pub fn blinded_messages_for_secrets(
    secrets: Vec<Secret>,
    amounts: Vec<Amount>,
    keyset_id: Id,
) -> PreMint {
    let mut outputs = Vec::with_capacity(secrets.len());
    let mut rs = Vec::with_capacity(secrets.len());

    for (secret, amount) in secrets.iter().zip(amounts) {
        let (blinded, r) = blind_message(secret.as_bytes(), None).expect("blinding works");
        outputs.push(BlindedMessage::new(amount, keyset_id, blinded));
        rs.push(r);
    }

    PreMint {
        outputs,
        rs,
        secrets,
    }
}

/// Active keyset public keys as seen by a wallet
pub fn active_keys(mint: &Mint) -> Keys {
    mint.pubkeys().keysets[0].keys.clone()
}

/// Unblind signatures into proofs
pub fn to_proofs(mint: &Mint, signatures: Vec<BlindSignature>, pre_mint: PreMint) -> Proofs {
    construct_proofs(signatures, pre_mint.rs, pre_mint.secrets, &active_keys(mint))
        .expect("unblinding works")
}

/// Run the full happy path to get `amount` worth of proofs
pub async fn mint_proofs(test: &TestMint, amount: Amount) -> Proofs {
    mint_proofs_with_amounts(test, &amount.split().iter().map(|a| a.to_sat()).collect::<Vec<_>>())
        .await
}

/// Run the full happy path to get proofs in the given denominations
pub async fn mint_proofs_with_amounts(test: &TestMint, amounts: &[u64]) -> Proofs {
    let total = Amount::from(amounts.iter().sum::<u64>());

    let quote = test
        .mint
        .request_mint_quote("bolt11", total, "sat")
        .await
        .expect("quote created");

    test.backend.settle_invoice(&quote.payment_hash).await;

    let pre_mint = blinded_messages_with_amounts(amounts, test.mint.active_keyset_id());
    let signatures = test
        .mint
        .mint_tokens("bolt11", &quote.id, &pre_mint.outputs)
        .await
        .expect("mint tokens");

    to_proofs(&test.mint, signatures, pre_mint)
}
