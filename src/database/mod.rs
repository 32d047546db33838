//! Storage backends for the mint

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::mint::MintKeySetInfo;
use crate::nuts::{BlindSignature, Id, MeltQuoteState, MintQuoteState, Proofs, PublicKey};
use crate::types::{MeltQuote, MintQuote};
use crate::Amount;

pub mod memory;

/// Database Error
#[derive(Debug, Error)]
pub enum Error {
    /// A proof in the batch is already in the spent table
    #[error("Proof already spent")]
    AlreadySpent,
    /// A proof in the batch is already in the pending table
    #[error("Proof already pending")]
    AlreadyPending,
    /// Quote id is not present
    #[error("Unknown quote")]
    UnknownQuote,
    /// Keyset id is not present
    #[error("Unknown keyset")]
    UnknownKeyset,
    /// Refused quote state transition
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },
    /// Record violates a unique constraint
    #[error("Duplicate entry")]
    Duplicate,
    /// Driver failure
    #[error("Database error: {0}")]
    Internal(String),
    /// Proof could not be keyed by `Y`
    #[error(transparent)]
    DHKE(#[from] crate::dhke::Error),
}

/// Transactional storage surface the mint core relies on.
///
/// Implementations must uphold three contracts the core's safety depends on:
///
/// * [`add_pending_proofs`](Self::add_pending_proofs) and
///   [`add_spent_proofs`](Self::add_spent_proofs) are unique-`Y` claims over
///   the union of both proof tables. The insert fails with
///   [`Error::AlreadyPending`] or [`Error::AlreadySpent`] when any `Y` is
///   taken, and concurrent claims on the same `Y` admit exactly one winner.
/// * [`update_mint_quote_state`](Self::update_mint_quote_state) and
///   [`update_melt_quote_state`](Self::update_melt_quote_state) are
///   compare-and-set transitions, rejecting moves the quote state machines
///   do not allow (notably `Issued -> *` and `Pending -> Pending`).
/// * [`finalize_pending_proofs`](Self::finalize_pending_proofs) moves a
///   quote's proofs from pending to spent atomically; no observer may see
///   them in neither table.
#[async_trait]
pub trait MintDatabase: std::fmt::Debug + Send + Sync {
    /// Get the stored mint seed
    async fn get_seed(&self) -> Result<Option<Vec<u8>>, Error>;
    /// Persist the mint seed
    async fn save_seed(&self, seed: &[u8]) -> Result<(), Error>;

    /// Add [`MintKeySetInfo`]
    async fn add_keyset_info(&self, info: MintKeySetInfo) -> Result<(), Error>;
    /// Get [`MintKeySetInfo`] by [`Id`]
    async fn get_keyset_info(&self, id: &Id) -> Result<Option<MintKeySetInfo>, Error>;
    /// Get all stored [`MintKeySetInfo`]s
    async fn get_keyset_infos(&self) -> Result<Vec<MintKeySetInfo>, Error>;
    /// Flip a keyset's active flag
    async fn set_keyset_active(&self, id: &Id, active: bool) -> Result<(), Error>;

    /// Add [`MintQuote`]
    async fn add_mint_quote(&self, quote: MintQuote) -> Result<(), Error>;
    /// Get [`MintQuote`] by id
    async fn get_mint_quote(&self, quote_id: &str) -> Result<Option<MintQuote>, Error>;
    /// Get [`MintQuote`] by the payment hash of its invoice
    async fn get_mint_quote_by_payment_hash(
        &self,
        payment_hash: &str,
    ) -> Result<Option<MintQuote>, Error>;
    /// Compare-and-set the state of a mint quote, returning the previous state
    async fn update_mint_quote_state(
        &self,
        quote_id: &str,
        state: MintQuoteState,
    ) -> Result<MintQuoteState, Error>;

    /// Add [`MeltQuote`]
    async fn add_melt_quote(&self, quote: MeltQuote) -> Result<(), Error>;
    /// Get [`MeltQuote`] by id
    async fn get_melt_quote(&self, quote_id: &str) -> Result<Option<MeltQuote>, Error>;
    /// Compare-and-set the state of a melt quote, storing the preimage with
    /// `Paid`. Returns the previous state.
    async fn update_melt_quote_state(
        &self,
        quote_id: &str,
        state: MeltQuoteState,
        preimage: Option<String>,
    ) -> Result<MeltQuoteState, Error>;

    /// Mark proofs spent. This is a unique-`Y` claim.
    async fn add_spent_proofs(&self, proofs: &Proofs) -> Result<(), Error>;
    /// Get spent proofs matching any of `ys`
    async fn get_spent_proofs(&self, ys: &[PublicKey]) -> Result<Proofs, Error>;

    /// Lock proofs to an in-flight melt quote. This is a unique-`Y` claim.
    async fn add_pending_proofs(&self, quote_id: &str, proofs: &Proofs) -> Result<(), Error>;
    /// Get pending proofs matching any of `ys`
    async fn get_pending_proofs(&self, ys: &[PublicKey]) -> Result<Proofs, Error>;
    /// Get the proofs locked to a melt quote
    async fn get_pending_proofs_by_quote(&self, quote_id: &str) -> Result<Proofs, Error>;
    /// Unlock and return the proofs locked to a melt quote
    async fn remove_pending_proofs(&self, quote_id: &str) -> Result<Proofs, Error>;
    /// Atomically move the proofs locked to a melt quote into the spent table
    async fn finalize_pending_proofs(&self, quote_id: &str) -> Result<Proofs, Error>;

    /// Persist blind signatures keyed by their blinded message `B_`
    async fn add_blind_signatures(
        &self,
        blinded_secrets: &[PublicKey],
        signatures: &[BlindSignature],
    ) -> Result<(), Error>;
    /// Get the signature stored for one `B_`
    async fn get_blind_signature(
        &self,
        blinded_secret: &PublicKey,
    ) -> Result<Option<BlindSignature>, Error>;
    /// Get stored signatures for many `B_`s, in request order
    async fn get_blind_signatures(
        &self,
        blinded_secrets: &[PublicKey],
    ) -> Result<Vec<Option<BlindSignature>>, Error>;

    /// Outstanding balance: sats paid into quotes minus sats melted out
    async fn get_balance(&self) -> Result<Amount, Error>;
}

/// Type alias for a shared mint database
pub type DynMintDatabase = Arc<dyn MintDatabase>;
