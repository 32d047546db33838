//! Swap processing

use tracing::instrument;

use super::verification::verify_sig_all_outputs;
use super::Mint;
use crate::database;
use crate::nuts::nut11::proofs_sig_all;
use crate::nuts::{BlindSignature, BlindedMessage, Proofs, ProofsMethods, PublicKey};
use crate::{Amount, Error};

impl Mint {
    /// Process a swap: validate the input proofs, check amount conservation
    /// modulo fees, blind-sign the outputs and invalidate the inputs.
    ///
    /// The inputs are claimed as spent *before* the outputs are signed, so
    /// two racing swaps over the same proofs serialize on the claim and the
    /// loser is rejected before any signature exists. The outputs are fully
    /// validated as signable beforehand, which makes the signing step
    /// infallible short of storage errors.
    #[instrument(skip_all)]
    pub async fn swap(
        &self,
        proofs: Proofs,
        outputs: Vec<BlindedMessage>,
    ) -> Result<Vec<BlindSignature>, Error> {
        let ys = proofs.ys().map_err(|_| Error::InvalidProof)?;

        let proofs_amount = proofs.total_amount().map_err(|_| Error::InvalidProof)?;
        let outputs_amount = Amount::try_sum(outputs.iter().map(|o| o.amount))
            .map_err(|_| Error::InvalidBlindedMessageAmount)?;

        self.verify_proofs(&proofs, &ys).await?;

        let fees = self.transaction_fees(&proofs)?;
        if proofs_amount
            .checked_sub(fees)
            .map_or(true, |net| net < outputs_amount)
        {
            return Err(Error::InsufficientProofsAmount);
        }

        // Refuse any B_ that has been signed before
        let blinded_secrets: Vec<PublicKey> =
            outputs.iter().map(|o| o.blinded_secret).collect();
        if self
            .localstore()
            .get_blind_signatures(&blinded_secrets)
            .await?
            .iter()
            .flatten()
            .next()
            .is_some()
        {
            return Err(Error::BlindedMessageAlreadySigned);
        }

        // SIG_ALL inputs also commit to the outputs
        if proofs_sig_all(&proofs) {
            verify_sig_all_outputs(&proofs, &outputs)?;
        }

        self.verify_outputs_signable(&outputs)?;

        // Claim the inputs; the unique-Y insert admits exactly one spender
        self.localstore()
            .add_spent_proofs(&proofs)
            .await
            .map_err(|err| match err {
                database::Error::AlreadySpent => Error::ProofAlreadyUsed,
                database::Error::AlreadyPending => Error::ProofPending,
                err => Error::from(err),
            })?;

        let signatures = self.sign_blinded_messages(&outputs).await?;

        tracing::debug!(
            "Swapped {} sat over {} inputs into {} outputs",
            proofs_amount,
            proofs.len(),
            signatures.len()
        );

        Ok(signatures)
    }
}
