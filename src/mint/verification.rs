//! Proof validation

use std::collections::HashSet;

use crate::dhke::verify_message;
use crate::nuts::nut11::{self, SigAllTerms};
use crate::nuts::{
    BlindedMessage, Nut10Secret, Proofs, PublicKey, SigFlag,
};
use crate::{Error, Mint};

impl Mint {
    /// Validate a batch of input proofs.
    ///
    /// Rejection reasons are checked in a fixed order, first match wins:
    /// empty batch, pending `Y`, spent `Y`, duplicate `Y` within the batch,
    /// then per proof: unknown keyset, unsupported amount, P2PK witness,
    /// BDHKE signature.
    pub(crate) async fn verify_proofs(
        &self,
        proofs: &Proofs,
        ys: &[PublicKey],
    ) -> Result<(), Error> {
        if proofs.is_empty() {
            return Err(Error::NoProofsProvided);
        }

        let pending = self.localstore().get_pending_proofs(ys).await?;
        if !pending.is_empty() {
            return Err(Error::ProofPending);
        }

        let spent = self.localstore().get_spent_proofs(ys).await?;
        if !spent.is_empty() {
            return Err(Error::ProofAlreadyUsed);
        }

        let unique: HashSet<[u8; 33]> = ys.iter().map(|y| y.to_bytes()).collect();
        if unique.len() != ys.len() {
            return Err(Error::DuplicateProofs);
        }

        let snapshot = self.keyset_snapshot();
        for proof in proofs {
            let keyset = snapshot
                .keysets
                .get(&proof.keyset_id)
                .ok_or(Error::UnknownKeyset)?;

            let key_pair = keyset
                .keys
                .amount_key(proof.amount)
                .ok_or(Error::InvalidProof)?;

            if proof.secret.is_p2pk() {
                proof.verify_p2pk()?;
            }

            verify_message(&key_pair.secret_key, proof.c, proof.secret.as_bytes())
                .map_err(|_| Error::InvalidProof)?;
        }

        Ok(())
    }
}

/// Verify the output side of a SIG_ALL swap.
///
/// Every proof must be P2PK with the SIG_ALL flag and commit to the same
/// normalized `(pubkeys, n_sigs)` terms, and every blinded output must carry
/// a witness meeting the threshold over `SHA256(B_)`.
pub(crate) fn verify_sig_all_outputs(
    proofs: &Proofs,
    outputs: &[BlindedMessage],
) -> Result<(), Error> {
    let first_secret =
        Nut10Secret::try_from(&proofs[0].secret).map_err(|_| Error::InvalidProof)?;
    let terms = SigAllTerms::try_from(&first_secret)?;

    for proof in proofs {
        let secret = Nut10Secret::try_from(&proof.secret).map_err(|_| Error::InvalidProof)?;
        let current = SigAllTerms::try_from(&secret)?;

        if current.sig_flag != SigFlag::SigAll {
            return Err(nut11::Error::AllFlagsMustBeSigAll.into());
        }
        if current.pubkeys != terms.pubkeys {
            return Err(nut11::Error::SigAllKeysMustBeEqual.into());
        }
        if current.num_sigs != terms.num_sigs {
            return Err(nut11::Error::NSigsMustBeEqual.into());
        }
    }

    let pubkeys: Vec<PublicKey> = terms.pubkeys.iter().copied().collect();
    for output in outputs {
        output.verify_p2pk(&pubkeys, terms.num_sigs)?;
    }

    Ok(())
}
