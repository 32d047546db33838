//! Proof-state query

use std::collections::HashSet;

use tracing::instrument;

use super::Mint;
use crate::nuts::{ProofState, PublicKey, State};
use crate::Error;

impl Mint {
    /// Report the state of each `Y`, in request order.
    ///
    /// Only `Unspent` and `Spent` are exposed; proofs locked to an
    /// in-flight melt read as `Unspent` until the melt settles.
    #[instrument(skip_all)]
    pub async fn check_proofs_state(
        &self,
        ys: &[PublicKey],
    ) -> Result<Vec<ProofState>, Error> {
        let spent = self.localstore().get_spent_proofs(ys).await?;

        let spent_ys: HashSet<[u8; 33]> = spent
            .iter()
            .map(|proof| proof.y().map(|y| y.to_bytes()))
            .collect::<Result<_, _>>()
            .map_err(|_| Error::InvalidProof)?;

        Ok(ys
            .iter()
            .map(|y| ProofState {
                y: *y,
                state: if spent_ys.contains(&y.to_bytes()) {
                    State::Spent
                } else {
                    State::Unspent
                },
            })
            .collect())
    }
}
