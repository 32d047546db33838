//! In-memory mint storage

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::{Error, MintDatabase};
use crate::mint::MintKeySetInfo;
use crate::nuts::{BlindSignature, Id, MeltQuoteState, MintQuoteState, Proof, Proofs, PublicKey};
use crate::types::{MeltQuote, MintQuote};
use crate::Amount;

/// In-memory implementation of [`MintDatabase`].
///
/// Proof tables are keyed by the 33 compressed bytes of `Y`. A single lock
/// is taken over both proof tables so claims and the pending-to-spent move
/// are atomic with respect to each other.
#[derive(Debug, Clone, Default)]
pub struct MintMemoryDatabase {
    seed: Arc<RwLock<Option<Vec<u8>>>>,
    keysets: Arc<RwLock<HashMap<Id, MintKeySetInfo>>>,
    mint_quotes: Arc<RwLock<HashMap<String, MintQuote>>>,
    melt_quotes: Arc<RwLock<HashMap<String, MeltQuote>>>,
    proofs: Arc<Mutex<ProofTables>>,
    blind_signatures: Arc<RwLock<HashMap<[u8; 33], BlindSignature>>>,
}

#[derive(Debug, Default)]
struct ProofTables {
    /// `Y` -> (quote id, proof)
    pending: HashMap<[u8; 33], (String, Proof)>,
    /// `Y` -> proof
    spent: HashMap<[u8; 33], Proof>,
}

impl ProofTables {
    fn check_unclaimed(&self, ys: &[[u8; 33]]) -> Result<(), Error> {
        for y in ys {
            if self.spent.contains_key(y) {
                return Err(Error::AlreadySpent);
            }
            if self.pending.contains_key(y) {
                return Err(Error::AlreadyPending);
            }
        }
        Ok(())
    }
}

impl MintMemoryDatabase {
    /// Create an empty [`MintMemoryDatabase`]
    pub fn new() -> Self {
        Self::default()
    }
}

fn proof_ys(proofs: &Proofs) -> Result<Vec<[u8; 33]>, Error> {
    proofs
        .iter()
        .map(|p| {
            crate::dhke::hash_to_curve(p.secret.as_bytes())
                .map(|y| y.to_bytes())
                .map_err(Error::from)
        })
        .collect()
}

#[async_trait]
impl MintDatabase for MintMemoryDatabase {
    async fn get_seed(&self) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.seed.read().await.clone())
    }

    async fn save_seed(&self, seed: &[u8]) -> Result<(), Error> {
        *self.seed.write().await = Some(seed.to_vec());
        Ok(())
    }

    async fn add_keyset_info(&self, info: MintKeySetInfo) -> Result<(), Error> {
        self.keysets.write().await.insert(info.id, info);
        Ok(())
    }

    async fn get_keyset_info(&self, id: &Id) -> Result<Option<MintKeySetInfo>, Error> {
        Ok(self.keysets.read().await.get(id).cloned())
    }

    async fn get_keyset_infos(&self) -> Result<Vec<MintKeySetInfo>, Error> {
        Ok(self.keysets.read().await.values().cloned().collect())
    }

    async fn set_keyset_active(&self, id: &Id, active: bool) -> Result<(), Error> {
        let mut keysets = self.keysets.write().await;
        let info = keysets.get_mut(id).ok_or(Error::UnknownKeyset)?;
        info.active = active;
        Ok(())
    }

    async fn add_mint_quote(&self, quote: MintQuote) -> Result<(), Error> {
        self.mint_quotes
            .write()
            .await
            .insert(quote.id.clone(), quote);
        Ok(())
    }

    async fn get_mint_quote(&self, quote_id: &str) -> Result<Option<MintQuote>, Error> {
        Ok(self.mint_quotes.read().await.get(quote_id).cloned())
    }

    async fn get_mint_quote_by_payment_hash(
        &self,
        payment_hash: &str,
    ) -> Result<Option<MintQuote>, Error> {
        Ok(self
            .mint_quotes
            .read()
            .await
            .values()
            .find(|q| q.payment_hash == payment_hash)
            .cloned())
    }

    async fn update_mint_quote_state(
        &self,
        quote_id: &str,
        state: MintQuoteState,
    ) -> Result<MintQuoteState, Error> {
        let mut quotes = self.mint_quotes.write().await;
        let quote = quotes.get_mut(quote_id).ok_or(Error::UnknownQuote)?;

        let allowed = match (quote.state, state) {
            (MintQuoteState::Unpaid, MintQuoteState::Paid) => true,
            (MintQuoteState::Unpaid, MintQuoteState::Issued) => true,
            (MintQuoteState::Paid, MintQuoteState::Issued) => true,
            _ => false,
        };

        if !allowed {
            return Err(Error::InvalidStateTransition {
                from: quote.state.to_string(),
                to: state.to_string(),
            });
        }

        let previous = quote.state;
        quote.state = state;
        Ok(previous)
    }

    async fn add_melt_quote(&self, quote: MeltQuote) -> Result<(), Error> {
        self.melt_quotes
            .write()
            .await
            .insert(quote.id.clone(), quote);
        Ok(())
    }

    async fn get_melt_quote(&self, quote_id: &str) -> Result<Option<MeltQuote>, Error> {
        Ok(self.melt_quotes.read().await.get(quote_id).cloned())
    }

    async fn update_melt_quote_state(
        &self,
        quote_id: &str,
        state: MeltQuoteState,
        preimage: Option<String>,
    ) -> Result<MeltQuoteState, Error> {
        let mut quotes = self.melt_quotes.write().await;
        let quote = quotes.get_mut(quote_id).ok_or(Error::UnknownQuote)?;

        let allowed = match (quote.state, state) {
            (MeltQuoteState::Unpaid, MeltQuoteState::Pending) => true,
            (MeltQuoteState::Pending, MeltQuoteState::Unpaid) => true,
            (MeltQuoteState::Pending, MeltQuoteState::Paid) => true,
            _ => false,
        };

        if !allowed {
            return Err(Error::InvalidStateTransition {
                from: quote.state.to_string(),
                to: state.to_string(),
            });
        }

        let previous = quote.state;
        quote.state = state;
        quote.preimage = preimage;
        Ok(previous)
    }

    async fn add_spent_proofs(&self, proofs: &Proofs) -> Result<(), Error> {
        let ys = proof_ys(proofs)?;

        let mut tables = self.proofs.lock().await;
        tables.check_unclaimed(&ys)?;

        for (y, proof) in ys.into_iter().zip(proofs.iter()) {
            tables.spent.insert(y, proof.clone());
        }
        Ok(())
    }

    async fn get_spent_proofs(&self, ys: &[PublicKey]) -> Result<Proofs, Error> {
        let tables = self.proofs.lock().await;
        Ok(ys
            .iter()
            .filter_map(|y| tables.spent.get(&y.to_bytes()).cloned())
            .collect())
    }

    async fn add_pending_proofs(&self, quote_id: &str, proofs: &Proofs) -> Result<(), Error> {
        let ys = proof_ys(proofs)?;

        let mut tables = self.proofs.lock().await;
        tables.check_unclaimed(&ys)?;

        for (y, proof) in ys.into_iter().zip(proofs.iter()) {
            tables
                .pending
                .insert(y, (quote_id.to_string(), proof.clone()));
        }
        Ok(())
    }

    async fn get_pending_proofs(&self, ys: &[PublicKey]) -> Result<Proofs, Error> {
        let tables = self.proofs.lock().await;
        Ok(ys
            .iter()
            .filter_map(|y| tables.pending.get(&y.to_bytes()).map(|(_, p)| p.clone()))
            .collect())
    }

    async fn get_pending_proofs_by_quote(&self, quote_id: &str) -> Result<Proofs, Error> {
        let tables = self.proofs.lock().await;
        Ok(tables
            .pending
            .values()
            .filter(|(quote, _)| quote == quote_id)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn remove_pending_proofs(&self, quote_id: &str) -> Result<Proofs, Error> {
        let mut tables = self.proofs.lock().await;

        let ys: Vec<[u8; 33]> = tables
            .pending
            .iter()
            .filter(|(_, (quote, _))| quote == quote_id)
            .map(|(y, _)| *y)
            .collect();

        Ok(ys
            .into_iter()
            .filter_map(|y| tables.pending.remove(&y).map(|(_, p)| p))
            .collect())
    }

    async fn finalize_pending_proofs(&self, quote_id: &str) -> Result<Proofs, Error> {
        let mut tables = self.proofs.lock().await;

        let ys: Vec<[u8; 33]> = tables
            .pending
            .iter()
            .filter(|(_, (quote, _))| quote == quote_id)
            .map(|(y, _)| *y)
            .collect();

        // Single lock held over both tables, the move cannot be observed
        // half done
        let mut proofs = Vec::with_capacity(ys.len());
        for y in ys {
            if let Some((_, proof)) = tables.pending.remove(&y) {
                tables.spent.insert(y, proof.clone());
                proofs.push(proof);
            }
        }

        Ok(proofs)
    }

    async fn add_blind_signatures(
        &self,
        blinded_secrets: &[PublicKey],
        signatures: &[BlindSignature],
    ) -> Result<(), Error> {
        let mut stored = self.blind_signatures.write().await;

        for b in blinded_secrets {
            if stored.contains_key(&b.to_bytes()) {
                return Err(Error::Duplicate);
            }
        }

        for (b, signature) in blinded_secrets.iter().zip(signatures.iter()) {
            stored.insert(b.to_bytes(), signature.clone());
        }
        Ok(())
    }

    async fn get_blind_signature(
        &self,
        blinded_secret: &PublicKey,
    ) -> Result<Option<BlindSignature>, Error> {
        Ok(self
            .blind_signatures
            .read()
            .await
            .get(&blinded_secret.to_bytes())
            .cloned())
    }

    async fn get_blind_signatures(
        &self,
        blinded_secrets: &[PublicKey],
    ) -> Result<Vec<Option<BlindSignature>>, Error> {
        let stored = self.blind_signatures.read().await;

        Ok(blinded_secrets
            .iter()
            .map(|b| stored.get(&b.to_bytes()).cloned())
            .collect())
    }

    async fn get_balance(&self) -> Result<Amount, Error> {
        let minted = {
            let quotes = self.mint_quotes.read().await;
            Amount::try_sum(
                quotes
                    .values()
                    .filter(|q| q.state.is_paid())
                    .map(|q| q.amount),
            )
            .map_err(|e| Error::Internal(e.to_string()))?
        };

        let melted = {
            let quotes = self.melt_quotes.read().await;
            Amount::try_sum(
                quotes
                    .values()
                    .filter(|q| q.state == MeltQuoteState::Paid)
                    .map(|q| q.amount),
            )
            .map_err(|e| Error::Internal(e.to_string()))?
        };

        Ok(minted.checked_sub(melted).unwrap_or(Amount::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::nuts::SecretKey;
    use crate::secret::Secret;

    fn proof() -> Proof {
        Proof::new(
            Amount::from(2),
            Id::from_str("009a1f293253e41e").unwrap(),
            Secret::generate(),
            SecretKey::generate().public_key(),
        )
    }

    #[tokio::test]
    async fn test_pending_claim_is_exclusive() {
        let db = MintMemoryDatabase::new();
        let proofs = vec![proof()];

        db.add_pending_proofs("quote-a", &proofs).await.unwrap();

        assert!(matches!(
            db.add_pending_proofs("quote-b", &proofs).await,
            Err(Error::AlreadyPending)
        ));
        assert!(matches!(
            db.add_spent_proofs(&proofs).await,
            Err(Error::AlreadyPending)
        ));
    }

    #[tokio::test]
    async fn test_finalize_moves_pending_to_spent() {
        let db = MintMemoryDatabase::new();
        let proofs = vec![proof(), proof()];
        let ys: Vec<PublicKey> = proofs.iter().map(|p| p.y().unwrap()).collect();

        db.add_pending_proofs("quote-a", &proofs).await.unwrap();
        let finalized = db.finalize_pending_proofs("quote-a").await.unwrap();

        assert_eq!(finalized.len(), 2);
        assert!(db.get_pending_proofs(&ys).await.unwrap().is_empty());
        assert_eq!(db.get_spent_proofs(&ys).await.unwrap().len(), 2);

        // Once spent, the claim can never be retaken
        assert!(matches!(
            db.add_pending_proofs("quote-b", &proofs).await,
            Err(Error::AlreadySpent)
        ));
    }

    #[tokio::test]
    async fn test_mint_quote_single_issue_cas() {
        let db = MintMemoryDatabase::new();
        let quote = MintQuote::new(Amount::from(10), "lnbc1".into(), "hash".into(), 0);
        let id = quote.id.clone();
        db.add_mint_quote(quote).await.unwrap();

        db.update_mint_quote_state(&id, MintQuoteState::Paid)
            .await
            .unwrap();
        db.update_mint_quote_state(&id, MintQuoteState::Issued)
            .await
            .unwrap();

        assert!(matches!(
            db.update_mint_quote_state(&id, MintQuoteState::Issued).await,
            Err(Error::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_melt_quote_pending_exclusion() {
        let db = MintMemoryDatabase::new();
        let quote = MeltQuote::new(
            "lnbc1".into(),
            "hash".into(),
            Amount::from(10),
            Amount::ZERO,
            0,
        );
        let id = quote.id.clone();
        db.add_melt_quote(quote).await.unwrap();

        db.update_melt_quote_state(&id, MeltQuoteState::Pending, None)
            .await
            .unwrap();

        // A second transition to pending must lose the race
        assert!(matches!(
            db.update_melt_quote_state(&id, MeltQuoteState::Pending, None)
                .await,
            Err(Error::InvalidStateTransition { .. })
        ));
    }
}
