//! NUT-12: Offline ecash signature validation
//!
//! <https://github.com/cashubtc/nuts/blob/main/12.md>

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nut00::{BlindSignature, Proof};
use super::nut01::{PublicKey, SecretKey};
use super::nut02::Id;
use crate::dhke::{hash_e, hash_to_curve};
use crate::{Amount, SECP256K1};

/// NUT12 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Missing DLEQ proof
    #[error("No DLEQ proof provided")]
    MissingDleqProof,
    /// Incomplete DLEQ proof
    #[error("Incomplete DLEQ proof")]
    IncompleteDleqProof,
    /// DLEQ proof does not verify
    #[error("Invalid DLEQ proof")]
    InvalidDleqProof,
    /// DHKE error
    #[error(transparent)]
    DHKE(#[from] crate::dhke::Error),
    /// NUT01 error
    #[error(transparent)]
    NUT01(#[from] super::nut01::Error),
    /// Secp256k1 error
    #[error(transparent)]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
}

/// DLEQ proof attached to a blind signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlindSignatureDleq {
    /// Challenge
    pub e: SecretKey,
    /// Response
    pub s: SecretKey,
}

/// DLEQ proof attached to a proof, including the blinding factor needed to
/// verify offline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofDleq {
    /// Challenge
    pub e: SecretKey,
    /// Response
    pub s: SecretKey,
    /// Blinding factor
    pub r: SecretKey,
}

impl ProofDleq {
    /// Create new [`ProofDleq`]
    pub fn new(e: SecretKey, s: SecretKey, r: SecretKey) -> Self {
        Self { e, s, r }
    }
}

/// Verify that `e == hash(R1, R2, K, C_)` for `R1 = s·G - e·K` and
/// `R2 = s·B_ - e·C_`, which holds iff `C_ == k·B_`
fn verify_dleq(
    blinded_message: &PublicKey,   // B_
    blinded_signature: &PublicKey, // C_
    e: &SecretKey,
    s: &SecretKey,
    mint_pubkey: &PublicKey, // K
) -> Result<(), Error> {
    let e_scalar = e.as_scalar();

    // R1 = s*G - e*K
    let neg_e_k: PublicKey = mint_pubkey
        .mul_tweak(&SECP256K1, &e_scalar)
        .map_err(|_| Error::InvalidDleqProof)?
        .negate(&SECP256K1)
        .into();
    let r1: PublicKey = s
        .public_key()
        .combine(&neg_e_k)
        .map_err(|_| Error::InvalidDleqProof)?
        .into();

    // R2 = s*B_ - e*C_
    let neg_e_c: PublicKey = blinded_signature
        .mul_tweak(&SECP256K1, &e_scalar)
        .map_err(|_| Error::InvalidDleqProof)?
        .negate(&SECP256K1)
        .into();
    let r2: PublicKey = blinded_message
        .mul_tweak(&SECP256K1, &s.as_scalar())
        .map_err(|_| Error::InvalidDleqProof)?
        .combine(&neg_e_c)
        .map_err(|_| Error::InvalidDleqProof)?
        .into();

    let hash_e = hash_e(vec![r1, r2, *mint_pubkey, *blinded_signature]);

    if e.to_secret_bytes() != hash_e {
        tracing::warn!("DLEQ on signature failed");
        return Err(Error::InvalidDleqProof);
    }

    Ok(())
}

/// Construct a DLEQ proof binding `C_` to the amount public key `K`
///
/// ```text
/// r = random nonce
/// R1 = r*G
/// R2 = r*B_
/// e = hash(R1, R2, K, C_)
/// s = r + e*k
/// ```
fn calculate_dleq(
    blinded_signature: &PublicKey, // C_
    blinded_message: &PublicKey,   // B_
    mint_secret_key: &SecretKey,   // k
) -> Result<BlindSignatureDleq, Error> {
    let r = SecretKey::generate();

    let r1 = r.public_key();
    let r2: PublicKey = blinded_message
        .mul_tweak(&SECP256K1, &r.as_scalar())?
        .into();

    let e = hash_e(vec![
        r1,
        r2,
        mint_secret_key.public_key(),
        *blinded_signature,
    ]);
    let e_sk = SecretKey::from_slice(&e)?;

    // s = r + e*k
    let s: SecretKey = e_sk
        .mul_tweak(&mint_secret_key.as_scalar())?
        .add_tweak(&r.as_scalar())?
        .into();

    Ok(BlindSignatureDleq { e: e_sk, s })
}

impl Proof {
    /// Verify the DLEQ proof on an unblinded proof
    ///
    /// Only a holder knowing the blinding factor `r` can do this; the mint
    /// itself never sees `r`.
    pub fn verify_dleq(&self, mint_pubkey: &PublicKey) -> Result<(), Error> {
        let dleq = self.dleq.as_ref().ok_or(Error::MissingDleqProof)?;

        let y = hash_to_curve(self.secret.as_bytes())?;

        // C_ = C + r*K
        let r_k: PublicKey = mint_pubkey.mul_tweak(&SECP256K1, &dleq.r.as_scalar())?.into();
        let blinded_signature: PublicKey = self.c.combine(&r_k)?.into();

        // B_ = Y + r*G
        let blinded_message: PublicKey = y.combine(&dleq.r.public_key())?.into();

        verify_dleq(
            &blinded_message,
            &blinded_signature,
            &dleq.e,
            &dleq.s,
            mint_pubkey,
        )
    }
}

impl BlindSignature {
    /// Create a [`BlindSignature`] carrying a DLEQ proof
    pub fn new_dleq(
        amount: Amount,
        blinded_signature: PublicKey,
        keyset_id: Id,
        blinded_message: &PublicKey,
        mint_secret_key: &SecretKey,
    ) -> Result<Self, Error> {
        let dleq = calculate_dleq(&blinded_signature, blinded_message, mint_secret_key)?;

        Ok(BlindSignature {
            amount,
            keyset_id,
            c: blinded_signature,
            dleq: Some(dleq),
        })
    }

    /// Verify the DLEQ proof on this blind signature
    pub fn verify_dleq(
        &self,
        mint_pubkey: &PublicKey,
        blinded_message: &PublicKey,
    ) -> Result<(), Error> {
        let dleq = self.dleq.as_ref().ok_or(Error::MissingDleqProof)?;

        verify_dleq(blinded_message, &self.c, &dleq.e, &dleq.s, mint_pubkey)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::dhke::{blind_message, sign_message, unblind_message};
    use crate::secret::Secret;

    #[test]
    fn test_blind_signature_dleq() {
        let blinded_sig = r#"{"amount":8,"id":"00882760bfa2eb41","C_":"02a9acc1e48c25eeeb9289b5031cc57da9fe72f3fe2861d264bdc074209b107ba2","dleq":{"e":"9818e061ee51d5c8edc3342369a554998ff7b4381c8652d724cdf46429be73d9","s":"9818e061ee51d5c8edc3342369a554998ff7b4381c8652d724cdf46429be73da"}}"#;

        let blinded: BlindSignature = serde_json::from_str(blinded_sig).unwrap();

        let secret_key =
            SecretKey::from_hex("0000000000000000000000000000000000000000000000000000000000000001")
                .unwrap();

        let mint_key = secret_key.public_key();

        let blinded_secret = PublicKey::from_str(
            "02a9acc1e48c25eeeb9289b5031cc57da9fe72f3fe2861d264bdc074209b107ba2",
        )
        .unwrap();

        blinded.verify_dleq(&mint_key, &blinded_secret).unwrap()
    }

    #[test]
    fn test_dleq_round_trip() {
        let mint_key = SecretKey::generate();
        let secret = Secret::generate();

        let (blinded_secret, r) = blind_message(secret.as_bytes(), None).unwrap();
        let c_ = sign_message(&mint_key, &blinded_secret).unwrap();

        let signature = BlindSignature::new_dleq(
            Amount::from(8),
            c_,
            Id::from_str("009a1f293253e41e").unwrap(),
            &blinded_secret,
            &mint_key,
        )
        .unwrap();

        signature
            .verify_dleq(&mint_key.public_key(), &blinded_secret)
            .unwrap();

        // Verification against a different key must fail
        let other_key = SecretKey::generate();
        assert!(signature
            .verify_dleq(&other_key.public_key(), &blinded_secret)
            .is_err());

        // The unblinded proof verifies with the blinding factor
        let c = unblind_message(&c_, &r, &mint_key.public_key()).unwrap();
        let dleq = signature.dleq.clone().unwrap();
        let proof = Proof {
            amount: Amount::from(8),
            keyset_id: Id::from_str("009a1f293253e41e").unwrap(),
            secret,
            c,
            witness: None,
            dleq: Some(ProofDleq::new(dleq.e, dleq.s, r)),
        };

        proof.verify_dleq(&mint_key.public_key()).unwrap();
    }
}
