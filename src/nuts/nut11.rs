//! NUT-11: Pay to Public Key (P2PK)
//!
//! <https://github.com/cashubtc/nuts/blob/main/11.md>

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use bitcoin::secp256k1::schnorr::Signature;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nut00::{BlindedMessage, Proof, Proofs, Witness};
use super::nut01::{PublicKey, SecretKey};
use super::nut10::{Kind, Secret as Nut10Secret};
use crate::util::unix_time;

/// NUT11 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Secret is not a P2PK secret
    #[error("Secret is not a P2PK secret")]
    IncorrectSecretKind,
    /// Witness missing or malformed
    #[error("Invalid witness")]
    InvalidWitness,
    /// Signature threshold was not reached
    #[error("Not enough valid signatures provided")]
    NotEnoughSignatures,
    /// Multisig threshold requires additional pubkeys
    #[error("No pubkeys provided for multisig")]
    EmptyPubkeys,
    /// Unknown tag in P2PK secret
    #[error("Unknown tag in P2PK secret")]
    UnknownTag,
    /// Unknown Sigflag
    #[error("Unknown sigflag")]
    UnknownSigFlag,
    /// SIG_ALL proofs can only be swapped
    #[error("SIG_ALL proofs can only be swapped")]
    SigAllOnlySwap,
    /// SIG_ALL proofs must commit to one key set
    #[error("SIG_ALL proofs must all have the same public keys")]
    SigAllKeysMustBeEqual,
    /// SIG_ALL proofs must commit to one threshold
    #[error("SIG_ALL proofs must all have the same n_sigs")]
    NSigsMustBeEqual,
    /// Mixed sig flags in a SIG_ALL transaction
    #[error("All proofs must have SIG_ALL flag")]
    AllFlagsMustBeSigAll,
    /// Tag vector was empty
    #[error("Tag kind not found")]
    KindNotFound,
    /// Parse int error
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),
    /// Serde Json error
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
    /// Secp256k1 error
    #[error(transparent)]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    /// NUT01 Error
    #[error(transparent)]
    NUT01(#[from] super::nut01::Error),
}

/// P2PK Witness
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct P2PKWitness {
    /// Schnorr signatures, hex encoded
    pub signatures: Vec<String>,
}

impl P2PKWitness {
    /// Check if the witness carries no signatures
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// Serialize a [`P2PKWitness`] as the JSON string the wire format expects
pub mod serde_p2pk_witness {
    use serde::de::Error as DeserializerError;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::P2PKWitness;

    /// Serialize [P2PKWitness] as a JSON-encoded string
    pub fn serialize<S>(witness: &P2PKWitness, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let witness_str = serde_json::to_string(witness).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&witness_str)
    }

    /// Deserialize [P2PKWitness] from a JSON-encoded string
    pub fn deserialize<'de, D>(deserializer: D) -> Result<P2PKWitness, D::Error>
    where
        D: Deserializer<'de>,
    {
        let witness: String = String::deserialize(deserializer)?;
        serde_json::from_str(&witness).map_err(DeserializerError::custom)
    }
}

impl Proof {
    /// Sign [Proof] for a P2PK locked secret
    pub fn sign_p2pk(&mut self, secret_key: SecretKey) -> Result<(), Error> {
        let msg: Vec<u8> = self.secret.to_bytes();
        let signature: Signature = secret_key.sign(&msg)?;

        let signatures = vec![signature.to_string()];

        match self.witness.as_mut() {
            Some(witness) => {
                witness.add_signatures(signatures);
            }
            None => {
                let mut p2pk_witness = Witness::P2PKWitness(P2PKWitness::default());
                p2pk_witness.add_signatures(signatures);
                self.witness = Some(p2pk_witness);
            }
        };

        Ok(())
    }

    /// Verify the P2PK witness on this proof against its spending conditions.
    ///
    /// The message signed is the sha256 of the secret. After an expired
    /// locktime the refund keys (if any) take over; with no refund keys an
    /// expired lock makes the proof spendable by anyone.
    pub fn verify_p2pk(&self) -> Result<(), Error> {
        let secret: Nut10Secret = (&self.secret)
            .try_into()
            .map_err(|_| Error::IncorrectSecretKind)?;
        if secret.kind() != Kind::P2PK {
            return Err(Error::IncorrectSecretKind);
        }

        let conditions: Conditions = secret
            .secret_data()
            .tags()
            .cloned()
            .unwrap_or_default()
            .try_into()?;

        let witness_signatures = self
            .witness
            .as_ref()
            .and_then(|witness| witness.signatures())
            .unwrap_or_default();

        let msg: &[u8] = self.secret.as_bytes();

        if let Some(locktime) = conditions.locktime {
            if locktime > 0 && unix_time() > locktime {
                let refund_keys = conditions.refund_keys.unwrap_or_default();
                if refund_keys.is_empty() {
                    // Expired lock with no refund keys is anyone-can-spend
                    return Ok(());
                }

                if witness_signatures.is_empty() {
                    return Err(Error::InvalidWitness);
                }

                let signatures = parse_signatures(&witness_signatures)?;
                if valid_signatures(msg, &refund_keys, &signatures) < 1 {
                    return Err(Error::NotEnoughSignatures);
                }

                return Ok(());
            }
        }

        let mut pubkeys = vec![PublicKey::from_str(secret.secret_data().data())?];
        let mut signatures_required: u64 = 1;

        match conditions.num_sigs {
            Some(num_sigs) if num_sigs > 0 => {
                signatures_required = num_sigs;
                let additional = conditions.pubkeys.unwrap_or_default();
                if additional.is_empty() {
                    return Err(Error::EmptyPubkeys);
                }
                pubkeys.extend(additional);
            }
            _ => pubkeys.extend(conditions.pubkeys.unwrap_or_default()),
        }

        if witness_signatures.is_empty() {
            return Err(Error::InvalidWitness);
        }

        let signatures = parse_signatures(&witness_signatures)?;
        if valid_signatures(msg, &pubkeys, &signatures) < signatures_required {
            return Err(Error::NotEnoughSignatures);
        }

        Ok(())
    }
}

impl BlindedMessage {
    /// Sign [BlindedMessage] for a SIG_ALL transaction
    pub fn sign_p2pk(&mut self, secret_key: SecretKey) -> Result<(), Error> {
        let msg: [u8; 33] = self.blinded_secret.to_bytes();
        let signature: Signature = secret_key.sign(&msg)?;

        let signatures = vec![signature.to_string()];

        match self.witness.as_mut() {
            Some(witness) => {
                witness.add_signatures(signatures);
            }
            None => {
                let mut p2pk_witness = Witness::P2PKWitness(P2PKWitness::default());
                p2pk_witness.add_signatures(signatures);
                self.witness = Some(p2pk_witness);
            }
        };

        Ok(())
    }

    /// Verify that this blinded output carries at least `required_sigs`
    /// valid signatures over sha256(B_) from `pubkeys`
    pub fn verify_p2pk(&self, pubkeys: &[PublicKey], required_sigs: u64) -> Result<(), Error> {
        let witness_signatures = self
            .witness
            .as_ref()
            .and_then(|witness| witness.signatures())
            .unwrap_or_default();

        if witness_signatures.is_empty() {
            return Err(Error::InvalidWitness);
        }

        let signatures = parse_signatures(&witness_signatures)?;
        let msg: [u8; 33] = self.blinded_secret.to_bytes();

        if valid_signatures(&msg, pubkeys, &signatures) < required_sigs {
            return Err(Error::NotEnoughSignatures);
        }

        Ok(())
    }
}

fn parse_signatures(signatures: &[String]) -> Result<Vec<Signature>, Error> {
    signatures
        .iter()
        .map(|s| Signature::from_str(s).map_err(|_| Error::InvalidWitness))
        .collect()
}

/// Count the public keys with a valid signature over `msg`. Each public key
/// is counted at most once no matter how many signatures match it.
pub fn valid_signatures(msg: &[u8], pubkeys: &[PublicKey], signatures: &[Signature]) -> u64 {
    let mut verified_pubkeys = HashSet::new();

    for pubkey in pubkeys {
        for signature in signatures {
            if pubkey.verify(msg, signature).is_ok() {
                verified_pubkeys.insert(*pubkey);
            }
        }
    }

    verified_pubkeys.len() as u64
}

/// P2PK spending conditions expressed through secret tags
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Conditions {
    /// Unix locktime after which refund keys can be used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locktime: Option<u64>,
    /// Additional public keys for multisig
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkeys: Option<Vec<PublicKey>>,
    /// Refund keys, usable after the locktime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_keys: Option<Vec<PublicKey>>,
    /// Number of signatures required, defaults to 1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_sigs: Option<u64>,
    /// Signature flag, defaults to [`SigFlag::SigInputs`]
    pub sig_flag: SigFlag,
}

impl From<Conditions> for Vec<Vec<String>> {
    fn from(conditions: Conditions) -> Vec<Vec<String>> {
        let Conditions {
            locktime,
            pubkeys,
            refund_keys,
            num_sigs,
            sig_flag,
        } = conditions;

        let mut tags = Vec::new();

        if let Some(pubkeys) = pubkeys {
            tags.push(Tag::PubKeys(pubkeys).as_vec());
        }

        if let Some(locktime) = locktime {
            tags.push(Tag::LockTime(locktime).as_vec());
        }

        if let Some(num_sigs) = num_sigs {
            tags.push(Tag::NSigs(num_sigs).as_vec());
        }

        if let Some(refund_keys) = refund_keys {
            tags.push(Tag::Refund(refund_keys).as_vec())
        }

        tags.push(Tag::SigFlag(sig_flag).as_vec());
        tags
    }
}

impl TryFrom<Vec<Vec<String>>> for Conditions {
    type Error = Error;

    fn try_from(tags: Vec<Vec<String>>) -> Result<Conditions, Self::Error> {
        let tags: HashMap<TagKind, Tag> = tags
            .into_iter()
            .map(Tag::try_from)
            .collect::<Result<Vec<Tag>, _>>()?
            .into_iter()
            .map(|t| (t.kind(), t))
            .collect();

        let pubkeys = match tags.get(&TagKind::Pubkeys) {
            Some(Tag::PubKeys(pubkeys)) => Some(pubkeys.clone()),
            _ => None,
        };

        let locktime = match tags.get(&TagKind::Locktime) {
            Some(Tag::LockTime(locktime)) => Some(*locktime),
            _ => None,
        };

        let refund_keys = match tags.get(&TagKind::Refund) {
            Some(Tag::Refund(keys)) => Some(keys.clone()),
            _ => None,
        };

        let num_sigs = match tags.get(&TagKind::NSigs) {
            Some(Tag::NSigs(num_sigs)) => Some(*num_sigs),
            _ => None,
        };

        let sig_flag = match tags.get(&TagKind::SigFlag) {
            Some(Tag::SigFlag(sig_flag)) => *sig_flag,
            _ => SigFlag::SigInputs,
        };

        Ok(Conditions {
            locktime,
            pubkeys,
            refund_keys,
            num_sigs,
            sig_flag,
        })
    }
}

/// P2PK spending condition tag kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    /// Signature flag
    SigFlag,
    /// Number of signatures required
    #[serde(rename = "n_sigs")]
    NSigs,
    /// Locktime
    Locktime,
    /// Refund
    Refund,
    /// Pubkeys
    Pubkeys,
    /// Custom tag kind
    Custom(String),
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SigFlag => write!(f, "sigflag"),
            Self::NSigs => write!(f, "n_sigs"),
            Self::Locktime => write!(f, "locktime"),
            Self::Refund => write!(f, "refund"),
            Self::Pubkeys => write!(f, "pubkeys"),
            Self::Custom(c) => write!(f, "{c}"),
        }
    }
}

impl<S> From<S> for TagKind
where
    S: AsRef<str>,
{
    fn from(tag: S) -> Self {
        match tag.as_ref() {
            "sigflag" => Self::SigFlag,
            "n_sigs" => Self::NSigs,
            "locktime" => Self::Locktime,
            "refund" => Self::Refund,
            "pubkeys" => Self::Pubkeys,
            t => Self::Custom(t.to_owned()),
        }
    }
}

/// Signature flag
///
/// Defined in [NUT11](https://github.com/cashubtc/nuts/blob/main/11.md)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord, Hash)]
pub enum SigFlag {
    /// Requires valid signatures on all inputs. The default, applied even
    /// when the `sigflag` tag is absent.
    #[default]
    SigInputs,
    /// Requires valid signatures on all inputs and on all outputs
    SigAll,
}

impl fmt::Display for SigFlag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SigAll => write!(f, "SIG_ALL"),
            Self::SigInputs => write!(f, "SIG_INPUTS"),
        }
    }
}

impl FromStr for SigFlag {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "SIG_ALL" => Ok(Self::SigAll),
            "SIG_INPUTS" => Ok(Self::SigInputs),
            _ => Err(Error::UnknownSigFlag),
        }
    }
}

/// Tag of a P2PK secret
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Tag {
    /// Sigflag [`Tag`]
    SigFlag(SigFlag),
    /// Number of sigs [`Tag`]
    NSigs(u64),
    /// Locktime [`Tag`]
    LockTime(u64),
    /// Refund [`Tag`]
    Refund(Vec<PublicKey>),
    /// Pubkeys [`Tag`]
    PubKeys(Vec<PublicKey>),
    /// Custom tag
    Custom(String, Vec<String>),
}

impl Tag {
    /// Get [`Tag`] kind
    pub fn kind(&self) -> TagKind {
        match self {
            Self::SigFlag(_) => TagKind::SigFlag,
            Self::NSigs(_) => TagKind::NSigs,
            Self::LockTime(_) => TagKind::Locktime,
            Self::Refund(_) => TagKind::Refund,
            Self::PubKeys(_) => TagKind::Pubkeys,
            Self::Custom(tag, _) => TagKind::Custom(tag.to_string()),
        }
    }

    /// Get [`Tag`] as string vector
    pub fn as_vec(&self) -> Vec<String> {
        self.clone().into()
    }
}

impl<S> TryFrom<Vec<S>> for Tag
where
    S: AsRef<str>,
{
    type Error = Error;

    fn try_from(tag: Vec<S>) -> Result<Self, Self::Error> {
        let tag_kind = tag.first().map(TagKind::from).ok_or(Error::KindNotFound)?;
        let value = |idx: usize| -> Result<&str, Error> {
            tag.get(idx).map(|v| v.as_ref()).ok_or(Error::KindNotFound)
        };

        match tag_kind {
            TagKind::SigFlag => Ok(Tag::SigFlag(SigFlag::from_str(value(1)?)?)),
            TagKind::NSigs => Ok(Tag::NSigs(value(1)?.parse()?)),
            TagKind::Locktime => Ok(Tag::LockTime(value(1)?.parse()?)),
            TagKind::Refund => {
                let pubkeys = tag
                    .iter()
                    .skip(1)
                    .map(|p| PublicKey::from_str(p.as_ref()))
                    .collect::<Result<Vec<PublicKey>, _>>()?;

                Ok(Self::Refund(pubkeys))
            }
            TagKind::Pubkeys => {
                let pubkeys = tag
                    .iter()
                    .skip(1)
                    .map(|p| PublicKey::from_str(p.as_ref()))
                    .collect::<Result<Vec<PublicKey>, _>>()?;

                Ok(Self::PubKeys(pubkeys))
            }
            TagKind::Custom(name) => {
                let values = tag
                    .iter()
                    .skip(1)
                    .map(|p| p.as_ref().to_string())
                    .collect::<Vec<String>>();

                Ok(Self::Custom(name, values))
            }
        }
    }
}

impl From<Tag> for Vec<String> {
    fn from(data: Tag) -> Self {
        match data {
            Tag::SigFlag(sigflag) => vec![TagKind::SigFlag.to_string(), sigflag.to_string()],
            Tag::NSigs(num_sig) => vec![TagKind::NSigs.to_string(), num_sig.to_string()],
            Tag::LockTime(locktime) => vec![TagKind::Locktime.to_string(), locktime.to_string()],
            Tag::PubKeys(pubkeys) => {
                let mut tag = vec![TagKind::Pubkeys.to_string()];
                for pubkey in pubkeys.into_iter() {
                    tag.push(pubkey.to_string())
                }
                tag
            }
            Tag::Refund(pubkeys) => {
                let mut tag = vec![TagKind::Refund.to_string()];
                for pubkey in pubkeys {
                    tag.push(pubkey.to_string())
                }
                tag
            }
            Tag::Custom(name, values) => {
                let mut tag = vec![name];
                tag.extend(values);
                tag
            }
        }
    }
}

/// Normalized view of the key set and threshold a P2PK secret commits to.
///
/// Structural equality of these terms across proofs is what a SIG_ALL batch
/// requires: same allowed keys, same threshold, same flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigAllTerms {
    /// Allowed signing keys: the `data` key plus any `pubkeys` tag entries
    pub pubkeys: BTreeSet<PublicKey>,
    /// Required number of signatures, at least 1
    pub num_sigs: u64,
    /// Signature flag of the secret
    pub sig_flag: SigFlag,
}

impl TryFrom<&Nut10Secret> for SigAllTerms {
    type Error = Error;

    fn try_from(secret: &Nut10Secret) -> Result<Self, Self::Error> {
        if secret.kind() != Kind::P2PK {
            return Err(Error::IncorrectSecretKind);
        }

        let conditions: Conditions = secret
            .secret_data()
            .tags()
            .cloned()
            .unwrap_or_default()
            .try_into()?;

        let mut pubkeys: BTreeSet<PublicKey> =
            conditions.pubkeys.unwrap_or_default().into_iter().collect();
        pubkeys.insert(PublicKey::from_str(secret.secret_data().data())?);

        Ok(Self {
            pubkeys,
            num_sigs: conditions.num_sigs.filter(|n| *n > 0).unwrap_or(1),
            sig_flag: conditions.sig_flag,
        })
    }
}

/// Check whether any proof in the set is locked with the SIG_ALL flag
pub fn proofs_sig_all(proofs: &Proofs) -> bool {
    proofs.iter().any(|proof| {
        let Ok(secret) = Nut10Secret::try_from(&proof.secret) else {
            return false;
        };

        if secret.kind() != Kind::P2PK {
            return false;
        }

        matches!(
            SigAllTerms::try_from(&secret),
            Ok(terms) if terms.sig_flag == SigFlag::SigAll
        )
    })
}
