//! Mint core

use std::collections::HashMap;

use arc_swap::ArcSwap;
use bitcoin::secp256k1::rand::{self, RngCore};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::database::DynMintDatabase;
use crate::dhke::sign_message;
use crate::lightning::DynMintLightning;
use crate::nuts::nut02::mint::KeySet as MintKeySet;
use crate::nuts::{
    BlindSignature, BlindedMessage, CurrencyUnit, Id, KeySet, KeySetInfo, KeysResponse,
    KeysetResponse, PublicKey, Proofs, ProofsMethods, RestoreResponse,
};
use crate::{fees, Amount, Error};

mod check_spendable;
pub mod config;
mod issue;
mod melt;
mod swap;
mod verification;

pub use config::{MintConfig, MintLimits};

/// The only supported payment method
pub const BOLT11_METHOD: &str = "bolt11";
/// The only supported unit
pub const SAT_UNIT: &str = "sat";

/// Persisted keyset record, sufficient to re-derive the full keyset from
/// the mint seed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MintKeySetInfo {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Whether this keyset signs new outputs
    pub active: bool,
    /// BIP32 child index the keyset is derived at
    pub derivation_path_index: u32,
    /// Number of power-of-two amounts
    pub max_order: u8,
    /// Input fee, per proof, in thousandths of a unit
    pub input_fee_ppk: u64,
}

/// Immutable snapshot of the keysets the mint serves.
///
/// Handlers read a consistent view through an atomic swap handle; startup
/// and rotation replace the whole snapshot.
#[derive(Debug, Clone)]
pub struct KeySetSnapshot {
    /// Id of the keyset used for issuing new signatures
    pub active: Id,
    /// All keysets, active and inactive, accepted for verification
    pub keysets: HashMap<Id, MintKeySet>,
}

/// Chaumian mint backed by a Lightning node
#[derive(Debug)]
pub struct Mint {
    localstore: DynMintDatabase,
    lightning: DynMintLightning,
    keysets: ArcSwap<KeySetSnapshot>,
    limits: MintLimits,
    quote_expiry_secs: u64,
}

impl Mint {
    /// Load the mint: bootstrap the seed, re-derive all persisted keysets
    /// and rotate the active keyset if the configuration asks for a new one.
    pub async fn new(
        config: MintConfig,
        localstore: DynMintDatabase,
        lightning: DynMintLightning,
    ) -> Result<Self, Error> {
        let seed = match localstore.get_seed().await? {
            Some(seed) => seed,
            None => {
                let mut seed = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut seed);
                localstore.save_seed(&seed).await?;
                seed.to_vec()
            }
        };

        let active_keyset = MintKeySet::generate(
            &seed,
            CurrencyUnit::Sat,
            config.derivation_path_index,
            config.max_order,
            config.input_fee_ppk,
        )?;
        let active_id = active_keyset.id;

        let stored_infos = localstore.get_keyset_infos().await?;

        let mut keysets: HashMap<Id, MintKeySet> = HashMap::new();
        let mut active_is_new = true;
        for info in &stored_infos {
            let keyset = MintKeySet::generate(
                &seed,
                info.unit,
                info.derivation_path_index,
                info.max_order,
                info.input_fee_ppk,
            )?;
            if keyset.id == active_id {
                active_is_new = false;
            }
            keysets.insert(keyset.id, keyset);
        }
        keysets.insert(active_id, active_keyset);

        if active_is_new {
            localstore
                .add_keyset_info(MintKeySetInfo {
                    id: active_id,
                    unit: CurrencyUnit::Sat,
                    active: true,
                    derivation_path_index: config.derivation_path_index,
                    max_order: config.max_order,
                    input_fee_ppk: config.input_fee_ppk,
                })
                .await?;
            tracing::info!("Generated new active keyset {active_id}");
        }

        // Reconcile stored active flags with the configured active keyset
        for info in &stored_infos {
            if info.id == active_id && !info.active {
                localstore.set_keyset_active(&info.id, true).await?;
            } else if info.id != active_id && info.active {
                localstore.set_keyset_active(&info.id, false).await?;
            }
        }

        Ok(Self {
            localstore,
            lightning,
            keysets: ArcSwap::from_pointee(KeySetSnapshot {
                active: active_id,
                keysets,
            }),
            limits: config.limits,
            quote_expiry_secs: config.quote_expiry_secs,
        })
    }

    pub(crate) fn localstore(&self) -> &DynMintDatabase {
        &self.localstore
    }

    pub(crate) fn lightning(&self) -> &DynMintLightning {
        &self.lightning
    }

    pub(crate) fn limits(&self) -> &MintLimits {
        &self.limits
    }

    pub(crate) fn quote_expiry_secs(&self) -> u64 {
        self.quote_expiry_secs
    }

    pub(crate) fn keyset_snapshot(&self) -> std::sync::Arc<KeySetSnapshot> {
        self.keysets.load_full()
    }

    /// Id of the keyset currently used for signing
    pub fn active_keyset_id(&self) -> Id {
        self.keysets.load().active
    }

    /// Public keys of the active keyset, for distribution to wallets
    #[instrument(skip_all)]
    pub fn pubkeys(&self) -> KeysResponse {
        let snapshot = self.keysets.load();
        KeysResponse {
            keysets: snapshot
                .keysets
                .get(&snapshot.active)
                .map(|keyset| KeySet::from(keyset.clone()))
                .into_iter()
                .collect(),
        }
    }

    /// Public keys of the keyset with `keyset_id`
    #[instrument(skip(self))]
    pub fn keyset_pubkeys(&self, keyset_id: &Id) -> Result<KeysResponse, Error> {
        let snapshot = self.keysets.load();
        let keyset = snapshot
            .keysets
            .get(keyset_id)
            .cloned()
            .ok_or(Error::UnknownKeyset)?;

        Ok(KeysResponse {
            keysets: vec![KeySet::from(keyset)],
        })
    }

    /// All keysets the mint knows, with their active flags and fees
    #[instrument(skip_all)]
    pub fn keysets(&self) -> KeysetResponse {
        let snapshot = self.keysets.load();
        KeysetResponse {
            keysets: snapshot
                .keysets
                .values()
                .map(|keyset| KeySetInfo {
                    id: keyset.id,
                    unit: keyset.unit,
                    active: keyset.id == snapshot.active,
                    input_fee_ppk: keyset.input_fee_ppk,
                })
                .collect(),
        }
    }

    /// Total transaction fee charged for spending `proofs`
    pub fn transaction_fees(&self, proofs: &Proofs) -> Result<Amount, Error> {
        let snapshot = self.keysets.load();
        let keyset_fees = snapshot
            .keysets
            .values()
            .map(|keyset| (keyset.id, keyset.input_fee_ppk))
            .collect();

        fees::calculate_fee(&proofs.count_by_keyset(), &keyset_fees)
    }

    /// Check that every output can be signed: known keyset, active keyset,
    /// supported amount. Performs no signing and no writes.
    pub(crate) fn verify_outputs_signable(
        &self,
        outputs: &[BlindedMessage],
    ) -> Result<(), Error> {
        let snapshot = self.keysets.load();

        for output in outputs {
            let keyset = snapshot
                .keysets
                .get(&output.keyset_id)
                .ok_or(Error::UnknownKeyset)?;
            if output.keyset_id != snapshot.active {
                return Err(Error::InactiveKeyset);
            }
            if keyset.keys.amount_key(output.amount).is_none() {
                return Err(Error::InvalidBlindedMessageAmount);
            }
        }

        Ok(())
    }

    /// Blind-sign `outputs` with the active keyset and persist the
    /// signatures keyed by `B_`. Signatures are returned in input order.
    #[instrument(skip_all)]
    pub(crate) async fn sign_blinded_messages(
        &self,
        outputs: &[BlindedMessage],
    ) -> Result<Vec<BlindSignature>, Error> {
        let snapshot = self.keyset_snapshot();

        let mut signatures = Vec::with_capacity(outputs.len());
        for output in outputs {
            let keyset = snapshot
                .keysets
                .get(&output.keyset_id)
                .ok_or(Error::UnknownKeyset)?;
            if output.keyset_id != snapshot.active {
                return Err(Error::InactiveKeyset);
            }
            let key_pair = keyset
                .keys
                .amount_key(output.amount)
                .ok_or(Error::InvalidBlindedMessageAmount)?;

            // C_ = k * B_
            let c = sign_message(&key_pair.secret_key, &output.blinded_secret)?;

            let signature = BlindSignature::new_dleq(
                output.amount,
                c,
                output.keyset_id,
                &output.blinded_secret,
                &key_pair.secret_key,
            )?;

            signatures.push(signature);
        }

        let blinded_secrets: Vec<PublicKey> =
            outputs.iter().map(|o| o.blinded_secret).collect();
        self.localstore
            .add_blind_signatures(&blinded_secrets, &signatures)
            .await?;

        Ok(signatures)
    }

    /// Return the stored signatures for the outputs that have one,
    /// preserving input order. Missing entries are skipped, never invented.
    #[instrument(skip_all)]
    pub async fn restore(&self, outputs: Vec<BlindedMessage>) -> Result<RestoreResponse, Error> {
        let blinded_secrets: Vec<PublicKey> =
            outputs.iter().map(|o| o.blinded_secret).collect();

        let stored = self
            .localstore
            .get_blind_signatures(&blinded_secrets)
            .await?;

        let mut matched_outputs = Vec::new();
        let mut signatures = Vec::new();
        for (output, signature) in outputs.into_iter().zip(stored) {
            if let Some(signature) = signature {
                matched_outputs.push(output);
                signatures.push(signature);
            }
        }

        Ok(RestoreResponse {
            outputs: matched_outputs,
            signatures,
        })
    }
}
