//! NUT-02: Keysets and keyset ID
//!
//! <https://github.com/cashubtc/nuts/blob/main/02.md>

use core::fmt;
use core::str::FromStr;

use bitcoin::hashes::{sha256, Hash};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, VecSkipError};
use thiserror::Error;

use super::nut00::CurrencyUnit;
use super::nut01::Keys;
use crate::util::hex;

/// NUT02 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Hex error
    #[error(transparent)]
    HexError(#[from] hex::Error),
    /// Keyset id length invalid
    #[error("Invalid keyset id length")]
    Length,
    /// BIP32 derivation error
    #[error(transparent)]
    Bip32(#[from] bitcoin::bip32::Error),
}

/// Keyset id version byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySetVersion {
    /// Current version `00`
    Version00,
}

impl fmt::Display for KeySetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySetVersion::Version00 => f.write_str("00"),
        }
    }
}

/// A keyset ID uniquely identifies a keyset's public-key bundle. It can be
/// derived by anyone who knows the set of public keys of a mint, and is
/// carried inside every proof to identify which keys signed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id {
    version: KeySetVersion,
    id: [u8; Self::STRLEN],
}

impl Id {
    const STRLEN: usize = 14;
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format!(
            "{}{}",
            self.version,
            String::from_utf8(self.id.to_vec()).map_err(|_| fmt::Error)?
        ))
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::STRLEN + 2 {
            return Err(Error::Length);
        }

        Ok(Self {
            version: KeySetVersion::Version00,
            id: s[2..].as_bytes().try_into().map_err(|_| Error::Length)?,
        })
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id: String = String::deserialize(deserializer)?;
        Self::from_str(&id).map_err(serde::de::Error::custom)
    }
}

impl From<&Keys> for Id {
    /// Derive the keyset id from the public keys:
    /// 1. sort public keys by their amount in ascending order
    /// 2. concatenate all (compressed) public keys
    /// 3. SHA-256 the concatenation
    /// 4. take the first 14 characters of the hex-encoded hash
    /// 5. prefix with the keyset id version byte
    fn from(map: &Keys) -> Self {
        // Keys is a BTreeMap, already sorted by amount ascending
        let pubkeys_concat: Vec<u8> = map
            .iter()
            .map(|(_, pubkey)| pubkey.to_bytes())
            .collect::<Vec<[u8; 33]>>()
            .concat();

        let hash = sha256::Hash::hash(&pubkeys_concat);
        let hex_of_hash = hex::encode(hash.to_byte_array());

        Self {
            version: KeySetVersion::Version00,
            id: hex_of_hash[0..Self::STRLEN]
                .as_bytes()
                .try_into()
                .expect("ids from fixed size slice"),
        }
    }
}

/// Keyset public keys [NUT-02]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Keyset [`Keys`]
    pub keys: Keys,
}

impl From<mint::KeySet> for KeySet {
    fn from(keyset: mint::KeySet) -> Self {
        Self {
            id: keyset.id,
            unit: keyset.unit,
            keys: Keys::from(&keyset.keys),
        }
    }
}

/// Keyset entry in the keysets listing [NUT-02]
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySetInfo {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Whether the keyset is used for issuing new signatures
    pub active: bool,
    /// Input fee, per proof, in thousandths of a unit
    pub input_fee_ppk: u64,
}

/// Keysets listing response [NUT-02]
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysetResponse {
    /// Keysets the mint knows, active and inactive
    #[serde_as(as = "VecSkipError<_>")]
    pub keysets: Vec<KeySetInfo>,
}

/// Mint-side keysets holding secret keys
pub mod mint {
    use bitcoin::bip32::{ChildNumber, Xpriv};
    use bitcoin::Network;
    use serde::Serialize;

    use super::{CurrencyUnit, Error, Id};
    use crate::nuts::nut01::mint::{KeyPair, Keys};
    use crate::nuts::nut01::SecretKey;
    use crate::Amount;
    use crate::SECP256K1;

    /// Keyset with the secret keys the mint signs with
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct KeySet {
        /// Keyset [`Id`]
        pub id: Id,
        /// Keyset [`CurrencyUnit`]
        pub unit: CurrencyUnit,
        /// Keypairs per power-of-two amount
        pub keys: Keys,
        /// Input fee, per proof, in thousandths of a unit
        pub input_fee_ppk: u64,
    }

    impl KeySet {
        /// Derive a keyset deterministically from the mint seed.
        ///
        /// A BIP32 master key is built from the seed on mainnet parameters,
        /// a child is derived at `derivation_path_index` and, for each of the
        /// `max_order` supported amounts `2^i`, a further child at `i` whose
        /// private scalar becomes that amount's signing key. Re-derivation
        /// from the same `(seed, index)` is byte-stable.
        pub fn generate(
            seed: &[u8],
            unit: CurrencyUnit,
            derivation_path_index: u32,
            max_order: u8,
            input_fee_ppk: u64,
        ) -> Result<Self, Error> {
            let master = Xpriv::new_master(Network::Bitcoin, seed)?;
            let keyset_key =
                master.derive_priv(&SECP256K1, &[ChildNumber::from_normal_idx(derivation_path_index)?])?;

            let mut map = std::collections::BTreeMap::new();
            for i in 0..max_order {
                let amount = Amount::from(2_u64.pow(i as u32));

                let child = keyset_key
                    .derive_priv(&SECP256K1, &[ChildNumber::from_normal_idx(i as u32)?])?;
                let secret_key = SecretKey::from(child.private_key);
                map.insert(amount, KeyPair::from_secret_key(secret_key));
            }

            let keys = Keys(map);
            let id = Id::from(&super::Keys::from(&keys));

            Ok(Self {
                id,
                unit,
                keys,
                input_fee_ppk,
            })
        }
    }

    impl From<&KeySet> for Id {
        fn from(keyset: &KeySet) -> Id {
            Id::from(&super::Keys::from(&keyset.keys))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    const SHORT_KEYSET_ID: &str = "00456a94ab4e1c46";
    const SHORT_KEYSET: &str = r#"
        {
            "1":"03a40f20667ed53513075dc51e715ff2046cad64eb68960632269ba7f0210e38bc",
            "2":"03fd4ce5a16b65576145949e6f99f445f8249fee17c606b688b504a849cdc452de",
            "4":"02648eccfa4c026960966276fa5a4cae46ce0fd432211a4f449bf84f13aa5f8303",
            "8":"02fdfd6796bfeac490cbee12f778f867f0a2c68f6508d17c649759ea0dc3547528"
        }
    "#;

    #[test]
    fn test_deserialization_and_id_generation() {
        let keys: Keys = serde_json::from_str(SHORT_KEYSET).unwrap();

        let id: Id = (&keys).into();

        assert_eq!(id, Id::from_str(SHORT_KEYSET_ID).unwrap());
    }

    #[test]
    fn test_generation_is_stable() {
        let seed = [7u8; 32];
        let keyset =
            mint::KeySet::generate(&seed, CurrencyUnit::Sat, 0, 32, 0).unwrap();
        let again = mint::KeySet::generate(&seed, CurrencyUnit::Sat, 0, 32, 0).unwrap();

        assert_eq!(keyset.id, again.id);
        assert_eq!(keyset.keys, again.keys);

        // A different derivation path index yields a different keyset
        let rotated =
            mint::KeySet::generate(&seed, CurrencyUnit::Sat, 1, 32, 0).unwrap();
        assert_ne!(keyset.id, rotated.id);
    }

    #[test]
    fn test_keyset_info_deserialization() {
        let h = r#"{"id":"009a1f293253e41e","unit":"sat","active":true,"input_fee_ppk":100}"#;

        let keyset_info: KeySetInfo = serde_json::from_str(h).unwrap();
        assert!(keyset_info.active);
        assert_eq!(keyset_info.input_fee_ppk, 100);
    }
}
