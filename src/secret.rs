//! Secret

use std::fmt;
use std::str::FromStr;

use bitcoin::secp256k1::rand::{self, RngCore};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::util::hex;

/// Maximum number of characters allowed in a secret
pub const MAX_SECRET_LENGTH: usize = 512;

/// The secret data that allows spending ecash
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Secret(String);

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.chars().count() > MAX_SECRET_LENGTH {
            return Err(serde::de::Error::custom(
                "Secret exceeds maximum allowed length",
            ));
        }
        Ok(Self(s))
    }
}

/// Secret Errors
#[derive(Debug, Error)]
pub enum Error {
    /// Secret is too long
    #[error("Secret exceeds maximum allowed char length")]
    InvalidLength,
    /// Hex Error
    #[error(transparent)]
    Hex(#[from] hex::Error),
    /// Serde Json error
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl Default for Secret {
    fn default() -> Self {
        Self::generate()
    }
}

impl Secret {
    /// Create new [`Secret`]
    #[inline]
    pub fn new<S>(secret: S) -> Result<Self, Error>
    where
        S: Into<String>,
    {
        let secret_str = secret.into();
        if secret_str.chars().count() > MAX_SECRET_LENGTH {
            return Err(Error::InvalidLength);
        }
        Ok(Self(secret_str))
    }

    /// Generate a new random secret as the recommended 32 byte hex
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut random_bytes = [0u8; 32];
        rng.fill_bytes(&mut random_bytes);
        Self(hex::encode(random_bytes))
    }

    /// [`Secret`] as bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// [`Secret`] to bytes
    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Check if secret is a P2PK well-known secret
    pub fn is_p2pk(&self) -> bool {
        use crate::nuts::nut10;

        matches!(
            serde_json::from_str::<nut10::Secret>(&self.0),
            Ok(secret) if secret.kind() == nut10::Kind::P2PK
        )
    }
}

impl FromStr for Secret {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Secret> for Vec<u8> {
    fn from(value: Secret) -> Vec<u8> {
        value.to_bytes()
    }
}

impl TryFrom<&Secret> for crate::nuts::nut10::Secret {
    type Error = Error;

    fn try_from(unchecked_secret: &Secret) -> Result<crate::nuts::nut10::Secret, Self::Error> {
        Ok(serde_json::from_str(&unchecked_secret.0)?)
    }
}
