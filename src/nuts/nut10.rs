//! NUT-10: Spending conditions
//!
//! <https://github.com/cashubtc/nuts/blob/main/10.md>

use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};

/// Kind of spending condition
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Kind {
    /// NUT-11 Pay to Public Key
    #[default]
    P2PK,
}

/// Secret data committed to by a well-known secret
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq, Serialize)]
pub struct SecretData {
    /// Unique random string
    nonce: String,
    /// Expresses the spending condition specific to each kind
    data: String,
    /// Additional data committed to, used for feature extensions
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<Vec<String>>>,
}

impl SecretData {
    /// The condition data, e.g. the hex-encoded locking public key for P2PK
    pub fn data(&self) -> &str {
        &self.data
    }

    /// The condition tags
    pub fn tags(&self) -> Option<&Vec<Vec<String>>> {
        self.tags.as_ref()
    }
}

/// A well-known secret: a JSON tuple `[kind, {nonce, data, tags}]` carried
/// in a proof's secret field
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
pub struct Secret {
    /// Kind of the spending condition
    kind: Kind,
    secret_data: SecretData,
}

impl Secret {
    /// Create new [`Secret`]
    pub fn new<S, V>(kind: Kind, data: S, tags: Option<V>) -> Self
    where
        S: Into<String>,
        V: Into<Vec<Vec<String>>>,
    {
        let nonce = crate::secret::Secret::generate().to_string();

        Self {
            kind,
            secret_data: SecretData {
                nonce,
                data: data.into(),
                tags: tags.map(|v| v.into()),
            },
        }
    }

    /// Kind of the spending condition
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The committed secret data
    pub fn secret_data(&self) -> &SecretData {
        &self.secret_data
    }
}

impl Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // The well-known secret is serialized as a two element JSON array
        let mut s = serializer.serialize_tuple(2)?;
        s.serialize_element(&self.kind)?;
        s.serialize_element(&self.secret_data)?;
        s.end()
    }
}

impl TryFrom<Secret> for crate::secret::Secret {
    type Error = serde_json::Error;

    fn try_from(secret: Secret) -> Result<crate::secret::Secret, Self::Error> {
        // Generated secrets are far below the length ceiling
        Ok(crate::secret::Secret::new(serde_json::to_string(&secret)?)
            .expect("serialized well-known secret within length bound"))
    }
}
