//! NUT-09: Restore signatures
//!
//! <https://github.com/cashubtc/nuts/blob/main/09.md>

use serde::{Deserialize, Serialize};

use super::nut00::{BlindSignature, BlindedMessage};

/// Restore request [NUT-09]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    /// Blinded messages whose signatures should be recovered
    pub outputs: Vec<BlindedMessage>,
}

/// Restore response [NUT-09]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResponse {
    /// Outputs for which a signature was found, in request order
    pub outputs: Vec<BlindedMessage>,
    /// The stored signatures, paired with `outputs`
    pub signatures: Vec<BlindSignature>,
}
