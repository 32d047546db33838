//! NUT-07: Token state check
//!
//! <https://github.com/cashubtc/nuts/blob/main/07.md>

use std::fmt;

use serde::{Deserialize, Serialize};

use super::nut01::PublicKey;

/// State of a proof as tracked by the mint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    /// Proof has not been seen by the mint
    Unspent,
    /// Proof is locked to an in-flight melt
    Pending,
    /// Proof has been consumed
    Spent,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unspent => write!(f, "UNSPENT"),
            Self::Pending => write!(f, "PENDING"),
            Self::Spent => write!(f, "SPENT"),
        }
    }
}

/// State of a single proof, keyed by its `Y`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofState {
    /// `Y = hash_to_curve(secret)`
    #[serde(rename = "Y")]
    pub y: PublicKey,
    /// State of proof
    pub state: State,
}

/// Check spendable request [NUT-07]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStateRequest {
    /// Ys of the proofs to check
    #[serde(rename = "Ys")]
    pub ys: Vec<PublicKey>,
}

/// Check spendable response [NUT-07]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStateResponse {
    /// Proof states, in request order
    pub states: Vec<ProofState>,
}
