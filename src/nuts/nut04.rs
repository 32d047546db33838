//! NUT-04: Mint tokens via Bolt11
//!
//! <https://github.com/cashubtc/nuts/blob/main/04.md>

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nut00::{BlindSignature, BlindedMessage, CurrencyUnit};
use crate::Amount;

/// NUT04 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown quote state
    #[error("Unknown quote state")]
    UnknownState,
}

/// Possible states of a mint quote
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuoteState {
    /// Quote has not been paid
    #[default]
    Unpaid,
    /// Quote has been paid and wallet can mint
    Paid,
    /// Ecash issued for quote
    Issued,
}

impl QuoteState {
    /// Whether the backing invoice has been settled
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid | Self::Issued)
    }
}

impl fmt::Display for QuoteState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unpaid => write!(f, "UNPAID"),
            Self::Paid => write!(f, "PAID"),
            Self::Issued => write!(f, "ISSUED"),
        }
    }
}

impl FromStr for QuoteState {
    type Err = Error;

    fn from_str(state: &str) -> Result<Self, Self::Err> {
        match state {
            "UNPAID" => Ok(Self::Unpaid),
            "PAID" => Ok(Self::Paid),
            "ISSUED" => Ok(Self::Issued),
            _ => Err(Error::UnknownState),
        }
    }
}

/// Mint quote request [NUT-04]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuoteBolt11Request {
    /// Amount
    pub amount: Amount,
    /// Unit wallet would like to pay with
    pub unit: CurrencyUnit,
}

/// Mint quote response [NUT-04]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuoteBolt11Response {
    /// Quote Id
    pub quote: String,
    /// Payment request to fulfil
    pub request: String,
    /// Quote state
    pub state: QuoteState,
    /// Deprecated convenience flag, equals `state ∈ {Paid, Issued}`. The
    /// authoritative value is `state`.
    pub paid: bool,
    /// Unix timestamp until which the quote is valid
    pub expiry: u64,
}

/// Mint request [NUT-04]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRequest {
    /// Quote id
    pub quote: String,
    /// Blinded outputs to sign
    pub outputs: Vec<BlindedMessage>,
}

/// Mint response [NUT-04]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintResponse {
    /// Blind signatures
    pub signatures: Vec<BlindSignature>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [QuoteState::Unpaid, QuoteState::Paid, QuoteState::Issued] {
            assert_eq!(QuoteState::from_str(&state.to_string()).unwrap(), state);
        }
        assert!(QuoteState::from_str("PENDING").is_err());
    }

    #[test]
    fn test_response_paid_alias() {
        let response = MintQuoteBolt11Response {
            quote: "q".to_string(),
            request: "lnbc1...".to_string(),
            state: QuoteState::Paid,
            paid: QuoteState::Paid.is_paid(),
            expiry: 0,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""state":"PAID""#));
        assert!(json.contains(r#""paid":true"#));
    }
}
