//! NUT-05: Melting tokens via Bolt11
//!
//! <https://github.com/cashubtc/nuts/blob/main/05.md>

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nut00::{CurrencyUnit, Proofs};
use crate::Amount;

/// NUT05 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown quote state
    #[error("Unknown quote state")]
    UnknownState,
}

/// Possible states of a melt quote
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuoteState {
    /// Quote has not been paid
    #[default]
    Unpaid,
    /// A payment attempt is in flight
    Pending,
    /// Payment settled, proofs burned
    Paid,
}

impl fmt::Display for QuoteState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unpaid => write!(f, "UNPAID"),
            Self::Pending => write!(f, "PENDING"),
            Self::Paid => write!(f, "PAID"),
        }
    }
}

impl FromStr for QuoteState {
    type Err = Error;

    fn from_str(state: &str) -> Result<Self, Self::Err> {
        match state {
            "UNPAID" => Ok(Self::Unpaid),
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            _ => Err(Error::UnknownState),
        }
    }
}

/// Melt quote request [NUT-05]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuoteBolt11Request {
    /// Bolt11 invoice to be paid
    pub request: String,
    /// Unit wallet would like to pay with
    pub unit: CurrencyUnit,
}

/// Melt quote response [NUT-05]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuoteBolt11Response {
    /// Quote Id
    pub quote: String,
    /// The amount that needs to be provided
    pub amount: Amount,
    /// The fee reserve that is required
    pub fee_reserve: Amount,
    /// Quote state
    pub state: QuoteState,
    /// Deprecated convenience flag, equals `state == Paid`. The
    /// authoritative value is `state`.
    pub paid: bool,
    /// Unix timestamp until which the quote is valid
    pub expiry: u64,
    /// Preimage of the paid invoice, set iff state is `Paid`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_preimage: Option<String>,
}

/// Melt request [NUT-05]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltRequest {
    /// Quote id
    pub quote: String,
    /// Proofs to melt
    pub inputs: Proofs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [QuoteState::Unpaid, QuoteState::Pending, QuoteState::Paid] {
            assert_eq!(QuoteState::from_str(&state.to_string()).unwrap(), state);
        }
        assert!(QuoteState::from_str("ISSUED").is_err());
    }
}
