//! Mint-side quote records

use serde::{Deserialize, Serialize};

use crate::nuts::{
    MeltQuoteBolt11Response, MeltQuoteState, MintQuoteBolt11Response, MintQuoteState,
};
use crate::util::random_quote_id;
use crate::Amount;

/// Mint quote tracked by the mint until issuance
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuote {
    /// Quote id
    pub id: String,
    /// Amount of quote
    pub amount: Amount,
    /// Bolt11 invoice the wallet has to pay
    pub payment_request: String,
    /// Payment hash of the invoice
    pub payment_hash: String,
    /// Quote state
    pub state: MintQuoteState,
    /// Expiration time of quote
    pub expiry: u64,
}

impl MintQuote {
    /// Create a new [`MintQuote`] in the `Unpaid` state with a random id
    pub fn new(amount: Amount, payment_request: String, payment_hash: String, expiry: u64) -> Self {
        Self {
            id: random_quote_id(),
            amount,
            payment_request,
            payment_hash,
            state: MintQuoteState::Unpaid,
            expiry,
        }
    }
}

impl From<&MintQuote> for MintQuoteBolt11Response {
    fn from(quote: &MintQuote) -> Self {
        Self {
            quote: quote.id.clone(),
            request: quote.payment_request.clone(),
            state: quote.state,
            paid: quote.state.is_paid(),
            expiry: quote.expiry,
        }
    }
}

/// Melt quote tracked by the mint across a payment attempt
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuote {
    /// Quote id
    pub id: String,
    /// Bolt11 invoice the mint will pay
    pub invoice_request: String,
    /// Payment hash of the invoice
    pub payment_hash: String,
    /// Amount of the invoice
    pub amount: Amount,
    /// Fee reserve required on top of the amount
    pub fee_reserve: Amount,
    /// Quote state
    pub state: MeltQuoteState,
    /// Expiration time of quote
    pub expiry: u64,
    /// Preimage of the paid invoice, set iff state is `Paid`
    pub preimage: Option<String>,
}

impl MeltQuote {
    /// Create a new [`MeltQuote`] in the `Unpaid` state with a random id
    pub fn new(
        invoice_request: String,
        payment_hash: String,
        amount: Amount,
        fee_reserve: Amount,
        expiry: u64,
    ) -> Self {
        Self {
            id: random_quote_id(),
            invoice_request,
            payment_hash,
            amount,
            fee_reserve,
            state: MeltQuoteState::Unpaid,
            expiry,
            preimage: None,
        }
    }
}

impl From<&MeltQuote> for MeltQuoteBolt11Response {
    fn from(quote: &MeltQuote) -> Self {
        Self {
            quote: quote.id.clone(),
            amount: quote.amount,
            fee_reserve: quote.fee_reserve,
            state: quote.state,
            paid: quote.state == MeltQuoteState::Paid,
            expiry: quote.expiry,
            payment_preimage: quote.preimage.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_quote_response() {
        let mut quote = MintQuote::new(
            Amount::from(100),
            "lnbc1...".to_string(),
            "deadbeef".to_string(),
            1_000,
        );

        let response = MintQuoteBolt11Response::from(&quote);
        assert_eq!(response.quote, quote.id);
        assert_eq!(response.state, MintQuoteState::Unpaid);
        assert!(!response.paid);

        // The deprecated boolean tracks the state
        quote.state = MintQuoteState::Issued;
        let response = MintQuoteBolt11Response::from(&quote);
        assert!(response.paid);
    }

    #[test]
    fn test_melt_quote_response() {
        let mut quote = MeltQuote::new(
            "lnbc1...".to_string(),
            "deadbeef".to_string(),
            Amount::from(100),
            Amount::from(2),
            1_000,
        );

        let response = MeltQuoteBolt11Response::from(&quote);
        assert_eq!(response.fee_reserve, Amount::from(2));
        assert!(!response.paid);
        assert_eq!(response.payment_preimage, None);

        quote.state = MeltQuoteState::Paid;
        quote.preimage = Some("00".repeat(32));
        let response = MeltQuoteBolt11Response::from(&quote);
        assert!(response.paid);
        assert_eq!(response.payment_preimage, quote.preimage);

        // Two fresh quotes never share an id
        let other = MeltQuote::new(
            "lnbc1...".to_string(),
            "deadbeef".to_string(),
            Amount::from(100),
            Amount::from(2),
            1_000,
        );
        assert_ne!(other.id, quote.id);
    }
}
