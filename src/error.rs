//! Errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// nutmint Error
#[derive(Debug, Error)]
pub enum Error {
    /// Payment method is not supported, only bolt11 is
    #[error("Payment method not supported")]
    PaymentMethodNotSupported,
    /// Unit is not supported, only sat is
    #[error("Unit not supported")]
    UnitNotSupported,
    /// Quote id is not known to the mint
    #[error("Quote does not exist")]
    UnknownQuote,
    /// Mint redemption attempted before invoice settlement
    #[error("Quote request has not been paid")]
    MintQuoteNotPaid,
    /// Second mint redemption on the same quote
    #[error("Tokens have already been issued for quote")]
    MintQuoteAlreadyIssued,
    /// Blinded output sum exceeds quote amount
    #[error("Blinded messages amount is over quote amount")]
    OutputsOverQuoteAmount,
    /// Blinded output sum is zero or overflowed
    #[error("Invalid blinded message amount")]
    InvalidBlindedMessageAmount,
    /// `B_` has been signed before
    #[error("Blinded message has already been signed")]
    BlindedMessageAlreadySigned,
    /// Signing requested with a retired keyset
    #[error("Signature request with inactive keyset")]
    InactiveKeyset,
    /// Keyset id is not known to the mint
    #[error("Unknown keyset")]
    UnknownKeyset,
    /// Proof failed verification
    #[error("Invalid proof")]
    InvalidProof,
    /// Proof has already been spent
    #[error("Proof already used")]
    ProofAlreadyUsed,
    /// Proof is locked to an in-flight melt
    #[error("Proof is pending")]
    ProofPending,
    /// Duplicate `Y` within one request
    #[error("Duplicate proofs")]
    DuplicateProofs,
    /// Empty input list
    #[error("No proofs provided")]
    NoProofsProvided,
    /// Inputs do not cover outputs plus fees
    #[error("Insufficient proofs amount")]
    InsufficientProofsAmount,
    /// Double melt on a paid quote
    #[error("Melt quote has already been paid")]
    MeltQuoteAlreadyPaid,
    /// Double melt on an in-flight quote
    #[error("Melt quote is pending")]
    MeltQuotePending,
    /// Melting policy limit exceeded
    #[error("Melt amount exceeds limit")]
    MeltAmountExceeded,
    /// Minting policy limit exceeded
    #[error("Mint amount exceeds limit")]
    MintAmountExceeded,
    /// Minting would exceed the configured balance cap
    #[error("Minting is disabled")]
    MintingDisabled,
    /// Invoice could not be decoded
    #[error("Invalid invoice: {0}")]
    InvalidInvoice(String),
    /// Invoice carries no amount
    #[error("Invoice has no amount")]
    AmountlessInvoice,
    /// Lightning backend failure. Logged in detail, reported generically.
    #[error(transparent)]
    Lightning(#[from] crate::lightning::Error),
    /// Storage failure. Logged in detail, reported generically.
    #[error(transparent)]
    Database(#[from] crate::database::Error),
    /// NUT02 error
    #[error(transparent)]
    NUT02(#[from] crate::nuts::nut02::Error),
    /// NUT11 error
    #[error(transparent)]
    NUT11(#[from] crate::nuts::nut11::Error),
    /// NUT12 error
    #[error(transparent)]
    NUT12(#[from] crate::nuts::nut12::Error),
    /// DHKE error
    #[error(transparent)]
    DHKE(#[from] crate::dhke::Error),
}

/// Stable error codes carried on the wire, from the NUT error registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Token could not be verified (10001)
    TokenNotVerified,
    /// Token is already spent (11001)
    TokenAlreadySpent,
    /// Token is pending (11002)
    TokenPending,
    /// Blinded message of output already signed (11003)
    BlindedMessageAlreadySigned,
    /// Transaction is not balanced (11005)
    TransactionUnbalanced,
    /// Amount outside of limit range (11006)
    AmountOutOfLimitRange,
    /// Duplicate inputs provided (11007)
    DuplicateInputs,
    /// Unit in request is not supported (11013)
    UnsupportedUnit,
    /// Keyset is not known (12001)
    KeysetNotFound,
    /// Keyset is inactive, cannot sign messages (12002)
    KeysetInactive,
    /// Quote request is not paid (20001)
    QuoteNotPaid,
    /// Tokens have already been issued for quote (20002)
    TokensAlreadyIssued,
    /// Minting is disabled (20003)
    MintingDisabled,
    /// Quote is pending (20005)
    QuotePending,
    /// Witness is missing or invalid (20008)
    WitnessMissingOrInvalid,
    /// Unknown or internal error (1000)
    Unknown,
}

impl ErrorCode {
    /// Numeric wire representation
    pub fn to_code(self) -> u16 {
        match self {
            Self::TokenNotVerified => 10001,
            Self::TokenAlreadySpent => 11001,
            Self::TokenPending => 11002,
            Self::BlindedMessageAlreadySigned => 11003,
            Self::TransactionUnbalanced => 11005,
            Self::AmountOutOfLimitRange => 11006,
            Self::DuplicateInputs => 11007,
            Self::UnsupportedUnit => 11013,
            Self::KeysetNotFound => 12001,
            Self::KeysetInactive => 12002,
            Self::QuoteNotPaid => 20001,
            Self::TokensAlreadyIssued => 20002,
            Self::MintingDisabled => 20003,
            Self::QuotePending => 20005,
            Self::WitnessMissingOrInvalid => 20008,
            Self::Unknown => 1000,
        }
    }
}

/// Error body returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable numeric code
    pub code: u16,
    /// Human readable detail
    pub detail: String,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        let code = match err {
            Error::BlindedMessageAlreadySigned => ErrorCode::BlindedMessageAlreadySigned,
            Error::InvalidProof | Error::DHKE(_) => ErrorCode::TokenNotVerified,
            Error::ProofAlreadyUsed => ErrorCode::TokenAlreadySpent,
            Error::ProofPending => ErrorCode::TokenPending,
            Error::InsufficientProofsAmount
            | Error::OutputsOverQuoteAmount
            | Error::InvalidBlindedMessageAmount
            | Error::NoProofsProvided => ErrorCode::TransactionUnbalanced,
            Error::DuplicateProofs => ErrorCode::DuplicateInputs,
            Error::UnitNotSupported => ErrorCode::UnsupportedUnit,
            Error::MintAmountExceeded | Error::MeltAmountExceeded => {
                ErrorCode::AmountOutOfLimitRange
            }
            Error::UnknownKeyset => ErrorCode::KeysetNotFound,
            Error::InactiveKeyset => ErrorCode::KeysetInactive,
            Error::MintQuoteNotPaid => ErrorCode::QuoteNotPaid,
            Error::MintQuoteAlreadyIssued => ErrorCode::TokensAlreadyIssued,
            Error::MintingDisabled => ErrorCode::MintingDisabled,
            Error::MeltQuotePending => ErrorCode::QuotePending,
            Error::NUT11(_) => ErrorCode::WitnessMissingOrInvalid,
            _ => ErrorCode::Unknown,
        };

        // Internal failures are logged with detail but reported generically
        // so backend and storage state does not leak to callers
        let detail = match err {
            Error::Lightning(err) => {
                tracing::error!("Lightning backend error: {err}");
                "Lightning backend error".to_string()
            }
            Error::Database(err) => {
                tracing::error!("Database error: {err}");
                "Internal storage error".to_string()
            }
            _ => err.to_string(),
        };

        Self {
            code: code.to_code(),
            detail,
        }
    }
}
