//! Lightning backends for the mint

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::Amount;

pub mod fake;

/// Lightning backend Error
///
/// `PaymentError` and `PaymentFailed` are the two *definitive* failure
/// signals; the melt engine unlocks proofs on them. Every other error is
/// treated as ambiguous and resolved through
/// [`MintLightning::outgoing_payment_status`].
#[derive(Debug, Error)]
pub enum Error {
    /// The backend rejected the payment outright; no payment is in flight
    #[error("payment error: {0}")]
    PaymentError(String),
    /// The backend reports the payment definitively failed
    #[error("payment failed")]
    PaymentFailed,
    /// No invoice is known for the payment hash
    #[error("Invoice not found")]
    InvoiceNotFound,
    /// Connection level failure, outcome unknown
    #[error("Connection error: {0}")]
    Connection(String),
    /// Anything else the backend reports
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

/// Status of an outgoing payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    /// Payment is in flight
    Pending,
    /// Payment settled
    Succeeded,
    /// Payment failed
    Failed,
}

/// Response from creating an invoice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInvoiceResponse {
    /// Bolt11 payment request
    pub payment_request: String,
    /// Payment hash, hex encoded
    pub payment_hash: String,
    /// Unix timestamp the invoice expires at
    pub expiry: u64,
    /// Invoice amount
    pub amount: Amount,
}

/// Response from an invoice status lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceStatusResponse {
    /// Whether the invoice has been settled
    pub settled: bool,
    /// Preimage, available once settled
    pub preimage: Option<String>,
    /// Invoice amount
    pub amount: Amount,
}

/// Response from sending a payment or probing its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayInvoiceResponse {
    /// Payment status
    pub status: PaymentStatus,
    /// Preimage, available on success
    pub preimage: Option<String>,
}

/// Surface of the Lightning node the mint core consumes.
///
/// All async calls may block arbitrarily long; the core holds no in-memory
/// locks across them. Timeouts are the backend's concern; a timed out call
/// should surface as an ambiguous error, not as `PaymentError` or
/// `PaymentFailed`.
#[async_trait]
pub trait MintLightning: std::fmt::Debug + Send + Sync {
    /// Create an invoice for `amount`
    async fn create_invoice(&self, amount: Amount) -> Result<CreateInvoiceResponse, Error>;

    /// Look up the settlement status of an invoice issued by this node
    async fn invoice_status(&self, payment_hash: &str) -> Result<InvoiceStatusResponse, Error>;

    /// Attempt an outgoing payment of `bolt11`, spending at most
    /// `max_fee` on routing
    async fn send_payment(
        &self,
        bolt11: &str,
        max_fee: Amount,
    ) -> Result<PayInvoiceResponse, Error>;

    /// Probe the status of an outgoing payment
    async fn outgoing_payment_status(
        &self,
        payment_hash: &str,
    ) -> Result<PayInvoiceResponse, Error>;

    /// Routing fee to reserve for paying `amount`
    fn fee_reserve(&self, amount: Amount) -> Amount;
}

/// Type alias for a shared lightning backend
pub type DynMintLightning = Arc<dyn MintLightning>;
