//! Fake Lightning backend
//!
//! Deterministic in-memory backend for tests: it issues real bolt11
//! invoices with known preimages and lets tests script the outcome of
//! payment attempts and status probes.

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::hashes::{sha256, Hash};
use bitcoin::secp256k1::rand::{self, RngCore};
use bitcoin::secp256k1::SecretKey;
use lightning_invoice::{Bolt11Invoice, Currency, InvoiceBuilder, PaymentSecret};
use tokio::sync::{Mutex, RwLock};

use super::{
    CreateInvoiceResponse, Error, InvoiceStatusResponse, MintLightning, PayInvoiceResponse,
    PaymentStatus,
};
use crate::util::{hex, unix_time, SECP256K1};
use crate::Amount;

const INVOICE_EXPIRY_SECS: u64 = 3600;

/// Outcome the fake backend should produce for the next `send_payment` call
#[derive(Debug, Clone, Copy)]
pub enum SendOutcome {
    /// Return the given status, with the invoice preimage on success
    Status(PaymentStatus),
    /// Fail with [`Error::PaymentError`], the definitive rejection
    PaymentError,
    /// Fail with [`Error::Connection`], the ambiguous outcome
    ConnectionError,
}

/// Outcome the fake backend should produce for the next
/// `outgoing_payment_status` probe
#[derive(Debug, Clone, Copy)]
pub enum StatusOutcome {
    /// Return the given status, with the invoice preimage on success
    Status(PaymentStatus),
    /// Fail with [`Error::PaymentFailed`], the definitive failure
    PaymentFailed,
    /// Fail with [`Error::Connection`], the ambiguous outcome
    ConnectionError,
}

/// An invoice known to the fake backend
#[derive(Debug, Clone)]
pub struct FakeInvoice {
    /// Bolt11 payment request
    pub payment_request: String,
    /// Payment hash, hex encoded
    pub payment_hash: String,
    /// Preimage, hex encoded
    pub preimage: String,
    /// Invoice amount
    pub amount: Amount,
}

#[derive(Debug, Clone)]
struct InvoiceState {
    invoice: FakeInvoice,
    settled: bool,
}

/// In-memory Lightning backend test double
#[derive(Debug, Default)]
pub struct FakeLightning {
    /// Invoices issued by this node, by payment hash
    invoices: RwLock<HashMap<String, InvoiceState>>,
    /// External invoices this node is able to pay, by payment hash
    payable: RwLock<HashMap<String, FakeInvoice>>,
    /// Recorded outgoing payment outcomes, by payment hash
    payments: RwLock<HashMap<String, PayInvoiceResponse>>,
    scripted_sends: Mutex<VecDeque<SendOutcome>>,
    scripted_statuses: Mutex<VecDeque<StatusOutcome>>,
    send_payment_calls: AtomicUsize,
}

fn build_invoice(amount: Amount, preimage: &[u8; 32]) -> FakeInvoice {
    let payment_hash = sha256::Hash::hash(preimage);

    let node_key = SecretKey::from_slice(&[0x42; 32]).expect("static key is valid");

    let invoice = InvoiceBuilder::new(Currency::Bitcoin)
        .description("fake backend invoice".to_string())
        .payment_hash(payment_hash)
        .payment_secret(PaymentSecret([42; 32]))
        .amount_milli_satoshis(amount.to_sat() * 1000)
        .current_timestamp()
        .min_final_cltv_expiry_delta(144)
        .expiry_time(Duration::from_secs(INVOICE_EXPIRY_SECS))
        .build_signed(|hash| SECP256K1.sign_ecdsa_recoverable(hash, &node_key))
        .expect("invoice parameters are valid");

    FakeInvoice {
        payment_request: invoice.to_string(),
        payment_hash: payment_hash.to_string(),
        preimage: hex::encode(preimage),
        amount,
    }
}

fn random_preimage() -> [u8; 32] {
    let mut rng = rand::thread_rng();
    let mut preimage = [0u8; 32];
    rng.fill_bytes(&mut preimage);
    preimage
}

impl FakeLightning {
    /// Create a new [`FakeLightning`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Settle an invoice previously issued by [`create_invoice`], as if a
    /// payer had paid it externally
    ///
    /// [`create_invoice`]: MintLightning::create_invoice
    pub async fn settle_invoice(&self, payment_hash: &str) {
        if let Some(state) = self.invoices.write().await.get_mut(payment_hash) {
            state.settled = true;
        }
    }

    /// Register an invoice from another node that `send_payment` is able to
    /// settle
    pub async fn add_payable_invoice(&self, amount: Amount) -> FakeInvoice {
        let invoice = build_invoice(amount, &random_preimage());
        self.payable
            .write()
            .await
            .insert(invoice.payment_hash.clone(), invoice.clone());
        invoice
    }

    /// Script the outcome of the next `send_payment` call. Scripted
    /// outcomes are consumed in FIFO order before default behavior applies.
    pub async fn script_send_outcome(&self, outcome: SendOutcome) {
        self.scripted_sends.lock().await.push_back(outcome);
    }

    /// Script the outcome of the next `outgoing_payment_status` probe
    pub async fn script_status_outcome(&self, outcome: StatusOutcome) {
        self.scripted_statuses.lock().await.push_back(outcome);
    }

    /// How many times `send_payment` has been called
    pub fn send_payment_calls(&self) -> usize {
        self.send_payment_calls.load(Ordering::SeqCst)
    }

    async fn known_preimage(&self, payment_hash: &str) -> Option<String> {
        if let Some(invoice) = self.payable.read().await.get(payment_hash) {
            return Some(invoice.preimage.clone());
        }
        self.invoices
            .read()
            .await
            .get(payment_hash)
            .map(|state| state.invoice.preimage.clone())
    }

    async fn record_payment(&self, payment_hash: &str, response: PayInvoiceResponse) {
        self.payments
            .write()
            .await
            .insert(payment_hash.to_string(), response);
    }
}

#[async_trait]
impl MintLightning for FakeLightning {
    async fn create_invoice(&self, amount: Amount) -> Result<CreateInvoiceResponse, Error> {
        let invoice = build_invoice(amount, &random_preimage());

        self.invoices.write().await.insert(
            invoice.payment_hash.clone(),
            InvoiceState {
                invoice: invoice.clone(),
                settled: false,
            },
        );

        Ok(CreateInvoiceResponse {
            payment_request: invoice.payment_request,
            payment_hash: invoice.payment_hash,
            expiry: unix_time() + INVOICE_EXPIRY_SECS,
            amount,
        })
    }

    async fn invoice_status(&self, payment_hash: &str) -> Result<InvoiceStatusResponse, Error> {
        let invoices = self.invoices.read().await;
        let state = invoices.get(payment_hash).ok_or(Error::InvoiceNotFound)?;

        Ok(InvoiceStatusResponse {
            settled: state.settled,
            // This node generated the preimage, it is always known
            preimage: Some(state.invoice.preimage.clone()),
            amount: state.invoice.amount,
        })
    }

    async fn send_payment(
        &self,
        bolt11: &str,
        _max_fee: Amount,
    ) -> Result<PayInvoiceResponse, Error> {
        self.send_payment_calls.fetch_add(1, Ordering::SeqCst);

        let invoice =
            Bolt11Invoice::from_str(bolt11).map_err(|e| Error::PaymentError(e.to_string()))?;
        let payment_hash = invoice.payment_hash().to_string();

        if let Some(outcome) = self.scripted_sends.lock().await.pop_front() {
            return match outcome {
                SendOutcome::Status(status) => {
                    let preimage = match status {
                        PaymentStatus::Succeeded => self.known_preimage(&payment_hash).await,
                        _ => None,
                    };
                    let response = PayInvoiceResponse { status, preimage };
                    self.record_payment(&payment_hash, response.clone()).await;
                    Ok(response)
                }
                SendOutcome::PaymentError => {
                    Err(Error::PaymentError("no route found".to_string()))
                }
                SendOutcome::ConnectionError => {
                    Err(Error::Connection("backend unreachable".to_string()))
                }
            };
        }

        match self.known_preimage(&payment_hash).await {
            Some(preimage) => {
                let response = PayInvoiceResponse {
                    status: PaymentStatus::Succeeded,
                    preimage: Some(preimage),
                };
                self.record_payment(&payment_hash, response.clone()).await;
                Ok(response)
            }
            None => Err(Error::PaymentError("no route found".to_string())),
        }
    }

    async fn outgoing_payment_status(
        &self,
        payment_hash: &str,
    ) -> Result<PayInvoiceResponse, Error> {
        if let Some(outcome) = self.scripted_statuses.lock().await.pop_front() {
            return match outcome {
                StatusOutcome::Status(status) => {
                    let preimage = match status {
                        PaymentStatus::Succeeded => self.known_preimage(payment_hash).await,
                        _ => None,
                    };
                    Ok(PayInvoiceResponse { status, preimage })
                }
                StatusOutcome::PaymentFailed => Err(Error::PaymentFailed),
                StatusOutcome::ConnectionError => {
                    Err(Error::Connection("backend unreachable".to_string()))
                }
            };
        }

        match self.payments.read().await.get(payment_hash) {
            Some(response) => Ok(response.clone()),
            // Nothing known about this hash, the payment never left
            None => Err(Error::PaymentFailed),
        }
    }

    fn fee_reserve(&self, amount: Amount) -> Amount {
        Amount::from(std::cmp::max(1, amount.to_sat() / 100))
    }
}
