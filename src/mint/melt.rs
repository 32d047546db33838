//! Melt-quote engine

use std::str::FromStr;

use lightning_invoice::Bolt11Invoice;
use tracing::instrument;

use super::{Mint, BOLT11_METHOD, SAT_UNIT};
use crate::database;
use crate::lightning::{self, PayInvoiceResponse, PaymentStatus};
use crate::nuts::nut11::{self, proofs_sig_all};
use crate::nuts::{MeltQuoteState, MintQuoteState, Proofs, ProofsMethods};
use crate::types::{MeltQuote, MintQuote};
use crate::util::unix_time;
use crate::{Amount, Error};

impl Mint {
    /// Process a request to melt tokens into a Lightning payment, returning
    /// a priced quote.
    ///
    /// When a mint quote with the same payment hash already exists the
    /// invoice was issued by this mint: the quote is seeded for internal
    /// settlement with the canonical invoice string and a zero fee reserve.
    ///
    /// See [NUT-05](https://github.com/cashubtc/nuts/blob/main/05.md)
    #[instrument(skip(self, request))]
    pub async fn request_melt_quote(
        &self,
        method: &str,
        request: &str,
        unit: &str,
    ) -> Result<MeltQuote, Error> {
        if method != BOLT11_METHOD {
            return Err(Error::PaymentMethodNotSupported);
        }
        if unit != SAT_UNIT {
            return Err(Error::UnitNotSupported);
        }

        let bolt11 =
            Bolt11Invoice::from_str(request).map_err(|e| Error::InvalidInvoice(e.to_string()))?;
        let msat = bolt11
            .amount_milli_satoshis()
            .filter(|msat| *msat > 0)
            .ok_or(Error::AmountlessInvoice)?;
        let amount = Amount::from_msat(msat);

        let limits = self.limits();
        if limits.melt_max_amount > Amount::ZERO && amount > limits.melt_max_amount {
            return Err(Error::MeltAmountExceeded);
        }

        let fee_reserve = self.lightning().fee_reserve(amount);

        let mut quote = MeltQuote::new(
            request.to_string(),
            bolt11.payment_hash().to_string(),
            amount,
            fee_reserve,
            unix_time() + self.quote_expiry_secs(),
        );

        // A mint quote with the same payment hash means the invoice is our
        // own and the melt can settle internally, so no routing fee applies
        if let Some(mint_quote) = self
            .localstore()
            .get_mint_quote_by_payment_hash(&quote.payment_hash)
            .await?
        {
            quote.invoice_request = mint_quote.payment_request;
            quote.payment_hash = mint_quote.payment_hash;
            quote.fee_reserve = Amount::ZERO;
        }

        self.localstore().add_melt_quote(quote.clone()).await?;

        tracing::debug!("Created melt quote {} for {} sat", quote.id, amount);

        Ok(quote)
    }

    /// Current state of a melt quote. A `Pending` quote probes the
    /// backend's outgoing-payment status and converges to `Paid` or back to
    /// `Unpaid` when the outcome is definitive.
    #[instrument(skip(self))]
    pub async fn get_melt_quote_state(
        &self,
        method: &str,
        quote_id: &str,
    ) -> Result<MeltQuote, Error> {
        if method != BOLT11_METHOD {
            return Err(Error::PaymentMethodNotSupported);
        }

        let mut quote = self
            .localstore()
            .get_melt_quote(quote_id)
            .await?
            .ok_or(Error::UnknownQuote)?;

        if quote.state == MeltQuoteState::Pending {
            match self
                .lightning()
                .outgoing_payment_status(&quote.payment_hash)
                .await
            {
                Ok(PayInvoiceResponse {
                    status: PaymentStatus::Pending,
                    ..
                }) => {}
                Ok(PayInvoiceResponse {
                    status: PaymentStatus::Succeeded,
                    preimage,
                }) => {
                    self.settle_melt(&mut quote, preimage).await?;
                }
                Ok(PayInvoiceResponse {
                    status: PaymentStatus::Failed,
                    ..
                })
                | Err(lightning::Error::PaymentFailed) => {
                    self.unlock_melt(&mut quote).await?;
                }
                Err(err) => {
                    // Transient; leave the quote untouched
                    tracing::warn!(
                        "Could not get status for melt quote {}: {err}",
                        quote.id
                    );
                }
            }
        }

        Ok(quote)
    }

    /// Validate the proofs, lock them to the quote and attempt the payment.
    ///
    /// Once the proofs are pending and the payment has been handed to the
    /// backend the attempt is never aborted; only the outgoing-status probe
    /// may move the quote out of `Pending`.
    #[instrument(skip(self, proofs))]
    pub async fn melt_tokens(
        &self,
        method: &str,
        quote_id: &str,
        proofs: Proofs,
    ) -> Result<MeltQuote, Error> {
        let ys = proofs.ys().map_err(|_| Error::InvalidProof)?;

        if method != BOLT11_METHOD {
            return Err(Error::PaymentMethodNotSupported);
        }

        let mut quote = self
            .localstore()
            .get_melt_quote(quote_id)
            .await?
            .ok_or(Error::UnknownQuote)?;
        match quote.state {
            MeltQuoteState::Paid => return Err(Error::MeltQuoteAlreadyPaid),
            MeltQuoteState::Pending => return Err(Error::MeltQuotePending),
            MeltQuoteState::Unpaid => {}
        }

        self.verify_proofs(&proofs, &ys).await?;

        let fees = self.transaction_fees(&proofs)?;
        let proofs_amount = proofs.total_amount().map_err(|_| Error::InvalidProof)?;
        let required = quote
            .amount
            .checked_add(quote.fee_reserve)
            .and_then(|amount| amount.checked_add(fees))
            .ok_or(Error::InsufficientProofsAmount)?;
        if proofs_amount < required {
            return Err(Error::InsufficientProofsAmount);
        }

        if proofs_sig_all(&proofs) {
            return Err(nut11::Error::SigAllOnlySwap.into());
        }

        // Lock: claim the Ys into the pending table, then move the quote to
        // Pending. The claim linearizes concurrent spends of the same proof.
        self.localstore()
            .add_pending_proofs(&quote.id, &proofs)
            .await
            .map_err(|err| match err {
                database::Error::AlreadySpent => Error::ProofAlreadyUsed,
                database::Error::AlreadyPending => Error::ProofPending,
                err => Error::from(err),
            })?;

        if let Err(err) = self
            .localstore()
            .update_melt_quote_state(&quote.id, MeltQuoteState::Pending, None)
            .await
        {
            // Lost the quote race; release the claim
            self.localstore().remove_pending_proofs(&quote.id).await?;
            return Err(match err {
                database::Error::InvalidStateTransition { .. } => Error::MeltQuotePending,
                err => Error::from(err),
            });
        }
        quote.state = MeltQuoteState::Pending;

        // Settle internally when the invoice is our own
        if let Some(mint_quote) = self
            .localstore()
            .get_mint_quote_by_payment_hash(&quote.payment_hash)
            .await?
        {
            return self.settle_quotes_internally(mint_quote, quote).await;
        }

        match self
            .lightning()
            .send_payment(&quote.invoice_request, quote.fee_reserve)
            .await
        {
            Err(lightning::Error::PaymentError(err)) => {
                // Definitive rejection, nothing is in flight
                tracing::info!("Payment for melt quote {} rejected: {err}", quote.id);
                self.unlock_melt(&mut quote).await?;
                Ok(quote)
            }
            Err(err) => {
                // Outcome unknown; converge through the status probe
                tracing::warn!(
                    "Send payment for melt quote {} ambiguous: {err}",
                    quote.id
                );
                self.probe_outgoing_payment(quote).await
            }
            Ok(PayInvoiceResponse {
                status: PaymentStatus::Succeeded,
                preimage,
            }) => {
                self.settle_melt(&mut quote, preimage).await?;
                Ok(quote)
            }
            Ok(PayInvoiceResponse {
                status: PaymentStatus::Pending,
                ..
            }) => Ok(quote),
            Ok(PayInvoiceResponse {
                status: PaymentStatus::Failed,
                ..
            }) => self.probe_outgoing_payment(quote).await,
        }
    }

    /// Disambiguate an uncertain send-payment outcome through the backend's
    /// outgoing-payment status. A payment must never end up both pending
    /// forever and actually paid; anything short of a definitive answer
    /// leaves the quote `Pending` for a later probe.
    async fn probe_outgoing_payment(&self, mut quote: MeltQuote) -> Result<MeltQuote, Error> {
        match self
            .lightning()
            .outgoing_payment_status(&quote.payment_hash)
            .await
        {
            Ok(PayInvoiceResponse {
                status: PaymentStatus::Pending,
                ..
            }) => Ok(quote),
            Ok(PayInvoiceResponse {
                status: PaymentStatus::Succeeded,
                preimage,
            }) => {
                self.settle_melt(&mut quote, preimage).await?;
                Ok(quote)
            }
            Ok(PayInvoiceResponse {
                status: PaymentStatus::Failed,
                ..
            })
            | Err(lightning::Error::PaymentFailed) => {
                self.unlock_melt(&mut quote).await?;
                Ok(quote)
            }
            Err(err) => {
                tracing::warn!(
                    "Status probe for melt quote {} ambiguous, staying pending: {err}",
                    quote.id
                );
                Ok(quote)
            }
        }
    }

    /// Settle a melt against our own invoice without touching the network:
    /// the preimage comes straight from the backend's invoice record, the
    /// proofs are burned and both quotes end `Paid`.
    async fn settle_quotes_internally(
        &self,
        mint_quote: MintQuote,
        mut quote: MeltQuote,
    ) -> Result<MeltQuote, Error> {
        let invoice = self
            .lightning()
            .invoice_status(&mint_quote.payment_hash)
            .await?;

        self.settle_melt(&mut quote, invoice.preimage).await?;

        if mint_quote.state == MintQuoteState::Unpaid {
            self.localstore()
                .update_mint_quote_state(&mint_quote.id, MintQuoteState::Paid)
                .await?;
        }

        tracing::debug!(
            "Settled melt quote {} internally against mint quote {}",
            quote.id,
            mint_quote.id
        );

        Ok(quote)
    }

    /// Burn the quote's pending proofs and mark it `Paid` with the
    /// preimage. The pending to spent move is a single storage operation.
    async fn settle_melt(
        &self,
        quote: &mut MeltQuote,
        preimage: Option<String>,
    ) -> Result<(), Error> {
        self.localstore().finalize_pending_proofs(&quote.id).await?;
        self.localstore()
            .update_melt_quote_state(&quote.id, MeltQuoteState::Paid, preimage.clone())
            .await?;

        quote.state = MeltQuoteState::Paid;
        quote.preimage = preimage;

        Ok(())
    }

    /// Release the quote's pending proofs and return it to `Unpaid` after a
    /// definitive payment failure
    async fn unlock_melt(&self, quote: &mut MeltQuote) -> Result<(), Error> {
        self.localstore().remove_pending_proofs(&quote.id).await?;
        self.localstore()
            .update_melt_quote_state(&quote.id, MeltQuoteState::Unpaid, None)
            .await?;

        quote.state = MeltQuoteState::Unpaid;
        quote.preimage = None;

        Ok(())
    }
}
