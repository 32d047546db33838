//! Mint-quote engine

use tracing::instrument;

use super::{Mint, BOLT11_METHOD, SAT_UNIT};
use crate::database;
use crate::nuts::{BlindSignature, BlindedMessage, MintQuoteState, PublicKey};
use crate::types::MintQuote;
use crate::{Amount, Error};

impl Mint {
    /// Process a request to mint tokens, returning a quote with an invoice
    /// the wallet has to pay.
    ///
    /// See [NUT-04](https://github.com/cashubtc/nuts/blob/main/04.md)
    #[instrument(skip(self))]
    pub async fn request_mint_quote(
        &self,
        method: &str,
        amount: Amount,
        unit: &str,
    ) -> Result<MintQuote, Error> {
        if method != BOLT11_METHOD {
            return Err(Error::PaymentMethodNotSupported);
        }
        if unit != SAT_UNIT {
            return Err(Error::UnitNotSupported);
        }

        let limits = self.limits();
        if limits.mint_max_amount > Amount::ZERO && amount > limits.mint_max_amount {
            return Err(Error::MintAmountExceeded);
        }
        if limits.max_balance > Amount::ZERO {
            let balance = self.localstore().get_balance().await?;
            let would_be = balance
                .checked_add(amount)
                .ok_or(Error::MintingDisabled)?;
            if would_be > limits.max_balance {
                return Err(Error::MintingDisabled);
            }
        }

        let invoice = self.lightning().create_invoice(amount).await?;

        let quote = MintQuote::new(
            amount,
            invoice.payment_request,
            invoice.payment_hash,
            invoice.expiry,
        );
        self.localstore().add_mint_quote(quote.clone()).await?;

        tracing::debug!("Created mint quote {} for {} sat", quote.id, amount);

        Ok(quote)
    }

    /// Current state of a mint quote. An `Unpaid` quote polls the Lightning
    /// backend and transitions to `Paid` once the invoice settles; `Paid`
    /// and `Issued` are returned as stored.
    #[instrument(skip(self))]
    pub async fn get_mint_quote_state(
        &self,
        method: &str,
        quote_id: &str,
    ) -> Result<MintQuote, Error> {
        if method != BOLT11_METHOD {
            return Err(Error::PaymentMethodNotSupported);
        }

        let mut quote = self
            .localstore()
            .get_mint_quote(quote_id)
            .await?
            .ok_or(Error::UnknownQuote)?;

        if quote.state == MintQuoteState::Unpaid {
            let status = self.lightning().invoice_status(&quote.payment_hash).await?;

            if status.settled {
                self.localstore()
                    .update_mint_quote_state(&quote.id, MintQuoteState::Paid)
                    .await?;
                quote.state = MintQuoteState::Paid;
            }
        }

        Ok(quote)
    }

    /// Verify that the quote has been paid and blind-sign the outputs.
    ///
    /// Issuing happens at most once per quote: the transition to `Issued`
    /// is a compare-and-set that claims the quote before any signature is
    /// produced, and every `B_` is refused a second signature.
    #[instrument(skip(self, outputs))]
    pub async fn mint_tokens(
        &self,
        method: &str,
        quote_id: &str,
        outputs: &[BlindedMessage],
    ) -> Result<Vec<BlindSignature>, Error> {
        if method != BOLT11_METHOD {
            return Err(Error::PaymentMethodNotSupported);
        }

        let quote = self
            .localstore()
            .get_mint_quote(quote_id)
            .await?
            .ok_or(Error::UnknownQuote)?;

        let invoice_paid = match quote.state {
            MintQuoteState::Unpaid => {
                self.lightning()
                    .invoice_status(&quote.payment_hash)
                    .await?
                    .settled
            }
            _ => true,
        };
        if !invoice_paid {
            return Err(Error::MintQuoteNotPaid);
        }

        if quote.state == MintQuoteState::Issued {
            return Err(Error::MintQuoteAlreadyIssued);
        }

        let outputs_amount = Amount::try_sum(outputs.iter().map(|o| o.amount))
            .map_err(|_| Error::InvalidBlindedMessageAmount)?;
        if outputs_amount == Amount::ZERO {
            return Err(Error::InvalidBlindedMessageAmount);
        }
        if outputs_amount > quote.amount {
            return Err(Error::OutputsOverQuoteAmount);
        }

        // Refuse any B_ that has been signed before
        let blinded_secrets: Vec<PublicKey> =
            outputs.iter().map(|o| o.blinded_secret).collect();
        if self
            .localstore()
            .get_blind_signatures(&blinded_secrets)
            .await?
            .iter()
            .flatten()
            .next()
            .is_some()
        {
            return Err(Error::BlindedMessageAlreadySigned);
        }

        self.verify_outputs_signable(outputs)?;

        // Claim the quote before producing signatures; a concurrent
        // request on the same quote loses here, before anything is signed
        match self
            .localstore()
            .update_mint_quote_state(&quote.id, MintQuoteState::Issued)
            .await
        {
            Ok(_) => {}
            Err(database::Error::InvalidStateTransition { .. }) => {
                return Err(Error::MintQuoteAlreadyIssued)
            }
            Err(err) => return Err(err.into()),
        }

        let signatures = self.sign_blinded_messages(outputs).await?;

        tracing::debug!("Issued {} sat for mint quote {}", outputs_amount, quote.id);

        Ok(signatures)
    }
}
