//! # nutmint
//!
//! Core of a Chaumian e-cash mint for Bitcoin Lightning. The mint issues
//! blind signatures against paid Lightning invoices, swaps circulating
//! proofs and redeems them into outgoing payments, without ever learning
//! which issued token corresponds to which redeemed token.
//!
//! The HTTP transport, real Lightning nodes and persistent storage drivers
//! live elsewhere; the core consumes the latter two through the
//! [`lightning::MintLightning`] and [`database::MintDatabase`] contracts.

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod amount;
pub mod database;
pub mod dhke;
pub mod error;
pub mod fees;
pub mod lightning;
pub mod mint;
pub mod nuts;
pub mod secret;
pub mod types;
pub mod util;

pub use amount::Amount;
pub use error::{Error, ErrorResponse};
pub use lightning_invoice::Bolt11Invoice;
pub use mint::Mint;
pub use util::SECP256K1;
