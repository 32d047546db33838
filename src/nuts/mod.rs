//! NUT definitions
//!
//! See all at <https://github.com/cashubtc/nuts>

pub mod nut00;
pub mod nut01;
pub mod nut02;
pub mod nut04;
pub mod nut05;
pub mod nut07;
pub mod nut09;
pub mod nut10;
pub mod nut11;
pub mod nut12;

pub use nut00::{
    BlindSignature, BlindedMessage, CurrencyUnit, Proof, Proofs, ProofsMethods, Witness,
};
pub use nut01::{Keys, KeysResponse, PublicKey, SecretKey};
pub use nut02::{Id, KeySet, KeySetInfo, KeysetResponse};
pub use nut04::{
    MintQuoteBolt11Request, MintQuoteBolt11Response, MintRequest, MintResponse,
    QuoteState as MintQuoteState,
};
pub use nut05::{
    MeltQuoteBolt11Request, MeltQuoteBolt11Response, MeltRequest, QuoteState as MeltQuoteState,
};
pub use nut07::{CheckStateRequest, CheckStateResponse, ProofState, State};
pub use nut09::{RestoreRequest, RestoreResponse};
pub use nut10::{Kind, Secret as Nut10Secret};
pub use nut11::{Conditions, P2PKWitness, SigFlag};
pub use nut12::{BlindSignatureDleq, ProofDleq};
