//! Mint configuration

use crate::Amount;

/// Default lifetime of a melt quote in seconds
pub const QUOTE_EXPIRY_SECS: u64 = 600;

/// Default number of supported power-of-two amounts, `2^0` up to `2^63`
pub const DEFAULT_MAX_ORDER: u8 = 64;

/// Policy limits on minting and melting. A zero amount means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MintLimits {
    /// Cap on the mint's outstanding balance
    pub max_balance: Amount,
    /// Cap on a single mint quote
    pub mint_max_amount: Amount,
    /// Cap on a single melt quote
    pub melt_max_amount: Amount,
}

/// Configuration for [`Mint`](super::Mint)
#[derive(Debug, Clone)]
pub struct MintConfig {
    /// BIP32 child index the active keyset is derived at
    pub derivation_path_index: u32,
    /// Input fee of the active keyset, per proof, in thousandths of a unit
    pub input_fee_ppk: u64,
    /// Number of power-of-two amounts the active keyset supports
    pub max_order: u8,
    /// Policy limits
    pub limits: MintLimits,
    /// Lifetime of melt quotes in seconds
    pub quote_expiry_secs: u64,
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            derivation_path_index: 0,
            input_fee_ppk: 0,
            max_order: DEFAULT_MAX_ORDER,
            limits: MintLimits::default(),
            quote_expiry_secs: QUOTE_EXPIRY_SECS,
        }
    }
}
