//! Utilities

pub mod hex;

use std::time::{SystemTime, UNIX_EPOCH};

use bitcoin::secp256k1::rand::{self, RngCore};
use bitcoin::secp256k1::{All, Secp256k1};
use once_cell::sync::Lazy;

/// Secp256k1 global context
pub static SECP256K1: Lazy<Secp256k1<All>> = Lazy::new(|| {
    let mut ctx = Secp256k1::new();
    let mut rng = rand::thread_rng();
    ctx.randomize(&mut rng);
    ctx
});

/// Seconds since unix epoch
pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Generate a random quote id as 32 bytes of entropy, hex encoded
pub fn random_quote_id() -> String {
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_quote_id() {
        let id = random_quote_id();
        assert_eq!(id.len(), 64);
        assert_ne!(id, random_quote_id());
        assert_eq!(hex::decode(&id).unwrap().len(), 32);
    }
}
