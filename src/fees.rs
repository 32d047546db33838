//! Input fee calculation
//!
//! <https://github.com/cashubtc/nuts/blob/main/02.md>

use std::collections::HashMap;

use crate::nuts::Id;
use crate::{Amount, Error};

/// Fee required for a proof set.
///
/// Sums each keyset's per-proof `input_fee_ppk` over the proof counts and
/// rounds the thousandths up to whole units.
pub fn calculate_fee(
    proofs_count: &HashMap<Id, u64>,
    keyset_fee_ppk: &HashMap<Id, u64>,
) -> Result<Amount, Error> {
    let mut sum_fee = 0u64;

    for (keyset_id, proof_count) in proofs_count {
        let fee_ppk = keyset_fee_ppk
            .get(keyset_id)
            .ok_or(Error::UnknownKeyset)?;

        sum_fee += fee_ppk * proof_count;
    }

    let fee = (sum_fee + 999) / 1000;

    Ok(fee.into())
}
