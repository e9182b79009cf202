// Exact conversions between token amounts, U256 and felts
// Every amount is an integer count of base units; floats never enter the picture

use primitive_types::U256;
use starknet::core::types::Felt;

use crate::error::{OpsError, Result};

/// Convert a decimal token amount (e.g. "0.001") into base units with `decimals` places
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256> {
    let amount = amount.trim();
    let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));

    if whole.is_empty() && fraction.is_empty() {
        return Err(OpsError::Encoding(format!("invalid token amount '{}'", amount)));
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(OpsError::Encoding(format!("invalid token amount '{}'", amount)));
    }
    if fraction.len() > decimals as usize {
        return Err(OpsError::Encoding(format!(
            "token amount '{}' has more than {} fractional digits",
            amount, decimals
        )));
    }

    let padding = "0".repeat(decimals as usize - fraction.len());
    let digits = format!("{}{}{}", whole, fraction, padding);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_dec_str(digits)
        .map_err(|_| OpsError::Encoding(format!("token amount '{}' does not fit in u256", amount)))
}

/// Render base units as a decimal token amount, trimming trailing zeros
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

pub fn felt_to_u256(felt: &Felt) -> U256 {
    U256::from_big_endian(&felt.to_bytes_be())
}

/// Narrow a U256 into a felt; fails when the value is not below the field prime
pub fn u256_to_felt(value: U256) -> Result<Felt> {
    if value > felt_to_u256(&Felt::MAX) {
        return Err(OpsError::Encoding(format!("{} does not fit in a felt", value)));
    }
    let mut bytes = [0u8; 32];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = value.byte(31 - i);
    }
    Ok(Felt::from_bytes_be(&bytes))
}

/// Cairo `u256` calldata layout: `(low, high)` 128-bit limbs
pub fn split_u256(value: U256) -> (Felt, Felt) {
    let low = value.low_u128();
    let high = (value >> 128).low_u128();
    (Felt::from(low), Felt::from(high))
}

pub fn join_u256(low: &Felt, high: &Felt) -> Result<U256> {
    let limb_max = U256::from(u128::MAX);
    let low = felt_to_u256(low);
    let high = felt_to_u256(high);
    if low > limb_max || high > limb_max {
        return Err(OpsError::Encoding("u256 limb exceeds 128 bits".to_string()));
    }
    Ok((high << 128) | low)
}
