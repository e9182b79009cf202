// Utility functions and helpers

pub mod units;

use starknet::core::types::Felt;

use crate::error::{OpsError, Result};

pub use units::{felt_to_u256, format_units, join_u256, parse_units, split_u256, u256_to_felt};

/// Parse a felt from `0x`-prefixed hex or plain decimal
pub fn parse_felt(value: &str) -> Result<Felt> {
    let value = value.trim();
    let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"));
    let parsed = if let Some(digits) = digits {
        // from_hex only understands a lowercase prefix
        Felt::from_hex(&format!("0x{}", digits)).map_err(|e| e.to_string())
    } else {
        Felt::from_dec_str(value).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| OpsError::Encoding(format!("invalid felt '{}': {}", value, reason)))
}

/// Render a felt the way explorers and starknet.js print hashes and addresses
pub fn fmt_felt(felt: &Felt) -> String {
    felt.to_hex_string()
}
