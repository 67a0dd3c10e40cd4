//! Fixed-point token amounts
//!
//! Amounts cross the command surface as decimal strings ("10", "42.50") and
//! travel to the chain as integer base units. Parsing goes through
//! `BigDecimal` so no precision is ever lost to floating point.

use alloy::primitives::U256;
use bigdecimal::BigDecimal;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;

/// USDC uses 6 decimals on every CCTP network
pub const USDC_DECIMALS: u8 = 6;

/// Longest accepted amount string. Far above any real USDC value, small
/// enough that parsing stays cheap.
const MAX_AMOUNT_LEN: usize = 64;

/// Fractional digits always shown when rendering an amount ("42.50", "1000.00")
const MIN_DISPLAY_DECIMALS: usize = 2;

/// A token amount in base units together with the token's decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokenAmount {
    raw: U256,
    decimals: u8,
}

impl TokenAmount {
    pub fn from_raw(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    /// Parse a positive decimal string into base units.
    ///
    /// Only plain decimal notation is accepted. Zero, negative values,
    /// exponents and values with more fractional digits than the token
    /// supports are rejected.
    pub fn parse(amount: &str, decimals: u8) -> Result<Self, BridgeError> {
        let trimmed = amount.trim();
        let plain = !trimmed.is_empty()
            && trimmed.len() <= MAX_AMOUNT_LEN
            && trimmed.bytes().all(|b| b.is_ascii_digit() || b == b'.' || b == b'-' || b == b'+');
        if !plain {
            return Err(BridgeError::InvalidInput(format!(
                "invalid amount format: {}",
                truncated(trimmed)
            )));
        }

        let dec = BigDecimal::from_str(trimmed)
            .map_err(|_| BridgeError::InvalidInput(format!("invalid amount format: {amount}")))?;

        if dec <= BigDecimal::from(0) {
            return Err(BridgeError::InvalidInput(
                "amount must be greater than 0".to_string(),
            ));
        }

        let scaled = dec.with_scale(decimals as i64);
        if scaled != dec {
            return Err(BridgeError::InvalidInput(format!(
                "amount has more than {decimals} decimal places"
            )));
        }

        let (units, _) = scaled.as_bigint_and_exponent();
        let raw = U256::from_str_radix(&units.to_string(), 10)
            .map_err(|_| BridgeError::InvalidInput(format!("amount out of range: {amount}")))?;

        Ok(Self { raw, decimals })
    }

    pub fn raw(&self) -> U256 {
        self.raw
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_units(self.raw, self.decimals))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

fn truncated(input: &str) -> String {
    match input.char_indices().nth(MAX_AMOUNT_LEN) {
        Some((end, _)) => format!("{}...", &input[..end]),
        None => input.to_string(),
    }
}

/// Render base units as a decimal string, trimming trailing zeros but keeping
/// at least two fractional digits.
pub fn format_units(raw: U256, decimals: u8) -> String {
    let digits = raw.to_string();
    let decimals = decimals as usize;

    if decimals == 0 {
        return format!("{digits}.{}", "0".repeat(MIN_DISPLAY_DECIMALS));
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals + 1 - digits.len()), digits)
    } else {
        digits
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);

    let mut frac = frac_part.trim_end_matches('0').to_string();
    while frac.len() < MIN_DISPLAY_DECIMALS {
        frac.push('0');
    }

    format!("{int_part}.{frac}")
}
