//! Raw balance handling
//!
//! Ledger balances are unsigned 256-bit integers in the asset's smallest
//! unit. They are carried as `BigUint` and only ever turned into text by
//! exact integer division, never through floating point.
//!
//! Formatting follows the usual fixed-point-from-integer convention:
//! trailing zeros of the fraction are dropped but at least one fractional
//! digit is kept (`"2.0"`, `"0.5"`), and precision 0 prints the bare integer.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{Num, Zero};
use std::fmt;

use super::error::LedgerError;

/// Precision of the native asset (wei per ether).
pub const NATIVE_DECIMALS: u32 = 18;

const MAX_BITS: u64 = 256;

/// Non-negative integer balance in the asset's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct RawBalance(BigUint);

impl RawBalance {
    pub fn new(value: BigUint) -> Result<Self, LedgerError> {
        if value.bits() > MAX_BITS {
            return Err(LedgerError::Permanent(format!(
                "balance exceeds 256 bits ({} bits)",
                value.bits()
            )));
        }
        Ok(Self(value))
    }

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// Parse a JSON-RPC hex quantity (`"0x1bc16d674ec80000"`).
    pub fn from_hex_quantity(quantity: &str) -> Result<Self, LedgerError> {
        let digits = quantity
            .strip_prefix("0x")
            .or_else(|| quantity.strip_prefix("0X"))
            .ok_or_else(|| LedgerError::Permanent(format!("not a hex quantity: {quantity}")))?;
        if digits.is_empty() {
            return Ok(Self::zero());
        }
        let value = BigUint::from_str_radix(digits, 16)
            .map_err(|e| LedgerError::Permanent(format!("invalid hex quantity {quantity}: {e}")))?;
        Self::new(value)
    }

    /// Decode the single `uint256` word returned by an `eth_call`.
    pub fn from_abi_word(data: &str) -> Result<Self, LedgerError> {
        let digits = data.strip_prefix("0x").unwrap_or(data);
        // Non-contract addresses answer with empty return data.
        if digits.is_empty() {
            return Err(LedgerError::Permanent(
                "empty return data (contract missing at this block?)".to_string(),
            ));
        }
        let bytes = hex::decode(digits)
            .map_err(|e| LedgerError::Permanent(format!("invalid return data: {e}")))?;
        if bytes.len() < 32 {
            return Err(LedgerError::Permanent(format!(
                "return data too short: {} bytes",
                bytes.len()
            )));
        }
        Self::new(BigUint::from_bytes_be(&bytes[..32]))
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

impl From<u64> for RawBalance {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<u128> for RawBalance {
    fn from(value: u128) -> Self {
        Self(BigUint::from(value))
    }
}

impl fmt::Display for RawBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Render `raw / 10^decimals` as an exact decimal string.
pub fn normalize(raw: &RawBalance, decimals: u32) -> String {
    if decimals == 0 {
        return raw.0.to_string();
    }

    let scale = BigUint::from(10u32).pow(decimals);
    let (whole, fraction) = raw.0.div_rem(&scale);

    let mut frac = fraction.to_string();
    let width = decimals as usize;
    if frac.len() < width {
        frac = format!("{}{}", "0".repeat(width - frac.len()), frac);
    }
    let trimmed = frac.trim_end_matches('0');
    let frac = if trimmed.is_empty() { "0" } else { trimmed };

    format!("{whole}.{frac}")
}

/// Native balances always use [`NATIVE_DECIMALS`].
pub fn normalize_native(raw: &RawBalance) -> String {
    normalize(raw, NATIVE_DECIMALS)
}
