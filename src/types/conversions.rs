use crate::constants::WEIGHT_MULTIPLIER;
use crate::fixed_point::{Uq112x112, Q112};
use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Scale of the fractional digits rendered for UQ112x112 values.
const FRACTION_DIGITS: u32 = 18;

// Cantidades de tokens (balances, market caps) con sus decimales
pub fn u256_to_decimal(value: U256, decimals: u8) -> Result<Decimal, ConversionError> {
    let mut decimal_value = Decimal::from_str(&value.to_string())
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))?;
    decimal_value
        .set_scale(decimals as u32)
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))?;
    Ok(decimal_value.normalize())
}

/// Denormalized weight as a percentage of the total pool weight.
pub fn denorm_to_percent(denorm: u128) -> Result<Decimal, ConversionError> {
    let denorm = i128::try_from(denorm).map_err(|_| ConversionError::Overflow)?;
    let denorm = Decimal::try_from_i128_with_scale(denorm, 0).map_err(|_| ConversionError::Overflow)?;
    let total = Decimal::try_from_i128_with_scale(WEIGHT_MULTIPLIER as i128, 0)
        .map_err(|_| ConversionError::Overflow)?;
    denorm
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(total))
        .ok_or(ConversionError::Overflow)
}

/// UQ112x112 → Decimal, truncated to 18 fractional digits.
pub fn fraction_to_decimal(value: Uq112x112) -> Result<Decimal, ConversionError> {
    let raw = value.raw();
    let integer = raw / Q112;
    let fractional = (raw % Q112) * U256::exp10(FRACTION_DIGITS as usize) / Q112;

    let integer = Decimal::from_str(&integer.to_string()).map_err(|_| ConversionError::Overflow)?;
    let fractional = Decimal::try_from_i128_with_scale(fractional.as_u128() as i128, FRACTION_DIGITS)
        .map_err(|_| ConversionError::Overflow)?;
    integer
        .checked_add(fractional)
        .map(|d| d.normalize())
        .ok_or(ConversionError::Overflow)
}

// Para addresses
pub fn address_to_string(addr: Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s).map_err(|e| ConversionError::InvalidAddress(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    #[error("Overflow in conversion")]
    Overflow,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}
