//! # Market Cap Weighting
//!
//! Converts prices and supplies into square-root-of-market-cap weights and derives
//! the per-token quantities a pool instruction carries (denormalized weight, minimum
//! balance, initial balance).
//!
//! This module never selects membership: callers pass the token set (top-N of a
//! category, or the pool's current desired tokens).
//!
//! ```text
//! cap(i)    = price(i) * supply(i)                  (decode144)
//! weight(i) = sqrt(cap(i)) / sum_j sqrt(cap(j))     (UQ112x112)
//! denorm(i) = weight(i) * WEIGHT_MULTIPLIER         (decode144)
//! ```

use crate::constants::{MIN_BALANCE_DIVISOR, WEIGHT_MULTIPLIER};
use crate::error::{ControllerError, ControllerResult};
use crate::fixed_point::{self, MathError, Uq112x112};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// One token's share of a rebalance instruction. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightAssignment {
    pub token: Address,
    pub denorm: u128,
    /// Only set for reindex instructions.
    pub minimum_balance: Option<U256>,
}

/// Quote-unit value of `amount` token units at `price`. With the total supply as
/// `amount` this is the token's market cap.
pub fn quote_value(price: Uq112x112, amount: U256) -> Result<U256, MathError> {
    Ok(price.mul(amount)?.decode144())
}

/// Square-root-of-market-cap weights, in token order.
///
/// The weights sum to at most one; the shortfall is the floor loss of each fraction.
/// A zero market cap is rejected rather than weighted at zero.
pub fn compute_weights(tokens: &[Address], market_caps: &[U256]) -> ControllerResult<Vec<Uq112x112>> {
    if tokens.len() != market_caps.len() {
        return Err(ControllerError::ArrayLengthMismatch(tokens.len(), market_caps.len()));
    }

    let mut sqrts = Vec::with_capacity(tokens.len());
    let mut root_sum = U256::zero();
    for (token, cap) in tokens.iter().zip(market_caps) {
        if cap.is_zero() {
            return Err(ControllerError::InvalidMarketCap(*token));
        }
        let root = fixed_point::sqrt(*cap);
        root_sum = root_sum.checked_add(root).ok_or(MathError::Overflow)?;
        sqrts.push(root);
    }

    sqrts
        .into_iter()
        .map(|root| Uq112x112::fraction(root, root_sum).map_err(ControllerError::from))
        .collect()
}

/// Weights proportional to already-computed values (used when finalizing a pool
/// from its actual contributions).
pub fn weights_from_values(values: &[U256]) -> ControllerResult<Vec<Uq112x112>> {
    let mut sum = U256::zero();
    for value in values {
        sum = sum.checked_add(*value).ok_or(MathError::Overflow)?;
    }
    values
        .iter()
        .map(|value| Uq112x112::fraction(*value, sum).map_err(ControllerError::from))
        .collect()
}

/// Fraction of one → fraction of [`WEIGHT_MULTIPLIER`].
pub fn denormalize_weight(weight: Uq112x112) -> Result<u128, MathError> {
    let denorm = weight.mul(U256::from(WEIGHT_MULTIPLIER))?.decode144();
    if denorm > U256::from(u128::MAX) {
        return Err(MathError::Overflow);
    }
    Ok(denorm.low_u128())
}

pub fn denormalize_weights(weights: &[Uq112x112]) -> Result<Vec<u128>, MathError> {
    weights.iter().map(|weight| denormalize_weight(*weight)).collect()
}

/// Tokens worth `weight` of `total_value` at `price`.
pub fn weighted_balance(total_value: U256, weight: Uq112x112, price: Uq112x112) -> Result<U256, MathError> {
    let weighted_value = weight.mul(total_value)?.decode144();
    Ok(price.reciprocal()?.mul(weighted_value)?.decode144())
}

/// Tokens worth 1% of `total_value` at `price`.
///
/// `floor(floor(1 / price) * total_value) / 100`, with both floors in UQ112x112.
/// Prices whose reciprocal is unrepresentable, and products beyond 256 bits, fail.
pub fn minimum_balance(total_value: U256, price: Uq112x112) -> Result<U256, MathError> {
    let tokens_worth_value = price.reciprocal()?.mul(total_value)?.decode144();
    Ok(tokens_worth_value / U256::from(MIN_BALANCE_DIVISOR))
}
