//! # Pool Value Estimator
//!
//! Estimates a pool's total value from a single reference token instead of summing
//! every holding. The first token that is ready and has a non-zero desired weight is
//! extrapolated to a "virtual balance", the balance the pool would hold if that token
//! carried the whole pool weight:
//!
//! ```text
//! virtual_balance = balance * total_denorm / denorm
//! pool_value      = price(token) * virtual_balance      (decode144)
//! ```
//!
//! The estimate only sizes minimum balances; it is not an accounting figure.

use crate::error::{ControllerError, ControllerResult};
use crate::fixed_point::MathError;
use crate::interfaces::{IndexPoolGateway, PriceOracle, TokenRecord};
use ethers::types::{Address, U256};

/// `balance * total_denorm / denorm`, floored.
pub fn virtual_balance(balance: U256, denorm: u128, total_denorm: u128) -> Result<U256, MathError> {
    if denorm == 0 {
        return Err(MathError::DivideByZero);
    }
    let scaled = balance
        .checked_mul(U256::from(total_denorm))
        .ok_or(MathError::Overflow)?;
    Ok(scaled / U256::from(denorm))
}

/// Picks the reference token from a pool's records (in pool token order) and returns
/// it with its virtual balance.
///
/// Pools implementing [`IndexPoolGateway::extrapolate_pool_value_from_token`] over
/// their own records should delegate here.
pub fn extrapolate_from_records(
    pool: Address,
    records: &[(Address, TokenRecord)],
    total_denorm: u128,
) -> ControllerResult<(Address, U256)> {
    let (token, record) = records
        .iter()
        .find(|(_, record)| record.bound && record.ready && record.desired_denorm > 0 && record.denorm > 0)
        .ok_or(ControllerError::NoReadyToken(pool))?;
    let balance = virtual_balance(record.balance, record.denorm, total_denorm)?;
    Ok((*token, balance))
}

/// Total value of `pool` in oracle quote units.
pub fn estimate_pool_value(
    pools: &dyn IndexPoolGateway,
    oracle: &dyn PriceOracle,
    pool: Address,
) -> ControllerResult<U256> {
    let (token, virtual_balance) = pools
        .extrapolate_pool_value_from_token(pool)
        .map_err(ControllerError::collaborator)?;
    let price = oracle
        .compute_average_price(token)
        .map_err(ControllerError::collaborator)?;
    Ok(price.mul(virtual_balance)?.decode144())
}
