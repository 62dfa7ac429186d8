//! # Fixed Point Math
//!
//! Binary fixed-point fractions in the UQ112x112 layout used by on-chain TWAP oracles.
//!
//! All operations floor. That truncation is part of the compatibility contract: every
//! weight, balance and value derived from these types carries the same systematic
//! underestimate as the on-chain computation, so off-chain replays match bit for bit.
//!
//! ## Layouts
//!
//! - [`Uq112x112`]: 112 integer bits, 112 fractional bits (raw value `< 2^224`)
//! - [`Uq144x112`]: 144 integer bits, 112 fractional bits (full 256-bit raw value)
//!
//! ## Usage
//!
//! ```rust
//! use ethers::types::U256;
//! use index_controller_sdk::fixed_point::Uq112x112;
//!
//! let half = Uq112x112::fraction(U256::from(1), U256::from(2))?;
//! let value = half.mul(U256::from(1_000))?.decode144();
//! assert_eq!(value, U256::from(500));
//! # Ok::<(), index_controller_sdk::fixed_point::MathError>(())
//! ```

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of fractional bits.
pub const RESOLUTION: usize = 112;

/// 2^112
pub const Q112: U256 = U256([0, 1 << 48, 0, 0]);
/// 2^144
pub const Q144: U256 = U256([0, 0, 1 << 16, 0]);
/// 2^224
pub const Q224: U256 = U256([0, 0, 0, 1 << 32]);

/// Arithmetic faults. Never substituted with a default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("fixed point division by zero")]
    DivideByZero,
    #[error("fixed point overflow")]
    Overflow,
}

/// Unsigned 112.112 fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Uq112x112(U256);

/// Unsigned 144.112 fraction, the product of a [`Uq112x112`] and an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Uq144x112(U256);

impl Uq112x112 {
    pub const ZERO: Uq112x112 = Uq112x112(U256([0, 0, 0, 0]));
    pub const ONE: Uq112x112 = Uq112x112(Q112);

    /// Wraps a raw 224-bit value.
    pub fn from_raw(raw: U256) -> Result<Self, MathError> {
        if raw >= Q224 {
            return Err(MathError::Overflow);
        }
        Ok(Self(raw))
    }

    /// Encodes an integer that fits in 112 bits.
    pub fn encode(value: U256) -> Result<Self, MathError> {
        if value >= Q112 {
            return Err(MathError::Overflow);
        }
        Ok(Self(value * Q112))
    }

    /// `numerator / denominator`, floored to 112 fractional bits.
    ///
    /// Both operands must fit in 112 bits.
    pub fn fraction(numerator: U256, denominator: U256) -> Result<Self, MathError> {
        if denominator.is_zero() {
            return Err(MathError::DivideByZero);
        }
        if numerator >= Q112 || denominator >= Q112 {
            return Err(MathError::Overflow);
        }
        // numerator < 2^112 so the shifted value fits in 224 bits
        Ok(Self((numerator * Q112) / denominator))
    }

    /// Full-width product with an integer. Fails instead of wrapping.
    pub fn mul(self, y: U256) -> Result<Uq144x112, MathError> {
        self.0.checked_mul(y).map(Uq144x112).ok_or(MathError::Overflow)
    }

    /// `1 / self`, floored.
    ///
    /// A raw value of exactly 1 has a reciprocal of `2^224`, which does not fit the
    /// layout and is reported as [`MathError::Overflow`].
    pub fn reciprocal(self) -> Result<Self, MathError> {
        if self.0.is_zero() {
            return Err(MathError::DivideByZero);
        }
        let inverse = Q224 / self.0;
        if inverse >= Q224 {
            return Err(MathError::Overflow);
        }
        Ok(Self(inverse))
    }

    /// Integer part (fractional bits discarded).
    pub fn decode(self) -> u128 {
        (self.0 / Q112).low_u128()
    }

    pub fn raw(self) -> U256 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }
}

impl Uq144x112 {
    pub fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    /// Integer part, always `< 2^144`.
    pub fn decode144(self) -> U256 {
        self.0 / Q112
    }

    pub fn raw(self) -> U256 {
        self.0
    }
}

impl fmt::Display for Uq112x112 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/2^112", self.0)
    }
}

/// Floor square root.
pub fn sqrt(y: U256) -> U256 {
    y.integer_sqrt()
}

/// `true` if `value` fits in 144 bits.
pub fn fits_u144(value: U256) -> bool {
    value < Q144
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(Q112, U256::from(2).pow(U256::from(112)));
        assert_eq!(Q144, U256::from(2).pow(U256::from(144)));
        assert_eq!(Q224, U256::from(2).pow(U256::from(224)));
    }

    #[test]
    fn test_fraction_floors() {
        let third = Uq112x112::fraction(U256::from(1), U256::from(3)).unwrap();
        assert_eq!(third.raw(), Q112 / 3);
        // 3 * floor(2^112 / 3) < 2^112
        assert!(third.mul(U256::from(3)).unwrap().decode144().is_zero());
    }

    #[test]
    fn test_fraction_errors() {
        assert_eq!(
            Uq112x112::fraction(U256::one(), U256::zero()),
            Err(MathError::DivideByZero)
        );
        assert_eq!(
            Uq112x112::fraction(Q112, U256::one()),
            Err(MathError::Overflow)
        );
        assert_eq!(
            Uq112x112::fraction(U256::one(), Q112),
            Err(MathError::Overflow)
        );
        let max = Q112 - 1;
        assert_eq!(Uq112x112::fraction(max, U256::one()).unwrap().decode(), max.low_u128());
    }

    #[test]
    fn test_mul_overflow_detected() {
        let big = Uq112x112::from_raw(Q224 - 1).unwrap();
        assert!(big.mul(U256::from(1u64 << 33)).is_err());
        assert!(big.mul(U256::from(u32::MAX)).is_ok());
        assert_eq!(big.mul(U256::zero()).unwrap().raw(), U256::zero());
    }

    #[test]
    fn test_reciprocal() {
        let two = Uq112x112::encode(U256::from(2)).unwrap();
        let half = two.reciprocal().unwrap();
        assert_eq!(half, Uq112x112::fraction(U256::one(), U256::from(2)).unwrap());

        assert_eq!(Uq112x112::ZERO.reciprocal(), Err(MathError::DivideByZero));
        let tiny = Uq112x112::from_raw(U256::one()).unwrap();
        assert_eq!(tiny.reciprocal(), Err(MathError::Overflow));
        // smallest raw with a representable reciprocal
        let two_raw = Uq112x112::from_raw(U256::from(2)).unwrap();
        assert_eq!(two_raw.reciprocal().unwrap().raw(), Q224 / 2);
    }

    #[test]
    fn test_decode_truncates() {
        let q = Uq112x112::fraction(U256::from(7), U256::from(2)).unwrap();
        assert_eq!(q.decode(), 3);
        let p = q.mul(U256::from(3)).unwrap();
        assert_eq!(p.decode144(), U256::from(10));
    }

    #[test]
    fn test_from_raw_bounds() {
        assert!(Uq112x112::from_raw(Q224).is_err());
        assert!(Uq112x112::encode(Q112).is_err());
        assert!(fits_u144(Q144 - 1));
        assert!(!fits_u144(Q144));
    }

    #[test]
    fn test_sqrt_floor() {
        assert_eq!(sqrt(U256::zero()), U256::zero());
        assert_eq!(sqrt(U256::from(3)), U256::one());
        assert_eq!(sqrt(U256::from(4)), U256::from(2));
        assert_eq!(sqrt(U256::from(99)), U256::from(9));
        let e18 = U256::exp10(18);
        assert_eq!(sqrt(e18 * e18), e18);
    }
}
