// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Q32.32 signed fixed-point arithmetic.
//!
//! A [`FixedPoint`] is an `i64` interpreted as `raw / 2^32`: the upper 32
//! bits carry the integer part, the lower 32 bits the fraction. Prices and
//! volumes flow through this type so aggregation never touches floating
//! point on the hot path.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const FRACTIONAL_BITS: u32 = 32;

/// Raw representation of 1.0.
pub const FIXED_ONE: i64 = 1 << FRACTIONAL_BITS;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FixedPointError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("fixed-point {op} overflow")]
    Overflow { op: &'static str },
}

/// Q32.32 fixed-point number.
///
/// Equality and ordering compare raw bits, which is exact. The arithmetic
/// operators fail loudly on overflow; the `checked_*` methods return a
/// [`FixedPointError`] instead and are what the aggregation path uses.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FixedPoint(i64);

impl FixedPoint {
    pub const ZERO: FixedPoint = FixedPoint(0);

    /// Wraps an already-encoded raw value.
    pub const fn from_raw(raw: i64) -> Self {
        FixedPoint(raw)
    }

    /// Encodes an integer. Inputs outside `[-2^31, 2^31)` lose their high
    /// bits, same as the raw shift they are defined by.
    pub const fn from_int(value: i64) -> Self {
        FixedPoint(value << FRACTIONAL_BITS)
    }

    /// Lossy conversion for ingest boundaries and tests; not used by the
    /// aggregation fast path.
    pub fn from_double(value: f64) -> Self {
        FixedPoint((value * FIXED_ONE as f64) as i64)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Integer part, truncating toward negative infinity.
    pub const fn to_int(self) -> i64 {
        self.0 >> FRACTIONAL_BITS
    }

    pub fn to_double(self) -> f64 {
        self.0 as f64 / FIXED_ONE as f64
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: FixedPoint) -> Result<FixedPoint, FixedPointError> {
        self.0
            .checked_add(rhs.0)
            .map(FixedPoint)
            .ok_or(FixedPointError::Overflow { op: "addition" })
    }

    pub fn checked_sub(self, rhs: FixedPoint) -> Result<FixedPoint, FixedPointError> {
        self.0
            .checked_sub(rhs.0)
            .map(FixedPoint)
            .ok_or(FixedPointError::Overflow { op: "subtraction" })
    }

    /// `(a * b) / 2^32` with a 128-bit intermediate. The arithmetic shift
    /// keeps the sign; narrowing back to `i64` is checked.
    pub fn checked_mul(self, rhs: FixedPoint) -> Result<FixedPoint, FixedPointError> {
        let product = i128::from(self.0) * i128::from(rhs.0);
        let shifted = product >> FRACTIONAL_BITS;
        i64::try_from(shifted)
            .map(FixedPoint)
            .map_err(|_| FixedPointError::Overflow { op: "multiplication" })
    }

    /// `(a * 2^32) / b` with a 128-bit numerator, truncating toward zero.
    pub fn checked_div(self, rhs: FixedPoint) -> Result<FixedPoint, FixedPointError> {
        if rhs.0 == 0 {
            return Err(FixedPointError::DivisionByZero);
        }
        let numerator = i128::from(self.0) << FRACTIONAL_BITS;
        let quotient = numerator / i128::from(rhs.0);
        i64::try_from(quotient)
            .map(FixedPoint)
            .map_err(|_| FixedPointError::Overflow { op: "division" })
    }
}

impl Add for FixedPoint {
    type Output = FixedPoint;

    fn add(self, rhs: FixedPoint) -> FixedPoint {
        match self.checked_add(rhs) {
            Ok(sum) => sum,
            Err(err) => panic!("{err}"),
        }
    }
}

impl Sub for FixedPoint {
    type Output = FixedPoint;

    fn sub(self, rhs: FixedPoint) -> FixedPoint {
        match self.checked_sub(rhs) {
            Ok(diff) => diff,
            Err(err) => panic!("{err}"),
        }
    }
}

impl Neg for FixedPoint {
    type Output = FixedPoint;

    fn neg(self) -> FixedPoint {
        match self.0.checked_neg() {
            Some(raw) => FixedPoint(raw),
            None => panic!("fixed-point negation overflow"),
        }
    }
}

impl AddAssign for FixedPoint {
    fn add_assign(&mut self, rhs: FixedPoint) {
        *self = *self + rhs;
    }
}

impl SubAssign for FixedPoint {
    fn sub_assign(&mut self, rhs: FixedPoint) {
        *self = *self - rhs;
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9}", self.to_double())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(value: i64) -> FixedPoint {
        FixedPoint::from_int(value)
    }

    #[test]
    fn int_roundtrip_and_raw_encoding() {
        assert_eq!(fp(1).raw(), FIXED_ONE);
        assert_eq!(fp(-3).to_int(), -3);
        assert_eq!(FixedPoint::from_raw(FIXED_ONE / 2).to_double(), 0.5);
        assert_eq!(FixedPoint::from_double(100.0).raw(), 100 * FIXED_ONE);
    }

    #[test]
    fn addition_matches_integer_addition() {
        for a in -50i64..=50 {
            for b in -50i64..=50 {
                assert_eq!(fp(a) + fp(b), fp(a + b));
            }
        }
    }

    #[test]
    fn checked_add_fails_explicitly_on_overflow() {
        let near_max = FixedPoint::from_raw(i64::MAX);
        let err = near_max.checked_add(FixedPoint::from_raw(1)).unwrap_err();
        assert_eq!(err, FixedPointError::Overflow { op: "addition" });

        let near_min = FixedPoint::from_raw(i64::MIN);
        let err = near_min.checked_sub(FixedPoint::from_raw(1)).unwrap_err();
        assert_eq!(err, FixedPointError::Overflow { op: "subtraction" });
    }

    #[test]
    fn multiplication_matches_integer_multiplication() {
        for a in -20i64..=20 {
            for b in -20i64..=20 {
                assert_eq!(fp(a).checked_mul(fp(b)).unwrap(), fp(a * b));
            }
        }
    }

    #[test]
    fn multiplication_handles_fractions() {
        let half = FixedPoint::from_double(0.5);
        assert_eq!(fp(10).checked_mul(half).unwrap(), fp(5));
        assert_eq!(half.checked_mul(half).unwrap(), FixedPoint::from_double(0.25));
    }

    #[test]
    fn multiplication_by_zero_is_zero() {
        for a in [i64::MIN, -7, 0, 7, i64::MAX] {
            let x = FixedPoint::from_raw(a);
            assert_eq!(x.checked_mul(FixedPoint::ZERO).unwrap(), FixedPoint::ZERO);
            assert_eq!(FixedPoint::ZERO.checked_mul(x).unwrap(), FixedPoint::ZERO);
        }
    }

    #[test]
    fn multiplication_overflow_is_detected() {
        let big = fp(1 << 20);
        assert_eq!(
            big.checked_mul(big).unwrap_err(),
            FixedPointError::Overflow { op: "multiplication" }
        );
    }

    #[test]
    fn division_matches_integer_division_on_exact_multiples() {
        for b in [-12i64, -5, -1, 1, 5, 12] {
            for q in -10i64..=10 {
                let a = b * q;
                assert_eq!(fp(a).checked_div(fp(b)).unwrap(), fp(q));
            }
        }
    }

    #[test]
    fn division_of_value_by_itself_is_one() {
        for raw in [-(5 * FIXED_ONE), -1, 1, 3, FIXED_ONE, 7 * FIXED_ONE] {
            let x = FixedPoint::from_raw(raw);
            assert_eq!(x.checked_div(x).unwrap(), fp(1));
        }
    }

    #[test]
    fn division_by_zero_is_a_domain_error() {
        assert_eq!(
            fp(1).checked_div(FixedPoint::ZERO).unwrap_err(),
            FixedPointError::DivisionByZero
        );
    }

    #[test]
    fn division_handles_negative_numerators() {
        assert_eq!(fp(-6).checked_div(fp(3)).unwrap(), fp(-2));
        assert_eq!(
            fp(1).checked_div(fp(-2)).unwrap(),
            FixedPoint::from_double(-0.5)
        );
    }

    #[test]
    fn sign_of_product_and_quotient_is_xor_of_operand_signs() {
        let cases = [(6i64, 3i64), (6, -3), (-6, 3), (-6, -3)];
        for (a, b) in cases {
            let expected_negative = (a < 0) != (b < 0);
            let product = fp(a).checked_mul(fp(b)).unwrap();
            let quotient = fp(a).checked_div(fp(b)).unwrap();
            assert_eq!(product.raw() < 0, expected_negative);
            assert_eq!(quotient.raw() < 0, expected_negative);
        }
    }

    #[test]
    fn division_overflow_is_detected() {
        let max = FixedPoint::from_raw(i64::MAX);
        let tiny = FixedPoint::from_raw(1);
        assert_eq!(
            max.checked_div(tiny).unwrap_err(),
            FixedPointError::Overflow { op: "division" }
        );
    }

    #[test]
    fn ordering_follows_numeric_value() {
        assert!(fp(-2) < fp(-1));
        assert!(fp(-1) < FixedPoint::from_double(0.5));
        assert!(FixedPoint::from_double(0.5) < fp(1));
    }

    #[test]
    fn display_uses_nine_fractional_digits() {
        assert_eq!(FixedPoint::from_double(1.5).to_string(), "1.500000000");
        assert_eq!(fp(-2).to_string(), "-2.000000000");
    }
}
