//! Fixed-point decimal numbers, per spec.md §9's design note that decimal
//! values use "an arbitrary-precision fixed-point representation" and
//! §4 Open Questions' resolution that decimal arithmetic promotion and
//! modulo sign match `Int`'s truncated-division convention.
//!
//! No decimal crate appears anywhere in this project's dependency
//! lineage, so `Decimal` is written by hand here, the same way the
//! project's other numeric/arithmetic modules are: a mantissa scaled by
//! a power of ten (`value == mantissa / 10^scale`), matching the scale of
//! two operands before combining them so `1.10 + 2.9` keeps two decimal
//! digits of precision rather than inheriting whichever operand happened
//! to come first.

use std::cmp::Ordering;
use std::fmt;

/// `mantissa / 10^scale`. `scale` never exceeds what a `u8` can hold;
/// literal and arithmetic results are kept well under that in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    mantissa: i128,
    scale: u8,
}

fn pow10(scale: u8) -> i128 {
    10i128.pow(scale as u32)
}

impl Decimal {
    pub fn new(mantissa: i128, scale: u8) -> Self {
        Decimal { mantissa, scale }
    }

    pub fn from_i64(n: i64) -> Self {
        Decimal::new(n as i128, 0)
    }

    pub fn zero() -> Self {
        Decimal::new(0, 0)
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / pow10(self.scale) as f64
    }

    /// Rescales to `target` digits of precision (which must be >= both
    /// operands' current scale); used to bring two decimals to a common
    /// scale before arithmetic.
    fn rescaled(&self, target: u8) -> i128 {
        self.mantissa * pow10(target - self.scale)
    }

    fn common_scale(a: Decimal, b: Decimal) -> (i128, i128, u8) {
        let scale = a.scale.max(b.scale);
        (a.rescaled(scale), b.rescaled(scale), scale)
    }

    pub fn add(self, other: Decimal) -> Decimal {
        let (x, y, scale) = Self::common_scale(self, other);
        Decimal::new(x + y, scale)
    }

    pub fn sub(self, other: Decimal) -> Decimal {
        let (x, y, scale) = Self::common_scale(self, other);
        Decimal::new(x - y, scale)
    }

    pub fn mul(self, other: Decimal) -> Decimal {
        Decimal::new(self.mantissa * other.mantissa, self.scale + other.scale)
    }

    /// Division is exact to the wider of the two operands' scales plus a
    /// fixed extra margin of precision, matching `Decimal(i128, u8)`'s
    /// finite-scale representation (no repeating-fraction support).
    pub fn div(self, other: Decimal) -> Option<Decimal> {
        if other.mantissa == 0 {
            return None;
        }
        const EXTRA_SCALE: u8 = 10;
        let scale = self.scale.max(other.scale) + EXTRA_SCALE;
        let numerator = self.mantissa * pow10(scale + other.scale - self.scale);
        Some(Decimal::new(numerator / other.mantissa, scale))
    }

    /// Truncated-division remainder (sign of the dividend), matching
    /// Int's `%` convention per spec.md's Open Questions resolution.
    pub fn rem(self, other: Decimal) -> Option<Decimal> {
        if other.mantissa == 0 {
            return None;
        }
        let (x, y, scale) = Self::common_scale(self, other);
        Some(Decimal::new(x % y, scale))
    }

    pub fn neg(self) -> Decimal {
        Decimal::new(-self.mantissa, self.scale)
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let (x, y, _) = Self::common_scale(*self, *other);
        x.cmp(&y)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let scale = pow10(self.scale);
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let abs = self.mantissa.unsigned_abs();
        let whole = abs / scale as u128;
        let frac = abs % scale as u128;
        write!(f, "{sign}{whole}.{frac:0width$}", width = self.scale as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_keeps_wider_scale() {
        let a = Decimal::new(110, 2); // 1.10
        let b = Decimal::new(29, 1); // 2.9
        let sum = a.add(b);
        assert_eq!(sum.to_string(), "4.00");
    }

    #[test]
    fn mul_adds_scales() {
        let a = Decimal::new(15, 1); // 1.5
        let b = Decimal::new(25, 1); // 2.5
        let product = a.mul(b);
        assert_eq!(product.to_string(), "3.75");
    }

    #[test]
    fn div_by_zero_is_none() {
        assert!(Decimal::from_i64(1).div(Decimal::zero()).is_none());
    }

    #[test]
    fn rem_matches_truncated_division_sign() {
        let a = Decimal::from_i64(-7);
        let b = Decimal::from_i64(3);
        assert_eq!(a.rem(b).unwrap().to_string(), "-1");
    }

    #[test]
    fn display_pads_fractional_zeroes() {
        assert_eq!(Decimal::new(500, 2).to_string(), "5.00");
        assert_eq!(Decimal::new(-500, 2).to_string(), "-5.00");
    }

    #[test]
    fn ordering_compares_across_scales() {
        assert!(Decimal::new(1, 0) > Decimal::new(99, 2)); // 1 > 0.99
    }
}
