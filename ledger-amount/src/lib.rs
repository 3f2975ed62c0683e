//! Fixed-point decimal amounts for the mutual-credit ledger.
//!
//! Amounts are represented internally as signed integer units scaled by
//! `10^SCALE`. `Precision` (the number of significant digits the format
//! supports) bounds how large a value may grow before arithmetic starts
//! refusing to proceed; `Scale` is the number of fractional digits kept
//! exact. Both match the ledger's on-disk decimal columns, so conversion
//! to/from `Amount` never loses precision within that budget.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of significant digits an `Amount` may carry before `checked_*`
/// arithmetic starts returning `AmountError::Overflow`.
pub const PRECISION: u32 = 16;

/// Number of fractional decimal digits kept exact.
pub const SCALE: u32 = 6;

/// `10^SCALE`, the factor used to convert between decimal and integer units.
pub const SCALE_FACTOR: i64 = 1_000_000; // 10^SCALE

/// Largest magnitude of scaled units representable at `PRECISION` digits.
const MAX_UNITS: i64 = 9_999_999_999_999_999; // 10^PRECISION - 1

/// An error produced by `Amount` arithmetic or parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The result (or operand) would exceed `PRECISION` significant digits.
    #[error("amount overflow: result exceeds {PRECISION} significant digits")]
    Overflow,
    /// Attempted an operation that requires a finite amount on `Amount::Infinity`.
    #[error("operation is undefined on an infinite amount")]
    InfiniteOperand,
    /// The input string could not be parsed as a decimal amount.
    #[error("invalid amount literal: {0}")]
    InvalidLiteral(String),
}

/// A signed fixed-point decimal amount, or the distinguished value `+Infinity`.
///
/// `Infinity` is only ever meaningful as a credit-line limit ("no limit");
/// account balances and entries are always `Finite`. Arithmetic follows the
/// usual conventions for a one-sided infinity: `Infinity + x = Infinity` for
/// any finite `x`, and `Infinity` compares greater than every finite amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Amount {
    /// `units / 10^SCALE`.
    Finite(i64),
    /// No limit.
    Infinity,
}

impl Amount {
    pub const ZERO: Amount = Amount::Finite(0);

    /// Construct from already-scaled integer units (`value * 10^SCALE`).
    pub fn from_units(units: i64) -> Result<Amount, AmountError> {
        if units.unsigned_abs() > MAX_UNITS as u64 {
            Err(AmountError::Overflow)
        } else {
            Ok(Amount::Finite(units))
        }
    }

    /// The scaled integer units, or `None` for `Infinity`.
    pub fn units(self) -> Option<i64> {
        match self {
            Amount::Finite(u) => Some(u),
            Amount::Infinity => None,
        }
    }

    pub fn is_infinite(self) -> bool {
        matches!(self, Amount::Infinity)
    }

    pub fn is_zero(self) -> bool {
        matches!(self, Amount::Finite(0))
    }

    pub fn is_negative(self) -> bool {
        matches!(self, Amount::Finite(u) if u < 0)
    }

    pub fn is_positive(self) -> bool {
        matches!(self, Amount::Finite(u) if u > 0)
    }

    /// `-self`. Infinity has no negation; callers never need `-Infinity`
    /// because only credit limits (always non-negative) may be infinite.
    pub fn checked_neg(self) -> Result<Amount, AmountError> {
        match self {
            Amount::Finite(u) => Amount::from_units(u.checked_neg().ok_or(AmountError::Overflow)?),
            Amount::Infinity => Err(AmountError::InfiniteOperand),
        }
    }

    pub fn checked_add(self, rhs: Amount) -> Result<Amount, AmountError> {
        match (self, rhs) {
            (Amount::Infinity, _) | (_, Amount::Infinity) => Ok(Amount::Infinity),
            (Amount::Finite(a), Amount::Finite(b)) => {
                let sum = a.checked_add(b).ok_or(AmountError::Overflow)?;
                Amount::from_units(sum)
            }
        }
    }

    pub fn checked_sub(self, rhs: Amount) -> Result<Amount, AmountError> {
        self.checked_add(rhs.checked_neg()?)
    }

    /// Multiply by a small integer multiplier (used for `bal_mult ∈ {+1,-1}`).
    pub fn checked_mul_small(self, mult: i64) -> Result<Amount, AmountError> {
        match self {
            Amount::Infinity => Ok(Amount::Infinity),
            Amount::Finite(u) => {
                let prod = u.checked_mul(mult).ok_or(AmountError::Overflow)?;
                Amount::from_units(prod)
            }
        }
    }

    /// Exact division, for cost computation only (`§4.C`). Returns a float
    /// ratio; never used for ledger balances, only for router edge costs.
    pub fn div_exact(self, rhs: Amount) -> Result<f64, AmountError> {
        match (self, rhs) {
            (Amount::Infinity, _) | (_, Amount::Infinity) => Err(AmountError::InfiniteOperand),
            (Amount::Finite(_), Amount::Finite(0)) => Err(AmountError::InfiniteOperand),
            (Amount::Finite(a), Amount::Finite(b)) => Ok(a as f64 / b as f64),
        }
    }

    /// Scale to the router's integer capacity space: multiply by `10^SCALE`
    /// and truncate. `Infinity` stays symbolic (`None`).
    ///
    /// Amounts are already stored in scaled units, so this is the identity
    /// on `Finite` values; it exists to make the scaling boundary from
    /// §4.C/§9 explicit at call sites rather than passing raw units around.
    pub fn to_scaled_capacity(self) -> Option<i64> {
        self.units()
    }

    /// Inverse of `to_scaled_capacity`: exact, since the router only ever
    /// produces integer unit amounts.
    pub fn from_scaled_capacity(units: i64) -> Result<Amount, AmountError> {
        Amount::from_units(units)
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount::ZERO
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Amount::Infinity, Amount::Infinity) => Ordering::Equal,
            (Amount::Infinity, Amount::Finite(_)) => Ordering::Greater,
            (Amount::Finite(_), Amount::Infinity) => Ordering::Less,
            (Amount::Finite(a), Amount::Finite(b)) => a.cmp(b),
        }
    }
}

/// Convenience operator overloads. These panic on overflow the same way
/// primitive integer `+`/`-` do; ledger code that must not panic uses the
/// `checked_*` methods directly.
impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        self.checked_add(rhs).expect("amount overflow")
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Amount) -> Amount {
        self.checked_sub(rhs).expect("amount overflow")
    }
}

impl Neg for Amount {
    type Output = Amount;
    fn neg(self) -> Amount {
        self.checked_neg().expect("cannot negate an infinite amount")
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Infinity => write!(f, "Infinity"),
            Amount::Finite(units) => {
                let sign = if *units < 0 { "-" } else { "" };
                let abs = units.unsigned_abs();
                let whole = abs / SCALE_FACTOR as u64;
                let frac = abs % SCALE_FACTOR as u64;
                write!(f, "{}{}.{:0width$}", sign, whole, frac, width = SCALE as usize)
            }
        }
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Amount, AmountError> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("infinity") || s == "+Infinity" {
            return Ok(Amount::Infinity);
        }
        let (neg, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let mut parts = s.splitn(2, '.');
        let whole_str = parts.next().unwrap_or("0");
        let frac_str = parts.next().unwrap_or("");
        if frac_str.len() > SCALE as usize || !whole_str.chars().all(|c| c.is_ascii_digit())
            || !frac_str.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AmountError::InvalidLiteral(s.to_string()));
        }
        let whole: i64 = whole_str
            .parse()
            .map_err(|_| AmountError::InvalidLiteral(s.to_string()))?;
        let mut frac_padded = frac_str.to_string();
        while frac_padded.len() < SCALE as usize {
            frac_padded.push('0');
        }
        let frac: i64 = if frac_padded.is_empty() {
            0
        } else {
            frac_padded
                .parse()
                .map_err(|_| AmountError::InvalidLiteral(s.to_string()))?
        };
        let units = whole
            .checked_mul(SCALE_FACTOR)
            .and_then(|w| w.checked_add(frac))
            .ok_or(AmountError::Overflow)?;
        let units = if neg { -units } else { units };
        Amount::from_units(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_round_trip() {
        let a: Amount = "12.5".parse().unwrap();
        assert_eq!(a, Amount::Finite(12_500_000));
        assert_eq!(a.to_string(), "12.500000");
    }

    #[test]
    fn parses_negative_and_zero() {
        assert_eq!("-3.2".parse::<Amount>().unwrap(), Amount::Finite(-3_200_000));
        assert_eq!("0".parse::<Amount>().unwrap(), Amount::ZERO);
    }

    #[test]
    fn infinity_parses_and_compares_greatest() {
        let inf: Amount = "Infinity".parse().unwrap();
        assert!(inf.is_infinite());
        assert!(inf > Amount::Finite(i64::MAX / 2));
    }

    #[test]
    fn infinity_propagates_through_add() {
        let inf = Amount::Infinity;
        let five = Amount::from_units(5_000_000).unwrap();
        assert_eq!(inf.checked_add(five).unwrap(), Amount::Infinity);
        assert_eq!(five.checked_add(inf).unwrap(), Amount::Infinity);
    }

    #[test]
    fn mul_small_applies_bal_mult() {
        let bal = Amount::from_units(7_000_000).unwrap();
        assert_eq!(bal.checked_mul_small(-1).unwrap(), Amount::from_units(-7_000_000).unwrap());
    }

    #[test]
    fn overflow_is_rejected() {
        let huge = Amount::from_units(MAX_UNITS).unwrap();
        let one = Amount::from_units(SCALE_FACTOR).unwrap();
        assert_eq!(huge.checked_add(one), Err(AmountError::Overflow));
    }

    #[test]
    fn div_exact_rejects_infinite_operands() {
        let five = Amount::from_units(5_000_000).unwrap();
        assert_eq!(five.div_exact(Amount::Infinity), Err(AmountError::InfiniteOperand));
        assert_eq!(Amount::Infinity.div_exact(five), Err(AmountError::InfiniteOperand));
    }

    #[test]
    fn serde_round_trip() {
        let a = Amount::from_units(42).unwrap();
        let s = serde_json::to_string(&a).unwrap();
        let back: Amount = serde_json::from_str(&s).unwrap();
        assert_eq!(a, back);
    }
}
