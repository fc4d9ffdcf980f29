//! Monetary amounts stored as integer cents

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// An amount of money in cents.
///
/// Serialized as a decimal number of major units (`12.5` for 1250 cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Convert a decimal amount, rounding to the nearest cent.
    pub fn from_major(amount: f64) -> Option<Self> {
        if !amount.is_finite() {
            return None;
        }
        let cents = (amount * 100.0).round();
        if cents.abs() > i64::MAX as f64 {
            return None;
        }
        Some(Money(cents as i64))
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn as_major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `round(self × rate, 2)`, rounding half away from zero.
    ///
    /// The rate is resolved to basis points first so `0.85` is exact.
    pub fn percentage(self, rate: f64) -> Money {
        let basis_points = (rate * 10_000.0).round() as i128;
        Money(div_round(self.0 as i128 * basis_points, 10_000) as i64)
    }

    /// `self × numerator / denominator`, rounded to the nearest cent.
    pub fn scale(self, numerator: i64, denominator: i64) -> Money {
        if denominator == 0 {
            return Money::ZERO;
        }
        Money(div_round(self.0 as i128 * numerator as i128, denominator as i128) as i64)
    }
}

fn div_round(value: i128, divisor: i128) -> i128 {
    let quotient = value / divisor;
    let remainder = value % divisor;
    if remainder.abs() * 2 >= divisor.abs() {
        if (value < 0) != (divisor < 0) {
            quotient - 1
        } else {
            quotient + 1
        }
    } else {
        quotient
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, cents / 100, cents % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_major())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = f64::deserialize(deserializer)?;
        Money::from_major(amount)
            .ok_or_else(|| de::Error::custom(format!("invalid monetary amount: {}", amount)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_rounds_to_cents() {
        assert_eq!(Money::from_cents(10_000).percentage(0.5), Money::from_cents(5_000));
        assert_eq!(Money::from_cents(10_000).percentage(0.85), Money::from_cents(8_500));
        assert_eq!(Money::from_cents(333).percentage(0.5), Money::from_cents(167));
        assert_eq!(Money::from_cents(1).percentage(0.0), Money::ZERO);
    }

    #[test]
    fn scale_rounds_half_away_from_zero() {
        // 25.00/h for 90 minutes
        assert_eq!(Money::from_cents(2_500).scale(90, 60), Money::from_cents(3_750));
        assert_eq!(Money::from_cents(1).scale(1, 2), Money::from_cents(1));
        assert_eq!(Money::from_cents(100).scale(1, 0), Money::ZERO);
    }

    #[test]
    fn json_uses_major_units() {
        let json = serde_json::to_string(&Money::from_cents(1_250)).unwrap();
        assert_eq!(json, "12.5");

        let parsed: Money = serde_json::from_str("19.999").unwrap();
        assert_eq!(parsed, Money::from_cents(2_000));
    }

    #[test]
    fn display_pads_cents() {
        assert_eq!(Money::from_cents(505).to_string(), "5.05");
        assert_eq!(Money::from_cents(-7).to_string(), "-0.07");
    }
}
