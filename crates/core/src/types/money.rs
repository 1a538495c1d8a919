//! Money amounts in the smallest currency unit.
//!
//! Prices are stored as integer cents everywhere (database, cart snapshots,
//! provider line items). [`Money::to_decimal`] converts to the 2-decimal
//! amount used for display.

use core::fmt;
use core::iter::Sum;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Quantity;

/// An amount of money in minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Create an amount from minor units.
    #[must_use]
    pub const fn from_minor(cents: i64) -> Self {
        Self(cents)
    }

    /// The amount in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Price of `quantity` units at this unit price.
    ///
    /// Saturates instead of overflowing; a cart can never legitimately reach
    /// that magnitude.
    #[must_use]
    pub fn times(self, quantity: Quantity) -> Self {
        Self(self.0.saturating_mul(i64::from(quantity.get())))
    }

    /// The amount in major units, rounded to 2 decimal places.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2).round_dp(2)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|m| m.0).fold(0_i64, i64::saturating_add))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amount = self.to_decimal();
        if amount.is_sign_negative() {
            write!(f, "-${:.2}", amount.abs())
        } else {
            write!(f, "${amount:.2}")
        }
    }
}

impl From<i32> for Money {
    fn from(cents: i32) -> Self {
        Self(i64::from(cents))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_two_decimals() {
        assert_eq!(Money::from_minor(1999).to_string(), "$19.99");
        assert_eq!(Money::from_minor(500).to_string(), "$5.00");
        assert_eq!(Money::from_minor(7).to_string(), "$0.07");
        assert_eq!(Money::ZERO.to_string(), "$0.00");
    }

    #[test]
    fn test_times_quantity() {
        let unit = Money::from_minor(500);
        assert_eq!(unit.times(Quantity::new(2).unwrap()), Money::from_minor(1000));
    }

    #[test]
    fn test_sum() {
        let total: Money = [Money::from_minor(1000), Money::from_minor(999)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_minor(1999));
        assert_eq!(total.to_decimal(), Decimal::new(1999, 2));
    }
}
