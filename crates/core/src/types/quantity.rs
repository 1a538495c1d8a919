//! Line item quantities.
//!
//! A quantity is always at least one. Form input reaches the cart as text, so
//! [`Quantity::parse`] is the only way user-supplied values become quantities.

use core::fmt;
use core::num::{IntErrorKind, NonZeroU32};

use serde::{Deserialize, Serialize};

/// Errors from parsing a user-supplied quantity.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// Nothing was entered.
    #[error("quantity is required")]
    Empty,
    /// The input is not a whole number.
    #[error("quantity must be a whole number")]
    NotANumber,
    /// Zero or negative.
    #[error("quantity must be at least 1")]
    NotPositive,
    /// Above [`Quantity::MAX`].
    #[error("quantity must be at most {max}")]
    TooLarge {
        /// Largest accepted quantity.
        max: u32,
    },
}

/// A positive number of units of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(NonZeroU32);

impl Quantity {
    /// One unit.
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Largest quantity a single line can hold. Fits the `INTEGER` column.
    pub const MAX: u32 = i32::MAX as u32;

    /// Create a quantity, returning `None` for zero or values above [`Self::MAX`].
    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        if value > Self::MAX {
            return None;
        }
        NonZeroU32::new(value).map(Self)
    }

    /// Parse untrusted form input.
    ///
    /// # Errors
    ///
    /// Returns a [`QuantityError`] unless the trimmed input is a whole number
    /// between 1 and [`Self::MAX`].
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(QuantityError::Empty);
        }

        let value: i64 = trimmed.parse().map_err(|e: core::num::ParseIntError| match e.kind() {
            IntErrorKind::PosOverflow => QuantityError::TooLarge { max: Self::MAX },
            IntErrorKind::NegOverflow => QuantityError::NotPositive,
            _ => QuantityError::NotANumber,
        })?;
        if value < 1 {
            return Err(QuantityError::NotPositive);
        }

        u32::try_from(value)
            .ok()
            .and_then(Self::new)
            .ok_or(QuantityError::TooLarge { max: Self::MAX })
    }

    /// The number of units.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// One more unit, or `None` at [`Self::MAX`].
    #[must_use]
    pub fn incremented(self) -> Option<Self> {
        self.get().checked_add(1).and_then(Self::new)
    }

    /// One fewer unit, or `None` when that would reach zero.
    #[must_use]
    pub fn decremented(self) -> Option<Self> {
        Self::new(self.get() - 1)
    }

    /// The value as stored in the database.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        // MAX is i32::MAX, so this never saturates.
        i32::try_from(self.get()).unwrap_or(i32::MAX)
    }
}

impl TryFrom<i32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .ok()
            .and_then(Self::new)
            .ok_or(QuantityError::NotPositive)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_positive_integers() {
        assert_eq!(Quantity::parse("3").unwrap().get(), 3);
        assert_eq!(Quantity::parse(" 12 ").unwrap().get(), 12);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(Quantity::parse(""), Err(QuantityError::Empty));
        assert_eq!(Quantity::parse("two"), Err(QuantityError::NotANumber));
        assert_eq!(Quantity::parse("1.5"), Err(QuantityError::NotANumber));
        assert_eq!(Quantity::parse("0"), Err(QuantityError::NotPositive));
        assert_eq!(Quantity::parse("-4"), Err(QuantityError::NotPositive));
        assert!(matches!(
            Quantity::parse("99999999999"),
            Err(QuantityError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_parse_beyond_integer_range() {
        assert_eq!(
            Quantity::parse("99999999999999999999"),
            Err(QuantityError::TooLarge { max: Quantity::MAX })
        );
        assert_eq!(
            Quantity::parse("-99999999999999999999"),
            Err(QuantityError::NotPositive)
        );
    }

    #[test]
    fn test_decrement_stops_at_one() {
        let two = Quantity::new(2).unwrap();
        assert_eq!(two.decremented(), Some(Quantity::ONE));
        assert_eq!(Quantity::ONE.decremented(), None);
    }

    #[test]
    fn test_increment() {
        assert_eq!(Quantity::ONE.incremented(), Quantity::new(2));
        assert_eq!(Quantity::new(Quantity::MAX).unwrap().incremented(), None);
    }

    #[test]
    fn test_try_from_database_value() {
        assert_eq!(Quantity::try_from(5).unwrap().get(), 5);
        assert!(Quantity::try_from(0).is_err());
        assert!(Quantity::try_from(-1).is_err());
    }
}
