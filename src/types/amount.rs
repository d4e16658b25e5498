use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Smallest unit of the native currency. 1 BOS = 10^7 GON.
pub const GON_PER_BOS: u64 = 10_000_000;

/// A non-negative amount of GON, the fixed-point unit of the native currency.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Debug, Default, Hash)]
pub struct Amount(u64);

impl Amount {
    pub fn from_gon(gon: u64) -> Self {
        Self(gon)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn gon(&self) -> u64 {
        self.0
    }

    /// Parse an amount string, stripping `,`, `.`, and `_` digit separators,
    /// then interpreting the remaining digits as a GON count.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        let cleaned: String = s.chars().filter(|c| !matches!(c, ',' | '.' | '_')).collect();
        if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
            return Err(NodeError::InvalidFee(format!("invalid amount string: {}", s)));
        }
        cleaned
            .parse::<u64>()
            .map(Amount)
            .map_err(|_| NodeError::InvalidFee(format!("invalid amount string: {}", s)))
    }

    pub fn checked_add(&self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(&self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_strips_digit_separators() {
        assert_eq!(Amount::parse("1,000.00").unwrap(), Amount::from_gon(1_000_00));
        assert_eq!(Amount::parse("1_000_00").unwrap(), Amount::from_gon(1_000_00));
        assert_eq!(Amount::parse("100000").unwrap(), Amount::from_gon(100_000));
    }

    #[test]
    fn parsing_rejects_non_numeric() {
        assert!(Amount::parse("abc").is_err());
        assert!(Amount::parse("").is_err());
    }
}
