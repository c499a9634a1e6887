use std::{
    fmt::Display,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------     MinorUnits      ---------------------------------------------------------
/// An amount of money in the smallest unit of its currency (cents, pesewas, kobo).
///
/// All amounts that cross the engine boundary are integers. Conversion from the decimal strings that providers and
/// storefronts use happens once, at the edge, via [`MinorUnits::from_str`].
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct MinorUnits(i64);

op!(binary MinorUnits, Add, add);
op!(binary MinorUnits, Sub, sub);
op!(inplace MinorUnits, AddAssign, add_assign);
op!(inplace MinorUnits, SubAssign, sub_assign);
op!(unary MinorUnits, Neg, neg);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor currency units: {0}")]
pub struct MinorUnitsConversionError(String);

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for MinorUnits {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for MinorUnits {}

impl TryFrom<u64> for MinorUnits {
    type Error = MinorUnitsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MinorUnitsConversionError(format!("Value {value} is too large to convert to MinorUnits")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

/// Parses a two-decimal price string, e.g. "9.99" or "12", into minor units.
impl FromStr for MinorUnits {
    type Err = MinorUnitsConversionError;

    fn from_str(price: &str) -> Result<Self, Self::Err> {
        let price = price.trim();
        let invalid = |reason: &str| MinorUnitsConversionError(format!("Invalid price value: {price}. {reason}."));
        let (negative, digits) = match price.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, price),
        };
        let mut parts = digits.split('.');
        let whole = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| invalid("Missing whole units"))?;
        let whole_units = whole.parse::<i64>().map_err(|e| invalid(&e.to_string()))?;
        let cents = match parts.next() {
            None => 0,
            Some(frac) if frac.is_empty() || frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) => {
                return Err(invalid("Expected at most two decimal places"));
            },
            Some(frac) if frac.len() == 1 => frac.parse::<i64>().map_err(|e| invalid(&e.to_string()))? * 10,
            Some(frac) => frac.parse::<i64>().map_err(|e| invalid(&e.to_string()))?,
        };
        if parts.next().is_some() {
            return Err(invalid("Too many decimal points"));
        }
        let value = whole_units
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .ok_or_else(|| invalid("Value is out of range"))?;
        Ok(Self(if negative { -value } else { value }))
    }
}

impl Display for MinorUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl MinorUnits {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Returns `None` if the sum does not fit in an `i64`.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Multiplies by a quantity. Returns `None` on overflow.
    pub fn checked_mul(self, quantity: i64) -> Option<Self> {
        self.0.checked_mul(quantity).map(Self)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}
