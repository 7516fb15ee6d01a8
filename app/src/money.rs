//! Monetary amounts. Balances, cashback and deductions have a precision of one decimal place and
//! are stored as whole tenths of the currency unit. Catalog prices keep two decimal places and are
//! stored as whole cents.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use thiserror::Error;

/// Cashback credited for a purchase, in percent of the charged price.
pub const CASHBACK_PERCENT: i64 = 3;

/// Anything above this is rejected as nonsense input. It also keeps the cashback arithmetic far
/// away from overflow.
const MAX_ABS_UNITS: f64 = 1e12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is not a number")]
    NotANumber,
    #[error("amount has too many decimal places")]
    TooPrecise,
    #[error("amount is out of range")]
    OutOfRange,
}

/// An amount in tenths of the currency unit, e.g. `Tenths(15)` is 1.5.
#[derive(Debug, Clone, Copy, Default, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct Tenths(pub i64);

/// A price in cents, e.g. `Cents(3333)` is 33.33.
#[derive(Debug, Clone, Copy, Default, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct Cents(pub i64);

impl Tenths {
    /// Parses a decimal string such as `"12"`, `"12.5"` or `"0.3"`.
    pub fn parse(s: &str) -> Result<Self, AmountError> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(AmountError::NotANumber);
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AmountError::NotANumber);
        }
        // Trailing zeros carry no precision.
        let fraction = fraction.trim_end_matches('0');
        if fraction.len() > 1 {
            return Err(AmountError::TooPrecise);
        }
        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| AmountError::OutOfRange)?
        };
        let tenth: i64 = fraction.parse().unwrap_or(0);
        let value = whole
            .checked_mul(10)
            .and_then(|v| v.checked_add(tenth))
            .filter(|v| (*v as f64) < MAX_ABS_UNITS * 10.0)
            .ok_or(AmountError::OutOfRange)?;
        Ok(Self(if negative { -value } else { value }))
    }

    /// Converts a JSON number. Values that need more than one decimal place are rejected rather
    /// than silently rounded.
    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        let scaled = scale(value, 10.0)?;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err(AmountError::TooPrecise);
        }
        Ok(Self(rounded as i64))
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 10.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Cents {
    /// Converts a price given as a JSON number. Fractions of a cent are rejected, the cashback
    /// is only ever rounded once.
    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        let scaled = scale(value, 100.0)?;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err(AmountError::TooPrecise);
        }
        Ok(Self(rounded as i64))
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Cashback earned on this price: [`CASHBACK_PERCENT`] of it, rounded to one decimal place,
    /// with halves rounded away from zero.
    pub fn cashback(&self) -> Tenths {
        // cents * percent is expressed in ten-thousandths of the unit, a tenth is 1000 of those.
        let scaled = self.0 * CASHBACK_PERCENT;
        let quotient = scaled / 1000;
        let remainder = scaled % 1000;
        if remainder.abs() * 2 >= 1000 {
            Tenths(quotient + scaled.signum())
        } else {
            Tenths(quotient)
        }
    }
}

fn scale(value: f64, factor: f64) -> Result<f64, AmountError> {
    if !value.is_finite() {
        return Err(AmountError::NotANumber);
    }
    if value.abs() >= MAX_ABS_UNITS {
        return Err(AmountError::OutOfRange);
    }
    Ok(value * factor)
}

impl fmt::Display for Tenths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{}", sign, self.0.abs() / 10, self.0.abs() % 10)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.0.abs() / 100, self.0.abs() % 100)
    }
}

impl Add for Tenths {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Tenths {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Tenths {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl AddAssign for Tenths {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl SubAssign for Tenths {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl std::iter::Sum for Tenths {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Tenths::default(), |acc, x| acc + x)
    }
}
