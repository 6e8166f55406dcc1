//! # PULSE - Fixed-Point Currency
//!
//! **NO FLOATING POINT IN FINANCIAL CALCULATIONS**
//!
//! `Pulse` is the single fungible currency of the bazaar. It uses the same
//! precision as the on-chain token: 18 decimals stored as a raw `u128`.
//!
//! ## Range
//!
//! - Minimum: 0.000000000000000000
//! - Maximum: 340,282,366,920,938,463,463.374607431768211455
//!
//! All arithmetic the engine performs goes through the checked helpers;
//! overflow surfaces as [`BazaarError::ArithmeticOverflow`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BazaarError, BazaarResult};

/// Number of decimal places.
pub const DECIMALS: u32 = 18;

/// The multiplier for 18 decimal places.
const MULTIPLIER: u128 = 10u128.pow(DECIMALS);

/// An amount of PULSE with 18 decimal places.
///
/// Serialized as a decimal string (`"0.001"`) so config files stay readable
/// and no precision is lost through TOML's 64-bit integers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(transparent)]
pub struct Pulse(u128);

impl Pulse {
    /// Zero value.
    pub const ZERO: Self = Self(0);

    /// One whole PULSE.
    pub const ONE: Self = Self(MULTIPLIER);

    /// Maximum representable value.
    pub const MAX: Self = Self(u128::MAX);

    /// Creates from a whole number of PULSE.
    ///
    /// Saturates at [`Pulse::MAX`].
    #[inline]
    #[must_use]
    pub const fn from_whole(whole: u128) -> Self {
        Self(whole.saturating_mul(MULTIPLIER))
    }

    /// Creates from whole and fractional parts, e.g. `from_parts(47, 500_000)`
    /// with `fraction_digits = 6` is 47.5.
    ///
    /// Returns `None` if `fraction` has more digits than `fraction_digits`,
    /// `fraction_digits` exceeds 18, or the value overflows.
    #[must_use]
    pub fn from_parts(whole: u128, fraction: u128, fraction_digits: u32) -> Option<Self> {
        if fraction_digits > DECIMALS || fraction >= 10u128.pow(fraction_digits) {
            return None;
        }
        let scaled_fraction = fraction * 10u128.pow(DECIMALS - fraction_digits);
        whole
            .checked_mul(MULTIPLIER)?
            .checked_add(scaled_fraction)
            .map(Self)
    }

    /// Creates from the raw 18-decimal value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Returns the raw 18-decimal value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Returns the whole number part.
    #[inline]
    #[must_use]
    pub const fn whole(self) -> u128 {
        self.0 / MULTIPLIER
    }

    /// Returns the fractional part in raw units (0 to 10^18 - 1).
    #[inline]
    #[must_use]
    pub const fn fraction(self) -> u128 {
        self.0 % MULTIPLIER
    }

    /// Returns true if zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction.
    #[inline]
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked multiplication by an integer (unit price times quantity).
    #[inline]
    #[must_use]
    pub const fn checked_mul_int(self, rhs: u128) -> Option<Self> {
        match self.0.checked_mul(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked floor division by an integer.
    #[inline]
    #[must_use]
    pub const fn checked_div_int(self, rhs: u128) -> Option<Self> {
        if rhs == 0 {
            None
        } else {
            Some(Self(self.0 / rhs))
        }
    }

    /// Saturating subtraction.
    #[inline]
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Addition with error on overflow.
    ///
    /// # Errors
    ///
    /// Returns `BazaarError::ArithmeticOverflow` if the addition overflows.
    #[inline]
    pub fn safe_add(self, rhs: Self) -> BazaarResult<Self> {
        self.checked_add(rhs).ok_or(BazaarError::ArithmeticOverflow)
    }

    /// Subtraction with error on underflow.
    ///
    /// # Errors
    ///
    /// Returns `BazaarError::ArithmeticOverflow` if the subtraction underflows.
    #[inline]
    pub fn safe_sub(self, rhs: Self) -> BazaarResult<Self> {
        self.checked_sub(rhs).ok_or(BazaarError::ArithmeticOverflow)
    }

    /// Multiplication by an integer with error on overflow.
    ///
    /// # Errors
    ///
    /// Returns `BazaarError::ArithmeticOverflow` if the product overflows.
    #[inline]
    pub fn safe_mul_int(self, rhs: u128) -> BazaarResult<Self> {
        self.checked_mul_int(rhs).ok_or(BazaarError::ArithmeticOverflow)
    }
}

impl fmt::Debug for Pulse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pulse({}.{:018})", self.whole(), self.fraction())
    }
}

impl fmt::Display for Pulse {
    /// Prints the shortest exact decimal form: `47.5`, `0.001`, `3`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fraction = self.fraction();
        if fraction == 0 {
            return write!(f, "{}", self.whole());
        }
        let digits = format!("{fraction:018}");
        write!(f, "{}.{}", self.whole(), digits.trim_end_matches('0'))
    }
}

impl FromStr for Pulse {
    type Err = BazaarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || BazaarError::InvalidConfig(format!("invalid PULSE amount: {s:?}"));

        let (whole, fraction) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(bad());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let digits = u32::try_from(fraction.len()).map_err(|_| bad())?;
        if digits > DECIMALS {
            return Err(bad());
        }

        let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| bad())? };
        let fraction: u128 = if fraction.is_empty() { 0 } else { fraction.parse().map_err(|_| bad())? };

        Self::from_parts(whole, fraction, digits).ok_or_else(bad)
    }
}

impl TryFrom<String> for Pulse {
    type Error = BazaarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pulse> for String {
    fn from(value: Pulse) -> Self {
        value.to_string()
    }
}
