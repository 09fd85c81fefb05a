use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// Number of fractional digits carried by an [`Amount`].
pub const DECIMALS: usize = 8;

/// Base units per whole token.
pub const UNITS_PER_TOKEN: u64 = 100_000_000;

/// Token amount held as fixed-point base units so that long runs of small
/// transfers never drift. Serialized as a plain JSON number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);

    #[cfg(test)]
    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    pub const fn from_tokens(tokens: u64) -> Self {
        Self(tokens * UNITS_PER_TOKEN)
    }

    pub fn units(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Convert a JSON-style float, rounding to the nearest base unit.
    pub fn from_f64(value: f64) -> Result<Self, LedgerError> {
        if !value.is_finite() {
            return Err(LedgerError::InvalidAmount(value.to_string()));
        }
        if value < 0.0 {
            return Err(LedgerError::NonPositiveAmount);
        }
        let units = (value * UNITS_PER_TOKEN as f64).round();
        if units >= u64::MAX as f64 {
            return Err(LedgerError::InvalidAmount(value.to_string()));
        }
        Ok(Self(units as u64))
    }

    /// Like [`Amount::from_f64`] but rejects values that need rounding,
    /// i.e. anything finer than eight decimals.
    pub fn from_f64_exact(value: f64) -> Result<Self, LedgerError> {
        let amount = Self::from_f64(value)?;
        if amount.as_f64() != value {
            return Err(LedgerError::InvalidAmount(value.to_string()));
        }
        Ok(amount)
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / UNITS_PER_TOKEN as f64
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNITS_PER_TOKEN;
        let frac = self.0 % UNITS_PER_TOKEN;
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            let digits = format!("{frac:0width$}", width = DECIMALS);
            write!(f, "{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

/// Exact decimal parsing: `"4"`, `"4.25"`, `".5"`. More than eight
/// fractional digits is an error, never a silent truncation.
impl FromStr for Amount {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = || LedgerError::InvalidAmount(raw.to_string());

        if let Some(rest) = raw.strip_prefix('-') {
            // A well-formed negative number is a sign problem, not a syntax one.
            return match rest.parse::<Amount>() {
                Ok(_) => Err(LedgerError::NonPositiveAmount),
                Err(_) => Err(invalid()),
            };
        }

        let (whole, frac) = match raw.split_once('.') {
            Some((w, f)) => (w, f),
            None => (raw, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        if frac.len() > DECIMALS {
            return Err(invalid());
        }

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u64>()
                .ok()
                .and_then(|w| w.checked_mul(UNITS_PER_TOKEN))
                .ok_or_else(invalid)?
        };
        let frac_units = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = DECIMALS);
            padded.parse::<u64>().map_err(|_| invalid())?
        };

        whole_units
            .checked_add(frac_units)
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Amount::from_f64(value).map_err(serde::de::Error::custom)
    }
}
