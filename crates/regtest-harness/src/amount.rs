//! Exact satoshi amounts.
//!
//! Daemons and the indexing service speak in decimal coin units carried as
//! JSON numbers. [`Amount`] keeps the value as an integer satoshi count and
//! converts through the number's decimal text, so no float arithmetic ever
//! touches a balance.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

/// Satoshis in one coin.
pub const SATS_PER_COIN: u64 = 100_000_000;

const DECIMAL_PLACES: i64 = 8;

/// A non-negative amount measured in satoshis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

/// Errors raised while reading an amount from decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// The text is not a plain or exponent-form decimal number.
    #[error("malformed amount '{text}'")]
    Malformed {
        /// Offending text.
        text: String,
    },
    /// Amounts cannot be negative.
    #[error("negative amount '{text}'")]
    Negative {
        /// Offending text.
        text: String,
    },
    /// The value carries precision below one satoshi.
    #[error("amount '{text}' is more precise than one satoshi")]
    SubSatoshi {
        /// Offending text.
        text: String,
    },
    /// The value does not fit in 64 bits of satoshis.
    #[error("amount '{text}' overflows")]
    Overflow {
        /// Offending text.
        text: String,
    },
}

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Builds an amount from a satoshi count.
    #[must_use]
    pub const fn from_sat(sats: u64) -> Self {
        Self(sats)
    }

    /// Builds an amount from whole coins, saturating on overflow.
    #[must_use]
    pub const fn from_coins(coins: u64) -> Self {
        Self(coins.saturating_mul(SATS_PER_COIN))
    }

    /// Returns the satoshi count.
    #[must_use]
    pub const fn to_sat(self) -> u64 {
        self.0
    }

    /// Subtracts `other`, returning `None` when the result would be negative.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(sats) => Some(Self(sats)),
            None => None,
        }
    }

    /// Adds `other`, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sats) => Some(Self(sats)),
            None => None,
        }
    }

    /// Renders the amount as fixed eight-place coin text, e.g. `25.00000000`.
    #[must_use]
    pub fn to_coin_string(self) -> String {
        format!(
            "{}.{:08}",
            self.0.div_euclid(SATS_PER_COIN),
            self.0.rem_euclid(SATS_PER_COIN)
        )
    }

    /// Renders the amount as a JSON number in coin units.
    #[must_use]
    pub fn to_json(self) -> Value {
        self.to_coin_string()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number)
    }

    /// Reads a coin-unit JSON number.
    ///
    /// # Errors
    ///
    /// Returns an [`AmountError`] when the number is negative, finer than one
    /// satoshi, or too large.
    pub fn from_json_number(number: &Number) -> Result<Self, AmountError> {
        Self::parse_coins(&number.to_string())
    }

    /// Reads a coin-unit JSON value, which must be a number.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::Malformed`] for non-numeric values.
    pub fn from_json(value: &Value) -> Result<Self, AmountError> {
        match value {
            Value::Number(number) => Self::from_json_number(number),
            other => Err(AmountError::Malformed {
                text: other.to_string(),
            }),
        }
    }

    /// Parses decimal coin text such as `50`, `49.9999` or `1e-5`.
    ///
    /// # Errors
    ///
    /// See [`Amount::from_json_number`].
    pub fn parse_coins(text: &str) -> Result<Self, AmountError> {
        let malformed = || AmountError::Malformed {
            text: text.to_owned(),
        };
        if text.starts_with('-') {
            return Err(AmountError::Negative {
                text: text.to_owned(),
            });
        }
        let (mantissa, exponent) = match text.split_once(['e', 'E']) {
            Some((mantissa, exponent)) => {
                (mantissa, exponent.parse::<i64>().map_err(|_| malformed())?)
            }
            None => (text, 0),
        };
        let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(malformed());
        }
        let digits: Vec<u64> = whole
            .chars()
            .chain(fraction.chars())
            .map(|ch| ch.to_digit(10).map(u64::from))
            .collect::<Option<_>>()
            .ok_or_else(malformed)?;

        let whole_len = i64::try_from(whole.len()).map_err(|_| malformed())?;
        let integer_digits = whole_len
            .checked_add(exponent)
            .and_then(|len| len.checked_add(DECIMAL_PLACES))
            .ok_or_else(malformed)?;
        let overflow = || AmountError::Overflow {
            text: text.to_owned(),
        };

        let mut sats: u64 = 0;
        let mut position: i64 = 0;
        for digit in digits {
            if position < integer_digits {
                sats = sats
                    .checked_mul(10)
                    .and_then(|value| value.checked_add(digit))
                    .ok_or_else(overflow)?;
            } else if digit != 0 {
                return Err(AmountError::SubSatoshi {
                    text: text.to_owned(),
                });
            }
            position += 1;
        }
        while position < integer_digits {
            sats = sats.checked_mul(10).ok_or_else(overflow)?;
            position += 1;
        }
        Ok(Self(sats))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BTC", self.to_coin_string())
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let number = Number::deserialize(deserializer)?;
        Self::from_json_number(&number).map_err(de::Error::custom)
    }
}
