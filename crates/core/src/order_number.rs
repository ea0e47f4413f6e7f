//! External order numbers.
//!
//! An order number is what customers and support staff quote. It is a fixed
//! prefix followed by 16 uppercase hex digits drawn from a 128-bit random
//! value, so numbers reveal nothing about order volume or sequence.

use core::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Source of randomness for order numbers.
///
/// Production uses [`ThreadRandom`]; tests inject a deterministic source.
pub trait RandomSource: Send + Sync {
    /// Draw 128 random bits.
    fn next_u128(&self) -> u128;
}

/// Cryptographically secure randomness from the thread-local `rand` RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_u128(&self) -> u128 {
        rand::random()
    }
}

/// Errors parsing an order number or prefix.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderNumberError {
    /// Prefixes are 1-8 uppercase ASCII letters or digits.
    #[error("invalid order number prefix: {0:?}")]
    InvalidPrefix(String),
    /// Not `PREFIX-` followed by 16 uppercase hex digits.
    #[error("malformed order number: {0:?}")]
    Malformed(String),
}

/// A customer-facing order number such as `ORD-3F9A0C1D22B7E410`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Number of hex digits after the prefix.
    pub const TOKEN_LEN: usize = 16;

    /// Default prefix.
    pub const DEFAULT_PREFIX: &'static str = "ORD";

    /// Check that `prefix` can start an order number.
    ///
    /// # Errors
    ///
    /// Returns [`OrderNumberError::InvalidPrefix`] unless the prefix is 1-8
    /// uppercase ASCII letters or digits.
    pub fn validate_prefix(prefix: &str) -> Result<(), OrderNumberError> {
        let ok = (1..=8).contains(&prefix.len())
            && prefix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if ok {
            Ok(())
        } else {
            Err(OrderNumberError::InvalidPrefix(prefix.to_owned()))
        }
    }

    /// Parse a number received from a URL or the command line.
    ///
    /// # Errors
    ///
    /// Returns [`OrderNumberError::Malformed`] if the shape is wrong.
    pub fn parse(s: &str) -> Result<Self, OrderNumberError> {
        let malformed = || OrderNumberError::Malformed(s.to_owned());
        let (prefix, token) = s.split_once('-').ok_or_else(malformed)?;

        Self::validate_prefix(prefix).map_err(|_| malformed())?;

        let token_ok = token.len() == Self::TOKEN_LEN
            && token
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c));
        if !token_ok {
            return Err(malformed());
        }

        Ok(Self(s.to_owned()))
    }

    /// The number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OrderNumber {
    type Err = OrderNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Issues order numbers with a fixed, pre-validated prefix.
#[derive(Clone)]
pub struct OrderNumberGenerator {
    prefix: String,
    random: Arc<dyn RandomSource>,
}

impl OrderNumberGenerator {
    /// Build a generator.
    ///
    /// # Errors
    ///
    /// Returns [`OrderNumberError::InvalidPrefix`] for a bad prefix.
    pub fn new(
        prefix: impl Into<String>,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, OrderNumberError> {
        let prefix = prefix.into();
        OrderNumber::validate_prefix(&prefix)?;
        Ok(Self { prefix, random })
    }

    /// The configured prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Draw the next order number.
    #[must_use]
    pub fn next_number(&self) -> OrderNumber {
        #[allow(clippy::cast_possible_truncation)] // low 64 bits of the draw
        let token = self.random.next_u128() as u64;
        OrderNumber(format!("{}-{token:016X}", self.prefix))
    }
}

impl fmt::Debug for OrderNumberGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderNumberGenerator")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
