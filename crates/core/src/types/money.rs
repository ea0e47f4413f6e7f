//! Decimal money amounts.
//!
//! ShopClub trades in a single, configured currency, so a [`Money`] value is
//! just a decimal amount in the currency's standard unit (dollars, pounds).
//! All arithmetic is exact decimal arithmetic; nothing passes through floats.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors converting a [`Money`] amount for the payment gateway.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Gateways never charge negative amounts.
    #[error("amount {0} is negative")]
    Negative(Decimal),
    /// The amount has more precision than the currency's minor unit.
    #[error("amount {0} is not a whole number of minor units")]
    FractionalMinorUnits(Decimal),
    /// The amount does not fit in the gateway's integer representation.
    #[error("amount {0} is too large")]
    Overflow(Decimal),
}

/// An amount of money in the store currency.
///
/// ```
/// use rust_decimal::Decimal;
/// use shopclub_core::Money;
///
/// let price = Money::new(Decimal::new(999, 2));
/// assert_eq!(price.times(3).to_string(), "29.97");
/// assert_eq!(price.times(3).to_minor_units(), Ok(2997));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero in the store currency.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Minor units per standard unit (cents per dollar).
    const MINOR_UNITS: i64 = 100;

    /// Wrap a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Build an amount from minor units (e.g. cents).
    #[must_use]
    pub fn from_minor_units(minor: i64) -> Self {
        Self(Decimal::new(minor, 2))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// This amount multiplied by a quantity.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }

    /// Whether the amount is below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Convert to the gateway's integer minor-unit representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative, has sub-cent precision, or
    /// does not fit in an `i64`.
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        if self.is_negative() {
            return Err(MoneyError::Negative(self.0));
        }

        let scaled = self
            .0
            .checked_mul(Decimal::from(Self::MINOR_UNITS))
            .ok_or(MoneyError::Overflow(self.0))?;

        if !scaled.fract().is_zero() {
            return Err(MoneyError::FractionalMinorUnits(self.0));
        }

        i64::try_from(scaled.trunc()).map_err(|_| MoneyError::Overflow(self.0))
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Self> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value).map(Self)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
