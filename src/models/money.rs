//! Conversions between the arithmetic type (`rust_decimal::Decimal`) and the
//! stored type (`bson::Decimal128`). All balance math happens in `Decimal`;
//! documents carry `Decimal128` so the store can `$inc` and compare natively.

use mongodb::bson::Decimal128;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("invalid decimal amount: {0}")]
pub struct MoneyError(String);

pub fn to_decimal128(value: Decimal) -> Result<Decimal128, MoneyError> {
    Decimal128::from_str(&value.to_string()).map_err(|e| MoneyError(e.to_string()))
}

/// Fails only on stored values outside `Decimal` range (corrupt data, NaN).
pub fn to_decimal(value: Decimal128) -> Result<Decimal, MoneyError> {
    Decimal::from_str(&value.to_string()).map_err(|e| MoneyError(e.to_string()))
}

pub fn zero() -> Decimal128 {
    Decimal128::from_str("0").expect("zero is a valid decimal128")
}
