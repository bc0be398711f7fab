//! Value Objects

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SkuError {
    #[error("SKU empty")]
    Empty,
    #[error("SKU too long")]
    TooLong,
}

/// Money value object.
///
/// Amounts stay full-precision `Decimal` internally; rounding to two places
/// happens only when a value leaves the domain (`rounded` / `Display`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    /// Display-time value, rounded to 2 decimal places.
    pub fn rounded(&self) -> Decimal { self.amount.round_dp(2) }
    pub fn is_negative(&self) -> bool { self.amount < Decimal::ZERO }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch { left: self.currency.clone(), right: other.currency.clone() }); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }
    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch { left: self.currency.clone(), right: other.currency.clone() }); }
        Ok(Money::new(self.amount - other.amount, &self.currency))
    }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }
    /// Clamps a negative amount to zero, keeping the currency.
    pub fn clamp_zero(&self) -> Money {
        Money::new(self.amount.max(Decimal::ZERO), &self.currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.rounded(), self.currency)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MoneyError {
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
}

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sku() { let sku = Sku::new("prod-001").unwrap(); assert_eq!(sku.as_str(), "PROD-001"); }

    #[test]
    fn test_money_add() {
        let a = Money::new(Decimal::new(100, 0), "XOF");
        let b = Money::new(Decimal::new(50, 0), "XOF");
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(150, 0));
    }

    #[test]
    fn test_money_currency_mismatch() {
        let a = Money::new(Decimal::new(100, 0), "XOF");
        let b = Money::new(Decimal::new(100, 0), "EUR");
        assert!(a.add(&b).is_err());
        assert!(a.subtract(&b).is_err());
    }

    #[test]
    fn test_money_rounds_at_display_only() {
        // a third of ten, accumulated three times, stays exact internally
        let third = Money::new(Decimal::new(10, 0) / Decimal::new(3, 0), "XOF");
        let sum = third.add(&third).unwrap().add(&third).unwrap();
        assert_eq!(sum.rounded(), Decimal::new(1000, 2));
    }

    #[test]
    fn test_clamp_zero() {
        let m = Money::new(Decimal::new(-500, 2), "XOF");
        assert_eq!(m.clamp_zero().amount(), Decimal::ZERO);
        let p = Money::new(Decimal::new(500, 2), "XOF");
        assert_eq!(p.clamp_zero().amount(), Decimal::new(500, 2));
    }
}
