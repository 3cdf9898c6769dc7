use crate::error::EscrowError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a positive monetary amount.
///
/// Escrow authorizations are never created for zero or negative values, so the
/// constructor rejects them up front.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, EscrowError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(EscrowError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Amount in minor units (cents), rounded half away from zero.
    pub fn minor_units(&self) -> Result<i64, EscrowError> {
        (self.0 * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or_else(|| EscrowError::ValidationError("Amount out of range".to_string()))
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = EscrowError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// A three-letter ISO currency code, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, EscrowError> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_lowercase()))
        } else {
            Err(EscrowError::ValidationError(format!(
                "Invalid currency code: {:?}",
                code
            )))
        }
    }

    pub fn usd() -> Self {
        Self("usd".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

impl TryFrom<String> for Currency {
    type Error = EscrowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A currency-tagged amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Amount,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: Amount, currency: Currency) -> Self {
        Self { amount, currency }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency.as_str().to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(EscrowError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(EscrowError::ValidationError(_))
        ));
    }

    #[test]
    fn test_minor_units_rounding() {
        assert_eq!(Amount::new(dec!(100)).unwrap().minor_units().unwrap(), 10000);
        assert_eq!(Amount::new(dec!(19.999)).unwrap().minor_units().unwrap(), 2000);
        assert_eq!(Amount::new(dec!(0.005)).unwrap().minor_units().unwrap(), 1);
    }

    #[test]
    fn test_currency_is_normalised() {
        assert_eq!(Currency::new("USD").unwrap(), Currency::usd());
        assert_eq!(Currency::new(" eur ").unwrap().as_str(), "eur");
        assert!(Currency::new("dollars").is_err());
        assert!(Currency::new("u5d").is_err());
    }

    #[test]
    fn test_amount_deserialization_rejects_non_positive() {
        let ok: Amount = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(ok.value(), dec!(12.50));
        assert!(serde_json::from_str::<Amount>("\"0\"").is_err());
    }

    #[test]
    fn test_money_display() {
        let money = Money::new(Amount::new(dec!(100.00)).unwrap(), Currency::usd());
        assert_eq!(money.to_string(), "100 USD");
    }
}
