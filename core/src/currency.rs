use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CostError;

pub const DEFAULT_BASE_CURRENCY: &str = "USD";

/// Exchange rates expressed as "units of currency per 1 unit of the base".
///
/// The base currency's own rate is definitionally 1.0. An explicit entry for
/// the base is ignored rather than honored: changing the base's rate without
/// remapping every other entry would silently re-denominate the whole table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTable {
    pub base: String,
    pub rates: HashMap<String, f64>,
}

impl RateTable {
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        RateTable {
            base: base.into(),
            rates: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_rate(mut self, code: impl Into<String>, rate: f64) -> Self {
        self.rates.insert(code.into(), rate);
        self
    }

    fn rate(&self, code: &str) -> Result<f64, CostError> {
        if code == self.base {
            return Ok(1.0);
        }
        self.rates
            .get(code)
            .copied()
            .ok_or_else(|| CostError::MissingExchangeRate {
                currency: code.to_string(),
            })
    }
}

/// Convert a monetary amount between currencies through the base currency.
///
/// `from == to` returns the amount unchanged without consulting the table,
/// so same-currency amounts survive even when no rate entry exists. A
/// missing rate is an error, never a silent 1.0.
pub fn convert(amount: f64, from: &str, to: &str, rates: &RateTable) -> Result<f64, CostError> {
    if from == to {
        return Ok(amount);
    }
    let from_rate = rates.rate(from)?;
    let to_rate = rates.rate(to)?;
    Ok(amount / from_rate * to_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd_table() -> RateTable {
        RateTable::new("USD")
            .with_rate("EUR", 0.92)
            .with_rate("CUP", 24.0)
    }

    #[test]
    fn test_same_currency_is_identity_without_rate_entry() {
        let rates = RateTable::new("USD");
        // GBP has no entry at all; same-currency must still pass through
        assert!((convert(12.5, "GBP", "GBP", &rates).unwrap() - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_base_to_foreign() {
        let rates = usd_table();
        assert!((convert(100.0, "USD", "EUR", &rates).unwrap() - 92.0).abs() < 1e-9);
    }

    #[test]
    fn test_foreign_to_base() {
        let rates = usd_table();
        // 50 EUR / 0.92 = 54.3478...
        let usd = convert(50.0, "EUR", "USD", &rates).unwrap();
        assert!((usd - 54.35).abs() < 0.01);
    }

    #[test]
    fn test_foreign_to_foreign_through_base() {
        let rates = usd_table();
        // 92 EUR -> 100 USD -> 2400 CUP
        let cup = convert(92.0, "EUR", "CUP", &rates).unwrap();
        assert!((cup - 2400.0).abs() < 1e-6);
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let rates = usd_table();
        let there = convert(123.45, "USD", "CUP", &rates).unwrap();
        let back = convert(there, "CUP", "USD", &rates).unwrap();
        assert!((back - 123.45).abs() < 1e-9);
    }

    #[test]
    fn test_missing_rate_is_an_error() {
        let rates = usd_table();
        let err = convert(10.0, "GBP", "USD", &rates).unwrap_err();
        match err {
            CostError::MissingExchangeRate { currency } => assert_eq!(currency, "GBP"),
            other => panic!("expected MissingExchangeRate, got {other:?}"),
        }
        assert!(convert(10.0, "USD", "GBP", &rates).is_err());
    }

    #[test]
    fn test_base_rate_entry_is_ignored() {
        // An explicit (bogus) entry for the base must not shift conversions.
        let rates = RateTable::new("USD")
            .with_rate("USD", 2.0)
            .with_rate("EUR", 0.92);
        assert!((convert(100.0, "USD", "EUR", &rates).unwrap() - 92.0).abs() < 1e-9);
    }
}
