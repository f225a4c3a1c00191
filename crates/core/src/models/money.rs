use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Currencies the broker reports amounts in.
///
/// Closed set: anything outside it is rejected at the wire boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    Cad,
    Chf,
    Cny,
    Eur,
    Gbp,
    Hkd,
    Ils,
    Jpy,
    Rub,
    Try,
    Usd,
}

impl Currency {
    pub const ALL: [Currency; 11] = [
        Currency::Cad,
        Currency::Chf,
        Currency::Cny,
        Currency::Eur,
        Currency::Gbp,
        Currency::Hkd,
        Currency::Ils,
        Currency::Jpy,
        Currency::Rub,
        Currency::Try,
        Currency::Usd,
    ];

    /// ISO 4217 code, uppercased.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Cad => "CAD",
            Currency::Chf => "CHF",
            Currency::Cny => "CNY",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Hkd => "HKD",
            Currency::Ils => "ILS",
            Currency::Jpy => "JPY",
            Currency::Rub => "RUB",
            Currency::Try => "TRY",
            Currency::Usd => "USD",
        }
    }

    /// English display name.
    pub fn name(&self) -> &'static str {
        match self {
            Currency::Cad => "Canadian dollar",
            Currency::Chf => "Swiss franc",
            Currency::Cny => "Chinese yuan",
            Currency::Eur => "Euro",
            Currency::Gbp => "Pound sterling",
            Currency::Hkd => "Hong Kong dollar",
            Currency::Ils => "Israeli new shekel",
            Currency::Jpy => "Japanese yen",
            Currency::Rub => "Russian ruble",
            Currency::Try => "Turkish lira",
            Currency::Usd => "US dollar",
        }
    }

    /// Parse a currency code case-insensitively ("usd", "USD").
    pub fn from_code(code: &str) -> Option<Self> {
        let upper = code.trim().to_uppercase();
        Self::ALL.into_iter().find(|c| c.code() == upper)
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| CoreError::UnsupportedCurrency(s.to_string()))
    }
}

/// An amount in a specific currency. Immutable value type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub currency: Currency,
    pub amount: f64,
}

impl Money {
    pub fn new(currency: Currency, amount: f64) -> Self {
        Self { currency, amount }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(currency, 0.0)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero(Currency::Rub)
    }
}
