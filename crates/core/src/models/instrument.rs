use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::money::{Currency, Money};

/// Placeholder identifier for cash held in the base currency, whichever
/// currency that is. Priced at 1.0 and resolvable without a network round-trip.
pub const BASE_CASH_ID: &str = "CASH_BASE";

/// Sector used when the catalog leaves it empty.
pub const DEFAULT_SECTOR: &str = "Other";

/// The kind of a tradable instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    Bond,
    Currency,
    Etf,
    Share,
    Futures,
}

impl InstrumentType {
    /// Parse the broker's lowercase instrument kind ("share", "bond", ...)
    /// or its `INSTRUMENT_TYPE_*` enum name.
    pub fn from_wire(kind: &str) -> Option<Self> {
        let kind = kind.trim().to_lowercase();
        let kind = kind.strip_prefix("instrument_type_").unwrap_or(&kind);
        match kind {
            "bond" => Some(InstrumentType::Bond),
            "currency" => Some(InstrumentType::Currency),
            "etf" => Some(InstrumentType::Etf),
            "share" | "stock" => Some(InstrumentType::Share),
            "futures" | "future" => Some(InstrumentType::Futures),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentType::Bond => write!(f, "Bond"),
            InstrumentType::Currency => write!(f, "Currency"),
            InstrumentType::Etf => write!(f, "Etf"),
            InstrumentType::Share => write!(f, "Stock"),
            InstrumentType::Futures => write!(f, "Futures"),
        }
    }
}

/// Normalized instrument metadata, whatever shape the catalog reported it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_type: InstrumentType,
    /// Stable broker uid.
    pub uid: String,
    /// Legacy (figi-like) identifier; may be reissued over time.
    pub legacy_id: String,
    pub currency: Currency,
    pub ticker: String,
    pub name: String,
    /// Face value for bonds and currencies.
    pub nominal: Option<Money>,
    pub first_trade_date: Option<NaiveDate>,
    pub last_trade_date: Option<NaiveDate>,
    pub country: String,
    pub sector: String,
    pub exchange: String,
}

impl Instrument {
    /// Factor converting a quoted price into an absolute amount.
    /// Bonds are quoted in percent of nominal; everything else is 1.0.
    pub fn nominal_rate(&self) -> f64 {
        match (self.instrument_type, &self.nominal) {
            (InstrumentType::Bond, Some(nominal)) => 0.01 * nominal.amount,
            _ => 1.0,
        }
    }

    /// Sector capitalized for display, `Other` when absent.
    pub fn display_sector(&self) -> String {
        let sector = if self.sector.trim().is_empty() {
            DEFAULT_SECTOR
        } else {
            self.sector.trim()
        };
        let mut chars = sector.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
            None => String::new(),
        }
    }

    /// The synthetic cash instrument for `base_currency`.
    pub fn base_cash(base_currency: Currency) -> Self {
        Self {
            instrument_type: InstrumentType::Currency,
            uid: BASE_CASH_ID.to_string(),
            legacy_id: BASE_CASH_ID.to_string(),
            currency: base_currency,
            ticker: base_currency.code().to_string(),
            name: base_currency.name().to_string(),
            nominal: Some(Money::zero(base_currency)),
            first_trade_date: None,
            last_trade_date: None,
            country: String::new(),
            sector: String::new(),
            exchange: String::new(),
        }
    }
}
