use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::CoreError;
use crate::models::instrument::InstrumentType;
use crate::models::money::{Currency, Money};

const NANO: f64 = 1_000_000_000.0;

/// The brokerage the ledger is written against.
///
/// Every call is a plain request/response; pagination and retries are the
/// caller's business. A transport failure surfaces as `CoreError::Network`
/// or `CoreError::Api` and aborts whatever sync step issued it.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait BrokerApi: Send + Sync {
    /// Human-readable name of this broker (for logs/errors).
    fn name(&self) -> &str;

    async fn list_accounts(&self) -> Result<Vec<BrokerAccount>, CoreError>;

    /// Current holdings of one account.
    async fn fetch_positions(&self, account_id: &str) -> Result<Vec<BrokerPosition>, CoreError>;

    /// Free cash per currency.
    async fn fetch_cash_balances(&self, account_id: &str) -> Result<Vec<MoneyValue>, CoreError>;

    /// Daily candles with `from <= time <= to`.
    async fn fetch_candles(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, CoreError>;

    /// One page of executed operations. An empty `cursor` requests the first page.
    async fn fetch_operations_page(
        &self,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cursor: &str,
        limit: u32,
    ) -> Result<OperationsPage, CoreError>;

    /// Point lookup by any identifier. `None` when the broker knows nothing.
    async fn resolve_instrument(&self, query: &str) -> Result<Option<InstrumentRef>, CoreError>;

    async fn get_instrument_detail(
        &self,
        uid: &str,
        kind: InstrumentType,
    ) -> Result<InstrumentRecord, CoreError>;

    /// Every instrument of every status, grouped by catalog.
    async fn bulk_list_instruments(&self) -> Result<InstrumentCatalog, CoreError>;
}

// ── Wire scalars ────────────────────────────────────────────────────

/// Fixed-point number as `units + nano / 1e9`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quotation {
    #[serde(default, deserialize_with = "int_from_any")]
    pub units: i64,
    #[serde(default)]
    pub nano: i32,
}

impl Quotation {
    pub fn value(&self) -> f64 {
        self.units as f64 + self.nano as f64 / NANO
    }

    pub fn from_f64(value: f64) -> Self {
        let units = value.trunc();
        Self {
            units: units as i64,
            nano: ((value - units) * NANO).round() as i32,
        }
    }
}

/// A `Quotation` tagged with a lowercase currency code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyValue {
    #[serde(default)]
    pub currency: String,
    #[serde(default, deserialize_with = "int_from_any")]
    pub units: i64,
    #[serde(default)]
    pub nano: i32,
}

impl MoneyValue {
    pub fn new(currency: Currency, value: f64) -> Self {
        let q = Quotation::from_f64(value);
        Self {
            currency: currency.code().to_lowercase(),
            units: q.units,
            nano: q.nano,
        }
    }

    pub fn value(&self) -> f64 {
        self.units as f64 + self.nano as f64 / NANO
    }

    /// Convert into domain money; fails on a currency outside the supported set.
    pub fn to_money(&self) -> Result<Money, CoreError> {
        let currency = self.currency.parse::<Currency>()?;
        Ok(Money::new(currency, self.value()))
    }

    /// The gateway sends an empty currency for "no value".
    pub fn is_blank(&self) -> bool {
        self.currency.trim().is_empty()
    }
}

/// int64 fields arrive as JSON strings; accept plain numbers as well.
fn int_from_any<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(v) => Ok(v),
        IntOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// ── Accounts / positions ────────────────────────────────────────────

pub const ACCOUNT_STATUS_OPEN: &str = "ACCOUNT_STATUS_OPEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerAccount {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub account_type: String,
    #[serde(default)]
    pub status: String,
}

impl BrokerAccount {
    pub fn is_open(&self) -> bool {
        self.status == ACCOUNT_STATUS_OPEN
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerPosition {
    #[serde(default)]
    pub figi: String,
    #[serde(default)]
    pub instrument_uid: String,
    /// Lowercase kind: "share", "bond", "etf", "currency", "futures".
    #[serde(default)]
    pub instrument_type: String,
    #[serde(default)]
    pub quantity: Quotation,
    #[serde(default)]
    pub average_position_price: MoneyValue,
    #[serde(default)]
    pub current_price: MoneyValue,
    #[serde(default)]
    pub current_nkd: Option<MoneyValue>,
}

// ── Market data ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub close: Quotation,
    #[serde(default)]
    pub is_complete: bool,
}

// ── Operations ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOperation {
    pub id: String,
    #[serde(default)]
    pub instrument_uid: String,
    #[serde(default)]
    pub figi: String,
    pub date: DateTime<Utc>,
    /// `OPERATION_TYPE_*` enum name.
    #[serde(rename = "type", default)]
    pub operation_type: String,
    #[serde(default)]
    pub payment: MoneyValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationsPage {
    #[serde(default)]
    pub items: Vec<RawOperation>,
    #[serde(default)]
    pub has_next: bool,
    #[serde(default)]
    pub next_cursor: String,
}

// ── Instruments ─────────────────────────────────────────────────────

/// Canonical identity returned by a point lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentRef {
    pub uid: String,
    pub kind: InstrumentType,
}

/// Union of the fields the typed catalog records carry.
///
/// Which trading-window fields are filled depends on the catalog:
/// bonds have placement/maturity, shares ipo, etfs released,
/// futures first/last trade dates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentDetail {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub figi: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub nominal: Option<MoneyValue>,
    #[serde(default)]
    pub country_of_risk: String,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub placement_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub maturity_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ipo_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub released_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub first_trade_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_trade_date: Option<DateTime<Utc>>,
}

/// A detail record tagged with the catalog it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentRecord {
    Bond(InstrumentDetail),
    Currency(InstrumentDetail),
    Etf(InstrumentDetail),
    Share(InstrumentDetail),
    Futures(InstrumentDetail),
}

impl InstrumentRecord {
    pub fn tagged(kind: InstrumentType, detail: InstrumentDetail) -> Self {
        match kind {
            InstrumentType::Bond => InstrumentRecord::Bond(detail),
            InstrumentType::Currency => InstrumentRecord::Currency(detail),
            InstrumentType::Etf => InstrumentRecord::Etf(detail),
            InstrumentType::Share => InstrumentRecord::Share(detail),
            InstrumentType::Futures => InstrumentRecord::Futures(detail),
        }
    }

    pub fn kind(&self) -> InstrumentType {
        match self {
            InstrumentRecord::Bond(_) => InstrumentType::Bond,
            InstrumentRecord::Currency(_) => InstrumentType::Currency,
            InstrumentRecord::Etf(_) => InstrumentType::Etf,
            InstrumentRecord::Share(_) => InstrumentType::Share,
            InstrumentRecord::Futures(_) => InstrumentType::Futures,
        }
    }

    pub fn detail(&self) -> &InstrumentDetail {
        match self {
            InstrumentRecord::Bond(d)
            | InstrumentRecord::Currency(d)
            | InstrumentRecord::Etf(d)
            | InstrumentRecord::Share(d)
            | InstrumentRecord::Futures(d) => d,
        }
    }
}

/// Result of a bulk catalog listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrumentCatalog {
    pub bonds: Vec<InstrumentDetail>,
    pub etfs: Vec<InstrumentDetail>,
    pub shares: Vec<InstrumentDetail>,
    pub currencies: Vec<InstrumentDetail>,
}

impl InstrumentCatalog {
    /// Every record, tagged with its catalog.
    pub fn into_records(self) -> impl Iterator<Item = InstrumentRecord> {
        let bonds = self.bonds.into_iter().map(InstrumentRecord::Bond);
        let etfs = self.etfs.into_iter().map(InstrumentRecord::Etf);
        let shares = self.shares.into_iter().map(InstrumentRecord::Share);
        let currencies = self.currencies.into_iter().map(InstrumentRecord::Currency);
        bonds.chain(etfs).chain(shares).chain(currencies)
    }

    pub fn len(&self) -> usize {
        self.bonds.len() + self.etfs.len() + self.shares.len() + self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
