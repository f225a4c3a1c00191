// ═══════════════════════════════════════════════════════════════════
// Shared fixtures — in-memory broker, builders for wire records
// ═══════════════════════════════════════════════════════════════════

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use portfolio_ledger_core::errors::CoreError;
use portfolio_ledger_core::models::clock::Clock;
use portfolio_ledger_core::models::instrument::InstrumentType;
use portfolio_ledger_core::models::money::Currency;
use portfolio_ledger_core::models::settings::LedgerSettings;
use portfolio_ledger_core::providers::traits::{
    BrokerAccount, BrokerApi, BrokerPosition, Candle, InstrumentCatalog, InstrumentDetail,
    InstrumentRecord, InstrumentRef, MoneyValue, OperationsPage, Quotation, RawOperation,
    ACCOUNT_STATUS_OPEN,
};

pub const USD_PROXY: &str = "BBG0013HGFT4";

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn msk() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).unwrap()
}

/// Noon, broker local time, on `date`.
pub fn clock_at(date: NaiveDate) -> Clock {
    Clock::fixed(msk(), date.and_hms_opt(12, 0, 0).unwrap())
}

/// 07:00 UTC, i.e. 10:00 in the broker's timezone.
pub fn utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(7, 0, 0).unwrap())
}

pub fn candle(date: NaiveDate, close: f64) -> Candle {
    Candle {
        time: utc(date),
        close: Quotation::from_f64(close),
        is_complete: true,
    }
}

pub fn provisional_candle(date: NaiveDate, close: f64) -> Candle {
    Candle {
        is_complete: false,
        ..candle(date, close)
    }
}

pub fn detail(uid: &str, figi: &str, ticker: &str, name: &str, currency: &str) -> InstrumentDetail {
    InstrumentDetail {
        uid: uid.into(),
        figi: figi.into(),
        ticker: ticker.into(),
        name: name.into(),
        currency: currency.into(),
        ..InstrumentDetail::default()
    }
}

pub fn account(id: &str, kind: &str, status: &str) -> BrokerAccount {
    BrokerAccount {
        id: id.into(),
        name: format!("Account {id}"),
        account_type: kind.into(),
        status: status.into(),
    }
}

pub fn open_broker_account(id: &str) -> BrokerAccount {
    account(id, "ACCOUNT_TYPE_TINKOFF", ACCOUNT_STATUS_OPEN)
}

pub fn position(figi: &str, kind: &str, quantity: f64, average: f64, current: f64) -> BrokerPosition {
    BrokerPosition {
        figi: figi.into(),
        instrument_uid: format!("uid-{figi}"),
        instrument_type: kind.into(),
        quantity: Quotation::from_f64(quantity),
        average_position_price: MoneyValue::new(Currency::Rub, average),
        current_price: MoneyValue::new(Currency::Rub, current),
        current_nkd: None,
    }
}

pub fn operation(id: &str, figi: &str, date: NaiveDate, kind: &str, currency: Currency, amount: f64) -> RawOperation {
    RawOperation {
        id: id.into(),
        instrument_uid: if figi.is_empty() { String::new() } else { format!("uid-{figi}") },
        figi: figi.into(),
        date: utc(date),
        operation_type: kind.into(),
        payment: MoneyValue::new(currency, amount),
    }
}

/// Default settings: RUB base, +03:00, 180-day candle window.
pub fn settings() -> LedgerSettings {
    LedgerSettings::default()
}

/// Scripted broker. Records every candle and operations request it serves.
pub struct MockBroker {
    pub accounts: Vec<BrokerAccount>,
    pub positions: HashMap<String, Vec<BrokerPosition>>,
    pub cash: HashMap<String, Vec<MoneyValue>>,
    pub candles: HashMap<String, Vec<Candle>>,
    pub operations: HashMap<String, Vec<RawOperation>>,
    pub page_size: usize,
    pub catalog: InstrumentCatalog,
    pub candle_requests: Mutex<Vec<(String, DateTime<Utc>, DateTime<Utc>)>>,
    pub operation_requests: Mutex<Vec<(String, String)>>,
    pub resyncs: Mutex<usize>,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            positions: HashMap::new(),
            cash: HashMap::new(),
            candles: HashMap::new(),
            operations: HashMap::new(),
            page_size: 1000,
            catalog: InstrumentCatalog::default(),
            candle_requests: Mutex::new(Vec::new()),
            operation_requests: Mutex::new(Vec::new()),
            resyncs: Mutex::new(0),
        }
    }
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the USD proxy already in it.
    pub fn with_usd_proxy() -> Self {
        let mut broker = Self::new();
        broker
            .catalog
            .currencies
            .push(detail("uid-usd", USD_PROXY, "USD000UTSTOM", "US Dollar", "rub"));
        broker
    }

    pub fn share(mut self, figi: &str, ticker: &str, name: &str) -> Self {
        self.catalog
            .shares
            .push(detail(&format!("uid-{figi}"), figi, ticker, name, "rub"));
        self
    }

    pub fn candles(mut self, id: &str, candles: Vec<Candle>) -> Self {
        self.candles.insert(id.into(), candles);
        self
    }

    pub fn candle_request_count(&self) -> usize {
        self.candle_requests.lock().unwrap().len()
    }

    pub fn candle_requests_for(&self, id: &str) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.candle_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _, _)| i == id)
            .map(|(_, from, to)| (*from, *to))
            .collect()
    }

    pub fn operation_request_count(&self) -> usize {
        self.operation_requests.lock().unwrap().len()
    }

    pub fn resync_count(&self) -> usize {
        *self.resyncs.lock().unwrap()
    }

    fn records(&self) -> Vec<InstrumentRecord> {
        self.catalog.clone().into_records().collect()
    }
}

#[async_trait]
impl BrokerApi for MockBroker {
    fn name(&self) -> &str {
        "MockBroker"
    }

    async fn list_accounts(&self) -> Result<Vec<BrokerAccount>, CoreError> {
        Ok(self.accounts.clone())
    }

    async fn fetch_positions(&self, account_id: &str) -> Result<Vec<BrokerPosition>, CoreError> {
        Ok(self.positions.get(account_id).cloned().unwrap_or_default())
    }

    async fn fetch_cash_balances(&self, account_id: &str) -> Result<Vec<MoneyValue>, CoreError> {
        Ok(self.cash.get(account_id).cloned().unwrap_or_default())
    }

    async fn fetch_candles(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, CoreError> {
        self.candle_requests
            .lock()
            .unwrap()
            .push((instrument_id.to_string(), from, to));
        Ok(self
            .candles
            .get(instrument_id)
            .map(|all| {
                all.iter()
                    .filter(|c| c.time >= from && c.time <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_operations_page(
        &self,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cursor: &str,
        limit: u32,
    ) -> Result<OperationsPage, CoreError> {
        self.operation_requests
            .lock()
            .unwrap()
            .push((account_id.to_string(), cursor.to_string()));
        let mut matching: Vec<RawOperation> = self
            .operations
            .get(account_id)
            .map(|ops| {
                ops.iter()
                    .filter(|op| op.date >= from && op.date <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matching.sort_by_key(|op| op.date);

        let start: usize = if cursor.is_empty() { 0 } else { cursor.parse().unwrap() };
        let size = self.page_size.min(limit as usize);
        let end = (start + size).min(matching.len());
        let has_next = end < matching.len();
        Ok(OperationsPage {
            items: matching[start..end].to_vec(),
            has_next,
            next_cursor: if has_next { end.to_string() } else { String::new() },
        })
    }

    async fn resolve_instrument(&self, query: &str) -> Result<Option<InstrumentRef>, CoreError> {
        Ok(self.records().into_iter().find_map(|record| {
            let detail = record.detail();
            (detail.uid == query || detail.figi == query || detail.ticker == query).then(|| {
                InstrumentRef {
                    uid: detail.uid.clone(),
                    kind: record.kind(),
                }
            })
        }))
    }

    async fn get_instrument_detail(
        &self,
        uid: &str,
        kind: InstrumentType,
    ) -> Result<InstrumentRecord, CoreError> {
        self.records()
            .into_iter()
            .find(|r| r.kind() == kind && r.detail().uid == uid)
            .ok_or_else(|| CoreError::Api {
                provider: "MockBroker".into(),
                message: format!("no {kind} with uid {uid}"),
            })
    }

    async fn bulk_list_instruments(&self) -> Result<InstrumentCatalog, CoreError> {
        *self.resyncs.lock().unwrap() += 1;
        Ok(self.catalog.clone())
    }
}
