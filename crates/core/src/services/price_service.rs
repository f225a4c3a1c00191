use chrono::{Duration, NaiveDate};
use log::{debug, info};
use std::collections::BTreeSet;

use super::instrument_service::InstrumentService;
use crate::errors::CoreError;
use crate::models::clock::{end_of_day, start_of_day, Clock};
use crate::models::instrument::BASE_CASH_ID;
use crate::models::price::{PriceCache, PriceItem, PriceSeries};
use crate::models::remap::IdentifierRemap;
use crate::models::settings::LedgerSettings;
use crate::providers::traits::BrokerApi;
use crate::storage::table::{
    load_map, store_map, Table, TableStore, FIRST_TRADE_DATES_TABLE, PRICES_TABLE,
};

/// Lazily-filled daily close cache backed by the `prices` and
/// `first_trade_dates` tables.
///
/// Cache strategy:
/// - **Hit** on the exact date: served from memory, no I/O.
/// - **Miss**: one candle fetch over a window around the date, clipped to
///   what is already cached and to today, then forward-filled so weekends
///   and holidays resolve to the previous close. Fills after the newest
///   candle of a window that reaches today are provisional.
/// - **Provisional closes** (`is_closed = false`) are dropped when the
///   tables are opened, so the next run re-fetches the final value.
pub struct PriceService {
    cache: PriceCache,
    prices_table: Box<dyn Table>,
    first_trade_table: Box<dyn Table>,
    remap: IdentifierRemap,
    unavailable_history: BTreeSet<String>,
    clock: Clock,
    window_days: i64,
    lookback_days: i64,
    commit_every: usize,
    fetched_since_commit: usize,
}

impl std::fmt::Debug for PriceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceService")
            .field("instruments", &self.cache.instrument_count())
            .field("cached_prices", &self.cache.total_entries())
            .field("first_trade_dates", &self.cache.first_trade_dates.len())
            .field("fetched_since_commit", &self.fetched_since_commit)
            .finish()
    }
}

impl PriceService {
    pub fn open(store: &dyn TableStore, settings: &LedgerSettings, clock: Clock) -> Result<Self, CoreError> {
        let prices_table = store.open_table(PRICES_TABLE)?;
        let first_trade_table = store.open_table(FIRST_TRADE_DATES_TABLE)?;

        let mut cache = PriceCache {
            entries: load_map::<PriceSeries>(prices_table.as_ref())?,
            first_trade_dates: load_map::<NaiveDate>(first_trade_table.as_ref())?,
        };
        let evicted = cache.evict_unclosed();
        if evicted > 0 {
            info!("Evicted {evicted} provisional prices");
        }
        debug!(
            "Loaded {} prices for {} instruments",
            cache.total_entries(),
            cache.instrument_count()
        );

        Ok(Self {
            cache,
            prices_table,
            first_trade_table,
            remap: settings.identifier_upgrades.clone(),
            unavailable_history: settings.unavailable_history_ids.clone(),
            clock,
            window_days: settings.price_window_days,
            lookback_days: settings.first_trade_lookback_days,
            commit_every: settings.price_commit_every.max(1),
            fetched_since_commit: 0,
        })
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    /// Closing price of `instrument_id` on `date`, in the instrument's currency
    /// and scaled by its nominal rate. `0.0` when nothing trades that early.
    pub async fn price(
        &mut self,
        broker: &dyn BrokerApi,
        instruments: &mut InstrumentService,
        instrument_id: &str,
        date: NaiveDate,
    ) -> Result<f64, CoreError> {
        let id = self.remap.upgrade(instrument_id);
        if id == BASE_CASH_ID {
            return Ok(1.0);
        }
        let today = self.clock.today();
        if date > today {
            return Err(CoreError::FutureDate { date, today });
        }
        if let Some(price) = self.cache.get_price(&id, date) {
            return Ok(price);
        }

        let span = Duration::days(self.window_days);
        let mut from = date - span;
        let mut to = (date + span).min(today);
        if let Some(series) = self.cache.series(&id) {
            if let Some(below) = series.find_lt(date) {
                from = from.max(below);
            }
            if let Some(above) = series.find_gt(date) {
                to = to.min(above);
            }
        }

        let nominal_rate = instruments.get(broker, &id).await?.nominal_rate();
        let candles = broker
            .fetch_candles(
                &id,
                self.clock.to_utc(start_of_day(from)),
                self.clock.to_utc(end_of_day(to)),
            )
            .await?;
        debug!("Fetched {} candles for {id} over {from}..{to}", candles.len());

        let fetched = candles.len();
        let clock = self.clock;
        let series = self.cache.series_mut(&id);
        for candle in candles {
            series.set(PriceItem {
                date: clock.local_date(candle.time),
                price: candle.close.value() * nominal_rate,
                is_closed: candle.is_complete,
            });
        }
        let last_known = series.range(from, to).last().map(|item| item.date);
        series.fill_forward(from, to);
        // Days after the newest candle up to today may still get a close.
        if let Some(last) = last_known.filter(|_| to >= today) {
            series.mark_provisional_after(last, to);
        }
        let price = series.get(date).map_or(0.0, |item| item.price);
        if series.is_empty() {
            self.cache.entries.remove(&id);
        }

        self.fetched_since_commit += fetched;
        if self.fetched_since_commit >= self.commit_every {
            info!("Committing price cache after {} new prices", self.fetched_since_commit);
            self.commit()?;
        }
        Ok(price)
    }

    /// Earliest trading date of `instrument_id` within the lookback window.
    pub async fn first_trade_date(
        &mut self,
        broker: &dyn BrokerApi,
        instrument_id: &str,
    ) -> Result<NaiveDate, CoreError> {
        let id = self.remap.upgrade(instrument_id);
        if id == BASE_CASH_ID {
            return Ok(NaiveDate::MIN);
        }
        if let Some(date) = self.cache.first_trade_dates.get(&id) {
            return Ok(*date);
        }
        let today = self.clock.today();
        if self.unavailable_history.contains(&id) {
            return Ok(today);
        }

        let from = today - Duration::days(self.lookback_days);
        let candles = broker
            .fetch_candles(
                &id,
                self.clock.to_utc(start_of_day(from)),
                self.clock.to_utc(end_of_day(today)),
            )
            .await?;
        let first = candles
            .iter()
            .map(|c| self.clock.local_date(c.time))
            .min()
            .ok_or_else(|| CoreError::NoTradeHistory(id.clone()))?;
        self.cache.first_trade_dates.insert(id, first);
        Ok(first)
    }

    /// Persist both tables.
    pub fn commit(&mut self) -> Result<(), CoreError> {
        store_map(self.cache.entries.iter(), self.prices_table.as_mut())?;
        store_map(self.cache.first_trade_dates.iter(), self.first_trade_table.as_mut())?;
        self.fetched_since_commit = 0;
        Ok(())
    }
}
