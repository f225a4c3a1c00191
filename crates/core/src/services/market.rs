use chrono::NaiveDate;

use super::currency_service::CurrencyService;
use super::instrument_service::InstrumentService;
use super::price_service::PriceService;
use crate::errors::CoreError;
use crate::models::instrument::Instrument;
use crate::models::money::{Currency, Money};
use crate::providers::traits::BrokerApi;

/// Everything needed to put a number on a holding: the broker plus the
/// price, instrument and currency caches, borrowed for one computation.
pub struct Market<'a> {
    pub broker: &'a dyn BrokerApi,
    pub prices: &'a mut PriceService,
    pub instruments: &'a mut InstrumentService,
    pub currency: &'a CurrencyService,
}

impl<'a> Market<'a> {
    pub fn new(
        broker: &'a dyn BrokerApi,
        prices: &'a mut PriceService,
        instruments: &'a mut InstrumentService,
        currency: &'a CurrencyService,
    ) -> Self {
        Self {
            broker,
            prices,
            instruments,
            currency,
        }
    }

    pub async fn price(&mut self, instrument_id: &str, date: NaiveDate) -> Result<f64, CoreError> {
        self.prices
            .price(self.broker, self.instruments, instrument_id, date)
            .await
    }

    pub async fn first_trade_date(&mut self, instrument_id: &str) -> Result<NaiveDate, CoreError> {
        self.prices.first_trade_date(self.broker, instrument_id).await
    }

    pub async fn instrument(&mut self, instrument_id: &str) -> Result<Instrument, CoreError> {
        self.instruments
            .get(self.broker, instrument_id)
            .await
            .cloned()
    }

    pub async fn rate(&mut self, date: NaiveDate, currency: Currency) -> Result<f64, CoreError> {
        self.currency
            .rate(self.broker, self.prices, self.instruments, date, currency)
            .await
    }

    /// `money` converted to the base currency as of `date`.
    pub async fn to_base(&mut self, money: Money, date: NaiveDate) -> Result<f64, CoreError> {
        if money.amount == 0.0 {
            return Ok(0.0);
        }
        Ok(money.amount * self.rate(date, money.currency).await?)
    }
}
