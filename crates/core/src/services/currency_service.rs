use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::instrument_service::InstrumentService;
use super::price_service::PriceService;
use crate::errors::CoreError;
use crate::models::money::Currency;
use crate::models::settings::LedgerSettings;
use crate::providers::traits::BrokerApi;

/// Converts amounts into the base currency.
///
/// Each foreign currency is priced through a proxy instrument whose close is
/// "base units per foreign unit", so a rate is just a cached price lookup.
#[derive(Debug, Clone)]
pub struct CurrencyService {
    base: Currency,
    proxies: BTreeMap<Currency, String>,
}

impl CurrencyService {
    pub fn new(settings: &LedgerSettings) -> Self {
        Self {
            base: settings.base_currency,
            proxies: settings.fx_proxies.clone(),
        }
    }

    pub fn base_currency(&self) -> Currency {
        self.base
    }

    /// Proxy instrument for `currency`, if configured.
    pub fn proxy(&self, currency: Currency) -> Option<&str> {
        self.proxies.get(&currency).map(String::as_str)
    }

    /// Factor such that `amount_in_base = amount * rate`.
    pub async fn rate(
        &self,
        broker: &dyn BrokerApi,
        prices: &mut PriceService,
        instruments: &mut InstrumentService,
        date: NaiveDate,
        currency: Currency,
    ) -> Result<f64, CoreError> {
        if currency == self.base {
            return Ok(1.0);
        }
        let proxy = self
            .proxy(currency)
            .ok_or(CoreError::MissingCurrencyProxy(currency))?;
        prices.price(broker, instruments, proxy, date).await
    }
}
