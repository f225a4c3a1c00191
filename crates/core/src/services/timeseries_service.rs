use chrono::NaiveDate;
use log::debug;
use std::collections::{BTreeMap, HashMap};

use super::market::Market;
use super::operations_service::OperationsService;
use super::valuation::{item_value, item_yield, item_yield_percent, momentum};
use crate::errors::CoreError;
use crate::models::account::{Account, Position};
use crate::models::money::Currency;
use crate::models::operation::OperationType;
use crate::models::report::{AccountSeries, ItemSeries, TotalSeries};

/// Builds the per-date tables of an account's history.
#[derive(Debug, Default)]
pub struct TimeSeriesService;

impl TimeSeriesService {
    pub fn new() -> Self {
        Self
    }

    /// Value, yield, percent, XIRR and momentum of every holding at every
    /// snapshot date, plus account totals and the USD rate change.
    pub async fn build(
        &self,
        market: &mut Market<'_>,
        operations: &OperationsService,
        account: &Account,
    ) -> Result<AccountSeries, CoreError> {
        let dates = account.dates();
        if dates.is_empty() {
            return Ok(AccountSeries::default());
        }
        debug!("Building series for [{}] over {} dates", account.id, dates.len());

        // Last seen position per instrument, used for momentum on every date.
        let mut latest: HashMap<String, Position> = HashMap::new();
        for positions in account.positions.values() {
            for p in positions {
                latest.insert(p.instrument_id.clone(), p.clone());
            }
        }

        let mut items: HashMap<String, ItemSeries> = HashMap::new();
        for id in latest.keys() {
            let instrument = market.instrument(id).await?;
            let position = &latest[id];
            items.insert(
                id.clone(),
                ItemSeries {
                    instrument_id: id.clone(),
                    title: format!("{} ${}", instrument.name, instrument.ticker),
                    instrument_type: position.instrument_type,
                    currency: position.average_price.currency,
                    values: BTreeMap::new(),
                    yields: BTreeMap::new(),
                    yield_percents: BTreeMap::new(),
                    xirrs: BTreeMap::new(),
                    momentum: BTreeMap::new(),
                },
            );
        }

        let mut sums: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
        for (date, positions) in &account.positions {
            let mut value_sum = 0.0;
            let mut yield_sum = 0.0;
            for p in positions {
                let value = item_value(market, p, *date).await?;
                let yield_value = item_yield(market, p, *date).await?;
                value_sum += value;
                yield_sum += yield_value;
                if let Some(series) = items.get_mut(&p.instrument_id) {
                    series.values.insert(*date, value);
                    series.yields.insert(*date, yield_value);
                    series.yield_percents.insert(*date, item_yield_percent(p));
                }
            }
            sums.insert(*date, (value_sum, yield_sum));

            for (id, p) in &latest {
                let m = momentum(market, p, *date).await?;
                if let Some(series) = items.get_mut(id) {
                    series.momentum.insert(*date, m);
                }
            }
        }

        for (id, series) in items.iter_mut() {
            let instrument = market.instrument(id).await?;
            series.xirrs = operations
                .per_instrument_xirr(market, &account.id, &instrument, &series.values)
                .await?;
        }

        let totals = self.totals(market, operations, &account.id, &dates, &sums).await?;
        let usd_change = fx_change(market, &dates, Currency::Usd).await?;

        let mut items: Vec<ItemSeries> = items.into_values().collect();
        items.sort_by(|a, b| a.title.cmp(&b.title));

        Ok(AccountSeries {
            dates,
            items,
            totals,
            usd_change,
        })
    }

    async fn totals(
        &self,
        market: &mut Market<'_>,
        operations: &OperationsService,
        account_id: &str,
        dates: &[NaiveDate],
        sums: &BTreeMap<NaiveDate, (f64, f64)>,
    ) -> Result<TotalSeries, CoreError> {
        let payins = operations
            .windowed_total_for_type(market, account_id, dates, OperationType::Input)
            .await?;
        let payouts = operations
            .windowed_total_for_type(market, account_id, dates, OperationType::Output)
            .await?;
        let values: BTreeMap<NaiveDate, f64> = sums.iter().map(|(d, (v, _))| (*d, *v)).collect();
        let xirrs = operations.total_xirr(market, account_id, &values).await?;

        let mut totals = TotalSeries {
            xirrs,
            ..TotalSeries::default()
        };
        for (date, (value, yield_value)) in sums {
            let payin = payins.get(date).copied().unwrap_or(0.0);
            let payout = payouts.get(date).copied().unwrap_or(0.0);
            totals.net_values.insert(*date, value - (payin + payout));
            totals.yields.insert(*date, *yield_value);
            let percent = if payin != 0.0 {
                100.0 * (value / payin - 1.0)
            } else {
                0.0
            };
            totals.yield_percents.insert(*date, percent);
        }
        Ok(totals)
    }
}

/// Change of `currency`'s rate since the first date, percent.
pub async fn fx_change(
    market: &mut Market<'_>,
    dates: &[NaiveDate],
    currency: Currency,
) -> Result<BTreeMap<NaiveDate, f64>, CoreError> {
    let Some(first) = dates.first() else {
        return Ok(BTreeMap::new());
    };
    let base = market.rate(*first, currency).await?;
    let mut result = BTreeMap::new();
    for date in dates {
        let change = if base != 0.0 {
            100.0 * (market.rate(*date, currency).await? / base - 1.0)
        } else {
            0.0
        };
        result.insert(*date, change);
    }
    Ok(result)
}
