use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::comparison::HorizonComparison;
use super::instrument::InstrumentType;
use super::money::Currency;

/// Per-date metrics of one holding, all in the base currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSeries {
    pub instrument_id: String,
    /// "Name $TICKER".
    pub title: String,
    pub instrument_type: InstrumentType,
    pub currency: Currency,
    pub values: BTreeMap<NaiveDate, f64>,
    pub yields: BTreeMap<NaiveDate, f64>,
    pub yield_percents: BTreeMap<NaiveDate, f64>,
    pub xirrs: BTreeMap<NaiveDate, f64>,
    /// Short vs long moving average of the close, percent.
    /// `None` where there is no price history to average.
    pub momentum: BTreeMap<NaiveDate, Option<f64>>,
}

/// Account-wide rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TotalSeries {
    /// Portfolio value net of deposits and withdrawals.
    pub net_values: BTreeMap<NaiveDate, f64>,
    pub yields: BTreeMap<NaiveDate, f64>,
    /// Value over deposits, percent.
    pub yield_percents: BTreeMap<NaiveDate, f64>,
    pub xirrs: BTreeMap<NaiveDate, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSeries {
    pub dates: Vec<NaiveDate>,
    /// Sorted by title.
    pub items: Vec<ItemSeries>,
    pub totals: TotalSeries,
    /// USD rate change since the first date, percent.
    pub usd_change: BTreeMap<NaiveDate, f64>,
}

/// Everything the reporting layer renders for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountReport {
    pub account_id: String,
    pub name: String,
    pub series: AccountSeries,
    /// Latest snapshot against each lookback horizon, oldest first.
    pub horizons: Vec<HorizonComparison>,
}
