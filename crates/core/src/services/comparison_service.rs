use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::market::Market;
use super::operations_service::OperationsService;
use super::valuation::{item_value, item_yield};
use crate::errors::CoreError;
use crate::models::account::Position;
use crate::models::comparison::{Comparison, ComparisonRow, Delta};
use crate::models::instrument::Instrument;
use crate::models::operation::{OperationTotals, OperationType};

pub const TOTAL_TITLE: &str = "[Total]";
pub const TOTAL_YIELD_TITLE: &str = "[Total Yield]";
pub const TOTAL_YIELD_PERCENT_TITLE: &str = "[Total Yield, %]";
pub const YIELD_TITLE: &str = "[Yield]";

/// Lookback horizons in days with the accepted distance to the match.
const DAY_RANGES: [(i64, i64); 19] = [
    (1, 2),
    (7, 2),
    (14, 3),
    (30, 5),
    (60, 7),
    (90, 7),
    (180, 14),
    (270, 14),
    (365, 21),
    (547, 21),
    (730, 30),
    (1095, 60),
    (1460, 90),
    (1825, 180),
    (2190, 180),
    (2555, 180),
    (2920, 180),
    (3285, 180),
    (3650, 180),
];

/// Picks the snapshot dates to compare the latest one against.
pub struct DayRangeHelper;

impl DayRangeHelper {
    /// For every horizon, the stored date nearest to `reference - horizon`
    /// (ties to the earlier date), kept only within the horizon's tolerance.
    /// The last date is the reference and never a candidate.
    ///
    /// Horizons are searched from the longest down, each search starting at
    /// the previous match, so the result comes out strictly ascending.
    pub fn get_days(days: &[NaiveDate]) -> Vec<NaiveDate> {
        if days.len() < 2 {
            return Vec::new();
        }
        let reference = days[days.len() - 1];
        let high = days.len() - 1;
        let mut low = 0;
        let mut result: Vec<NaiveDate> = Vec::new();

        for (horizon, tolerance) in DAY_RANGES.iter().rev() {
            let target = reference - Duration::days(*horizon);
            let Some(index) = nearest_index(days, target, low, high) else {
                continue;
            };
            low = index;
            let found = days[index];
            if (found - target).num_days().abs() <= *tolerance
                && result.last().map_or(true, |last| *last < found)
            {
                result.push(found);
            }
        }
        result
    }
}

/// Index in `days[low..high]` closest to `target`; ties go to the earlier one.
fn nearest_index(days: &[NaiveDate], target: NaiveDate, low: usize, high: usize) -> Option<usize> {
    if low >= high {
        return None;
    }
    let pos = low + days[low..high].partition_point(|d| *d < target);
    let after = (pos < high).then_some(pos);
    let before = (pos > low).then(|| pos - 1);
    match (before, after) {
        (Some(b), Some(a)) => {
            if (days[a] - target).num_days().abs() < (target - days[b]).num_days().abs() {
                Some(a)
            } else {
                Some(b)
            }
        }
        (Some(b), None) => Some(b),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}

/// "12 Mar 2025 (1 year 2 months)".
pub fn horizon_label(day: NaiveDate, reference: NaiveDate) -> String {
    let mut days = (reference - day).num_days().max(0);
    let mut parts = Vec::new();
    for (unit, name) in [(365, "year"), (30, "month"), (7, "week")] {
        if days >= unit {
            let n = days / unit;
            parts.push(format!("{n} {name}{}", if n > 1 { "s" } else { "" }));
            days %= unit;
        }
    }
    if days > 0 || parts.is_empty() {
        parts.push(format!("{days} day{}", if days == 1 { "" } else { "s" }));
    }
    format!("{} ({})", day.format("%d %b %Y"), parts.join(" "))
}

/// One side of a holding comparison.
#[derive(Default)]
struct Side {
    value: f64,
    yield_value: f64,
    quantity: f64,
    xirr: f64,
}

/// Compares two snapshots of one account.
///
/// Running operation totals per account are prepared once for all the
/// dates of a report and reused across comparisons.
#[derive(Debug, Default)]
pub struct ComparisonService {
    prepared: HashMap<String, OperationTotals>,
}

impl ComparisonService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample the operation totals of `account_id` at `dates`.
    pub async fn prepare(
        &mut self,
        market: &mut Market<'_>,
        operations: &OperationsService,
        account_id: &str,
        dates: &[NaiveDate],
    ) -> Result<(), CoreError> {
        let totals = operations
            .windowed_totals_by_type(market, account_id, dates)
            .await?;
        let prepared = self.prepared.entry(account_id.to_string()).or_default();
        for (ty, by_date) in totals.totals {
            prepared.totals.entry(ty).or_default().extend(by_date);
        }
        Ok(())
    }

    /// Drop prepared totals, e.g. after new operations were merged.
    pub fn invalidate(&mut self, account_id: &str) {
        self.prepared.remove(account_id);
    }

    /// Aggregate rows first, then one row per holding whose value changed.
    #[allow(clippy::too_many_arguments)]
    pub async fn compare(
        &mut self,
        market: &mut Market<'_>,
        operations: &OperationsService,
        account_id: &str,
        d1: NaiveDate,
        p1: &[Position],
        d2: NaiveDate,
        p2: &[Position],
    ) -> Result<Comparison, CoreError> {
        let covered = self
            .prepared
            .get(account_id)
            .is_some_and(|t| t.covers(&[d1, d2]));
        if !covered {
            self.prepare(market, operations, account_id, &[d1, d2]).await?;
        }

        let mut comparison = Comparison::default();
        self.aggregates(market, operations, account_id, (d1, p1), (d2, p2), &mut comparison.aggregates)
            .await?;

        let items1 = by_name(market, p1).await?;
        let items2 = by_name(market, p2).await?;
        let names: BTreeSet<&String> = items1.keys().chain(items2.keys()).collect();

        for name in names {
            let mut ticker = String::new();
            let mut sector = String::new();
            let mut side1 = Side::default();
            let mut side2 = Side::default();
            if let Some((position, instrument)) = items1.get(name) {
                ticker = instrument.ticker.clone();
                sector = instrument.display_sector();
                side1 = measure(market, operations, account_id, position, instrument, d1).await?;
            }
            if let Some((position, instrument)) = items2.get(name) {
                ticker = instrument.ticker.clone();
                sector = instrument.display_sector();
                side2 = measure(market, operations, account_id, position, instrument, d2).await?;
            }
            if side1.value != side2.value {
                comparison.holdings.push(ComparisonRow {
                    name: name.clone(),
                    ticker,
                    sector,
                    value: Delta::between(side1.value, side2.value),
                    yield_value: Delta::between(side1.yield_value, side2.yield_value),
                    quantity: Delta::between(side1.quantity, side2.quantity),
                    xirr: Delta::between(side1.xirr, side2.xirr),
                });
            }
        }
        Ok(comparison)
    }

    async fn aggregates(
        &self,
        market: &mut Market<'_>,
        operations: &OperationsService,
        account_id: &str,
        (d1, p1): (NaiveDate, &[Position]),
        (d2, p2): (NaiveDate, &[Position]),
        rows: &mut Vec<ComparisonRow>,
    ) -> Result<(), CoreError> {
        let (v1, y1) = totals(market, p1, d1).await?;
        let (v2, y2) = totals(market, p2, d2).await?;

        let xirr1 = operations
            .total_xirr(market, account_id, &BTreeMap::from([(d1, v1)]))
            .await?
            .get(&d1)
            .copied()
            .unwrap_or(0.0);
        let xirr2 = operations
            .total_xirr(market, account_id, &BTreeMap::from([(d2, v2)]))
            .await?
            .get(&d2)
            .copied()
            .unwrap_or(0.0);
        rows.push(ComparisonRow {
            xirr: Delta::between(xirr1, xirr2),
            ..ComparisonRow::total(TOTAL_TITLE, v1, v2)
        });

        let empty = OperationTotals::default();
        let ops = self.prepared.get(account_id).unwrap_or(&empty);
        for ty in OperationType::all() {
            let (t1, t2) = (ops.get(ty, d1), ops.get(ty, d2));
            if ty.always_visible() || t1 != t2 {
                rows.push(ComparisonRow::total(format!("[{}]", ty.title()), t1, t2));
            }
        }

        let pay_in_out = |d| ops.get(OperationType::Input, d) + ops.get(OperationType::Output, d);
        let (io1, io2) = (pay_in_out(d1), pay_in_out(d2));
        rows.push(ComparisonRow::total(TOTAL_YIELD_TITLE, v1 - io1, v2 - io2));
        rows.push(ComparisonRow::total(
            TOTAL_YIELD_PERCENT_TITLE,
            percent_over(v1 - io1, io1),
            percent_over(v2 - io2, io2),
        ));
        rows.push(ComparisonRow::total(YIELD_TITLE, y1, y2));
        Ok(())
    }
}

fn percent_over(amount: f64, base: f64) -> f64 {
    if base != 0.0 {
        100.0 * amount / base
    } else {
        0.0
    }
}

/// Summed value and yield of a snapshot.
async fn totals(market: &mut Market<'_>, positions: &[Position], date: NaiveDate) -> Result<(f64, f64), CoreError> {
    let mut value = 0.0;
    let mut yield_value = 0.0;
    for position in positions {
        value += item_value(market, position, date).await?;
        yield_value += item_yield(market, position, date).await?;
    }
    Ok((value, yield_value))
}

async fn by_name<'p>(
    market: &mut Market<'_>,
    positions: &'p [Position],
) -> Result<BTreeMap<String, (&'p Position, Instrument)>, CoreError> {
    let mut result = BTreeMap::new();
    for position in positions {
        let instrument = market.instrument(&position.instrument_id).await?;
        result.insert(instrument.name.clone(), (position, instrument));
    }
    Ok(result)
}

async fn measure(
    market: &mut Market<'_>,
    operations: &OperationsService,
    account_id: &str,
    position: &Position,
    instrument: &Instrument,
    date: NaiveDate,
) -> Result<Side, CoreError> {
    let value = item_value(market, position, date).await?;
    let xirr = operations
        .per_instrument_xirr(market, account_id, instrument, &BTreeMap::from([(date, value)]))
        .await?
        .get(&date)
        .copied()
        .unwrap_or(0.0);
    Ok(Side {
        value,
        yield_value: item_yield(market, position, date).await?,
        quantity: position.quantity,
        xirr,
    })
}
