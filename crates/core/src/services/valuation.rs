use chrono::{Duration, NaiveDate};
use log::debug;

use super::market::Market;
use crate::errors::CoreError;
use crate::models::account::Position;

/// Holding value in the base currency: (quantity × average + unrealized
/// yield) at the average-price currency rate, plus accrued interest.
pub async fn item_value(market: &mut Market<'_>, position: &Position, date: NaiveDate) -> Result<f64, CoreError> {
    let rate = market.rate(date, position.average_price.currency).await?;
    let accrued = market.to_base(position.accrued_interest, date).await?;
    Ok(rate * native_value(position) + accrued)
}

/// Unrealized gain in the base currency, accrued interest included.
pub async fn item_yield(market: &mut Market<'_>, position: &Position, date: NaiveDate) -> Result<f64, CoreError> {
    let rate = market.rate(date, position.average_price.currency).await?;
    let accrued = market.to_base(position.accrued_interest, date).await?;
    Ok(rate * position.expected_yield.amount + accrued)
}

/// Unrealized gain over cost, in percent. 0.0 for a zero cost basis.
pub fn item_yield_percent(position: &Position) -> f64 {
    let cost = position.quantity * position.average_price.amount;
    if cost != 0.0 {
        100.0 * position.expected_yield.amount / cost
    } else {
        0.0
    }
}

/// Market value in the average-price currency, before conversion.
pub fn native_value(position: &Position) -> f64 {
    position.quantity * position.average_price.amount + position.expected_yield.amount
}

/// Close of the holding's instrument on `date`; `None` before it first traded.
pub async fn item_price(market: &mut Market<'_>, position: &Position, date: NaiveDate) -> Result<Option<f64>, CoreError> {
    let first_trade = match market.first_trade_date(&position.instrument_id).await {
        Ok(d) => d,
        Err(CoreError::NoTradeHistory(id)) => {
            debug!("No recent candles for {id}, price unknown on {date}");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    if date < first_trade {
        return Ok(None);
    }
    Ok(Some(market.price(&position.instrument_id, date).await?))
}

const SHORT_WINDOW: i64 = 7;
const LONG_WINDOW: i64 = 30;

/// Price momentum on `date`, in percent: the mean close of the last 7 days
/// against the mean of the 30 days ending a week earlier.
pub async fn momentum(market: &mut Market<'_>, position: &Position, date: NaiveDate) -> Result<Option<f64>, CoreError> {
    let recent = mean_price(market, position, date, SHORT_WINDOW).await?;
    let earlier = mean_price(market, position, date - Duration::days(SHORT_WINDOW), LONG_WINDOW).await?;
    Ok(match (recent, earlier) {
        (Some(now), Some(before)) if before != 0.0 => Some(100.0 * (now - before) / before),
        _ => None,
    })
}

async fn mean_price(
    market: &mut Market<'_>,
    position: &Position,
    end: NaiveDate,
    days: i64,
) -> Result<Option<f64>, CoreError> {
    let mut total = 0.0;
    let mut count = 0usize;
    for offset in 0..days {
        if let Some(price) = item_price(market, position, end - Duration::days(offset)).await? {
            total += price;
            count += 1;
        }
    }
    Ok((count > 0).then(|| total / count as f64))
}
