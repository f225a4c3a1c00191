use chrono::NaiveDate;
use thiserror::Error;

const DAYS_PER_YEAR: f64 = 365.0;
const MAX_NEWTON_ITERATIONS: usize = 100;
const MAX_BISECTION_ITERATIONS: usize = 200;
const TOLERANCE: f64 = 1e-10;
/// Rates at or below -100% make the discount factor meaningless.
const MIN_RATE: f64 = -0.999_999;
const MAX_RATE: f64 = 1e6;

/// Why an XIRR could not be computed. Callers decide what to substitute.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum XirrError {
    #[error("XIRR needs at least two cash flows, got {0}")]
    TooFewFlows(usize),

    #[error("XIRR needs both positive and negative cash flows")]
    SameSign,

    #[error("XIRR solver did not converge")]
    NoConvergence,
}

/// Annualized internal rate of return of irregular cash flows, in percent.
///
/// Time is measured in days/365 from the earliest flow. Solved with
/// Newton-Raphson from a 10% guess; when Newton wanders off (flat
/// derivative, rate below -100%) the root is bracketed and bisected.
pub fn solve_xirr(flows: &[(NaiveDate, f64)]) -> Result<f64, XirrError> {
    if flows.len() < 2 {
        return Err(XirrError::TooFewFlows(flows.len()));
    }
    if flows.iter().any(|(_, amount)| !amount.is_finite()) {
        return Err(XirrError::NoConvergence);
    }
    let has_positive = flows.iter().any(|(_, a)| *a > 0.0);
    let has_negative = flows.iter().any(|(_, a)| *a < 0.0);
    if !(has_positive && has_negative) {
        return Err(XirrError::SameSign);
    }

    let first = flows.iter().map(|(d, _)| *d).min().ok_or(XirrError::TooFewFlows(0))?;
    let series: Vec<(f64, f64)> = flows
        .iter()
        .map(|(d, amount)| (*amount, (*d - first).num_days() as f64 / DAYS_PER_YEAR))
        .collect();

    let rate = newton(&series).or_else(|| bisection(&series)).ok_or(XirrError::NoConvergence)?;
    Ok(rate * 100.0)
}

/// NPV and dNPV/dr at `rate`.
fn npv_and_derivative(series: &[(f64, f64)], rate: f64) -> (f64, f64) {
    let mut npv = 0.0;
    let mut dnpv = 0.0;
    for (cf, years) in series {
        let discount = (1.0 + rate).powf(*years);
        npv += cf / discount;
        dnpv -= years * cf / (discount * (1.0 + rate));
    }
    (npv, dnpv)
}

fn newton(series: &[(f64, f64)]) -> Option<f64> {
    let mut rate = 0.1;
    for _ in 0..MAX_NEWTON_ITERATIONS {
        let (npv, dnpv) = npv_and_derivative(series, rate);
        if !dnpv.is_finite() || dnpv.abs() < TOLERANCE {
            return None;
        }
        let next = rate - npv / dnpv;
        if !next.is_finite() || next <= MIN_RATE {
            return None;
        }
        if (next - rate).abs() < TOLERANCE {
            return Some(next);
        }
        rate = next;
    }
    None
}

fn bisection(series: &[(f64, f64)]) -> Option<f64> {
    let npv = |rate: f64| npv_and_derivative(series, rate).0;

    let mut lo = MIN_RATE;
    let mut hi = 1.0;
    let npv_lo = npv(lo);
    while npv_lo.signum() == npv(hi).signum() {
        hi *= 2.0;
        if hi > MAX_RATE {
            return None;
        }
    }

    for _ in 0..MAX_BISECTION_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let value = npv(mid);
        if value.abs() < TOLERANCE || (hi - lo) < TOLERANCE {
            return Some(mid);
        }
        if value.signum() == npv_lo.signum() {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Some(0.5 * (lo + hi))
}
