// ═══════════════════════════════════════════════════════════════════
// XIRR Solver Tests
// ═══════════════════════════════════════════════════════════════════

use chrono::NaiveDate;
use portfolio_ledger_core::services::xirr::{solve_xirr, XirrError};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn npv(flows: &[(NaiveDate, f64)], rate_percent: f64) -> f64 {
    let first = flows.iter().map(|(d, _)| *d).min().unwrap();
    let rate = rate_percent / 100.0;
    flows
        .iter()
        .map(|(d, cf)| cf / (1.0 + rate).powf((*d - first).num_days() as f64 / 365.0))
        .sum()
}

#[test]
fn one_year_ten_percent() {
    let flows = [(d(2023, 1, 1), 100.0), (d(2024, 1, 1), -110.0)];
    let rate = solve_xirr(&flows).unwrap();
    assert!((rate - 10.0).abs() < 1e-6, "got {rate}");
}

#[test]
fn halving_in_a_year() {
    let flows = [(d(2023, 1, 1), 100.0), (d(2024, 1, 1), -50.0)];
    let rate = solve_xirr(&flows).unwrap();
    assert!((rate + 50.0).abs() < 1e-6, "got {rate}");
}

#[test]
fn partial_year_is_annualized() {
    let flows = [(d(2023, 1, 1), 100.0), (d(2023, 7, 2), -105.0)];
    let years = 182.0 / 365.0;
    let expected = (1.05_f64.powf(1.0 / years) - 1.0) * 100.0;
    let rate = solve_xirr(&flows).unwrap();
    assert!((rate - expected).abs() < 1e-6, "got {rate}, expected {expected}");
}

#[test]
fn irregular_flows_zero_the_npv() {
    let flows = [
        (d(2022, 3, 1), 1000.0),
        (d(2022, 9, 15), 500.0),
        (d(2023, 2, 10), -200.0),
        (d(2023, 11, 30), -1450.0),
    ];
    let rate = solve_xirr(&flows).unwrap();
    assert!(npv(&flows, rate).abs() < 1e-6);
}

#[test]
fn sign_convention_is_symmetric() {
    let flows = [(d(2023, 1, 1), -100.0), (d(2024, 1, 1), 110.0)];
    let rate = solve_xirr(&flows).unwrap();
    assert!((rate - 10.0).abs() < 1e-6);
}

#[test]
fn deep_loss_falls_back_to_bisection() {
    let flows = [(d(2024, 1, 10), 10_000.0), (d(2024, 6, 15), -1_700.0)];
    let rate = solve_xirr(&flows).unwrap();
    assert!(rate < -90.0 && rate > -100.0, "got {rate}");
    assert!(npv(&flows, rate).abs() < 1e-4);
}

#[test]
fn single_flow_is_rejected() {
    assert_eq!(solve_xirr(&[(d(2024, 1, 1), 100.0)]), Err(XirrError::TooFewFlows(1)));
    assert_eq!(solve_xirr(&[]), Err(XirrError::TooFewFlows(0)));
}

#[test]
fn same_sign_is_rejected() {
    let flows = [(d(2023, 1, 1), 100.0), (d(2024, 1, 1), 50.0)];
    assert_eq!(solve_xirr(&flows), Err(XirrError::SameSign));
}

#[test]
fn non_finite_flow_does_not_converge() {
    let flows = [(d(2023, 1, 1), f64::NAN), (d(2024, 1, 1), -50.0)];
    assert_eq!(solve_xirr(&flows), Err(XirrError::NoConvergence));
}
