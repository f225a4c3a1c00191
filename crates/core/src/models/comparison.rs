use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Old/new pair with absolute and relative change.
///
/// - both zero → everything `None`
/// - equal and non-zero → values only
/// - old zero, new non-zero → percent is `+inf`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub old: Option<f64>,
    pub new: Option<f64>,
    pub diff: Option<f64>,
    pub diff_pct: Option<f64>,
}

impl Delta {
    pub fn between(old: f64, new: f64) -> Self {
        if old == new {
            if old == 0.0 {
                return Self::empty();
            }
            return Self {
                old: Some(old),
                new: Some(new),
                diff: None,
                diff_pct: None,
            };
        }
        let pct = if old != 0.0 {
            (new - old) / old.abs() * 100.0
        } else {
            f64::INFINITY
        };
        Self {
            old: Some(old),
            new: Some(new),
            diff: Some(new - old),
            diff_pct: Some(pct),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// One comparison line: a holding, or an aggregate like `[Total]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub name: String,
    pub ticker: String,
    pub sector: String,
    pub value: Delta,
    pub yield_value: Delta,
    pub quantity: Delta,
    pub xirr: Delta,
}

impl ComparisonRow {
    /// Aggregate line carrying only a value change.
    pub fn total(title: impl Into<String>, old: f64, new: f64) -> Self {
        Self {
            name: title.into(),
            ticker: String::new(),
            sector: String::new(),
            value: Delta::between(old, new),
            yield_value: Delta::empty(),
            quantity: Delta::empty(),
            xirr: Delta::empty(),
        }
    }
}

/// Result of comparing two snapshots of one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Always-present aggregate lines, in emission order.
    pub aggregates: Vec<ComparisonRow>,
    /// Holdings whose value changed, sorted by name.
    pub holdings: Vec<ComparisonRow>,
}

/// A comparison against one lookback horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonComparison {
    pub date: NaiveDate,
    pub label: String,
    pub comparison: Comparison,
}
