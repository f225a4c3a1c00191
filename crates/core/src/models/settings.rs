use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::money::Currency;
use super::remap::IdentifierRemap;
use crate::errors::CoreError;

/// Upper bound for every day-count setting.
pub const MAX_DAYS: i64 = 36_500;

/// Snapshot thinning policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Snapshots younger than this keep full daily density.
    pub full_density_days: i64,
    /// Older snapshots keep one date per bucket of this many days.
    pub bucket_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            full_density_days: 180,
            bucket_days: 28,
        }
    }
}

/// Ledger configuration. Every field has a default, so a partial JSON
/// document (or `{}`) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Currency every report is normalized to.
    pub base_currency: Currency,

    /// Broker local time offset; operation and candle timestamps are bucketed into its days.
    pub utc_offset_seconds: i32,

    /// Currency → instrument whose close is "base units per foreign unit".
    pub fx_proxies: BTreeMap<Currency, String>,

    /// Legacy-id upgrades for reissued instruments.
    pub identifier_upgrades: IdentifierRemap,

    /// Ids the candle API has no history for; their first trade date is today.
    pub unavailable_history_ids: BTreeSet<String>,

    /// Upstream holdings replaced by the synthetic base-cash position.
    pub cash_ledger_ids: BTreeSet<String>,

    pub price_window_days: i64,
    pub price_commit_every: usize,
    pub first_trade_lookback_days: i64,
    pub operations_page_size: u32,
    pub operations_epoch: NaiveDate,
    pub retention: RetentionPolicy,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        let fx_proxies = [
            (Currency::Usd, "BBG0013HGFT4"),
            (Currency::Eur, "BBG0013HJJ31"),
            (Currency::Cny, "BBG0013HRTL0"),
            (Currency::Hkd, "BBG0013HSW87"),
        ]
        .into_iter()
        .map(|(c, id)| (c, id.to_string()))
        .collect();

        Self {
            base_currency: Currency::Rub,
            utc_offset_seconds: 3 * 3600,
            fx_proxies,
            identifier_upgrades: IdentifierRemap::new(),
            unavailable_history_ids: BTreeSet::new(),
            cash_ledger_ids: ["RUB000UTSTOM".to_string()].into_iter().collect(),
            price_window_days: 180,
            price_commit_every: 100,
            first_trade_lookback_days: 360,
            operations_page_size: 1000,
            operations_epoch: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN),
            retention: RetentionPolicy::default(),
        }
    }
}

impl LedgerSettings {
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize settings: {e}")))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.utc_offset()?;
        check_days("price_window_days", self.price_window_days, 1)?;
        check_days("first_trade_lookback_days", self.first_trade_lookback_days, 1)?;
        if self.operations_page_size == 0 {
            return Err(CoreError::InvalidSettings("operations_page_size must be positive".into()));
        }
        check_days("retention.full_density_days", self.retention.full_density_days, 0)?;
        check_days("retention.bucket_days", self.retention.bucket_days, 1)?;
        Ok(())
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, CoreError> {
        FixedOffset::east_opt(self.utc_offset_seconds).ok_or_else(|| {
            CoreError::InvalidSettings(format!("utc offset out of range: {}s", self.utc_offset_seconds))
        })
    }
}

fn check_days(name: &str, value: i64, min: i64) -> Result<(), CoreError> {
    if (min..=MAX_DAYS).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::InvalidSettings(format!(
            "{name} must be within {min}..={MAX_DAYS}, got {value}"
        )))
    }
}
