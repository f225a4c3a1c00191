use chrono::{Duration, NaiveDate};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::errors::CoreError;
use crate::models::account::{Account, AccountInfo, Position};
use crate::models::instrument::{InstrumentType, BASE_CASH_ID};
use crate::models::money::{Currency, Money};
use crate::models::settings::{LedgerSettings, RetentionPolicy};
use crate::providers::traits::BrokerPosition;
use crate::storage::table::{load_map, store_map, Table, TableStore, PORTFOLIOS_TABLE};

/// Dated holdings per account, persisted in the `portfolios` table.
///
/// One snapshot is added per sync. Old snapshots are thinned before each
/// insert according to the [`RetentionPolicy`].
pub struct SnapshotService {
    accounts: BTreeMap<String, Account>,
    table: Box<dyn Table>,
    cash_ledger_ids: BTreeSet<String>,
    base_currency: Currency,
    retention: RetentionPolicy,
}

impl std::fmt::Debug for SnapshotService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotService")
            .field("accounts", &self.accounts.len())
            .field("retention", &self.retention)
            .finish()
    }
}

impl SnapshotService {
    pub fn open(store: &dyn TableStore, settings: &LedgerSettings) -> Result<Self, CoreError> {
        let table = store.open_table(PORTFOLIOS_TABLE)?;
        let accounts: HashMap<String, Account> = load_map(table.as_ref())?;
        Ok(Self {
            accounts: accounts.into_iter().collect(),
            table,
            cash_ledger_ids: settings.cash_ledger_ids.clone(),
            base_currency: settings.base_currency,
            retention: settings.retention,
        })
    }

    /// Insert the account or refresh its name and type.
    pub fn register(&mut self, info: &AccountInfo) -> &mut Account {
        let account = self
            .accounts
            .entry(info.id.clone())
            .or_insert_with(|| Account::new(info));
        account.name = info.name.clone();
        account.account_type = info.account_type;
        account
    }

    /// Record the holdings fetched on `fetch_date`. Prunes first, then
    /// inserts (replacing an existing snapshot of the same date).
    /// Returns how many old snapshots were dropped.
    pub fn merge(
        &mut self,
        info: &AccountInfo,
        fetch_date: NaiveDate,
        positions: &[BrokerPosition],
        cash: Option<f64>,
    ) -> usize {
        let merged = merge_positions(positions, &self.cash_ledger_ids, self.base_currency, cash);
        let retention = self.retention;
        let account = self.register(info);

        let keep: BTreeSet<NaiveDate> = retained_dates(&account.dates(), fetch_date, &retention)
            .into_iter()
            .collect();
        let before = account.positions.len();
        account.positions.retain(|date, _| keep.contains(date));
        let pruned = before - account.positions.len();
        if pruned > 0 {
            info!("Pruned {pruned} old snapshots of [{}]", info.id);
        }

        debug!("Snapshot [{}] {fetch_date}: {} positions", info.id, merged.len());
        account.positions.insert(fetch_date, merged);
        pruned
    }

    pub fn account(&self, account_id: &str) -> Result<&Account, CoreError> {
        self.accounts
            .get(account_id)
            .ok_or_else(|| CoreError::AccountNotFound(account_id.to_string()))
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn account_ids(&self) -> Vec<String> {
        self.accounts.keys().cloned().collect()
    }

    pub fn commit(&mut self) -> Result<(), CoreError> {
        store_map(self.accounts.iter(), self.table.as_mut())
    }
}

/// Positions being folded together, keyed by instrument id.
struct Pending {
    position: Position,
    current_price: f64,
}

/// Normalize upstream holdings into one position per instrument.
///
/// Duplicates sum their quantities; the yield is recomputed from the
/// first-seen average and current price. Cash-ledger rows are replaced by
/// the synthetic base-cash position, sized by `cash` when given.
pub fn merge_positions(
    positions: &[BrokerPosition],
    cash_ledger_ids: &BTreeSet<String>,
    base_currency: Currency,
    cash: Option<f64>,
) -> Vec<Position> {
    let mut order: Vec<String> = Vec::new();
    let mut pending: HashMap<String, Pending> = HashMap::new();
    let mut ledger_cash: Option<f64> = None;

    for raw in positions {
        if cash_ledger_ids.contains(&raw.figi) || cash_ledger_ids.contains(&raw.instrument_uid) {
            *ledger_cash.get_or_insert(0.0) += raw.quantity.value();
            continue;
        }
        let Some(instrument_type) = InstrumentType::from_wire(&raw.instrument_type) else {
            warn!("Skipping position {}: unknown instrument type '{}'", raw.figi, raw.instrument_type);
            continue;
        };
        let average = match raw.average_position_price.to_money() {
            Ok(m) => m,
            Err(e) => {
                warn!("Skipping position {}: {e}", raw.figi);
                continue;
            }
        };
        let current_price = if raw.current_price.is_blank() {
            average.amount
        } else {
            raw.current_price.value()
        };
        let quantity = raw.quantity.value();
        let nkd_per_unit = raw
            .current_nkd
            .as_ref()
            .filter(|n| !n.is_blank())
            .and_then(|n| n.to_money().ok())
            .unwrap_or_else(|| Money::zero(average.currency));

        let key = if raw.figi.is_empty() {
            raw.instrument_uid.clone()
        } else {
            raw.figi.clone()
        };

        match pending.get_mut(&key) {
            Some(existing) => {
                let p = &mut existing.position;
                p.quantity += quantity;
                p.expected_yield.amount =
                    (existing.current_price - p.average_price.amount) * p.quantity;
                p.accrued_interest.amount += nkd_per_unit.amount * quantity;
            }
            None => {
                order.push(key.clone());
                pending.insert(
                    key.clone(),
                    Pending {
                        position: Position {
                            instrument_type,
                            instrument_id: key,
                            instrument_uid: raw.instrument_uid.clone(),
                            quantity,
                            average_price: average,
                            expected_yield: Money::new(
                                average.currency,
                                (current_price - average.amount) * quantity,
                            ),
                            accrued_interest: Money::new(
                                nkd_per_unit.currency,
                                nkd_per_unit.amount * quantity,
                            ),
                        },
                        current_price,
                    },
                );
            }
        }
    }

    let mut result: Vec<Position> = order
        .into_iter()
        .filter_map(|key| pending.remove(&key).map(|p| p.position))
        .collect();

    if let Some(amount) = cash.or(ledger_cash) {
        result.push(base_cash_position(base_currency, amount));
    }
    result
}

/// The synthetic cash-in-base-currency holding.
pub fn base_cash_position(base_currency: Currency, amount: f64) -> Position {
    Position {
        instrument_type: InstrumentType::Currency,
        instrument_id: BASE_CASH_ID.to_string(),
        instrument_uid: BASE_CASH_ID.to_string(),
        quantity: amount,
        average_price: Money::new(base_currency, 1.0),
        expected_yield: Money::zero(base_currency),
        accrued_interest: Money::zero(base_currency),
    }
}

/// Dates that survive the retention sweep relative to `reference`.
///
/// Everything within `full_density_days` of the reference is kept. Older
/// dates are bucketed into `bucket_days` windows counted from the oldest
/// one, and only the earliest date of each bucket survives.
pub fn retained_dates(dates: &[NaiveDate], reference: NaiveDate, policy: &RetentionPolicy) -> Vec<NaiveDate> {
    let mut sorted = dates.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let threshold = reference - Duration::days(policy.full_density_days);
    let split = sorted.partition_point(|d| *d < threshold);
    let (old, recent) = sorted.split_at(split);

    let mut kept = Vec::with_capacity(sorted.len());
    if let Some(oldest) = old.first() {
        let mut last_bucket = None;
        for date in old {
            let bucket = (*date - *oldest).num_days() / policy.bucket_days.max(1);
            if last_bucket != Some(bucket) {
                kept.push(*date);
                last_bucket = Some(bucket);
            }
        }
    }
    kept.extend_from_slice(recent);
    kept
}
