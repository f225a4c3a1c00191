use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};

use super::market::Market;
use super::xirr::solve_xirr;
use crate::errors::CoreError;
use crate::models::clock::{end_of_day, start_of_day, Clock};
use crate::models::instrument::{Instrument, InstrumentType};
use crate::models::money::Money;
use crate::models::operation::{OperationItem, OperationKey, OperationTotals, OperationType};
use crate::models::remap::IdentifierRemap;
use crate::models::settings::LedgerSettings;
use crate::providers::traits::{BrokerApi, RawOperation};
use crate::storage::table::{load_map, store_map, Table, TableStore, OPERATIONS_TABLE};

type Ledger = BTreeMap<OperationKey, OperationItem>;

/// Per-account operations history.
///
/// Each account moves from "no history" to "synced through D" by `update`,
/// which re-fetches from the newest stored operation to now and merges by
/// `(date, type, id)`. Re-fetching an overlapping range is a no-op.
pub struct OperationsService {
    accounts: HashMap<String, Ledger>,
    table: Box<dyn Table>,
    remap: IdentifierRemap,
    clock: Clock,
    page_size: u32,
    epoch: NaiveDate,
}

impl std::fmt::Debug for OperationsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationsService")
            .field("accounts", &self.accounts.len())
            .field("operations", &self.accounts.values().map(|l| l.len()).sum::<usize>())
            .finish()
    }
}

impl OperationsService {
    pub fn open(store: &dyn TableStore, settings: &LedgerSettings, clock: Clock) -> Result<Self, CoreError> {
        let table = store.open_table(OPERATIONS_TABLE)?;
        let stored: HashMap<String, Vec<OperationItem>> = load_map(table.as_ref())?;
        let remap = settings.identifier_upgrades.clone();

        let accounts = stored
            .into_iter()
            .map(|(account_id, items)| {
                let ledger = items
                    .into_iter()
                    .map(|mut item| {
                        item.legacy_id = remap.upgrade(&item.legacy_id);
                        (item.key(), item)
                    })
                    .collect();
                (account_id, ledger)
            })
            .collect();

        Ok(Self {
            accounts,
            table,
            remap,
            clock,
            page_size: settings.operations_page_size,
            epoch: settings.operations_epoch,
        })
    }

    /// Fetch everything since the newest stored operation and merge it in.
    /// Returns how many operations were new.
    pub async fn update(&mut self, broker: &dyn BrokerApi, account_id: &str) -> Result<usize, CoreError> {
        let from = self
            .accounts
            .get(account_id)
            .and_then(|ledger| ledger.keys().next_back())
            .map_or_else(|| start_of_day(self.epoch), |key| key.date);
        let to = self.clock.now();
        info!("Updating operations [{account_id}] {}..{}", from.date(), to.date());

        let mut raw = Vec::new();
        let mut cursor = String::new();
        loop {
            let page = broker
                .fetch_operations_page(
                    account_id,
                    self.clock.to_utc(from),
                    self.clock.to_utc(to),
                    &cursor,
                    self.page_size,
                )
                .await?;
            raw.extend(page.items);
            info!(
                "Operations [{account_id}] {}..{}, size: {}",
                from.date(),
                to.date(),
                raw.len()
            );
            if !page.has_next {
                break;
            }
            if page.next_cursor.is_empty() || page.next_cursor == cursor {
                warn!("Operations [{account_id}]: broker reported more pages without a new cursor");
                break;
            }
            cursor = page.next_cursor;
        }

        let items: Vec<OperationItem> = raw
            .into_iter()
            .filter_map(|op| parse_operation(op, &self.remap, &self.clock))
            .collect();

        let ledger = self.accounts.entry(account_id.to_string()).or_default();
        let before = ledger.len();
        for item in items {
            ledger.insert(item.key(), item);
        }
        let added = ledger.len() - before;
        debug!("Operations [{account_id}]: {added} new, {} total", ledger.len());
        Ok(added)
    }

    /// Accounts with stored history.
    pub fn account_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.accounts.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stored operations of one account, ascending by date.
    pub fn operations(&self, account_id: &str) -> impl Iterator<Item = &OperationItem> {
        self.accounts.get(account_id).into_iter().flat_map(|l| l.values())
    }

    pub fn len(&self, account_id: &str) -> usize {
        self.accounts.get(account_id).map_or(0, |l| l.len())
    }

    /// Running base-currency total of every operation type, sampled at the
    /// end of each requested date.
    pub async fn windowed_totals_by_type(
        &self,
        market: &mut Market<'_>,
        account_id: &str,
        dates: &[NaiveDate],
    ) -> Result<OperationTotals, CoreError> {
        let dates = sorted_unique(dates);
        let mut running: HashMap<OperationType, f64> = HashMap::new();
        let mut totals = OperationTotals::default();
        let mut ops = self.operations(account_id).peekable();

        for date in dates {
            let cutoff = end_of_day(date);
            while let Some(op) = ops.next_if(|op| op.date <= cutoff) {
                let amount = market.to_base(op.payment, op.date.date()).await?;
                *running.entry(op.operation_type).or_insert(0.0) += amount;
            }
            for ty in OperationType::all() {
                let sum = running.get(&ty).copied().unwrap_or(0.0);
                totals.totals.entry(ty).or_default().insert(date, sum);
            }
        }
        Ok(totals)
    }

    /// Same sweep as [`windowed_totals_by_type`](Self::windowed_totals_by_type),
    /// restricted to one type.
    pub async fn windowed_total_for_type(
        &self,
        market: &mut Market<'_>,
        account_id: &str,
        dates: &[NaiveDate],
        operation_type: OperationType,
    ) -> Result<BTreeMap<NaiveDate, f64>, CoreError> {
        let dates = sorted_unique(dates);
        let mut ops = self
            .operations(account_id)
            .filter(|op| op.operation_type == operation_type)
            .peekable();
        let mut sum = 0.0;
        let mut result = BTreeMap::new();

        for date in dates {
            let cutoff = end_of_day(date);
            while let Some(op) = ops.next_if(|op| op.date <= cutoff) {
                sum += market.to_base(op.payment, op.date.date()).await?;
            }
            result.insert(date, sum);
        }
        Ok(result)
    }

    /// Money-weighted return of the whole account, in percent, for every
    /// `date → portfolio value`. Deposits and withdrawals are the flows; the
    /// value is the closing outflow. Unsolvable dates get 0.0.
    pub async fn total_xirr(
        &self,
        market: &mut Market<'_>,
        account_id: &str,
        values: &BTreeMap<NaiveDate, f64>,
    ) -> Result<BTreeMap<NaiveDate, f64>, CoreError> {
        let Some(last) = values.keys().next_back() else {
            return Ok(BTreeMap::new());
        };
        let flows = self
            .converted_flows(market, account_id, end_of_day(*last), |op| {
                op.operation_type.is_pay_in_out()
            })
            .await?;

        let mut result = BTreeMap::new();
        for (date, value) in values {
            if flows.is_empty() {
                result.insert(*date, 0.0);
                continue;
            }
            let mut series = flows_until(&flows, *date);
            series.push((*date, -value));
            let rate = solve_xirr(&series).unwrap_or_else(|e| {
                debug!("Total XIRR [{account_id}] on {date}: {e}, using 0");
                0.0
            });
            result.insert(*date, rate);
        }
        Ok(result)
    }

    /// Money-weighted return of one holding, in percent, for every
    /// `date → current value` seed. Buys, sells, dividends and coupons
    /// matching the instrument are the flows.
    pub async fn per_instrument_xirr(
        &self,
        market: &mut Market<'_>,
        account_id: &str,
        instrument: &Instrument,
        seeds: &BTreeMap<NaiveDate, f64>,
    ) -> Result<BTreeMap<NaiveDate, f64>, CoreError> {
        let zeros = || seeds.keys().map(|d| (*d, 0.0)).collect::<BTreeMap<_, _>>();
        if instrument.instrument_type == InstrumentType::Currency {
            return Ok(zeros());
        }
        let Some(last) = seeds.keys().next_back() else {
            return Ok(BTreeMap::new());
        };

        let legacy_id = self.remap.upgrade(&instrument.legacy_id);
        let matches = |op: &OperationItem| {
            op.operation_type.is_instrument_flow()
                && ((!instrument.uid.is_empty() && op.instrument_uid == instrument.uid)
                    || (!legacy_id.is_empty() && op.legacy_id == legacy_id))
        };
        let flows = self
            .converted_flows(market, account_id, end_of_day(*last), matches)
            .await?;
        if flows.is_empty() {
            info!(
                "XIRR [{account_id}]: no operations for {} ({}) through {last}",
                instrument.uid, instrument.legacy_id
            );
            return Ok(zeros());
        }

        let mut result = BTreeMap::new();
        for (date, seed) in seeds {
            if *seed == 0.0 {
                result.insert(*date, 0.0);
                continue;
            }
            let mut series = flows_until(&flows, *date);
            series.push((*date, *seed));
            let rate = match solve_xirr(&series) {
                Ok(rate) => rate,
                Err(e) => {
                    warn!("XIRR [{account_id}] {} on {date}: {e}, using 0", instrument.ticker);
                    0.0
                }
            };
            result.insert(*date, rate);
        }
        Ok(result)
    }

    /// Matching operations up to `cutoff`, converted to the base currency.
    async fn converted_flows<F>(
        &self,
        market: &mut Market<'_>,
        account_id: &str,
        cutoff: NaiveDateTime,
        keep: F,
    ) -> Result<Vec<(NaiveDateTime, f64)>, CoreError>
    where
        F: Fn(&OperationItem) -> bool,
    {
        let mut flows = Vec::new();
        for op in self.operations(account_id) {
            if op.date > cutoff {
                break;
            }
            if keep(op) {
                flows.push((op.date, market.to_base(op.payment, op.date.date()).await?));
            }
        }
        Ok(flows)
    }

    pub fn commit(&mut self) -> Result<(), CoreError> {
        let snapshot: HashMap<String, Vec<OperationItem>> = self
            .accounts
            .iter()
            .map(|(id, ledger)| (id.clone(), ledger.values().cloned().collect()))
            .collect();
        store_map(snapshot.iter(), self.table.as_mut())
    }
}

fn sorted_unique(dates: &[NaiveDate]) -> Vec<NaiveDate> {
    let mut dates = dates.to_vec();
    dates.sort_unstable();
    dates.dedup();
    dates
}

/// Flows on or before the end of `date`, as dated amounts.
fn flows_until(flows: &[(NaiveDateTime, f64)], date: NaiveDate) -> Vec<(NaiveDate, f64)> {
    flows
        .iter()
        .take_while(|(t, _)| t.date() <= date)
        .map(|(t, amount)| (t.date(), *amount))
        .collect()
}

/// Normalize one upstream operation; `None` for payments in an unsupported currency.
fn parse_operation(raw: RawOperation, remap: &IdentifierRemap, clock: &Clock) -> Option<OperationItem> {
    let operation_type = OperationType::from_wire(&raw.operation_type).unwrap_or_else(|| {
        warn!(
            "Unknown operation type '{}' for operation {}, storing as unspecified",
            raw.operation_type, raw.id
        );
        OperationType::Unspecified
    });
    let payment = if raw.payment.is_blank() {
        Money::default()
    } else {
        match raw.payment.to_money() {
            Ok(money) => money,
            Err(e) => {
                warn!("Skipping operation {}: {e}", raw.id);
                return None;
            }
        }
    };

    Some(OperationItem {
        id: raw.id,
        instrument_uid: raw.instrument_uid,
        legacy_id: remap.upgrade(&raw.figi),
        date: clock.to_local(raw.date),
        operation_type,
        payment,
    })
}
