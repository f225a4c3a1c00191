use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::models::clock::Clock;
use crate::models::instrument::{Instrument, DEFAULT_SECTOR};
use crate::models::money::{Currency, Money};
use crate::models::remap::IdentifierRemap;
use crate::models::settings::LedgerSettings;
use crate::providers::traits::{BrokerApi, InstrumentDetail, InstrumentRecord};
use crate::storage::table::{load_map, store_map, Table, TableStore, INSTRUMENTS_TABLE};

/// Instrument metadata keyed by uid, reachable by legacy id as well.
///
/// Misses go to the broker in two steps: a point lookup first, then a
/// full catalog resync. An id that survives both is a fatal inconsistency.
pub struct InstrumentService {
    instruments: HashMap<String, Instrument>,
    legacy_index: HashMap<String, String>,
    table: Box<dyn Table>,
    remap: IdentifierRemap,
    base_currency: Currency,
    clock: Clock,
}

impl std::fmt::Debug for InstrumentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentService")
            .field("instruments", &self.instruments.len())
            .finish()
    }
}

impl InstrumentService {
    pub fn open(store: &dyn TableStore, settings: &LedgerSettings, clock: Clock) -> Result<Self, CoreError> {
        let table = store.open_table(INSTRUMENTS_TABLE)?;
        let stored: HashMap<String, Instrument> = load_map(table.as_ref())?;
        let mut service = Self {
            instruments: HashMap::with_capacity(stored.len() + 1),
            legacy_index: HashMap::with_capacity(stored.len() + 1),
            table,
            remap: settings.identifier_upgrades.clone(),
            base_currency: settings.base_currency,
            clock,
        };
        for instrument in stored.into_values() {
            service.insert(instrument);
        }
        service.insert(Instrument::base_cash(settings.base_currency));
        Ok(service)
    }

    /// Resolve by uid or legacy id (after identifier upgrades).
    pub async fn get(&mut self, broker: &dyn BrokerApi, instrument_id: &str) -> Result<&Instrument, CoreError> {
        let id = self.remap.upgrade(instrument_id);

        if self.lookup(&id).is_none() {
            if let Some(found) = broker.resolve_instrument(&id).await? {
                debug!("Point lookup of {id} resolved to {} ({})", found.uid, found.kind);
                let record = broker.get_instrument_detail(&found.uid, found.kind).await?;
                if let Some(instrument) = parse_record(&record, &self.clock) {
                    self.insert(instrument);
                }
            }
        }

        if self.lookup(&id).is_none() {
            info!("Resyncing instrument catalog because of {id}");
            self.resync(broker).await?;
        }

        self.lookup(&id)
            .ok_or_else(|| CoreError::InstrumentNotFound(id.clone()))
    }

    /// Cached entry only; never touches the network.
    pub fn lookup(&self, instrument_id: &str) -> Option<&Instrument> {
        self.instruments.get(instrument_id).or_else(|| {
            self.legacy_index
                .get(instrument_id)
                .and_then(|uid| self.instruments.get(uid))
        })
    }

    /// Reload every catalog from the broker.
    pub async fn resync(&mut self, broker: &dyn BrokerApi) -> Result<usize, CoreError> {
        let catalog = broker.bulk_list_instruments().await?;
        let total = catalog.len();
        let mut parsed = 0;
        for record in catalog.into_records() {
            if let Some(instrument) = parse_record(&record, &self.clock) {
                self.insert(instrument);
                parsed += 1;
            }
        }
        self.insert(Instrument::base_cash(self.base_currency));
        info!("Instrument catalog resynced: {parsed} of {total} records usable");
        Ok(parsed)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn commit(&mut self) -> Result<(), CoreError> {
        store_map(self.instruments.iter(), self.table.as_mut())
    }

    fn insert(&mut self, instrument: Instrument) {
        if !instrument.legacy_id.is_empty() {
            self.legacy_index
                .insert(instrument.legacy_id.clone(), instrument.uid.clone());
        }
        self.instruments.insert(instrument.uid.clone(), instrument);
    }
}

/// Catalog timestamps at or before the epoch mean "unset".
fn parse_date(value: Option<DateTime<Utc>>, clock: &Clock) -> Option<NaiveDate> {
    value
        .filter(|t| t.timestamp() > 0)
        .map(|t| clock.local_date(t))
}

fn parse_nominal(detail: &InstrumentDetail) -> Option<Money> {
    let nominal = detail.nominal.as_ref().filter(|n| !n.is_blank())?;
    match nominal.to_money() {
        Ok(money) => Some(money),
        Err(e) => {
            warn!("Ignoring nominal of {}: {e}", detail.figi);
            None
        }
    }
}

/// Normalize a typed catalog record. `None` for records in an unsupported currency.
pub fn parse_record(record: &InstrumentRecord, clock: &Clock) -> Option<Instrument> {
    let detail = record.detail();
    let currency = match detail.currency.parse::<Currency>() {
        Ok(c) => c,
        Err(_) => {
            warn!(
                "Skipping {} {} ({}): unsupported currency '{}'",
                record.kind(),
                detail.ticker,
                detail.figi,
                detail.currency
            );
            return None;
        }
    };

    let (nominal, first_trade_date, last_trade_date) = match record {
        InstrumentRecord::Bond(d) => (
            parse_nominal(d),
            parse_date(d.placement_date, clock),
            parse_date(d.maturity_date, clock),
        ),
        InstrumentRecord::Currency(d) => (parse_nominal(d), None, None),
        InstrumentRecord::Etf(d) => (None, parse_date(d.released_date, clock), None),
        InstrumentRecord::Share(d) => (None, parse_date(d.ipo_date, clock), None),
        InstrumentRecord::Futures(d) => (
            None,
            parse_date(d.first_trade_date, clock),
            parse_date(d.last_trade_date, clock),
        ),
    };

    let uid = if detail.uid.is_empty() {
        detail.figi.clone()
    } else {
        detail.uid.clone()
    };
    let sector = if detail.sector.trim().is_empty() {
        DEFAULT_SECTOR.to_string()
    } else {
        detail.sector.clone()
    };

    Some(Instrument {
        instrument_type: record.kind(),
        uid,
        legacy_id: detail.figi.clone(),
        currency,
        ticker: detail.ticker.clone(),
        name: detail.name.clone(),
        nominal,
        first_trade_date,
        last_trade_date,
        country: detail.country_of_risk.clone(),
        sector,
        exchange: detail.exchange.clone(),
    })
}
