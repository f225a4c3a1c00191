use log::debug;

use super::currency_service::CurrencyService;
use super::instrument_service::InstrumentService;
use super::market::Market;
use super::operations_service::OperationsService;
use super::price_service::PriceService;
use super::snapshot_service::SnapshotService;
use crate::errors::CoreError;
use crate::models::clock::Clock;
use crate::models::settings::LedgerSettings;
use crate::providers::traits::BrokerApi;
use crate::storage::table::TableStore;

/// All persistent caches of one run, opened from the same store.
#[derive(Debug)]
pub struct LedgerContext {
    pub prices: PriceService,
    pub instruments: InstrumentService,
    pub currency: CurrencyService,
    pub operations: OperationsService,
    pub snapshots: SnapshotService,
}

impl LedgerContext {
    pub fn open(store: &dyn TableStore, settings: &LedgerSettings, clock: Clock) -> Result<Self, CoreError> {
        Ok(Self {
            prices: PriceService::open(store, settings, clock)?,
            instruments: InstrumentService::open(store, settings, clock)?,
            currency: CurrencyService::new(settings),
            operations: OperationsService::open(store, settings, clock)?,
            snapshots: SnapshotService::open(store, settings)?,
        })
    }

    /// Borrow the caches as a [`Market`] next to the two ledgers.
    pub fn split<'a>(
        &'a mut self,
        broker: &'a dyn BrokerApi,
    ) -> (Market<'a>, &'a mut OperationsService, &'a mut SnapshotService) {
        (
            Market::new(broker, &mut self.prices, &mut self.instruments, &self.currency),
            &mut self.operations,
            &mut self.snapshots,
        )
    }

    /// Persist every table.
    pub fn commit(&mut self) -> Result<(), CoreError> {
        self.prices.commit()?;
        self.instruments.commit()?;
        self.operations.commit()?;
        self.snapshots.commit()?;
        debug!("Committed all ledger tables");
        Ok(())
    }
}
