pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use chrono::NaiveDate;
use log::{info, warn};
use models::{
    account::{Account, AccountInfo, AccountType},
    clock::Clock,
    comparison::HorizonComparison,
    money::Currency,
    report::AccountReport,
    settings::LedgerSettings,
};
use providers::traits::BrokerApi;
use services::{
    comparison_service::{horizon_label, ComparisonService, DayRangeHelper},
    context::LedgerContext,
    timeseries_service::TimeSeriesService,
};
use storage::table::TableStore;

use errors::CoreError;

/// What one [`PortfolioLedger::sync`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub accounts_synced: usize,
    pub snapshots_pruned: usize,
    pub operations_added: usize,
}

/// Main entry point for the Portfolio Ledger core library.
/// Owns the broker connection and every cache needed to value an account.
#[must_use]
pub struct PortfolioLedger<B: BrokerApi> {
    broker: B,
    settings: LedgerSettings,
    ctx: LedgerContext,
    comparator: ComparisonService,
    clock: Clock,
}

impl<B: BrokerApi> std::fmt::Debug for PortfolioLedger<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioLedger")
            .field("broker", &self.broker.name())
            .field("base_currency", &self.settings.base_currency)
            .field("now", &self.clock.now())
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl<B: BrokerApi> PortfolioLedger<B> {
    /// Open every table of `store` and validate the settings.
    pub fn open(broker: B, settings: LedgerSettings, store: &dyn TableStore, clock: Clock) -> Result<Self, CoreError> {
        settings.validate()?;
        let ctx = LedgerContext::open(store, &settings, clock)?;
        info!("Ledger opened at {} with {}", clock.now(), broker.name());
        Ok(Self {
            broker,
            settings,
            ctx,
            comparator: ComparisonService::new(),
            clock,
        })
    }

    /// Same as [`open`](Self::open) with "now" taken from the system clock.
    pub fn open_now(broker: B, settings: LedgerSettings, store: &dyn TableStore) -> Result<Self, CoreError> {
        let clock = Clock::system(settings.utc_offset()?);
        Self::open(broker, settings, store, clock)
    }

    #[must_use]
    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    // ── Sync ────────────────────────────────────────────────────────

    /// Snapshot every open brokerage/IIS account as of today, then pull
    /// new operations for every known account.
    pub async fn sync(&mut self) -> Result<SyncSummary, CoreError> {
        let mut summary = SyncSummary::default();
        let today = self.clock.today();
        let base = self.settings.base_currency;

        for raw in self.broker.list_accounts().await? {
            if !raw.is_open() {
                continue;
            }
            let Some(account_type) = AccountType::from_wire(&raw.account_type) else {
                warn!("Skipping account {}: unknown type '{}'", raw.id, raw.account_type);
                continue;
            };
            if !account_type.is_tracked() {
                continue;
            }
            let info = AccountInfo {
                id: raw.id,
                name: raw.name,
                account_type,
            };

            let positions = self.broker.fetch_positions(&info.id).await?;
            let cash = self
                .broker
                .fetch_cash_balances(&info.id)
                .await?
                .into_iter()
                .find(|m| Currency::from_code(&m.currency) == Some(base))
                .map(|m| m.value());
            summary.snapshots_pruned += self.ctx.snapshots.merge(&info, today, &positions, cash);
            summary.accounts_synced += 1;
        }

        for account_id in self.ctx.snapshots.account_ids() {
            let added = self.ctx.operations.update(&self.broker, &account_id).await?;
            if added > 0 {
                self.comparator.invalidate(&account_id);
            }
            summary.operations_added += added;
        }
        info!(
            "Sync done: {} accounts, {} snapshots pruned, {} new operations",
            summary.accounts_synced, summary.snapshots_pruned, summary.operations_added
        );
        Ok(summary)
    }

    // ── Reports ─────────────────────────────────────────────────────

    /// Stored accounts, sorted by id.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.ctx.snapshots.accounts()
    }

    /// Time series of the account plus the latest snapshot compared
    /// against every lookback horizon that has a matching snapshot.
    pub async fn account_report(&mut self, account_id: &str) -> Result<AccountReport, CoreError> {
        let (mut market, operations, snapshots) = self.ctx.split(&self.broker);
        let account = snapshots.account(account_id)?;
        let series = TimeSeriesService::new()
            .build(&mut market, operations, account)
            .await?;

        let mut horizons = Vec::new();
        if let Some(reference) = account.latest_date() {
            let days = DayRangeHelper::get_days(&series.dates);
            let mut prepared = days.clone();
            prepared.push(reference);
            self.comparator
                .prepare(&mut market, operations, account_id, &prepared)
                .await?;

            let latest = account.snapshot(reference).unwrap_or(&[]);
            for day in days {
                let past = account.snapshot(day).unwrap_or(&[]);
                let comparison = self
                    .comparator
                    .compare(&mut market, operations, account_id, day, past, reference, latest)
                    .await?;
                horizons.push(HorizonComparison {
                    date: day,
                    label: horizon_label(day, reference),
                    comparison,
                });
            }
        }

        Ok(AccountReport {
            account_id: account.id.clone(),
            name: account.name.clone(),
            series,
            horizons,
        })
    }

    /// Base-currency units per unit of `currency` on `date`.
    pub async fn rate(&mut self, date: NaiveDate, currency: Currency) -> Result<f64, CoreError> {
        let (mut market, _, _) = self.ctx.split(&self.broker);
        market.rate(date, currency).await
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Flush every cache to the store.
    pub fn commit(&mut self) -> Result<(), CoreError> {
        self.ctx.commit()
    }
}
