//! Engine orchestration layer
//!
//! This module ties together storage, the account ledger, the clock and
//! metrics into the high-level API consumed by the player client and the
//! admin console. Component operations live next to their rules (`energy`,
//! `taps`, `vip`, `rewards`, ...) as further `impl Engine` blocks.
//!
//! # Example
//!
//! ```no_run
//! use economy_core::{AccountId, Config, Engine, NewAccount};
//!
//! fn main() -> economy_core::Result<()> {
//!     let engine = Engine::open(Config::default())?;
//!
//!     let id = AccountId::new("tg_42");
//!     let (account, created) = engine.create_account_if_absent(&id, NewAccount::default())?;
//!     assert!(created || account.cash_balance >= rust_decimal::Decimal::ZERO);
//!
//!     engine.spend_energy(&id)?;
//!     Ok(())
//! }
//! ```

use crate::{
    clock::{Clock, SystemClock},
    ledger::{BalanceDelta, Journal, Ledger},
    rules,
    storage::{Backend, MemoryBackend, RocksBackend},
    types::{Account, AccountId, Currency, NewAccount, TransactionRecord},
    Config, Error, Metrics, Result,
};
use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Game economy engine
pub struct Engine {
    /// Account store
    ledger: Arc<Ledger>,

    /// Configuration
    config: Config,

    /// Time source
    clock: Arc<dyn Clock>,

    /// Metrics collector
    metrics: Metrics,

    /// Reference timezone for calendar days
    offset: FixedOffset,

    /// Serializes season status changes
    pub(crate) season_lock: Mutex<()>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("service", &self.config.service_name)
            .field("offset", &self.offset)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Open engine over RocksDB at `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        let backend = Arc::new(RocksBackend::open(&config)?);
        Self::with_backend(config, backend, Arc::new(SystemClock))
    }

    /// Engine over an empty in-memory store
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::with_backend(config, Arc::new(MemoryBackend::new()), Arc::new(SystemClock))
    }

    /// Engine over any backend and clock
    pub fn with_backend(
        config: Config,
        backend: Arc<dyn Backend>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        rules::validate_tables()?;
        let offset = config.economy.reference_offset()?;
        let metrics = Metrics::new()
            .map_err(|e| Error::Other(format!("Failed to create metrics: {}", e)))?;

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            utc_offset_minutes = config.economy.utc_offset_minutes,
            "Economy engine ready"
        );

        Ok(Self {
            ledger: Arc::new(Ledger::new(backend)),
            config,
            clock,
            metrics,
            offset,
            season_lock: Mutex::new(()),
        })
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Underlying account store
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Current time
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Reference timezone
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Run an account operation after the lazy read-path refresh
    ///
    /// Expired VIP tiers are dropped and energy is rolled over to the current
    /// calendar day before `f` sees the account. Everything commits together.
    pub(crate) fn transact<T>(
        &self,
        id: &AccountId,
        operation: &'static str,
        f: impl FnOnce(&mut Account, &mut Journal) -> Result<T>,
    ) -> Result<T> {
        let started = Instant::now();
        let now = self.now();
        let result = self.ledger.mutate(id, now, |account, journal| {
            self.refresh(account, now);
            f(account, journal)
        });
        self.observe(id, operation, started, result)
    }

    pub(crate) fn observe<T>(
        &self,
        subject: &dyn fmt::Display,
        operation: &'static str,
        started: Instant,
        result: Result<T>,
    ) -> Result<T> {
        match &result {
            Ok(_) => self
                .metrics
                .record_duration(started.elapsed().as_secs_f64()),
            Err(e) => {
                self.metrics.record_rejection(e.kind());
                if e.is_expected() {
                    tracing::debug!(subject = %subject, operation, error = %e, "Operation rejected");
                } else {
                    tracing::error!(subject = %subject, operation, error = %e, "Operation failed");
                }
            }
        }
        result
    }

    fn refresh(&self, account: &mut Account, now: DateTime<Utc>) {
        crate::vip::expire_if_due(account, now);
        crate::energy::reconcile_energy(account, now, self.offset);
    }

    // Ledger store operations

    /// Load an account, applying lazy VIP expiry and energy rollover
    pub fn get_account(&self, id: &AccountId) -> Result<Account> {
        self.transact(id, "get_account", |account, _| Ok(account.clone()))
    }

    /// Create the account unless it exists
    ///
    /// A new account receives the welcome bonus (one credit record) and the
    /// lowest league's daily energy. Returns the stored account and whether
    /// this call created it.
    pub fn create_account_if_absent(
        &self,
        id: &AccountId,
        profile: NewAccount,
    ) -> Result<(Account, bool)> {
        let started = Instant::now();
        let result = self.create_account_inner(id, profile);
        self.observe(id, "create_account", started, result)
    }

    fn create_account_inner(&self, id: &AccountId, profile: NewAccount) -> Result<(Account, bool)> {
        id.validate()?;
        profile.validate(id)?;

        if let Some(existing) = self.ledger.account(id)? {
            return Ok((existing, false));
        }
        if let Some(referrer) = &profile.referred_by {
            self.ledger.require_account(referrer)?;
        }

        let now = self.now();
        let welcome_bonus = self.config.economy.welcome_bonus;
        let mut account = Account::new(id.clone(), &profile, rules::LEAGUES[0].energy_per_day, now);
        account.cash_balance = welcome_bonus;
        account.referred_by = profile.referred_by;

        let (account, created) = self.ledger.insert_if_absent(account, |account, journal| {
            if welcome_bonus > Decimal::ZERO {
                journal.credit(Currency::Cash, welcome_bonus, "Welcome bonus");
            }
            if let Some(referrer) = &account.referred_by {
                journal.link_referrer(referrer.clone());
            }
        })?;

        if created {
            self.metrics.accounts_created.inc();
            tracing::info!(
                account_id = %id,
                referred_by = ?account.referred_by.as_ref().map(AccountId::as_str),
                "Account created"
            );
        }
        Ok((account, created))
    }

    /// Apply a signed balance change atomically
    pub fn apply_delta(&self, id: &AccountId, delta: BalanceDelta) -> Result<Account> {
        self.transact(id, "apply_delta", |account, journal| {
            delta.apply(account, journal)?;
            tracing::debug!(
                account_id = %account.id,
                cash = %delta.cash,
                tokens = %delta.tokens,
                description = %delta.description,
                "Balance delta applied"
            );
            Ok(account.clone())
        })
    }

    /// Newest-first records of one account
    pub fn transactions(&self, id: &AccountId, limit: usize) -> Result<Vec<TransactionRecord>> {
        self.ledger.transactions(id, limit)
    }

    /// Newest-first records across all accounts
    pub fn recent_transactions(&self, limit: usize) -> Result<Vec<TransactionRecord>> {
        self.ledger.recent_transactions(limit)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    /// In-memory engine on a manual clock starting 2025-01-06 10:00 UTC
    pub fn engine() -> (Engine, Arc<ManualClock>) {
        engine_with(Config::default())
    }

    pub fn engine_with(config: Config) -> (Engine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap(),
        ));
        let engine = Engine::with_backend(config, Arc::new(MemoryBackend::new()), clock.clone())
            .unwrap();
        (engine, clock)
    }

    pub fn player(engine: &Engine, id: &str) -> AccountId {
        let id = AccountId::new(id);
        engine
            .create_account_if_absent(&id, NewAccount::default())
            .unwrap();
        id
    }
}
