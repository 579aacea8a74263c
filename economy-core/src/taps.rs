//! Tap cycle
//!
//! Clients accumulate taps locally and flush them as numbered batches. A cycle
//! fills up to `cycle_target` progress; completing it pays a bonus, grants one
//! cooldown-reset item and locks tapping for the cooldown period.

use crate::{
    config::TapConfig,
    ledger::Journal,
    rules,
    types::{Account, AccountId, Currency},
    Engine, Error, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Taps flushed by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapBatch {
    /// Per-account sequence number, strictly increasing from 1
    pub sequence: u64,
    /// Taps in the batch
    pub tap_count: u32,
    /// Damage per tap claimed by the client
    pub damage_per_tap: u32,
}

/// Result of a tap batch
#[derive(Debug, Clone, PartialEq)]
pub enum TapOutcome {
    /// Taps counted
    Applied {
        /// Cycle progress after the batch
        progress: u32,
        /// CASH credited (taps plus any cycle bonus)
        cash_earned: Decimal,
        /// Whether the batch completed the cycle
        cycle_completed: bool,
        /// Cooldown started by the batch
        cooldown_until: Option<DateTime<Utc>>,
    },
    /// Sequence already applied (retry or out-of-order delivery)
    Duplicate {
        /// Highest sequence applied so far
        last_sequence: u64,
    },
    /// Tapping locked; batch ignored
    CooldownActive {
        /// When tapping unlocks
        until: DateTime<Utc>,
    },
}

impl TapOutcome {
    fn label(&self) -> &'static str {
        match self {
            TapOutcome::Applied { .. } => "applied",
            TapOutcome::Duplicate { .. } => "duplicate",
            TapOutcome::CooldownActive { .. } => "cooldown",
        }
    }
}

/// Apply a batch to the account
///
/// `damage_per_tap` is capped at the damage of the account's tier.
pub fn apply_taps(
    account: &mut Account,
    journal: &mut Journal,
    batch: &TapBatch,
    config: &TapConfig,
) -> Result<TapOutcome> {
    if batch.sequence <= account.last_tap_batch_seq {
        return Ok(TapOutcome::Duplicate {
            last_sequence: account.last_tap_batch_seq,
        });
    }

    let now = journal.now();
    if let Some(until) = account.tap_cooldown_until.filter(|until| *until > now) {
        return Ok(TapOutcome::CooldownActive { until });
    }

    let damage = batch.damage_per_tap.min(rules::tap_damage(account.vip_tier));
    let gained = u64::from(batch.tap_count) * u64::from(damage);
    let target = config.cycle_target;
    let progress = (u64::from(account.tap_cycle_progress) + gained).min(u64::from(target)) as u32;

    let taps = Decimal::from(batch.tap_count);
    let mut cash_earned = taps;
    journal.credit(Currency::Cash, taps, format!("Tapped {} times", batch.tap_count));

    let cycle_completed = progress >= target;
    let mut cooldown_until = None;
    if cycle_completed {
        let until = now + config.cooldown();
        account.tap_cycle_progress = 0;
        account.tap_cooldown_until = Some(until);
        account.cooldown_resets_available = account.cooldown_resets_available.saturating_add(1);
        cash_earned += config.cycle_bonus;
        journal.credit(Currency::Cash, config.cycle_bonus, "Tap cycle bonus");
        cooldown_until = Some(until);
    } else {
        account.tap_cycle_progress = progress;
        // An elapsed cooldown is cleared on the next applied batch
        account.tap_cooldown_until = None;
    }

    account.cash_balance += cash_earned;
    account.season_cash += cash_earned;
    account.tap_count += u64::from(batch.tap_count);
    account.last_tap_batch_seq = batch.sequence;

    Ok(TapOutcome::Applied {
        progress: account.tap_cycle_progress,
        cash_earned,
        cycle_completed,
        cooldown_until,
    })
}

/// Spend a reset item against the running cooldown
///
/// Returns the remaining cooldown end, or `None` when tapping is unlocked.
pub fn reduce_cooldown(
    account: &mut Account,
    now: DateTime<Utc>,
    config: &TapConfig,
) -> Result<Option<DateTime<Utc>>> {
    if account.cooldown_resets_available == 0 {
        return Err(Error::NoResetsAvailable);
    }
    let Some(until) = account.tap_cooldown_until.filter(|until| *until > now) else {
        return Err(Error::NoResetsAvailable);
    };

    account.cooldown_resets_available -= 1;
    let reduced = until - config.reset_step();
    if reduced <= now {
        account.tap_cooldown_until = None;
        account.tap_cycle_progress = 0;
        Ok(None)
    } else {
        account.tap_cooldown_until = Some(reduced);
        Ok(Some(reduced))
    }
}

impl Engine {
    /// Apply a client tap batch
    pub fn apply_tap_batch(&self, id: &AccountId, batch: TapBatch) -> Result<TapOutcome> {
        if batch.sequence == 0 || batch.tap_count == 0 || batch.damage_per_tap == 0 {
            return Err(Error::InvalidInput(
                "Tap batch needs a positive sequence, count and damage".to_string(),
            ));
        }

        let tap = &self.config().economy.tap;
        let outcome = self.transact(id, "apply_tap_batch", |account, journal| {
            apply_taps(account, journal, &batch, tap)
        })?;

        self.metrics().record_tap_batch(outcome.label());
        match &outcome {
            TapOutcome::Applied {
                cycle_completed: true,
                cooldown_until,
                ..
            } => {
                self.metrics().cycles_completed.inc();
                tracing::info!(
                    account_id = %id,
                    sequence = batch.sequence,
                    cooldown_until = ?cooldown_until,
                    "Tap cycle completed"
                );
            }
            TapOutcome::Duplicate { last_sequence } => {
                tracing::debug!(
                    account_id = %id,
                    sequence = batch.sequence,
                    last_sequence,
                    "Duplicate tap batch dropped"
                );
            }
            _ => {}
        }
        Ok(outcome)
    }

    /// Use one cooldown-reset item
    pub fn use_cooldown_reset(&self, id: &AccountId) -> Result<Option<DateTime<Utc>>> {
        let tap = &self.config().economy.tap;
        let remaining = self.transact(id, "use_cooldown_reset", |account, journal| {
            reduce_cooldown(account, journal.now(), tap)
        })?;

        tracing::debug!(account_id = %id, remaining = ?remaining, "Cooldown reset used");
        Ok(remaining)
    }
}
