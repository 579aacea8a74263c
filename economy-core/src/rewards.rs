//! Reward reconciliation
//!
//! One-time tasks, the daily login streak and referral payouts. Every reward
//! credits both CASH and season CASH with a single credit record.

use crate::{
    clock::days_between,
    ledger::Journal,
    rules::{self, TaskKind},
    types::{Account, AccountId, Currency},
    Engine, Error, Result,
};
use rust_decimal::Decimal;

/// Result of a task claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Task recorded and rewarded
    Completed {
        /// CASH credited
        reward: Decimal,
    },
    /// Task was already rewarded earlier
    AlreadyCompleted,
}

/// Result of a daily reward claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyClaim {
    /// Streak day reached (1-7)
    pub day: u8,
    /// CASH credited
    pub reward: Decimal,
}

fn credit_reward(
    account: &mut Account,
    journal: &mut Journal,
    amount: Decimal,
    description: String,
) {
    account.cash_balance += amount;
    account.season_cash += amount;
    journal.credit(Currency::Cash, amount, description);
}

/// Streak day following a claim at `gap` calendar days after the previous one
fn next_streak_day(previous_day: u8, gap: Option<i64>) -> Result<u8> {
    match gap {
        Some(gap) if gap <= 0 => Err(Error::AlreadyClaimedToday),
        Some(1) if previous_day >= 7 => Ok(1),
        Some(1) => Ok(previous_day + 1),
        _ => Ok(1),
    }
}

impl Engine {
    /// Record a task and credit `reward` once
    pub fn complete_task(&self, id: &AccountId, task_id: &str, reward: Decimal) -> Result<TaskOutcome> {
        if task_id.is_empty() {
            return Err(Error::InvalidInput("Task id is empty".to_string()));
        }
        if reward < Decimal::ZERO {
            return Err(Error::InvalidInput("Task reward must not be negative".to_string()));
        }

        let outcome = self.transact(id, "complete_task", |account, journal| {
            if account.completed_task_ids.contains(task_id) {
                return Ok(TaskOutcome::AlreadyCompleted);
            }
            account.completed_task_ids.insert(task_id.to_string());
            credit_reward(account, journal, reward, format!("Task completed: {}", task_id));
            Ok(TaskOutcome::Completed { reward })
        })?;

        if let TaskOutcome::Completed { reward } = outcome {
            self.metrics().record_reward("task");
            tracing::debug!(account_id = %id, task_id, reward = %reward, "Task completed");
        }
        Ok(outcome)
    }

    /// Claim a catalogue task with its configured reward
    pub fn claim_catalog_task(&self, id: &AccountId, task_id: &str) -> Result<TaskOutcome> {
        let task = rules::task(task_id).ok_or_else(|| Error::UnknownTask(task_id.to_string()))?;

        if let TaskKind::Referral { required } = task.kind {
            let current = self.ledger().count_referrals(id)?;
            if current < required {
                return Err(Error::TaskLocked {
                    task_id: task.id.to_string(),
                    required,
                    current,
                });
            }
        }

        self.complete_task(id, task.id, Decimal::from(task.reward))
    }

    /// Claim today's login reward with an explicit amount
    pub fn claim_daily_reward(&self, id: &AccountId, reward: Decimal) -> Result<DailyClaim> {
        if reward < Decimal::ZERO {
            return Err(Error::InvalidInput("Daily reward must not be negative".to_string()));
        }
        self.claim_daily(id, Some(reward))
    }

    /// Claim today's login reward from the streak table
    pub fn claim_scheduled_daily_reward(&self, id: &AccountId) -> Result<DailyClaim> {
        self.claim_daily(id, None)
    }

    fn claim_daily(&self, id: &AccountId, reward: Option<Decimal>) -> Result<DailyClaim> {
        let offset = self.offset();
        let claim = self.transact(id, "claim_daily_reward", |account, journal| {
            let now = journal.now();
            let gap = account
                .last_daily_reward_at
                .map(|last| days_between(last, now, offset));
            let day = next_streak_day(account.daily_reward_day, gap)?;
            let reward = match reward {
                Some(reward) => reward,
                None => rules::daily_reward_for(day)
                    .ok_or_else(|| Error::Other(format!("No daily reward for day {}", day)))?,
            };

            account.daily_reward_day = day;
            account.last_daily_reward_at = Some(now);
            credit_reward(account, journal, reward, format!("Daily reward day {}", day));
            Ok(DailyClaim { day, reward })
        })?;

        self.metrics().record_reward("daily");
        tracing::debug!(account_id = %id, day = claim.day, reward = %claim.reward, "Daily reward claimed");
        Ok(claim)
    }

    /// Pay out referrals counted since the last reconciliation
    ///
    /// Returns the CASH credited. Running it again without new referees credits
    /// nothing. When referees were deleted the rewarded count drops to the live
    /// count without any clawback.
    pub fn reconcile_referrals(&self, id: &AccountId) -> Result<Decimal> {
        let per_referral = self.config().economy.referral_reward;
        let ledger = self.ledger();

        let credited = self.transact(id, "reconcile_referrals", |account, journal| {
            let count = ledger.count_referrals(&account.id)?;
            let rewarded = account.referral_rewarded_count;

            if count < rewarded {
                account.referral_rewarded_count = count;
                return Ok(Decimal::ZERO);
            }
            let new_referrals = count - rewarded;
            if new_referrals == 0 {
                return Ok(Decimal::ZERO);
            }

            let reward = per_referral * Decimal::from(new_referrals);
            account.referral_rewarded_count = count;
            credit_reward(
                account,
                journal,
                reward,
                format!("Referral reward for {} new friends", new_referrals),
            );
            Ok(reward)
        })?;

        if credited > Decimal::ZERO {
            self.metrics().record_reward("referral");
            tracing::info!(account_id = %id, credited = %credited, "Referral rewards credited");
        }
        Ok(credited)
    }

    /// Bind the inviting account once
    pub fn bind_referrer(&self, id: &AccountId, referrer: &AccountId) -> Result<()> {
        referrer.validate()?;
        if referrer == id {
            return Err(Error::InvalidInput("An account cannot refer itself".to_string()));
        }
        let referrer_account = self.ledger().require_account(referrer)?;
        if referrer_account.referred_by.as_ref() == Some(id) {
            return Err(Error::InvalidInput(format!(
                "{} was invited by {}",
                referrer, id
            )));
        }

        self.transact(id, "bind_referrer", |account, journal| {
            if account.referred_by.is_some() {
                return Err(Error::ReferrerAlreadySet(account.id.to_string()));
            }
            account.referred_by = Some(referrer.clone());
            journal.link_referrer(referrer.clone());
            Ok(())
        })?;

        tracing::info!(account_id = %id, referrer = %referrer, "Referrer bound");
        Ok(())
    }
}
