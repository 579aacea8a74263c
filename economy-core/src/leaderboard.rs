//! Leaderboards
//!
//! Built from a read-only scan of the account table one page at a time. No
//! account locks are taken, so a board may mix values from before and after
//! an in-flight write.

use crate::{rules, types::Account, types::AccountId, Engine, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// Ranked account field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardField {
    /// Current season CASH (prizes attached)
    SeasonCash,
    /// Lifetime CASH balance
    CashBalance,
}

impl LeaderboardField {
    fn value(&self, account: &Account) -> Decimal {
        match self {
            LeaderboardField::SeasonCash => account.season_cash,
            LeaderboardField::CashBalance => account.cash_balance,
        }
    }
}

/// Leaderboard row
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    /// 1-based rank
    pub rank: u32,
    /// Player id
    pub account_id: AccountId,
    /// Public name
    pub name: String,
    /// Ranked value
    pub value: Decimal,
    /// Games played
    pub games_played: u64,
    /// Effective VIP tier
    pub vip_tier: u8,
    /// Season prize for the rank (season board only)
    pub prize: Option<Decimal>,
}

/// Descending by value, ascending by id on ties
fn compare(a: &(Decimal, AccountId), b: &(Decimal, AccountId)) -> Ordering {
    b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1))
}

/// Keeps the best `limit` accounts seen so far
struct TopN {
    limit: usize,
    entries: Vec<((Decimal, AccountId), Account)>,
}

impl TopN {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: Vec::with_capacity(limit.min(1024)),
        }
    }

    fn offer(&mut self, key: (Decimal, AccountId), account: Account) {
        if self.limit == 0 {
            return;
        }
        if self.entries.len() >= self.limit {
            match self.entries.last() {
                Some((last, _)) if compare(&key, last) != Ordering::Less => return,
                _ => {}
            }
        }

        let position = self
            .entries
            .binary_search_by(|(existing, _)| compare(existing, &key))
            .unwrap_or_else(|position| position);
        self.entries.insert(position, (key, account));
        self.entries.truncate(self.limit);
    }
}

/// Rank `accounts` by `field`
pub fn rank_accounts(
    accounts: impl IntoIterator<Item = Account>,
    field: LeaderboardField,
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<LeaderboardEntry> {
    let mut top = TopN::new(limit);
    for account in accounts {
        top.offer((field.value(&account), account.id.clone()), account);
    }
    into_entries(top, field, now)
}

fn into_entries(top: TopN, field: LeaderboardField, now: DateTime<Utc>) -> Vec<LeaderboardEntry> {
    top.entries
        .into_iter()
        .enumerate()
        .map(|(index, ((value, account_id), account))| {
            let rank = u32::try_from(index + 1).unwrap_or(u32::MAX);
            LeaderboardEntry {
                rank,
                name: account.public_name(),
                account_id,
                value,
                games_played: account.games_played,
                vip_tier: account.effective_vip_tier(now),
                prize: match field {
                    LeaderboardField::SeasonCash => Some(rules::prize_for_rank(rank)),
                    LeaderboardField::CashBalance => None,
                },
            }
        })
        .collect()
}

impl Engine {
    /// Top `limit` accounts by `field`
    pub fn top_by_field(&self, field: LeaderboardField, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let page_size = self.config().admin.bulk_page_size;
        let mut top = TopN::new(limit);
        let mut cursor: Option<AccountId> = None;

        loop {
            let page = self.ledger().accounts_page(cursor.as_ref(), page_size)?;
            let done = page.len() < page_size;
            cursor = page.last().map(|account| account.id.clone());
            for account in page {
                top.offer((field.value(&account), account.id.clone()), account);
            }
            if done {
                break;
            }
        }

        Ok(into_entries(top, field, self.now()))
    }
}
