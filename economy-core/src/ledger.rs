//! Account store with atomic per-account mutation
//!
//! The ledger owns every persisted record. All writes touching an account run
//! through [`Ledger::mutate`] (or one of its siblings) under that account's
//! lock, and commit the account document, its transaction records and any
//! side records (admin log entries included) in a single backend batch.
//!
//! Lock entries live only while an operation holds or waits for them, so
//! lookups of unknown ids leave nothing behind.
//!
//! # Index layout (`indices` column family)
//!
//! - `t|{account}\0{record_id}` - transaction records per account
//! - `w|{account}\0{request_id}` - withdrawal requests per account
//! - `s|{status}{request_id}` - withdrawal requests per status
//! - `r|{referrer}\0{referee}` - referral links
//! - `v|{account}\0{purchase_id}` - VIP purchases per account

use crate::{
    storage::{Backend, Table, WriteOp},
    types::{
        Account, AccountId, AdminAction, Currency, Season, TransactionKind, TransactionRecord,
        VipPurchase, WithdrawalRequest, WithdrawalStatus,
    },
    Error, Result,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

const IDX_TRANSACTIONS: &[u8] = b"t|";
const IDX_WITHDRAWALS: &[u8] = b"w|";
const IDX_WITHDRAWAL_STATUS: &[u8] = b"s|";
const IDX_REFERRALS: &[u8] = b"r|";
const IDX_VIP_PURCHASES: &[u8] = b"v|";

/// Staged side effects of one account mutation
#[derive(Debug)]
pub struct Journal {
    account_id: AccountId,
    now: DateTime<Utc>,
    records: Vec<TransactionRecord>,
    withdrawals: Vec<(WithdrawalRequest, Option<WithdrawalStatus>)>,
    referral_links: Vec<AccountId>,
    admin_actions: Vec<AdminAction>,
    vip_purchases: Vec<VipPurchase>,
}

impl Journal {
    fn new(account_id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            now,
            records: Vec::new(),
            withdrawals: Vec::new(),
            referral_links: Vec::new(),
            admin_actions: Vec::new(),
            vip_purchases: Vec::new(),
        }
    }

    /// Time of the mutation
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Stage a credit record
    pub fn credit(&mut self, currency: Currency, amount: Decimal, description: impl Into<String>) {
        self.record(TransactionKind::Credit, currency, amount, description.into());
    }

    /// Stage a debit record
    pub fn debit(&mut self, currency: Currency, amount: Decimal, description: impl Into<String>) {
        self.record(TransactionKind::Debit, currency, amount, description.into());
    }

    /// Stage a zero-amount audit record
    pub fn note(&mut self, description: impl Into<String>) {
        self.record(
            TransactionKind::Credit,
            Currency::Cash,
            Decimal::ZERO,
            description.into(),
        );
    }

    /// Stage a credit or debit matching the sign of `delta` (nothing for zero)
    pub fn adjust(&mut self, currency: Currency, delta: Decimal, description: impl Into<String>) {
        if delta > Decimal::ZERO {
            self.credit(currency, delta, description);
        } else if delta < Decimal::ZERO {
            self.debit(currency, -delta, description);
        }
    }

    /// Stage a new withdrawal request owned by this account
    pub fn insert_withdrawal(&mut self, request: WithdrawalRequest) {
        self.withdrawals.push((request, None));
    }

    /// Stage a referral link from `referrer` to this account
    pub fn link_referrer(&mut self, referrer: AccountId) {
        self.referral_links.push(referrer);
    }

    /// Stage a VIP purchase of this account
    pub fn record_vip_purchase(&mut self, tier: u8, duration_days: i64, expires_at: DateTime<Utc>) {
        self.vip_purchases.push(VipPurchase {
            id: Uuid::now_v7(),
            account_id: self.account_id.clone(),
            tier,
            duration_days,
            purchased_at: self.now,
            expires_at,
        });
    }

    /// Stage an admin log entry committed with the rest of the mutation
    pub fn log_admin(&mut self, admin_id: &str, action: &str, details: impl Into<String>) {
        self.admin_actions.push(AdminAction {
            id: Uuid::now_v7(),
            admin_id: admin_id.to_string(),
            action: action.to_string(),
            details: details.into(),
            created_at: self.now,
        });
    }

    /// Records staged so far
    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    fn record(
        &mut self,
        kind: TransactionKind,
        currency: Currency,
        amount: Decimal,
        description: String,
    ) {
        self.records.push(TransactionRecord {
            id: Uuid::now_v7(),
            account_id: self.account_id.clone(),
            kind,
            currency,
            amount,
            description,
            created_at: self.now,
        });
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
            && self.withdrawals.is_empty()
            && self.referral_links.is_empty()
            && self.admin_actions.is_empty()
            && self.vip_purchases.is_empty()
    }

    fn into_ops(self, ops: &mut Vec<WriteOp>) -> Result<()> {
        for record in self.records {
            ops.push(WriteOp::Put {
                table: Table::Indices,
                key: account_index_key(IDX_TRANSACTIONS, &record.account_id, &record.id),
                value: Vec::new(),
            });
            ops.push(WriteOp::Put {
                table: Table::Transactions,
                key: record.id.as_bytes().to_vec(),
                value: encode(&record)?,
            });
        }

        for (request, previous_status) in self.withdrawals {
            match previous_status {
                Some(previous) => {
                    if previous != request.status {
                        ops.push(WriteOp::Delete {
                            table: Table::Indices,
                            key: status_index_key(previous, &request.id),
                        });
                    }
                }
                None => ops.push(WriteOp::Put {
                    table: Table::Indices,
                    key: account_index_key(IDX_WITHDRAWALS, &request.account_id, &request.id),
                    value: Vec::new(),
                }),
            }
            ops.push(WriteOp::Put {
                table: Table::Indices,
                key: status_index_key(request.status, &request.id),
                value: Vec::new(),
            });
            ops.push(WriteOp::Put {
                table: Table::Withdrawals,
                key: request.id.as_bytes().to_vec(),
                value: encode(&request)?,
            });
        }

        for referrer in self.referral_links {
            ops.push(WriteOp::Put {
                table: Table::Indices,
                key: referral_key(&referrer, Some(&self.account_id)),
                value: Vec::new(),
            });
        }

        for action in &self.admin_actions {
            ops.push(admin_action_op(action)?);
        }

        for purchase in self.vip_purchases {
            ops.push(WriteOp::Put {
                table: Table::Indices,
                key: account_index_key(IDX_VIP_PURCHASES, &purchase.account_id, &purchase.id),
                value: Vec::new(),
            });
            ops.push(WriteOp::Put {
                table: Table::VipPurchases,
                key: purchase.id.as_bytes().to_vec(),
                value: encode(&purchase)?,
            });
        }

        Ok(())
    }
}

/// Signed change to an account's balances
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceDelta {
    /// CASH change
    pub cash: Decimal,
    /// TOKEN change
    pub tokens: Decimal,
    /// Season CASH change
    pub season_cash: Decimal,
    /// Energy change
    pub energy: i64,
    /// Cooldown-reset item change
    pub cooldown_resets: i64,
    /// Reason recorded on the transaction records
    pub description: String,
}

impl BalanceDelta {
    /// Apply to `account`, staging one record per changed currency
    pub fn apply(&self, account: &mut Account, journal: &mut Journal) -> Result<()> {
        account.game_energy = apply_counter("energy", account.game_energy, self.energy)?;
        account.cooldown_resets_available = apply_counter(
            "cooldown_resets",
            account.cooldown_resets_available,
            self.cooldown_resets,
        )?;

        account.cash_balance += self.cash;
        account.token_balance += self.tokens;
        account.season_cash += self.season_cash;
        account.check_balances()?;

        journal.adjust(Currency::Cash, self.cash, self.description.clone());
        journal.adjust(Currency::Token, self.tokens, self.description.clone());
        Ok(())
    }
}

fn apply_counter(balance: &'static str, current: u32, delta: i64) -> Result<u32> {
    let next = i64::from(current) + delta;
    if next < 0 {
        return Err(Error::InsufficientBalance {
            balance,
            required: Decimal::from(-delta),
            available: Decimal::from(current),
        });
    }
    u32::try_from(next).map_err(|_| Error::InvalidInput(format!("{} overflow", balance)))
}

/// Account store
pub struct Ledger {
    backend: Arc<dyn Backend>,
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("locked_accounts", &self.locked_accounts())
            .finish()
    }
}

impl Ledger {
    /// Ledger over `backend`
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            locks: DashMap::new(),
        }
    }

    /// Run `f` while holding the lock of account `id`
    ///
    /// The map entry is dropped again once no other caller holds or waits for
    /// it, so the map only grows with the number of accounts in flight.
    fn with_lock<T>(&self, id: &AccountId, f: impl FnOnce() -> Result<T>) -> Result<T> {
        // Clone out of the map so the shard guard is released before locking
        let lock = self.locks.entry(id.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        // Other holders got their clone under the shard lock, so a count of 1
        // means nobody can be waiting on this mutex
        self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Accounts with a live lock entry
    pub fn locked_accounts(&self) -> usize {
        self.locks.len()
    }

    // Accounts

    /// Load an account
    pub fn account(&self, id: &AccountId) -> Result<Option<Account>> {
        self.backend
            .get(Table::Accounts, id.as_str().as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Load an account or fail with `AccountNotFound`
    pub fn require_account(&self, id: &AccountId) -> Result<Account> {
        self.account(id)?
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))
    }

    /// Run `f` on the account under its lock and commit the result atomically
    ///
    /// Nothing is written when `f` fails, when a balance would end up negative,
    /// or when neither the account nor the journal changed.
    pub fn mutate<T>(
        &self,
        id: &AccountId,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut Account, &mut Journal) -> Result<T>,
    ) -> Result<T> {
        self.with_lock(id, || {
            let original = self.require_account(id)?;
            let mut account = original.clone();
            let mut journal = Journal::new(id.clone(), now);

            let output = f(&mut account, &mut journal)?;
            account.check_balances()?;

            let changed = account != original;
            if !changed && journal.is_empty() {
                return Ok(output);
            }
            if changed {
                account.updated_at = now;
            }

            let mut ops = vec![WriteOp::Put {
                table: Table::Accounts,
                key: id.as_str().as_bytes().to_vec(),
                value: encode(&account)?,
            }];
            journal.into_ops(&mut ops)?;
            self.backend.write(ops)?;

            Ok(output)
        })
    }

    /// Store `account` unless one already exists with the same id
    ///
    /// Returns the stored account and whether it was created by this call.
    pub fn insert_if_absent(
        &self,
        account: Account,
        stage: impl FnOnce(&Account, &mut Journal),
    ) -> Result<(Account, bool)> {
        let id = account.id.clone();
        self.with_lock(&id, || {
            if let Some(existing) = self.account(&account.id)? {
                return Ok((existing, false));
            }

            let mut journal = Journal::new(account.id.clone(), account.created_at);
            stage(&account, &mut journal);

            let mut ops = vec![WriteOp::Put {
                table: Table::Accounts,
                key: account.id.as_str().as_bytes().to_vec(),
                value: encode(&account)?,
            }];
            journal.into_ops(&mut ops)?;
            self.backend.write(ops)?;

            Ok((account, true))
        })
    }

    /// Remove an account and its referral link; records are kept
    ///
    /// `audit` is committed in the same batch as the removal.
    pub fn delete_account(&self, id: &AccountId, audit: Option<&AdminAction>) -> Result<Account> {
        self.with_lock(id, || {
            let account = self.require_account(id)?;
            let mut ops = vec![WriteOp::Delete {
                table: Table::Accounts,
                key: id.as_str().as_bytes().to_vec(),
            }];
            if let Some(referrer) = &account.referred_by {
                ops.push(WriteOp::Delete {
                    table: Table::Indices,
                    key: referral_key(referrer, Some(id)),
                });
            }
            if let Some(action) = audit {
                ops.push(admin_action_op(action)?);
            }
            self.backend.write(ops)?;

            Ok(account)
        })
    }

    /// Up to `limit` accounts with ids strictly after `after`, in id order
    pub fn accounts_page(&self, after: Option<&AccountId>, limit: usize) -> Result<Vec<Account>> {
        self.backend
            .scan_after(
                Table::Accounts,
                after.map(|id| id.as_str().as_bytes()),
                limit,
            )?
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    /// Every account, loaded `page_size` at a time
    pub fn all_accounts(&self, page_size: usize) -> Result<Vec<Account>> {
        let mut accounts: Vec<Account> = Vec::new();
        loop {
            let page = self.accounts_page(accounts.last().map(|a| &a.id), page_size)?;
            let done = page.len() < page_size;
            accounts.extend(page);
            if done {
                return Ok(accounts);
            }
        }
    }

    /// Estimated number of accounts
    pub fn approximate_account_count(&self) -> Result<u64> {
        self.backend.approximate_count(Table::Accounts)
    }

    /// Accounts that name `referrer` as their referrer
    pub fn count_referrals(&self, referrer: &AccountId) -> Result<u32> {
        let links = self
            .backend
            .scan_prefix(Table::Indices, &referral_key(referrer, None))?;
        u32::try_from(links.len()).map_err(|_| Error::Other("Referral count overflow".to_string()))
    }

    // Transaction records

    /// Newest-first records of one account
    pub fn transactions(&self, id: &AccountId, limit: usize) -> Result<Vec<TransactionRecord>> {
        let prefix = account_index_prefix(IDX_TRANSACTIONS, id);
        let index = self.backend.scan_prefix(Table::Indices, &prefix)?;

        index
            .iter()
            .rev()
            .take(limit)
            .map(|(key, _)| {
                let record_id = uuid_suffix(key)?;
                self.backend
                    .get(Table::Transactions, record_id.as_bytes())?
                    .ok_or_else(|| {
                        Error::Storage(format!("Dangling transaction index {}", record_id))
                    })
                    .and_then(|bytes| decode(&bytes))
            })
            .collect()
    }

    /// Newest-first records across all accounts
    pub fn recent_transactions(&self, limit: usize) -> Result<Vec<TransactionRecord>> {
        self.backend
            .scan_last(Table::Transactions, limit)?
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    /// Newest-first VIP purchases of one account
    pub fn vip_purchases(&self, id: &AccountId) -> Result<Vec<VipPurchase>> {
        let prefix = account_index_prefix(IDX_VIP_PURCHASES, id);
        let mut purchases = self
            .backend
            .scan_prefix(Table::Indices, &prefix)?
            .iter()
            .map(|(key, _)| {
                let purchase_id = uuid_suffix(key)?;
                self.backend
                    .get(Table::VipPurchases, purchase_id.as_bytes())?
                    .ok_or_else(|| Error::Storage(format!("Dangling purchase index {}", purchase_id)))
                    .and_then(|bytes| decode(&bytes))
            })
            .collect::<Result<Vec<VipPurchase>>>()?;
        purchases.sort_by(|a, b| {
            b.purchased_at
                .cmp(&a.purchased_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(purchases)
    }

    // Withdrawals

    /// Load a withdrawal request
    pub fn withdrawal(&self, request_id: Uuid) -> Result<WithdrawalRequest> {
        let bytes = self
            .backend
            .get(Table::Withdrawals, request_id.as_bytes())?
            .ok_or_else(|| Error::WithdrawalNotFound(request_id.to_string()))?;
        decode(&bytes)
    }

    /// Newest-first withdrawal requests of one account
    pub fn withdrawals_for(&self, id: &AccountId) -> Result<Vec<WithdrawalRequest>> {
        let prefix = account_index_prefix(IDX_WITHDRAWALS, id);
        let mut requests = self
            .backend
            .scan_prefix(Table::Indices, &prefix)?
            .iter()
            .map(|(key, _)| self.withdrawal(uuid_suffix(key)?))
            .collect::<Result<Vec<_>>>()?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(requests)
    }

    /// Newest-first withdrawal requests in `status`, or of any status
    pub fn withdrawals_by_status(
        &self,
        status: Option<WithdrawalStatus>,
        limit: usize,
    ) -> Result<Vec<WithdrawalRequest>> {
        match status {
            Some(status) => {
                let mut prefix = IDX_WITHDRAWAL_STATUS.to_vec();
                prefix.push(status_tag(status));
                self.backend
                    .scan_prefix(Table::Indices, &prefix)?
                    .iter()
                    .rev()
                    .take(limit)
                    .map(|(key, _)| self.withdrawal(uuid_suffix(key)?))
                    .collect()
            }
            None => self
                .backend
                .scan_last(Table::Withdrawals, limit)?
                .iter()
                .map(|(_, value)| decode(value))
                .collect(),
        }
    }

    /// Number of requests in `status`
    pub fn count_withdrawals(&self, status: WithdrawalStatus) -> Result<usize> {
        let mut prefix = IDX_WITHDRAWAL_STATUS.to_vec();
        prefix.push(status_tag(status));
        Ok(self.backend.scan_prefix(Table::Indices, &prefix)?.len())
    }

    /// Run `f` on a withdrawal request and its owner under the owner's lock
    ///
    /// The owner is `None` when the account was deleted after the request.
    pub fn mutate_withdrawal<T>(
        &self,
        request_id: Uuid,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut WithdrawalRequest, Option<&mut Account>, &mut Journal) -> Result<T>,
    ) -> Result<T> {
        let owner = self.withdrawal(request_id)?.account_id;
        self.with_lock(&owner, || {
            // Reload under the lock
            let original = self.withdrawal(request_id)?;
            let mut request = original.clone();
            let original_account = self.account(&owner)?;
            let mut account = original_account.clone();
            let mut journal = Journal::new(owner.clone(), now);

            let output = f(&mut request, account.as_mut(), &mut journal)?;

            let mut ops = Vec::new();
            if let Some(mut account) = account {
                account.check_balances()?;
                if Some(&account) != original_account.as_ref() {
                    account.updated_at = now;
                    ops.push(WriteOp::Put {
                        table: Table::Accounts,
                        key: owner.as_str().as_bytes().to_vec(),
                        value: encode(&account)?,
                    });
                }
            }
            if request != original {
                journal.withdrawals.push((request, Some(original.status)));
            }
            journal.into_ops(&mut ops)?;

            if !ops.is_empty() {
                self.backend.write(ops)?;
            }
            Ok(output)
        })
    }

    // Seasons

    /// Store a season, together with `audit` when given
    pub fn put_season(&self, season: &Season, audit: Option<&AdminAction>) -> Result<()> {
        let mut ops = vec![WriteOp::Put {
            table: Table::Seasons,
            key: season.id.as_bytes().to_vec(),
            value: encode(season)?,
        }];
        if let Some(action) = audit {
            ops.push(admin_action_op(action)?);
        }
        self.backend.write(ops)
    }

    /// Load a season
    pub fn season(&self, season_id: Uuid) -> Result<Season> {
        let bytes = self
            .backend
            .get(Table::Seasons, season_id.as_bytes())?
            .ok_or_else(|| Error::SeasonNotFound(season_id.to_string()))?;
        decode(&bytes)
    }

    /// All seasons, oldest first
    pub fn seasons(&self) -> Result<Vec<Season>> {
        self.backend
            .scan_prefix(Table::Seasons, &[])?
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    // Admin audit log

    /// Append an admin action
    pub fn append_admin_action(&self, action: &AdminAction) -> Result<()> {
        self.backend.write(vec![admin_action_op(action)?])
    }

    /// Newest-first admin actions
    pub fn admin_actions(&self, limit: usize) -> Result<Vec<AdminAction>> {
        self.backend
            .scan_last(Table::AdminActions, limit)?
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

fn admin_action_op(action: &AdminAction) -> Result<WriteOp> {
    Ok(WriteOp::Put {
        table: Table::AdminActions,
        key: action.id.as_bytes().to_vec(),
        value: encode(action)?,
    })
}

fn account_index_prefix(tag: &[u8], id: &AccountId) -> Vec<u8> {
    let mut key = tag.to_vec();
    key.extend_from_slice(id.as_str().as_bytes());
    key.push(0);
    key
}

fn account_index_key(tag: &[u8], id: &AccountId, record_id: &Uuid) -> Vec<u8> {
    let mut key = account_index_prefix(tag, id);
    key.extend_from_slice(record_id.as_bytes());
    key
}

fn referral_key(referrer: &AccountId, referee: Option<&AccountId>) -> Vec<u8> {
    let mut key = account_index_prefix(IDX_REFERRALS, referrer);
    if let Some(referee) = referee {
        key.extend_from_slice(referee.as_str().as_bytes());
    }
    key
}

fn status_tag(status: WithdrawalStatus) -> u8 {
    match status {
        WithdrawalStatus::Pending => b'p',
        WithdrawalStatus::Approved => b'a',
        WithdrawalStatus::Rejected => b'r',
    }
}

fn status_index_key(status: WithdrawalStatus, request_id: &Uuid) -> Vec<u8> {
    let mut key = IDX_WITHDRAWAL_STATUS.to_vec();
    key.push(status_tag(status));
    key.extend_from_slice(request_id.as_bytes());
    key
}

fn uuid_suffix(key: &[u8]) -> Result<Uuid> {
    key.len()
        .checked_sub(16)
        .and_then(|start| Uuid::from_slice(&key[start..]).ok())
        .ok_or_else(|| Error::Storage("Malformed index key".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use crate::types::NewAccount;

    fn ledger_with(ids: &[&str]) -> Ledger {
        let ledger = Ledger::new(Arc::new(MemoryBackend::new()));
        for id in ids {
            let account = Account::new(AccountId::new(*id), &NewAccount::default(), 2, Utc::now());
            ledger.insert_if_absent(account, |_, _| {}).unwrap();
        }
        ledger
    }

    #[test]
    fn test_insert_if_absent_is_idempotent() {
        let ledger = ledger_with(&[]);
        let now = Utc::now();
        let account = Account::new(AccountId::new("p1"), &NewAccount::default(), 2, now);

        let (_, created) = ledger
            .insert_if_absent(account.clone(), |a, j| {
                j.credit(Currency::Cash, Decimal::from(500), "Welcome bonus");
                assert_eq!(a.id.as_str(), "p1");
            })
            .unwrap();
        assert!(created);

        let (_, created) = ledger
            .insert_if_absent(account, |_, j| {
                j.credit(Currency::Cash, Decimal::from(500), "Welcome bonus");
            })
            .unwrap();
        assert!(!created);
        assert_eq!(ledger.transactions(&AccountId::new("p1"), 10).unwrap().len(), 1);
    }

    #[test]
    fn test_apply_delta_emits_record_per_currency() {
        let ledger = ledger_with(&["p1"]);
        let id = AccountId::new("p1");
        let delta = BalanceDelta {
            cash: Decimal::from(100),
            tokens: Decimal::from(5),
            season_cash: Decimal::from(100),
            description: "grant".to_string(),
            ..Default::default()
        };
        ledger.mutate(&id, Utc::now(), |a, j| delta.apply(a, j)).unwrap();

        let records = ledger.transactions(&id, 10).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.kind == TransactionKind::Credit));
    }

    #[test]
    fn test_negative_result_is_rejected_without_write() {
        let ledger = ledger_with(&["p1"]);
        let id = AccountId::new("p1");
        let delta = BalanceDelta {
            cash: Decimal::from(-1),
            description: "overdraw".to_string(),
            ..Default::default()
        };

        let err = ledger.mutate(&id, Utc::now(), |a, j| delta.apply(a, j)).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { balance: "cash", .. }));
        assert!(ledger.transactions(&id, 10).unwrap().is_empty());
        assert_eq!(ledger.require_account(&id).unwrap().cash_balance, Decimal::ZERO);
    }

    #[test]
    fn test_energy_underflow_is_rejected() {
        let ledger = ledger_with(&["p1"]);
        let id = AccountId::new("p1");
        let delta = BalanceDelta {
            energy: -3,
            ..Default::default()
        };
        let err = ledger.mutate(&id, Utc::now(), |a, j| delta.apply(a, j)).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { balance: "energy", .. }));
    }

    #[test]
    fn test_mutate_missing_account() {
        let ledger = ledger_with(&[]);
        let err = ledger
            .mutate(&AccountId::new("ghost"), Utc::now(), |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(_)));
    }

    #[test]
    fn test_lock_entries_do_not_outlive_operations() {
        let ledger = ledger_with(&["p1"]);

        for i in 0..1_000 {
            let ghost = AccountId::new(format!("ghost-{}", i));
            assert!(ledger.mutate(&ghost, Utc::now(), |_, _| Ok(())).is_err());
        }
        ledger
            .mutate(&AccountId::new("p1"), Utc::now(), |account, _| {
                account.games_played += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(ledger.locked_accounts(), 0);

        ledger.delete_account(&AccountId::new("p1"), None).unwrap();
        assert_eq!(ledger.locked_accounts(), 0);
    }

    #[test]
    fn test_lock_entries_pruned_under_contention() {
        let ledger = Arc::new(ledger_with(&["p1"]));
        let id = AccountId::new("p1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        ledger
                            .mutate(&id, Utc::now(), |account, _| {
                                account.games_played += 1;
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.require_account(&id).unwrap().games_played, 400);
        assert_eq!(ledger.locked_accounts(), 0);
    }

    #[test]
    fn test_admin_entry_commits_with_mutation() {
        let ledger = ledger_with(&["p1"]);
        let id = AccountId::new("p1");

        let err = ledger
            .mutate(&id, Utc::now(), |account, journal| {
                journal.log_admin("admin", "override_account", "p1");
                account.cash_balance -= Decimal::ONE;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert!(ledger.admin_actions(10).unwrap().is_empty());

        ledger
            .mutate(&id, Utc::now(), |_, journal| {
                journal.log_admin("admin", "admin_remove_vip", "p1");
                Ok(())
            })
            .unwrap();
        let log = ledger.admin_actions(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, "admin_remove_vip");
    }

    #[test]
    fn test_accounts_page_walks_everything() {
        let ids: Vec<String> = (0..7).map(|i| format!("p{}", i)).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let ledger = ledger_with(&refs);

        let first = ledger.accounts_page(None, 3).unwrap();
        assert_eq!(first.len(), 3);
        let second = ledger.accounts_page(Some(&first[2].id), 3).unwrap();
        assert_eq!(second[0].id.as_str(), "p3");
        assert_eq!(ledger.all_accounts(3).unwrap().len(), 7);
    }

    #[test]
    fn test_referral_links_and_delete() {
        let ledger = ledger_with(&["referrer", "a", "b"]);
        let referrer = AccountId::new("referrer");

        for referee in ["a", "b"] {
            ledger
                .mutate(&AccountId::new(referee), Utc::now(), |account, journal| {
                    account.referred_by = Some(referrer.clone());
                    journal.link_referrer(referrer.clone());
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(ledger.count_referrals(&referrer).unwrap(), 2);

        ledger.delete_account(&AccountId::new("a"), None).unwrap();
        assert_eq!(ledger.count_referrals(&referrer).unwrap(), 1);
        assert!(ledger.account(&AccountId::new("a")).unwrap().is_none());
    }

    #[test]
    fn test_withdrawal_status_index_follows_updates() {
        let ledger = ledger_with(&["p1"]);
        let id = AccountId::new("p1");
        let now = Utc::now();
        let request = WithdrawalRequest {
            id: Uuid::now_v7(),
            account_id: id.clone(),
            amount: Decimal::from(100),
            wallet_address: "EQ-wallet".to_string(),
            status: WithdrawalStatus::Pending,
            created_at: now,
            processed_at: None,
            admin_note: String::new(),
        };
        let request_id = request.id;

        ledger
            .mutate(&id, now, |_, journal| {
                journal.insert_withdrawal(request);
                Ok(())
            })
            .unwrap();
        assert_eq!(ledger.count_withdrawals(WithdrawalStatus::Pending).unwrap(), 1);

        ledger
            .mutate_withdrawal(request_id, now, |request, account, _| {
                assert!(account.is_some());
                request.status = WithdrawalStatus::Approved;
                Ok(())
            })
            .unwrap();

        assert_eq!(ledger.count_withdrawals(WithdrawalStatus::Pending).unwrap(), 0);
        let approved = ledger
            .withdrawals_by_status(Some(WithdrawalStatus::Approved), 10)
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(ledger.withdrawals_for(&id).unwrap()[0].id, request_id);
    }
}
