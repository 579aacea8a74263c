//! Administrative operations
//!
//! Every operation takes the acting administrator's id, rejects an empty one
//! before touching anything, and commits its admin log entry in the same
//! batch as the change it describes. Bulk operations log one entry before
//! the first account is visited.

use crate::{
    ledger::Journal,
    rules,
    types::{Account, AccountId, AdminAction, Currency, WithdrawalStatus},
    vip::validate_tier,
    Engine, Error, Result,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Explicit VIP assignment inside an override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VipOverride {
    /// Tier (0 removes VIP)
    pub tier: u8,
    /// Expiry; required for tiers above 0
    pub expires_at: Option<DateTime<Utc>>,
}

/// Field corrections applied by an administrator; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountOverride {
    /// New CASH balance
    pub cash_balance: Option<Decimal>,
    /// New TOKEN balance
    pub token_balance: Option<Decimal>,
    /// New season CASH
    pub season_cash: Option<Decimal>,
    /// New energy
    pub game_energy: Option<u32>,
    /// New cooldown-reset item count
    pub cooldown_resets_available: Option<u32>,
    /// New VIP state
    pub vip: Option<VipOverride>,
    /// New payout wallet
    pub wallet_address: Option<String>,
    /// New display name
    pub display_name: Option<String>,
}

impl AccountOverride {
    /// Reject values that could never be stored
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("cash_balance", self.cash_balance),
            ("token_balance", self.token_balance),
            ("season_cash", self.season_cash),
        ] {
            if matches!(value, Some(v) if v < Decimal::ZERO) {
                return Err(Error::InvalidInput(format!("{} must not be negative", field)));
            }
        }
        if let Some(vip) = &self.vip {
            if vip.tier > rules::MAX_VIP_TIER {
                return Err(Error::InvalidInput(format!("Unknown VIP tier {}", vip.tier)));
            }
            if (vip.tier == 0) != vip.expires_at.is_none() {
                return Err(Error::InvalidInput(
                    "VIP expiry must be set exactly when the tier is above 0".to_string(),
                ));
            }
        }
        if matches!(&self.wallet_address, Some(w) if w.trim().is_empty()) {
            return Err(Error::InvalidInput("Wallet address is empty".to_string()));
        }
        if matches!(&self.display_name, Some(n) if n.len() > crate::types::MAX_PROFILE_FIELD_LEN) {
            return Err(Error::InvalidInput("Display name too long".to_string()));
        }
        Ok(())
    }

    fn apply(&self, account: &mut Account, journal: &mut Journal) {
        if let Some(cash) = self.cash_balance {
            journal.adjust(Currency::Cash, cash - account.cash_balance, "Admin adjustment");
            account.cash_balance = cash;
        }
        if let Some(tokens) = self.token_balance {
            journal.adjust(Currency::Token, tokens - account.token_balance, "Admin adjustment");
            account.token_balance = tokens;
        }
        if let Some(season_cash) = self.season_cash {
            account.season_cash = season_cash;
        }
        if let Some(energy) = self.game_energy {
            account.game_energy = energy;
        }
        if let Some(resets) = self.cooldown_resets_available {
            account.cooldown_resets_available = resets;
        }
        if let Some(vip) = &self.vip {
            account.vip_tier = vip.tier;
            account.vip_expires_at = vip.expires_at;
        }
        if let Some(wallet) = &self.wallet_address {
            account.wallet_address = Some(wallet.trim().to_string());
        }
        if let Some(name) = &self.display_name {
            account.display_name = name.clone();
        }
    }
}

/// Per-account failure inside a bulk operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    /// Account that was not updated
    pub account_id: AccountId,
    /// Error message
    pub error: String,
}

/// Outcome of a bulk operation (not transactional across accounts)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    /// Accounts visited
    pub scanned: usize,
    /// Accounts changed
    pub affected: usize,
    /// Accounts left untouched because their update failed
    pub failures: Vec<BulkFailure>,
}

/// Aggregates for the admin dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardStats {
    /// Accounts
    pub total_accounts: u64,
    /// Withdrawals waiting for review
    pub pending_withdrawals: usize,
    /// Accounts with an unexpired VIP tier
    pub active_vips: u64,
    /// CASH in circulation
    pub total_cash: Decimal,
    /// TOKEN in circulation
    pub total_tokens: Decimal,
    /// Games played by everyone
    pub total_games_played: u64,
}

pub(crate) fn require_admin(admin_id: &str) -> Result<()> {
    if admin_id.trim().is_empty() {
        return Err(Error::InvalidInput("Admin id is empty".to_string()));
    }
    Ok(())
}

impl Engine {
    /// Append an entry to the admin action log
    pub fn log_admin_action(
        &self,
        admin_id: &str,
        action: &str,
        details: impl Into<String>,
    ) -> Result<AdminAction> {
        let entry = self.admin_entry(admin_id, action, details)?;
        self.ledger().append_admin_action(&entry)?;
        Ok(entry)
    }

    /// Build a log entry without storing it
    pub(crate) fn admin_entry(
        &self,
        admin_id: &str,
        action: &str,
        details: impl Into<String>,
    ) -> Result<AdminAction> {
        require_admin(admin_id)?;
        Ok(AdminAction {
            id: Uuid::now_v7(),
            admin_id: admin_id.to_string(),
            action: action.to_string(),
            details: details.into(),
            created_at: self.now(),
        })
    }

    /// Newest-first admin actions
    pub fn admin_actions(&self, limit: usize) -> Result<Vec<AdminAction>> {
        self.ledger().admin_actions(limit)
    }

    /// Overwrite selected account fields
    ///
    /// Balance changes are recorded as credit or debit adjustments.
    pub fn override_account(
        &self,
        admin_id: &str,
        id: &AccountId,
        changes: AccountOverride,
    ) -> Result<Account> {
        require_admin(admin_id)?;
        if let Err(e) = changes.validate() {
            tracing::warn!(admin_id, account_id = %id, error = %e, "Rejected account override");
            return Err(e);
        }

        let details = serde_json::to_string(&changes)
            .map_err(|e| Error::Other(format!("Failed to encode override: {}", e)))?;
        let account = self.transact(id, "override_account", |account, journal| {
            changes.apply(account, journal);
            journal.log_admin(admin_id, "override_account", format!("{} {}", id, details));
            Ok(account.clone())
        })?;

        tracing::info!(admin_id, account_id = %id, "Account overridden");
        Ok(account)
    }

    /// Delete an account; its transaction records stay
    pub fn delete_account(&self, admin_id: &str, id: &AccountId) -> Result<Account> {
        let entry = self.admin_entry(admin_id, "delete_account", id.to_string())?;
        let account = self.ledger().delete_account(id, Some(&entry))?;
        tracing::info!(admin_id, account_id = %id, "Account deleted");
        Ok(account)
    }

    /// Zero every account's season CASH
    pub fn bulk_reset_season_cash(&self, admin_id: &str) -> Result<BulkReport> {
        self.log_admin_action(admin_id, "bulk_reset_season_cash", "season CASH to 0")?;
        self.bulk("bulk_reset_season_cash", |account, _| {
            if account.season_cash == Decimal::ZERO {
                return Ok(false);
            }
            account.season_cash = Decimal::ZERO;
            Ok(true)
        })
    }

    /// Add `delta` CASH (possibly negative) to every account
    ///
    /// Accounts whose balance would drop below zero are reported as failures
    /// and left unchanged.
    pub fn bulk_adjust_cash(&self, admin_id: &str, delta: Decimal) -> Result<BulkReport> {
        require_admin(admin_id)?;
        if delta == Decimal::ZERO {
            return Err(Error::InvalidInput("Adjustment must not be zero".to_string()));
        }
        self.log_admin_action(admin_id, "bulk_adjust_cash", format!("{} CASH", delta))?;
        self.bulk("bulk_adjust_cash", |account, journal| {
            account.cash_balance += delta;
            journal.adjust(Currency::Cash, delta, "Admin bulk adjustment");
            Ok(true)
        })
    }

    /// Visit every account page by page, updating each one atomically
    fn bulk(
        &self,
        operation: &'static str,
        update: impl Fn(&mut Account, &mut Journal) -> Result<bool>,
    ) -> Result<BulkReport> {
        let page_size = self.config().admin.bulk_page_size;
        let mut report = BulkReport::default();
        let mut cursor: Option<AccountId> = None;

        loop {
            let page = self.ledger().accounts_page(cursor.as_ref(), page_size)?;
            let done = page.len() < page_size;
            cursor = page.last().map(|account| account.id.clone());

            for account in page {
                report.scanned += 1;
                match self.transact(&account.id, operation, &update) {
                    Ok(true) => report.affected += 1,
                    Ok(false) => {}
                    // Deleted between the scan and the update
                    Err(Error::AccountNotFound(_)) => {}
                    Err(e) => report.failures.push(BulkFailure {
                        account_id: account.id,
                        error: e.to_string(),
                    }),
                }
            }

            if done {
                break;
            }
        }

        tracing::info!(
            operation,
            scanned = report.scanned,
            affected = report.affected,
            failed = report.failures.len(),
            "Bulk operation finished"
        );
        Ok(report)
    }

    /// Grant a VIP tier without the purchase item grant
    pub fn admin_set_vip(
        &self,
        admin_id: &str,
        id: &AccountId,
        tier: u8,
        duration_days: i64,
    ) -> Result<Account> {
        require_admin(admin_id)?;
        validate_tier(tier, duration_days)?;

        self.transact(id, "admin_set_vip", |account, journal| {
            account.vip_tier = tier;
            account.vip_expires_at = Some(journal.now() + Duration::days(duration_days));
            journal.note(format!("VIP Tier {} set by admin for {} days", tier, duration_days));
            journal.log_admin(
                admin_id,
                "admin_set_vip",
                format!("{} tier {} for {} days", id, tier, duration_days),
            );
            Ok(account.clone())
        })
    }

    /// Remove VIP immediately
    pub fn admin_remove_vip(&self, admin_id: &str, id: &AccountId) -> Result<Account> {
        require_admin(admin_id)?;
        self.transact(id, "admin_remove_vip", |account, journal| {
            if account.vip_tier != 0 {
                journal.note("VIP removed by admin");
            }
            account.vip_tier = 0;
            account.vip_expires_at = None;
            journal.log_admin(admin_id, "admin_remove_vip", id.to_string());
            Ok(account.clone())
        })
    }

    /// Totals over every account, read without account locks
    pub fn dashboard_stats(&self) -> Result<DashboardStats> {
        let now = self.now();
        let page_size = self.config().admin.bulk_page_size;
        let mut stats = DashboardStats {
            pending_withdrawals: self.ledger().count_withdrawals(WithdrawalStatus::Pending)?,
            ..Default::default()
        };

        let mut cursor: Option<AccountId> = None;
        loop {
            let page = self.ledger().accounts_page(cursor.as_ref(), page_size)?;
            let done = page.len() < page_size;
            cursor = page.last().map(|account| account.id.clone());

            for account in &page {
                stats.total_accounts += 1;
                if account.effective_vip_tier(now) > 0 {
                    stats.active_vips += 1;
                }
                stats.total_cash += account.cash_balance;
                stats.total_tokens += account.token_balance;
                stats.total_games_played += account.games_played;
            }

            if done {
                break;
            }
        }

        self.metrics()
            .accounts_estimate
            .set(i64::try_from(stats.total_accounts).unwrap_or(i64::MAX));
        Ok(stats)
    }
}
