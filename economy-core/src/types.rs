//! Core types for the economy engine
//!
//! All persisted types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for currency)
//! - Explicit defaults (no partial-object merging)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Longest accepted player identifier (bytes)
pub const MAX_ACCOUNT_ID_LEN: usize = 128;

/// Player identifier (platform user id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the id can be used as a storage key
    pub fn validate(&self) -> crate::Result<()> {
        if self.0.is_empty() {
            return Err(crate::Error::InvalidInput("Account id is empty".to_string()));
        }
        if self.0.len() > MAX_ACCOUNT_ID_LEN {
            return Err(crate::Error::InvalidInput(format!(
                "Account id longer than {} bytes",
                MAX_ACCOUNT_ID_LEN
            )));
        }
        if self.0.as_bytes().contains(&0) {
            return Err(crate::Error::InvalidInput(
                "Account id contains a NUL byte".to_string(),
            ));
        }
        Ok(())
    }

    /// Last eight characters, used when a player has no name
    pub fn short(&self) -> &str {
        let start = self
            .0
            .char_indices()
            .rev()
            .nth(7)
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        &self.0[start..]
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// In-game currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Spendable game currency
    Cash,
    /// Withdrawable currency
    Token,
}

impl Currency {
    /// Display code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Cash => "CASH",
            Currency::Token => "TOKEN",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Player account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Player id
    pub id: AccountId,

    /// Shown on leaderboards when no username is set
    pub display_name: String,

    /// Platform username
    pub username: String,

    /// Lifetime spendable CASH
    pub cash_balance: Decimal,

    /// Withdrawable TOKEN
    pub token_balance: Decimal,

    /// CASH earned in the current season (drives league placement)
    pub season_cash: Decimal,

    /// Energy left today
    pub game_energy: u32,

    /// Last daily energy refill
    pub last_energy_reset: DateTime<Utc>,

    /// Games finished
    pub games_played: u64,

    /// Best single game score (after multiplier)
    pub high_score: u64,

    /// Sum of all game scores (after multiplier)
    pub total_score: u64,

    /// Lifetime taps
    pub tap_count: u64,

    /// Progress in the current tap cycle
    pub tap_cycle_progress: u32,

    /// Tapping disabled until this instant
    pub tap_cooldown_until: Option<DateTime<Utc>>,

    /// Cooldown-reset items owned
    pub cooldown_resets_available: u32,

    /// Highest client tap batch sequence applied
    pub last_tap_batch_seq: u64,

    /// VIP tier (0 = none)
    pub vip_tier: u8,

    /// VIP expiry (None when tier is 0)
    pub vip_expires_at: Option<DateTime<Utc>>,

    /// Last claimed day of the login streak (0 = never)
    pub daily_reward_day: u8,

    /// Last daily reward claim
    pub last_daily_reward_at: Option<DateTime<Utc>>,

    /// Tasks already rewarded
    pub completed_task_ids: BTreeSet<String>,

    /// Account that invited this player
    pub referred_by: Option<AccountId>,

    /// Referrals already paid out
    pub referral_rewarded_count: u32,

    /// Payout wallet
    pub wallet_address: Option<String>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Fresh account with zero balances
    pub fn new(id: AccountId, profile: &NewAccount, energy: u32, now: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name: profile.display_name.clone(),
            username: profile.username.clone(),
            cash_balance: Decimal::ZERO,
            token_balance: Decimal::ZERO,
            season_cash: Decimal::ZERO,
            game_energy: energy,
            last_energy_reset: now,
            games_played: 0,
            high_score: 0,
            total_score: 0,
            tap_count: 0,
            tap_cycle_progress: 0,
            tap_cooldown_until: None,
            cooldown_resets_available: 0,
            last_tap_batch_seq: 0,
            vip_tier: 0,
            vip_expires_at: None,
            daily_reward_day: 0,
            last_daily_reward_at: None,
            completed_task_ids: BTreeSet::new(),
            referred_by: None,
            referral_rewarded_count: 0,
            wallet_address: profile.wallet_address.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Tapping is blocked at `now`
    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        matches!(self.tap_cooldown_until, Some(until) if until > now)
    }

    /// VIP tier as of `now`, without persisting an expiry
    pub fn effective_vip_tier(&self, now: DateTime<Utc>) -> u8 {
        match self.vip_expires_at {
            Some(expires_at) if expires_at < now => 0,
            _ => self.vip_tier,
        }
    }

    /// Name for public views
    pub fn public_name(&self) -> String {
        if !self.username.is_empty() {
            self.username.clone()
        } else if !self.display_name.is_empty() {
            self.display_name.clone()
        } else {
            self.id.short().to_string()
        }
    }

    /// Non-negativity of every balance
    pub fn check_balances(&self) -> crate::Result<()> {
        for (balance, value) in [
            ("cash", self.cash_balance),
            ("tokens", self.token_balance),
            ("season_cash", self.season_cash),
        ] {
            if value < Decimal::ZERO {
                return Err(crate::Error::InsufficientBalance {
                    balance,
                    required: -value,
                    available: Decimal::ZERO,
                });
            }
        }
        Ok(())
    }
}

/// Profile fields accepted at account creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    /// First name or nickname
    pub display_name: String,
    /// Platform username
    pub username: String,
    /// Inviting account, bound once at creation
    pub referred_by: Option<AccountId>,
    /// Payout wallet
    pub wallet_address: Option<String>,
}

/// Longest profile string accepted
pub const MAX_PROFILE_FIELD_LEN: usize = 64;

impl NewAccount {
    /// Validate before the profile is merged into a new account
    pub fn validate(&self, id: &AccountId) -> crate::Result<()> {
        if self.display_name.len() > MAX_PROFILE_FIELD_LEN
            || self.username.len() > MAX_PROFILE_FIELD_LEN
        {
            return Err(crate::Error::InvalidInput(
                "Profile field too long".to_string(),
            ));
        }
        if let Some(referrer) = &self.referred_by {
            referrer.validate()?;
            if referrer == id {
                return Err(crate::Error::InvalidInput(
                    "An account cannot refer itself".to_string(),
                ));
            }
        }
        if matches!(&self.wallet_address, Some(w) if w.trim().is_empty()) {
            return Err(crate::Error::InvalidInput(
                "Wallet address is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Direction of a transaction record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Balance increased (or a non-monetary event with amount 0)
    Credit,
    /// Balance decreased
    Debit,
}

/// Append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Record id (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Owning account
    pub account_id: AccountId,

    /// Credit or debit
    pub kind: TransactionKind,

    /// Affected currency
    pub currency: Currency,

    /// Amount (never negative)
    pub amount: Decimal,

    /// Human-readable reason
    pub description: String,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Withdrawal request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    /// Waiting for an administrator
    Pending,
    /// Paid out (terminal)
    Approved,
    /// Refused (terminal)
    Rejected,
}

impl WithdrawalStatus {
    /// Check if status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Approved | WithdrawalStatus::Rejected)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Token withdrawal request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Request id (UUIDv7)
    pub id: Uuid,

    /// Requesting account
    pub account_id: AccountId,

    /// Reserved token amount
    pub amount: Decimal,

    /// Destination wallet
    pub wallet_address: String,

    /// Current status
    pub status: WithdrawalStatus,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Resolution timestamp
    pub processed_at: Option<DateTime<Utc>>,

    /// Note left by the resolving administrator
    pub admin_note: String,
}

/// Confirmed VIP activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipPurchase {
    /// Purchase id (UUIDv7)
    pub id: Uuid,
    /// Buyer
    pub account_id: AccountId,
    /// Activated tier
    pub tier: u8,
    /// Days bought
    pub duration_days: i64,
    /// Activation time
    pub purchased_at: DateTime<Utc>,
    /// Expiry set by this purchase
    pub expires_at: DateTime<Utc>,
}

/// Season status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeasonStatus {
    /// Scheduled
    Upcoming,
    /// Running (at most one)
    Active,
    /// Finished
    Ended,
}

impl fmt::Display for SeasonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SeasonStatus::Upcoming => "upcoming",
            SeasonStatus::Active => "active",
            SeasonStatus::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Competitive season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    /// Season id
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Start of the season
    pub start_date: DateTime<Utc>,
    /// End of the season
    pub end_date: DateTime<Utc>,
    /// Current status
    pub status: SeasonStatus,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Administrative intervention, kept for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminAction {
    /// Entry id (UUIDv7)
    pub id: Uuid,
    /// Acting administrator
    pub admin_id: String,
    /// Short action name
    pub action: String,
    /// Free-form details (JSON for structured payloads)
    pub details: String,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_account_id_short() {
        assert_eq!(AccountId::new("user_1234567890").short(), "34567890");
        assert_eq!(AccountId::new("abc").short(), "abc");
    }

    #[test]
    fn test_account_id_validation() {
        assert!(AccountId::new("p1").validate().is_ok());
        assert!(AccountId::new("").validate().is_err());
        assert!(AccountId::new("a\0b").validate().is_err());
        assert!(AccountId::new("x".repeat(MAX_ACCOUNT_ID_LEN + 1)).validate().is_err());
    }

    #[test]
    fn test_withdrawal_status_terminal() {
        assert!(!WithdrawalStatus::Pending.is_terminal());
        assert!(WithdrawalStatus::Approved.is_terminal());
        assert!(WithdrawalStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_effective_vip_tier() {
        let now = Utc::now();
        let mut account = Account::new(AccountId::new("p1"), &NewAccount::default(), 2, now);
        account.vip_tier = 2;
        account.vip_expires_at = Some(now + Duration::days(1));
        assert_eq!(account.effective_vip_tier(now), 2);
        assert_eq!(account.effective_vip_tier(now + Duration::days(2)), 0);
    }

    #[test]
    fn test_public_name_fallbacks() {
        let now = Utc::now();
        let mut account = Account::new(AccountId::new("tg_000012345678"), &NewAccount::default(), 2, now);
        assert_eq!(account.public_name(), "12345678");
        account.display_name = "Ada".to_string();
        assert_eq!(account.public_name(), "Ada");
        account.username = "ada_l".to_string();
        assert_eq!(account.public_name(), "ada_l");
    }

    #[test]
    fn test_self_referral_rejected() {
        let id = AccountId::new("p1");
        let profile = NewAccount {
            referred_by: Some(id.clone()),
            ..Default::default()
        };
        assert!(profile.validate(&id).is_err());
    }

    #[test]
    fn test_negative_balance_detected() {
        let now = Utc::now();
        let mut account = Account::new(AccountId::new("p1"), &NewAccount::default(), 2, now);
        account.token_balance = Decimal::from(-5);
        match account.check_balances() {
            Err(crate::Error::InsufficientBalance { balance, required, .. }) => {
                assert_eq!(balance, "tokens");
                assert_eq!(required, Decimal::from(5));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
