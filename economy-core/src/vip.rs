//! VIP subscriptions
//!
//! Expiry is lazy: an expired tier keeps its benefits until the account is
//! next touched, at which point [`expire_if_due`] drops it inside the same
//! atomic unit as the operation.

use crate::{
    rules,
    types::{Account, AccountId, VipPurchase},
    Engine, Error, Result,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// Drop an expired tier; returns true when the account changed
pub fn expire_if_due(account: &mut Account, now: DateTime<Utc>) -> bool {
    match account.vip_expires_at {
        Some(expires_at) if expires_at < now => {
            account.vip_tier = 0;
            account.vip_expires_at = None;
            true
        }
        _ => false,
    }
}

pub(crate) fn validate_tier(tier: u8, duration_days: i64) -> Result<()> {
    if tier == 0 || tier > rules::MAX_VIP_TIER {
        return Err(Error::InvalidInput(format!(
            "VIP tier must be between 1 and {}, got {}",
            rules::MAX_VIP_TIER,
            tier
        )));
    }
    if duration_days <= 0 {
        return Err(Error::InvalidInput(format!(
            "VIP duration must be positive, got {} days",
            duration_days
        )));
    }
    Ok(())
}

/// Snapshot of an account's VIP benefits
#[derive(Debug, Clone, PartialEq)]
pub struct VipStatus {
    /// Effective tier
    pub tier: u8,
    /// Expiry of the current tier
    pub expires_at: Option<DateTime<Utc>>,
    /// Game score multiplier
    pub multiplier: Decimal,
    /// Damage per tap
    pub tap_damage: u32,
}

impl VipStatus {
    fn of(account: &Account) -> Self {
        Self {
            tier: account.vip_tier,
            expires_at: account.vip_expires_at,
            multiplier: rules::vip_multiplier(account.vip_tier),
            tap_damage: rules::tap_damage(account.vip_tier),
        }
    }
}

impl Engine {
    /// Activate a purchased tier
    ///
    /// Replaces any current tier, sets the expiry `duration_days` from now and
    /// grants the tier's cooldown-reset items on top of those already owned.
    pub fn activate_vip(&self, id: &AccountId, tier: u8, duration_days: i64) -> Result<VipStatus> {
        validate_tier(tier, duration_days)?;
        let grant = rules::cooldown_item_grant(tier);

        let status = self.transact(id, "activate_vip", |account, journal| {
            let expires_at = journal.now() + Duration::days(duration_days);
            account.vip_tier = tier;
            account.vip_expires_at = Some(expires_at);
            account.cooldown_resets_available = account
                .cooldown_resets_available
                .checked_add(grant)
                .ok_or_else(|| Error::InvalidInput("Cooldown reset overflow".to_string()))?;
            journal.record_vip_purchase(tier, duration_days, expires_at);
            journal.note(format!(
                "VIP Tier {} activated for {} days",
                tier, duration_days
            ));
            Ok(VipStatus::of(account))
        })?;

        tracing::info!(
            account_id = %id,
            tier,
            duration_days,
            items_granted = grant,
            "VIP activated"
        );
        Ok(status)
    }

    /// Newest-first VIP purchases of an account
    pub fn vip_purchases(&self, id: &AccountId) -> Result<Vec<VipPurchase>> {
        self.ledger().vip_purchases(id)
    }

    /// Current VIP benefits (after lazy expiry)
    pub fn vip_status(&self, id: &AccountId) -> Result<VipStatus> {
        self.transact(id, "vip_status", |account, _| Ok(VipStatus::of(account)))
    }

    /// Damage per tap for the account's effective tier
    pub fn effective_tap_damage(&self, id: &AccountId) -> Result<u32> {
        Ok(self.vip_status(id)?.tap_damage)
    }

    /// Game score multiplier for the account's effective tier
    pub fn effective_multiplier(&self, id: &AccountId) -> Result<Decimal> {
        Ok(self.vip_status(id)?.multiplier)
    }
}
