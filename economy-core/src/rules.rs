//! Progression rules
//!
//! Static tables for leagues, VIP tiers, prizes, daily rewards, tasks and VIP
//! plans. Everything here is pure; [`validate_tables`] runs once when the
//! engine opens.

use crate::{Error, Result};
use rust_decimal::Decimal;

/// League placement by season CASH
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct League {
    /// Stable identifier
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Lowest season CASH for this league
    pub min_cash: u64,
    /// Game energy granted per calendar day
    pub energy_per_day: u32,
}

/// Leagues in ascending order
pub static LEAGUES: [League; 11] = [
    League { id: "wood", name: "Wood", min_cash: 0, energy_per_day: 2 },
    League { id: "bronze", name: "Bronze", min_cash: 5_000, energy_per_day: 2 },
    League { id: "silver", name: "Silver", min_cash: 50_000, energy_per_day: 2 },
    League { id: "gold", name: "Gold", min_cash: 250_000, energy_per_day: 3 },
    League { id: "platinum", name: "Platinum", min_cash: 500_000, energy_per_day: 3 },
    League { id: "diamond", name: "Diamond", min_cash: 1_000_000, energy_per_day: 4 },
    League { id: "master", name: "Master", min_cash: 5_000_000, energy_per_day: 4 },
    League { id: "grandmaster", name: "Grandmaster", min_cash: 10_000_000, energy_per_day: 5 },
    League { id: "legendary", name: "Legendary", min_cash: 25_000_000, energy_per_day: 5 },
    League { id: "mythic", name: "Mythic", min_cash: 50_000_000, energy_per_day: 6 },
    League { id: "elite", name: "Elite", min_cash: 100_000_000, energy_per_day: 6 },
];

fn league_index(season_cash: Decimal) -> usize {
    LEAGUES
        .iter()
        .rposition(|league| Decimal::from(league.min_cash) <= season_cash)
        .unwrap_or(0)
}

/// Highest league whose minimum is reached
pub fn league_for(season_cash: Decimal) -> &'static League {
    &LEAGUES[league_index(season_cash)]
}

/// Percentage (0-100) travelled through the current league
pub fn league_progress(season_cash: Decimal) -> Decimal {
    let index = league_index(season_cash);
    let Some(next) = LEAGUES.get(index + 1) else {
        return Decimal::ONE_HUNDRED;
    };
    let min = Decimal::from(LEAGUES[index].min_cash);
    let range = Decimal::from(next.min_cash - 1) - min;
    let progress = (season_cash - min) / range * Decimal::ONE_HUNDRED;
    progress.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
}

/// Per-tier VIP benefits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VipBenefits {
    multiplier_pct: i64,
    tap_damage: u32,
    item_grant: u32,
}

static VIP_BENEFITS: [VipBenefits; 4] = [
    VipBenefits { multiplier_pct: 100, tap_damage: 1, item_grant: 0 },
    VipBenefits { multiplier_pct: 105, tap_damage: 6, item_grant: 2 },
    VipBenefits { multiplier_pct: 110, tap_damage: 11, item_grant: 5 },
    VipBenefits { multiplier_pct: 115, tap_damage: 16, item_grant: 10 },
];

/// Highest VIP tier
pub const MAX_VIP_TIER: u8 = 3;

fn vip_benefits(tier: u8) -> &'static VipBenefits {
    VIP_BENEFITS.get(usize::from(tier)).unwrap_or(&VIP_BENEFITS[0])
}

/// Game score multiplier
pub fn vip_multiplier(tier: u8) -> Decimal {
    Decimal::new(vip_benefits(tier).multiplier_pct, 2)
}

/// Damage per tap
pub fn tap_damage(tier: u8) -> u32 {
    vip_benefits(tier).tap_damage
}

/// Cooldown-reset items granted on activation
pub fn cooldown_item_grant(tier: u8) -> u32 {
    vip_benefits(tier).item_grant
}

/// Season prize band (inclusive ranks)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrizeBand {
    /// First rank
    pub rank_start: u32,
    /// Last rank
    pub rank_end: u32,
    /// Prize in TOKEN
    pub prize: u32,
}

/// Season prizes in ascending rank order
pub static PRIZES: [PrizeBand; 14] = [
    PrizeBand { rank_start: 1, rank_end: 1, prize: 1000 },
    PrizeBand { rank_start: 2, rank_end: 2, prize: 500 },
    PrizeBand { rank_start: 3, rank_end: 3, prize: 250 },
    PrizeBand { rank_start: 4, rank_end: 4, prize: 200 },
    PrizeBand { rank_start: 5, rank_end: 5, prize: 150 },
    PrizeBand { rank_start: 6, rank_end: 6, prize: 120 },
    PrizeBand { rank_start: 7, rank_end: 7, prize: 110 },
    PrizeBand { rank_start: 8, rank_end: 8, prize: 100 },
    PrizeBand { rank_start: 9, rank_end: 9, prize: 90 },
    PrizeBand { rank_start: 10, rank_end: 10, prize: 70 },
    PrizeBand { rank_start: 11, rank_end: 20, prize: 60 },
    PrizeBand { rank_start: 21, rank_end: 30, prize: 30 },
    PrizeBand { rank_start: 31, rank_end: 40, prize: 15 },
    PrizeBand { rank_start: 41, rank_end: 50, prize: 5 },
];

/// Prize for a season rank (zero outside the table)
pub fn prize_for_rank(rank: u32) -> Decimal {
    PRIZES
        .iter()
        .find(|band| band.rank_start <= rank && rank <= band.rank_end)
        .map_or(Decimal::ZERO, |band| Decimal::from(band.prize))
}

/// Login streak rewards for days 1 through 7
pub static DAILY_REWARDS: [u32; 7] = [100, 200, 300, 400, 500, 600, 10_000];

/// Reward for a streak day (1-based)
pub fn daily_reward_for(day: u8) -> Option<Decimal> {
    usize::from(day)
        .checked_sub(1)
        .and_then(|index| DAILY_REWARDS.get(index))
        .map(|reward| Decimal::from(*reward))
}

/// Requirement attached to a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Self-declared social action
    Social,
    /// Needs this many live referrals
    Referral {
        /// Referral threshold
        required: u32,
    },
}

/// Catalogue task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    /// Task id
    pub id: &'static str,
    /// Display title
    pub title: &'static str,
    /// CASH reward
    pub reward: u32,
    /// Requirement
    pub kind: TaskKind,
}

/// Task catalogue
pub static TASKS: [Task; 11] = [
    Task { id: "telegram", title: "Join Telegram Channel", reward: 1000, kind: TaskKind::Social },
    Task { id: "twitter", title: "Follow on X (Twitter)", reward: 1000, kind: TaskKind::Social },
    Task { id: "youtube", title: "Subscribe on YouTube", reward: 1000, kind: TaskKind::Social },
    Task { id: "website", title: "Visit Our Website", reward: 1000, kind: TaskKind::Social },
    Task { id: "instagram", title: "Follow on Instagram", reward: 1000, kind: TaskKind::Social },
    Task { id: "tiktok", title: "Follow on TikTok", reward: 1000, kind: TaskKind::Social },
    Task { id: "discord", title: "Join Discord Server", reward: 1000, kind: TaskKind::Social },
    Task { id: "wallet", title: "Connect TON Wallet", reward: 3000, kind: TaskKind::Social },
    Task { id: "invite1", title: "Invite 1 Friend", reward: 1000, kind: TaskKind::Referral { required: 1 } },
    Task { id: "invite5", title: "Invite 5 Friends", reward: 5000, kind: TaskKind::Referral { required: 5 } },
    Task { id: "invite10", title: "Invite 10 Friends", reward: 10_000, kind: TaskKind::Referral { required: 10 } },
];

/// Catalogue lookup
pub fn task(id: &str) -> Option<&'static Task> {
    TASKS.iter().find(|task| task.id == id)
}

/// Purchasable VIP plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VipPlan {
    /// Tier granted
    pub tier: u8,
    /// Display name
    pub name: &'static str,
    /// Price in US cents
    pub price_cents: i64,
    /// Subscription length
    pub duration_days: i64,
}

impl VipPlan {
    /// Price in USD
    pub fn price_usd(&self) -> Decimal {
        Decimal::new(self.price_cents, 2)
    }

    /// Items granted on activation
    pub fn item_grant(&self) -> u32 {
        cooldown_item_grant(self.tier)
    }
}

/// VIP plans by tier
pub static VIP_PLANS: [VipPlan; 3] = [
    VipPlan { tier: 1, name: "Bronze", price_cents: 500, duration_days: 30 },
    VipPlan { tier: 2, name: "Silver", price_cents: 5_000, duration_days: 30 },
    VipPlan { tier: 3, name: "Gold", price_cents: 10_000, duration_days: 30 },
];

/// Plan lookup
pub fn vip_plan(tier: u8) -> Option<&'static VipPlan> {
    VIP_PLANS.iter().find(|plan| plan.tier == tier)
}

/// Check the static tables are well formed
pub fn validate_tables() -> Result<()> {
    if LEAGUES[0].min_cash != 0 {
        return Err(Error::Config("Lowest league must start at 0".to_string()));
    }
    if LEAGUES.windows(2).any(|pair| pair[0].min_cash >= pair[1].min_cash) {
        return Err(Error::Config("Leagues must be strictly ascending".to_string()));
    }

    if PRIZES[0].rank_start != 1 {
        return Err(Error::Config("Prize table must start at rank 1".to_string()));
    }
    for band in &PRIZES {
        if band.rank_start > band.rank_end {
            return Err(Error::Config(format!("Empty prize band at rank {}", band.rank_start)));
        }
    }
    if PRIZES
        .windows(2)
        .any(|pair| pair[1].rank_start != pair[0].rank_end + 1)
    {
        return Err(Error::Config("Prize bands must be contiguous".to_string()));
    }

    for tier in 1..=MAX_VIP_TIER {
        if vip_plan(tier).is_none() {
            return Err(Error::Config(format!("Missing VIP plan for tier {}", tier)));
        }
    }

    let mut ids: Vec<&str> = TASKS.iter().map(|task| task.id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.len() != TASKS.len() {
        return Err(Error::Config("Duplicate task id".to_string()));
    }

    Ok(())
}
