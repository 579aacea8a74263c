//! Tap-to-earn Economy Core
//!
//! Authoritative account ledger for a tap-to-earn game: balances, energy,
//! tap cycles, VIP tiers, rewards, withdrawals and seasons.
//!
//! # Architecture
//!
//! - **Per-account serialization**: Every mutation of an account runs under that
//!   account's lock and commits as one atomic write
//! - **Journaled balances**: Each balance change is written together with its
//!   transaction record
//! - **Lazy refresh**: Energy regeneration and VIP expiry are applied when an
//!   account is next touched, not by a background job
//! - **Pluggable storage**: RocksDB column families in production, an in-memory
//!   backend for tests
//!
//! # Invariants
//!
//! - Balances (CASH, TOKEN, season CASH) are never negative
//! - Tap batches are applied at most once per sequence number
//! - A task or daily reward is credited at most once
//! - At most one season is active

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod storage;
pub mod ledger;
pub mod error;
pub mod config;
pub mod clock;
pub mod metrics;
pub mod rules;
pub mod engine;
pub mod energy;
pub mod taps;
pub mod vip;
pub mod rewards;
pub mod leaderboard;
pub mod withdrawal;
pub mod game;
pub mod admin;
pub mod seasons;

// Re-exports
pub use admin::{AccountOverride, BulkReport, DashboardStats, VipOverride};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use engine::Engine;
pub use error::{Error, Result};
pub use game::GameReward;
pub use leaderboard::{LeaderboardEntry, LeaderboardField};
pub use ledger::{BalanceDelta, Ledger};
pub use metrics::Metrics;
pub use rewards::{DailyClaim, TaskOutcome};
pub use taps::{TapBatch, TapOutcome};
pub use types::{
    Account, AccountId, AdminAction, Currency, NewAccount, Season, SeasonStatus,
    TransactionKind, TransactionRecord, VipPurchase, WithdrawalRequest, WithdrawalStatus,
};
pub use vip::VipStatus;
