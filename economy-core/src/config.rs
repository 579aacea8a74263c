//! Configuration for the economy engine

use chrono::{Duration, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Metrics listen address
    pub metrics_listen_addr: String,

    /// Seconds between statistics log lines in the server binary
    pub stats_interval_secs: u64,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Economy constants
    pub economy: EconomyConfig,

    /// Administrative operations
    pub admin: AdminConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/economy"),
            service_name: "economy-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            stats_interval_secs: 60,
            rocksdb: RocksDBConfig::default(),
            economy: EconomyConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 3,
            target_file_size_mb: 64,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Economy constants shared by every component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// CASH granted on account creation
    pub welcome_bonus: Decimal,

    /// Tap cycle constants
    pub tap: TapConfig,

    /// CASH credited per newly counted referral
    pub referral_reward: Decimal,

    /// CASH per TOKEN
    pub cash_to_token_rate: Decimal,

    /// Withdrawal rules
    pub withdrawal: WithdrawalConfig,

    /// Offset from UTC (minutes) of the timezone that defines a calendar day
    pub utc_offset_minutes: i32,
}

/// Widest offset any real timezone uses (UTC+14)
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            welcome_bonus: Decimal::from(500),
            tap: TapConfig::default(),
            referral_reward: Decimal::from(1000),
            cash_to_token_rate: Decimal::from(10),
            withdrawal: WithdrawalConfig::default(),
            utc_offset_minutes: 0,
        }
    }
}

impl EconomyConfig {
    /// Reference timezone for calendar-day comparisons
    pub fn reference_offset(&self) -> crate::Result<FixedOffset> {
        let minutes = self.utc_offset_minutes;
        (-MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES)
            .contains(&minutes)
            .then(|| FixedOffset::east_opt(minutes * 60))
            .flatten()
            .ok_or_else(|| {
                crate::Error::Config(format!("utc_offset_minutes out of range: {}", minutes))
            })
    }
}

/// Tap cycle constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    /// Progress needed to complete a cycle
    pub cycle_target: u32,

    /// CASH bonus on cycle completion
    pub cycle_bonus: Decimal,

    /// Cooldown after a completed cycle (hours)
    pub cooldown_hours: i64,

    /// Cooldown removed by one reset item (hours)
    pub reset_step_hours: i64,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            cycle_target: 1000,
            cycle_bonus: Decimal::from(1000),
            cooldown_hours: 24,
            reset_step_hours: 12,
        }
    }
}

impl TapConfig {
    /// Cooldown duration
    pub fn cooldown(&self) -> Duration {
        Duration::hours(self.cooldown_hours)
    }

    /// Reduction applied per reset item
    pub fn reset_step(&self) -> Duration {
        Duration::hours(self.reset_step_hours)
    }
}

/// Withdrawal rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalConfig {
    /// Smallest withdrawable token amount
    pub min_amount: Decimal,

    /// Minimum spacing between two requests of one account (days)
    pub cooldown_days: i64,
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            min_amount: Decimal::from(100),
            cooldown_days: 3,
        }
    }
}

/// Administrative operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Accounts loaded per page during bulk operations
    pub bulk_page_size: usize,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { bulk_page_size: 500 }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("ECONOMY_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("ECONOMY_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        if let Ok(offset) = std::env::var("ECONOMY_UTC_OFFSET_MINUTES") {
            config.economy.utc_offset_minutes = offset.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid ECONOMY_UTC_OFFSET_MINUTES: {}", e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let economy = &self.economy;

        if economy.welcome_bonus < Decimal::ZERO || economy.referral_reward < Decimal::ZERO {
            return Err(crate::Error::Config(
                "Reward amounts must not be negative".to_string(),
            ));
        }
        if economy.cash_to_token_rate <= Decimal::ZERO {
            return Err(crate::Error::Config(
                "cash_to_token_rate must be positive".to_string(),
            ));
        }
        if economy.tap.cycle_bonus < Decimal::ZERO {
            return Err(crate::Error::Config("cycle_bonus must not be negative".to_string()));
        }
        if economy.tap.cycle_target == 0 {
            return Err(crate::Error::Config("cycle_target must be positive".to_string()));
        }
        if economy.tap.cooldown_hours < 0 || economy.tap.reset_step_hours <= 0 {
            return Err(crate::Error::Config(
                "Tap cooldown durations are invalid".to_string(),
            ));
        }
        if economy.withdrawal.min_amount <= Decimal::ZERO || economy.withdrawal.cooldown_days < 0 {
            return Err(crate::Error::Config(
                "Withdrawal rules are invalid".to_string(),
            ));
        }
        if self.admin.bulk_page_size == 0 {
            return Err(crate::Error::Config(
                "bulk_page_size must be positive".to_string(),
            ));
        }
        economy.reference_offset()?;

        Ok(())
    }
}
