//! Error types for the economy engine
//!
//! Every variant above `Storage` is a local, expected outcome that the caller
//! turns into user messaging. The infrastructure variants below it are failures
//! the caller may retry; the engine never retries on its own.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// A mutation would have driven a balance below zero
    #[error("Insufficient {balance}: required {required}, available {available}")]
    InsufficientBalance {
        /// Which balance (cash, tokens, season_cash, energy, cooldown_resets)
        balance: &'static str,
        /// Amount the mutation tried to remove
        required: Decimal,
        /// Amount present before the mutation
        available: Decimal,
    },

    /// Withdrawal larger than the token balance
    #[error("Insufficient tokens: requested {requested}, available {available}")]
    InsufficientTokens {
        /// Requested withdrawal amount
        requested: Decimal,
        /// Token balance at the time of the request
        available: Decimal,
    },

    /// No game energy left today
    #[error("No energy left")]
    NoEnergy,

    /// No cooldown-reset item, or no cooldown to reduce
    #[error("No cooldown resets available")]
    NoResetsAvailable,

    /// Tap or withdrawal cooldown still running
    #[error("Cooldown active until {until}")]
    CooldownActive {
        /// When the cooldown ends
        until: DateTime<Utc>,
    },

    /// Withdrawal below the configured minimum
    #[error("Amount {amount} is below the minimum of {minimum}")]
    BelowMinimum {
        /// Requested amount
        amount: Decimal,
        /// Configured minimum
        minimum: Decimal,
    },

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Withdrawal request not found
    #[error("Withdrawal not found: {0}")]
    WithdrawalNotFound(String),

    /// Season not found
    #[error("Season not found: {0}")]
    SeasonNotFound(String),

    /// State machine violation (withdrawal resolved twice, etc.)
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },

    /// Daily reward already claimed for the current calendar day
    #[error("Daily reward already claimed today")]
    AlreadyClaimedToday,

    /// Referrer can only be bound once
    #[error("Referrer already set for account {0}")]
    ReferrerAlreadySet(String),

    /// Task id not present in the catalogue
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// Task requirements not met yet
    #[error("Task {task_id} locked: requires {required} referrals, have {current}")]
    TaskLocked {
        /// Task id
        task_id: String,
        /// Referrals needed
        required: u32,
        /// Referrals counted now
        current: u32,
    },

    /// A second season cannot become active
    #[error("Season conflict: {0}")]
    SeasonConflict(String),

    /// Caller supplied an invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for local outcomes the caller should surface to the player,
    /// false for infrastructure failures.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            Error::Storage(_)
                | Error::Serialization(_)
                | Error::Config(_)
                | Error::Io(_)
                | Error::Other(_)
        )
    }

    /// Stable label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::InsufficientTokens { .. } => "insufficient_tokens",
            Error::NoEnergy => "no_energy",
            Error::NoResetsAvailable => "no_resets_available",
            Error::CooldownActive { .. } => "cooldown_active",
            Error::BelowMinimum { .. } => "below_minimum",
            Error::AccountNotFound(_) => "account_not_found",
            Error::WithdrawalNotFound(_) => "withdrawal_not_found",
            Error::SeasonNotFound(_) => "season_not_found",
            Error::InvalidStateTransition { .. } => "invalid_state_transition",
            Error::AlreadyClaimedToday => "already_claimed_today",
            Error::ReferrerAlreadySet(_) => "referrer_already_set",
            Error::UnknownTask(_) => "unknown_task",
            Error::TaskLocked { .. } => "task_locked",
            Error::SeasonConflict(_) => "season_conflict",
            Error::InvalidInput(_) => "invalid_input",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
