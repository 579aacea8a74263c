//! Game scores and the CASH to TOKEN exchange

use crate::{
    rules,
    types::{AccountId, Currency},
    Engine, Error, Result,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Credited game result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameReward {
    /// Score after the VIP multiplier
    pub final_score: u64,
    /// Multiplier applied
    pub multiplier: Decimal,
    /// Whether the score is a new personal best
    pub new_high_score: bool,
}

/// Score after the multiplier, rounded down
pub fn apply_multiplier(raw_score: u64, multiplier: Decimal) -> Result<u64> {
    (Decimal::from(raw_score) * multiplier)
        .floor()
        .to_u64()
        .ok_or_else(|| Error::InvalidInput(format!("Score out of range: {}", raw_score)))
}

impl Engine {
    /// Credit a finished game
    ///
    /// The raw score is scaled by the effective VIP multiplier and credited to
    /// CASH and season CASH with one record.
    pub fn submit_game_score(&self, id: &AccountId, raw_score: u64) -> Result<GameReward> {
        let reward = self.transact(id, "submit_game_score", |account, journal| {
            let multiplier = rules::vip_multiplier(account.vip_tier);
            let final_score = apply_multiplier(raw_score, multiplier)?;
            let amount = Decimal::from(final_score);

            account.cash_balance += amount;
            account.season_cash += amount;
            account.games_played += 1;
            account.total_score = account.total_score.saturating_add(final_score);
            let new_high_score = final_score > account.high_score;
            if new_high_score {
                account.high_score = final_score;
            }

            journal.credit(
                Currency::Cash,
                amount,
                format!("Game score: {} x{} = {}", raw_score, multiplier, final_score),
            );
            Ok(GameReward {
                final_score,
                multiplier,
                new_high_score,
            })
        })?;

        self.metrics().record_reward("game");
        tracing::debug!(
            account_id = %id,
            raw_score,
            final_score = reward.final_score,
            "Game score credited"
        );
        Ok(reward)
    }

    /// Exchange CASH for TOKEN at the configured rate; returns tokens credited
    pub fn convert_cash_to_tokens(&self, id: &AccountId, cash: Decimal) -> Result<Decimal> {
        if cash <= Decimal::ZERO {
            return Err(Error::InvalidInput("Amount to convert must be positive".to_string()));
        }
        let rate = self.config().economy.cash_to_token_rate;
        let tokens = cash / rate;

        self.transact(id, "convert_cash_to_tokens", |account, journal| {
            if account.cash_balance < cash {
                return Err(Error::InsufficientBalance {
                    balance: "cash",
                    required: cash,
                    available: account.cash_balance,
                });
            }
            account.cash_balance -= cash;
            account.token_balance += tokens;
            journal.debit(Currency::Cash, cash, format!("Converted {} CASH to TOKEN", cash));
            journal.credit(Currency::Token, tokens, format!("Received {} TOKEN from CASH", tokens));
            Ok(())
        })?;

        tracing::info!(account_id = %id, cash = %cash, tokens = %tokens, "Cash converted");
        Ok(tokens)
    }
}
