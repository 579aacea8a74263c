//! Token withdrawals
//!
//! State machine: `pending -> {approved, rejected}`, both terminal. Tokens are
//! reserved (debited) when the request is created; a rejection gives them
//! back.

use crate::{
    admin::require_admin,
    types::{AccountId, Currency, WithdrawalRequest, WithdrawalStatus},
    Engine, Error, Result,
};
use chrono::Duration;
use rust_decimal::Decimal;
use std::time::Instant;
use uuid::Uuid;

/// Longest accepted wallet address
pub const MAX_WALLET_LEN: usize = 128;

fn validate_wallet(wallet_address: &str) -> Result<()> {
    let trimmed = wallet_address.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_WALLET_LEN {
        return Err(Error::InvalidInput(format!(
            "Wallet address must be 1 to {} characters",
            MAX_WALLET_LEN
        )));
    }
    Ok(())
}

impl Engine {
    /// Request a token withdrawal
    pub fn create_withdrawal(
        &self,
        id: &AccountId,
        amount: Decimal,
        wallet_address: &str,
    ) -> Result<WithdrawalRequest> {
        let rules = &self.config().economy.withdrawal;
        if amount < rules.min_amount {
            let err = Error::BelowMinimum {
                amount,
                minimum: rules.min_amount,
            };
            self.metrics().record_rejection(err.kind());
            return Err(err);
        }
        validate_wallet(wallet_address)?;

        let cooldown = Duration::days(rules.cooldown_days);
        let ledger = self.ledger();

        let request = self.transact(id, "create_withdrawal", |account, journal| {
            let now = journal.now();
            if account.token_balance < amount {
                return Err(Error::InsufficientTokens {
                    requested: amount,
                    available: account.token_balance,
                });
            }
            if let Some(latest) = ledger.withdrawals_for(&account.id)?.first() {
                let until = latest.created_at + cooldown;
                if until > now {
                    return Err(Error::CooldownActive { until });
                }
            }

            let request = WithdrawalRequest {
                id: Uuid::now_v7(),
                account_id: account.id.clone(),
                amount,
                wallet_address: wallet_address.trim().to_string(),
                status: WithdrawalStatus::Pending,
                created_at: now,
                processed_at: None,
                admin_note: String::new(),
            };

            account.token_balance -= amount;
            journal.debit(
                Currency::Token,
                amount,
                format!("Withdrawal request: {} tokens", amount),
            );
            journal.insert_withdrawal(request.clone());
            Ok(request)
        })?;

        self.metrics().record_withdrawal("pending");
        tracing::info!(
            account_id = %id,
            request_id = %request.id,
            amount = %amount,
            "Withdrawal requested"
        );
        Ok(request)
    }

    /// Approve or reject a pending request
    ///
    /// A rejection refunds the reserved tokens with a credit record in the same
    /// atomic write.
    pub fn resolve_withdrawal(
        &self,
        admin_id: &str,
        request_id: Uuid,
        status: WithdrawalStatus,
        note: &str,
    ) -> Result<WithdrawalRequest> {
        require_admin(admin_id)?;
        let started = Instant::now();
        let now = self.now();

        let result = self
            .ledger()
            .mutate_withdrawal(request_id, now, |request, account, journal| {
                if request.status.is_terminal() || !status.is_terminal() {
                    return Err(Error::InvalidStateTransition {
                        from: request.status.to_string(),
                        to: status.to_string(),
                    });
                }

                request.status = status;
                request.processed_at = Some(now);
                request.admin_note = note.to_string();

                if status == WithdrawalStatus::Rejected {
                    match account {
                        Some(account) => {
                            account.token_balance += request.amount;
                            journal.credit(
                                Currency::Token,
                                request.amount,
                                format!("Withdrawal rejected: {} tokens refunded", request.amount),
                            );
                        }
                        None => tracing::warn!(
                            request_id = %request.id,
                            account_id = %request.account_id,
                            "Rejected withdrawal belongs to a deleted account; nothing refunded"
                        ),
                    }
                }
                journal.log_admin(
                    admin_id,
                    "resolve_withdrawal",
                    format!("{} {} ({} tokens): {}", request.id, status, request.amount, note),
                );
                Ok(request.clone())
            });
        let request = self.observe(&request_id, "resolve_withdrawal", started, result)?;

        self.metrics().record_withdrawal(&status.to_string());
        tracing::info!(
            request_id = %request.id,
            account_id = %request.account_id,
            status = %status,
            admin_id,
            "Withdrawal resolved"
        );
        Ok(request)
    }

    /// Newest-first requests of one account
    pub fn withdrawals_for(&self, id: &AccountId) -> Result<Vec<WithdrawalRequest>> {
        self.ledger().withdrawals_for(id)
    }

    /// Newest-first requests filtered by status, for the admin queue
    pub fn withdrawals_by_status(
        &self,
        status: Option<WithdrawalStatus>,
        limit: usize,
    ) -> Result<Vec<WithdrawalRequest>> {
        self.ledger().withdrawals_by_status(status, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{engine, player};
    use crate::ledger::BalanceDelta;
    use crate::types::TransactionKind;

    fn funded(engine: &Engine, name: &str, tokens: i64) -> AccountId {
        let id = player(engine, name);
        engine
            .apply_delta(
                &id,
                BalanceDelta {
                    tokens: Decimal::from(tokens),
                    description: "Season prize".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        id
    }

    #[test]
    fn test_create_reserves_tokens() {
        let (engine, _clock) = engine();
        let id = funded(&engine, "p1", 1000);

        let request = engine
            .create_withdrawal(&id, Decimal::from(500), " EQ-wallet ")
            .unwrap();
        assert_eq!(request.status, WithdrawalStatus::Pending);
        assert_eq!(request.wallet_address, "EQ-wallet");
        assert_eq!(engine.get_account(&id).unwrap().token_balance, Decimal::from(500));

        let debit = engine
            .transactions(&id, 10)
            .unwrap()
            .into_iter()
            .find(|r| r.kind == TransactionKind::Debit)
            .unwrap();
        assert_eq!(debit.currency, Currency::Token);
        assert_eq!(debit.amount, Decimal::from(500));
    }

    #[test]
    fn test_create_validations() {
        let (engine, _clock) = engine();
        let id = funded(&engine, "p1", 150);

        assert!(matches!(
            engine.create_withdrawal(&id, Decimal::from(99), "w"),
            Err(Error::BelowMinimum { .. })
        ));
        assert!(matches!(
            engine.create_withdrawal(&id, Decimal::from(200), "w"),
            Err(Error::InsufficientTokens { .. })
        ));
        assert!(matches!(
            engine.create_withdrawal(&id, Decimal::from(100), "  "),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_cooldown_between_requests() {
        let (engine, clock) = engine();
        let id = funded(&engine, "p1", 1000);

        let first = engine.create_withdrawal(&id, Decimal::from(100), "w").unwrap();
        clock.advance(Duration::days(2));
        match engine.create_withdrawal(&id, Decimal::from(100), "w") {
            Err(Error::CooldownActive { until }) => {
                assert_eq!(until, first.created_at + Duration::days(3))
            }
            other => panic!("unexpected: {:?}", other),
        }

        clock.advance(Duration::days(1));
        engine.create_withdrawal(&id, Decimal::from(100), "w").unwrap();
        assert_eq!(engine.withdrawals_for(&id).unwrap().len(), 2);
    }

    #[test]
    fn test_approval_keeps_balances() {
        let (engine, _clock) = engine();
        let id = funded(&engine, "p1", 1000);
        let request = engine.create_withdrawal(&id, Decimal::from(500), "w").unwrap();

        let resolved = engine
            .resolve_withdrawal("admin", request.id, WithdrawalStatus::Approved, "paid")
            .unwrap();
        assert_eq!(resolved.status, WithdrawalStatus::Approved);
        assert_eq!(resolved.admin_note, "paid");
        assert!(resolved.processed_at.is_some());
        assert_eq!(engine.get_account(&id).unwrap().token_balance, Decimal::from(500));
        assert_eq!(engine.admin_actions(10).unwrap().len(), 1);
    }

    #[test]
    fn test_rejection_refunds() {
        let (engine, _clock) = engine();
        let id = funded(&engine, "p1", 1000);
        let request = engine.create_withdrawal(&id, Decimal::from(500), "w").unwrap();

        engine
            .resolve_withdrawal("admin", request.id, WithdrawalStatus::Rejected, "bad wallet")
            .unwrap();
        assert_eq!(engine.get_account(&id).unwrap().token_balance, Decimal::from(1000));

        let refunds = engine
            .transactions(&id, 10)
            .unwrap()
            .into_iter()
            .filter(|r| r.currency == Currency::Token && r.kind == TransactionKind::Credit)
            .count();
        // Initial grant plus the refund
        assert_eq!(refunds, 2);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let (engine, _clock) = engine();
        let id = funded(&engine, "p1", 1000);
        let request = engine.create_withdrawal(&id, Decimal::from(500), "w").unwrap();

        assert!(matches!(
            engine.resolve_withdrawal("admin", request.id, WithdrawalStatus::Pending, ""),
            Err(Error::InvalidStateTransition { .. })
        ));
        engine
            .resolve_withdrawal("admin", request.id, WithdrawalStatus::Rejected, "")
            .unwrap();
        assert!(matches!(
            engine.resolve_withdrawal("admin", request.id, WithdrawalStatus::Approved, ""),
            Err(Error::InvalidStateTransition { .. })
        ));
        // Refunded exactly once
        assert_eq!(engine.get_account(&id).unwrap().token_balance, Decimal::from(1000));
    }

    #[test]
    fn test_resolve_without_admin_changes_nothing() {
        let (engine, _clock) = engine();
        let id = funded(&engine, "p1", 1000);
        let request = engine.create_withdrawal(&id, Decimal::from(500), "w").unwrap();

        assert!(matches!(
            engine.resolve_withdrawal(" ", request.id, WithdrawalStatus::Rejected, "bad wallet"),
            Err(Error::InvalidInput(_))
        ));
        let stored = engine.withdrawals_for(&id).unwrap();
        assert_eq!(stored[0].status, WithdrawalStatus::Pending);
        assert_eq!(engine.get_account(&id).unwrap().token_balance, Decimal::from(500));
        assert!(engine.admin_actions(10).unwrap().is_empty());

        // A valid admin can still resolve it, and the log entry lands with it
        engine
            .resolve_withdrawal("admin", request.id, WithdrawalStatus::Rejected, "bad wallet")
            .unwrap();
        let log = engine.admin_actions(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, "resolve_withdrawal");
    }

    #[test]
    fn test_unknown_request() {
        let (engine, _clock) = engine();
        assert!(matches!(
            engine.resolve_withdrawal("admin", Uuid::now_v7(), WithdrawalStatus::Approved, ""),
            Err(Error::WithdrawalNotFound(_))
        ));
    }

    #[test]
    fn test_queue_by_status() {
        let (engine, _clock) = engine();
        let a = funded(&engine, "a", 1000);
        let b = funded(&engine, "b", 1000);
        let first = engine.create_withdrawal(&a, Decimal::from(100), "w").unwrap();
        engine.create_withdrawal(&b, Decimal::from(200), "w").unwrap();
        engine
            .resolve_withdrawal("admin", first.id, WithdrawalStatus::Approved, "")
            .unwrap();

        let pending = engine
            .withdrawals_by_status(Some(WithdrawalStatus::Pending), 10)
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].account_id, b);
        assert_eq!(engine.withdrawals_by_status(None, 10).unwrap().len(), 2);
    }
}
