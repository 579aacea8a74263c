//! Daily game energy
//!
//! Energy refills to the league allotment once per calendar day of the
//! reference timezone. The refill happens lazily, whenever the account is
//! next touched.

use crate::{
    clock::calendar_day,
    rules,
    types::{Account, AccountId},
    Engine, Error, Result,
};
use chrono::{DateTime, FixedOffset, Utc};

/// Refill energy if `now` falls on a later calendar day than the last refill
///
/// Returns true when the account changed.
pub fn reconcile_energy(account: &mut Account, now: DateTime<Utc>, offset: FixedOffset) -> bool {
    if calendar_day(now, offset) == calendar_day(account.last_energy_reset, offset) {
        return false;
    }
    account.game_energy = rules::league_for(account.season_cash).energy_per_day;
    account.last_energy_reset = now;
    true
}

impl Engine {
    /// Consume one energy point; returns the energy left
    pub fn spend_energy(&self, id: &AccountId) -> Result<u32> {
        let remaining = self.transact(id, "spend_energy", |account, _| {
            if account.game_energy == 0 {
                return Err(Error::NoEnergy);
            }
            account.game_energy -= 1;
            Ok(account.game_energy)
        })?;

        self.metrics().energy_spent.inc();
        tracing::debug!(account_id = %id, remaining, "Energy spent");
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{engine, player};
    use crate::types::NewAccount;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    #[test]
    fn test_reconcile_same_day_is_noop() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let morning = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        let mut account = Account::new(AccountId::new("p1"), &NewAccount::default(), 0, morning);

        assert!(!reconcile_energy(&mut account, morning + Duration::hours(15), utc));
        assert_eq!(account.game_energy, 0);
    }

    #[test]
    fn test_reconcile_uses_league_allotment() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let day = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        let mut account = Account::new(AccountId::new("p1"), &NewAccount::default(), 0, day);
        account.season_cash = Decimal::from(1_000_000);

        assert!(reconcile_energy(&mut account, day + Duration::days(1), utc));
        assert_eq!(account.game_energy, 4);
        assert_eq!(account.last_energy_reset, day + Duration::days(1));
    }

    #[test]
    fn test_reconcile_respects_reference_timezone() {
        // 20:00 and 23:00 UTC are different days at UTC+3
        let plus_three = FixedOffset::east_opt(3 * 3600).unwrap();
        let evening = Utc.with_ymd_and_hms(2025, 5, 1, 20, 0, 0).unwrap();
        let mut account = Account::new(AccountId::new("p1"), &NewAccount::default(), 0, evening);

        assert!(reconcile_energy(&mut account, evening + Duration::hours(3), plus_three));
        assert_eq!(account.game_energy, 2);
    }

    #[test]
    fn test_spend_until_empty() {
        let (engine, _clock) = engine();
        let id = player(&engine, "p1");

        assert_eq!(engine.spend_energy(&id).unwrap(), 1);
        assert_eq!(engine.spend_energy(&id).unwrap(), 0);
        assert!(matches!(engine.spend_energy(&id), Err(Error::NoEnergy)));
        assert_eq!(engine.metrics().energy_spent.get(), 2);
    }

    #[test]
    fn test_energy_refills_next_day() {
        let (engine, clock) = engine();
        let id = player(&engine, "p1");

        engine.spend_energy(&id).unwrap();
        engine.spend_energy(&id).unwrap();
        clock.advance(Duration::days(1));

        assert_eq!(engine.spend_energy(&id).unwrap(), 1);
    }
}
