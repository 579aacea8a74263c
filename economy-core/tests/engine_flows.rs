//! End-to-end flows against the RocksDB backend
//!
//! Concurrency cases run on a multi-threaded runtime with the engine shared
//! across blocking tasks, the way the server hosts it.

use chrono::{Duration, TimeZone, Utc};
use economy_core::{
    AccountId, Config, Currency, Engine, Error, ManualClock, NewAccount, SeasonStatus, TapBatch,
    TapOutcome, TransactionKind, WithdrawalStatus,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tempfile::TempDir;

fn rocks_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config
}

fn open(config: Config) -> (Arc<Engine>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 2, 10, 12, 0, 0).unwrap(),
    ));
    let engine = Engine::open(config).unwrap().with_clock(clock.clone());
    (Arc::new(engine), clock)
}

fn player(engine: &Engine, id: &str) -> AccountId {
    let id = AccountId::new(id);
    engine
        .create_account_if_absent(&id, NewAccount::default())
        .unwrap();
    id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_energy_spend() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _clock) = open(rocks_config(&temp_dir));
    let id = player(&engine, "p1");
    let energy = engine.get_account(&id).unwrap().game_energy as usize;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = engine.clone();
        let id = id.clone();
        handles.push(tokio::task::spawn_blocking(move || engine.spend_energy(&id)));
    }

    let mut spent = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => spent += 1,
            Err(Error::NoEnergy) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(spent, energy);
    assert_eq!(engine.get_account(&id).unwrap().game_energy, 0);
    assert_eq!(engine.metrics().energy_spent.get(), energy as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_conversions_never_overdraw() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _clock) = open(rocks_config(&temp_dir));
    let id = player(&engine, "p1");

    // 500 welcome CASH covers exactly five conversions of 100
    let mut handles = Vec::new();
    for _ in 0..12 {
        let engine = engine.clone();
        let id = id.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            engine.convert_cash_to_tokens(&id, Decimal::from(100))
        }));
    }

    let mut converted = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            converted += 1;
        }
    }

    let account = engine.get_account(&id).unwrap();
    assert_eq!(converted, 5);
    assert_eq!(account.cash_balance, Decimal::ZERO);
    assert_eq!(account.token_balance, Decimal::from(50));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redelivered_tap_batch_applies_once() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _clock) = open(rocks_config(&temp_dir));
    let id = player(&engine, "p1");

    let batch = TapBatch {
        sequence: 1,
        tap_count: 40,
        damage_per_tap: 1,
    };
    let mut handles = Vec::new();
    for _ in 0..6 {
        let engine = engine.clone();
        let id = id.clone();
        handles.push(tokio::task::spawn_blocking(move || engine.apply_tap_batch(&id, batch)));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            TapOutcome::Applied { .. } => applied += 1,
            TapOutcome::Duplicate { last_sequence } => assert_eq!(last_sequence, 1),
            TapOutcome::CooldownActive { .. } => panic!("no cooldown expected"),
        }
    }

    let account = engine.get_account(&id).unwrap();
    assert_eq!(applied, 1);
    assert_eq!(account.tap_count, 40);
    assert_eq!(account.tap_cycle_progress, 40);
    assert_eq!(account.cash_balance, Decimal::from(540));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_complete_cycle_once() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _clock) = open(rocks_config(&temp_dir));
    let id = player(&engine, "p1");

    // Every batch alone reaches the 1000 target
    let mut handles = Vec::new();
    for sequence in 1..=8 {
        let engine = engine.clone();
        let id = id.clone();
        let batch = TapBatch {
            sequence,
            tap_count: 1000,
            damage_per_tap: 1,
        };
        handles.push(tokio::task::spawn_blocking(move || engine.apply_tap_batch(&id, batch)));
    }

    let mut completions = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            TapOutcome::Applied {
                cycle_completed, ..
            } => {
                assert!(cycle_completed);
                completions += 1;
            }
            TapOutcome::Duplicate { .. } | TapOutcome::CooldownActive { .. } => {}
        }
    }

    let account = engine.get_account(&id).unwrap();
    assert_eq!(completions, 1);
    assert_eq!(account.tap_count, 1000);
    assert_eq!(account.tap_cycle_progress, 0);
    assert_eq!(account.cooldown_resets_available, 1);
    assert_eq!(account.tap_cooldown_until, Some(engine.now() + Duration::hours(24)));
    // Welcome bonus, taps, one cycle bonus
    assert_eq!(account.cash_balance, Decimal::from(2_500));
    assert_eq!(engine.metrics().cycles_completed.get(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_partial_batches_cross_target_once() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _clock) = open(rocks_config(&temp_dir));
    let id = player(&engine, "p1");

    // Four applied batches of 300 cross the 1000 target
    let mut handles = Vec::new();
    for sequence in 1..=8 {
        let engine = engine.clone();
        let id = id.clone();
        let batch = TapBatch {
            sequence,
            tap_count: 300,
            damage_per_tap: 1,
        };
        handles.push(tokio::task::spawn_blocking(move || engine.apply_tap_batch(&id, batch)));
    }

    let mut applied = 0u32;
    let mut completions = 0u32;
    for handle in handles {
        if let TapOutcome::Applied {
            cycle_completed, ..
        } = handle.await.unwrap().unwrap()
        {
            applied += 1;
            if cycle_completed {
                completions += 1;
            }
        }
    }

    let account = engine.get_account(&id).unwrap();
    assert!(applied <= 4);
    assert_eq!(completions, u32::from(applied == 4));
    assert_eq!(account.tap_count, 300 * u64::from(applied));
    assert_eq!(account.cooldown_resets_available, completions);
    assert_eq!(account.tap_cooldown_until.is_some(), completions == 1);
    assert_eq!(
        account.cash_balance,
        Decimal::from(500 + 300 * applied + 1000 * completions)
    );
    assert_eq!(engine.metrics().cycles_completed.get(), u64::from(completions));
}

#[test]
fn test_admin_errors_leave_state_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _clock) = open(rocks_config(&temp_dir));
    let id = player(&engine, "p1");
    engine.submit_game_score(&id, 4_500).unwrap();
    engine.convert_cash_to_tokens(&id, Decimal::from(5_000)).unwrap();
    let request = engine
        .create_withdrawal(&id, Decimal::from(300), "EQ-wallet")
        .unwrap();
    let start = engine.now();
    let season = engine
        .create_season("admin", "Winter", start, start + Duration::days(30), SeasonStatus::Upcoming)
        .unwrap();
    let account_before = engine.get_account(&id).unwrap();
    let records_before = engine.transactions(&id, 100).unwrap().len();

    assert!(engine
        .resolve_withdrawal("", request.id, WithdrawalStatus::Rejected, "refund")
        .is_err());
    assert!(engine
        .create_season("", "Spring", start, start + Duration::days(30), SeasonStatus::Upcoming)
        .is_err());
    assert!(engine
        .set_season_status(" ", season.id, SeasonStatus::Active)
        .is_err());
    assert!(engine.bulk_adjust_cash("", Decimal::from(100)).is_err());
    assert!(engine.bulk_reset_season_cash("").is_err());
    assert!(engine.delete_account("", &id).is_err());

    assert_eq!(engine.get_account(&id).unwrap(), account_before);
    assert_eq!(engine.transactions(&id, 100).unwrap().len(), records_before);
    assert_eq!(
        engine.withdrawals_for(&id).unwrap()[0].status,
        WithdrawalStatus::Pending
    );
    assert_eq!(engine.list_seasons().unwrap().len(), 1);
    assert!(engine.active_season().unwrap().is_none());

    // Only the season created above is logged
    let log = engine.admin_actions(usize::MAX).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, "create_season");
}

#[test]
fn test_unbounded_listings_and_unknown_ids() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _clock) = open(rocks_config(&temp_dir));
    let id = player(&engine, "p1");
    engine.submit_game_score(&id, 100).unwrap();

    assert_eq!(engine.recent_transactions(usize::MAX).unwrap().len(), 2);
    assert!(engine.admin_actions(usize::MAX).unwrap().is_empty());

    for i in 0..10_000 {
        let ghost = AccountId::new(format!("ghost-{}", i));
        assert!(matches!(engine.get_account(&ghost), Err(Error::AccountNotFound(_))));
    }
    assert_eq!(engine.ledger().locked_accounts(), 0);
}

#[test]
fn test_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let request_id = {
        let (engine, _clock) = open(rocks_config(&temp_dir));
        let id = player(&engine, "p1");
        engine.submit_game_score(&id, 2_500).unwrap();
        engine.convert_cash_to_tokens(&id, Decimal::from(2_000)).unwrap();
        engine.activate_vip(&id, 2, 30).unwrap();
        engine
            .create_withdrawal(&id, Decimal::from(150), "EQ-wallet")
            .unwrap()
            .id
    };

    let (engine, _clock) = open(rocks_config(&temp_dir));
    let id = AccountId::new("p1");
    let account = engine.get_account(&id).unwrap();
    assert_eq!(account.cash_balance, Decimal::from(1_000));
    assert_eq!(account.token_balance, Decimal::from(50));
    assert_eq!(account.season_cash, Decimal::from(2_500));
    assert_eq!(account.vip_tier, 2);
    assert_eq!(account.cooldown_resets_available, 5);

    let pending = engine
        .withdrawals_by_status(Some(WithdrawalStatus::Pending), 10)
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, request_id);

    // Welcome, game, conversion (2), VIP note, withdrawal
    assert_eq!(engine.transactions(&id, 100).unwrap().len(), 6);
    assert_eq!(engine.vip_purchases(&id).unwrap()[0].tier, 2);
}

#[test]
fn test_withdrawal_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, clock) = open(rocks_config(&temp_dir));
    let id = player(&engine, "p1");
    engine.submit_game_score(&id, 4_500).unwrap();
    engine.convert_cash_to_tokens(&id, Decimal::from(5_000)).unwrap();

    let first = engine
        .create_withdrawal(&id, Decimal::from(300), "EQ-wallet")
        .unwrap();
    engine
        .resolve_withdrawal("admin", first.id, WithdrawalStatus::Rejected, "wrong network")
        .unwrap();
    assert_eq!(engine.get_account(&id).unwrap().token_balance, Decimal::from(500));

    // The rejected request still counts for the cooldown
    assert!(matches!(
        engine.create_withdrawal(&id, Decimal::from(300), "EQ-wallet"),
        Err(Error::CooldownActive { .. })
    ));

    clock.advance(Duration::days(3));
    let second = engine
        .create_withdrawal(&id, Decimal::from(300), "EQ-wallet")
        .unwrap();
    engine
        .resolve_withdrawal("admin", second.id, WithdrawalStatus::Approved, "sent")
        .unwrap();

    let account = engine.get_account(&id).unwrap();
    assert_eq!(account.token_balance, Decimal::from(200));

    let history = engine.withdrawals_for(&id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);
    assert_eq!(history[0].status, WithdrawalStatus::Approved);
    assert_eq!(history[1].status, WithdrawalStatus::Rejected);

    let token_debits = engine
        .transactions(&id, 100)
        .unwrap()
        .into_iter()
        .filter(|r| r.currency == Currency::Token && r.kind == TransactionKind::Debit)
        .count();
    assert_eq!(token_debits, 2);
    assert_eq!(engine.admin_actions(10).unwrap().len(), 2);
}

#[test]
fn test_bulk_reset_spans_pages_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = rocks_config(&temp_dir);
    config.admin.bulk_page_size = 4;
    let (engine, _clock) = open(config);

    for i in 0..11 {
        let id = player(&engine, &format!("player-{:02}", i));
        engine.submit_game_score(&id, 100 + i).unwrap();
    }

    let report = engine.bulk_reset_season_cash("admin").unwrap();
    assert_eq!(report.scanned, 11);
    assert_eq!(report.affected, 11);
    assert!(report.failures.is_empty());

    let stats = engine.dashboard_stats().unwrap();
    assert_eq!(stats.total_accounts, 11);
    assert_eq!(stats.total_games_played, 11);
    for account in engine.ledger().all_accounts(4).unwrap() {
        assert_eq!(account.season_cash, Decimal::ZERO);
    }
}

#[test]
fn test_season_lifecycle_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _clock) = open(rocks_config(&temp_dir));
    let start = engine.now();

    let season = engine
        .create_season(
            "admin",
            "Winter",
            start,
            start + Duration::days(30),
            SeasonStatus::Upcoming,
        )
        .unwrap();
    assert!(engine.active_season().unwrap().is_none());

    engine
        .set_season_status("admin", season.id, SeasonStatus::Active)
        .unwrap();
    assert_eq!(engine.active_season().unwrap().unwrap().name, "Winter");
    assert_eq!(engine.list_seasons().unwrap().len(), 1);
}
