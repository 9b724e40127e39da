//! Transfers across the account hierarchy: conservation, legality and audit

mod common;

use common::Fixture;
use wagerbook::{Amount, LogType, Role, TransferKind, WagerError};

#[test]
fn test_seed_chain_conserves_total() {
    let fx = Fixture::new();
    let ledger = fx.core.ledger();

    assert_eq!(fx.balance(&fx.root), Amount::ZERO);
    assert_eq!(fx.balance(&fx.admin.id), Amount::ZERO);
    assert_eq!(fx.balance(&fx.client.id), Amount::from_major(9_000));
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(1_000));
    // only issuance creates money
    assert_eq!(ledger.total_balance().unwrap(), Amount::from_major(10_000));

    fx.core
        .transfers()
        .transfer(
            &fx.customer.id,
            &fx.client.id,
            Amount::from_major(250),
            TransferKind::Withdraw,
            &fx.client.id,
        )
        .unwrap();
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(750));
    assert_eq!(ledger.total_balance().unwrap(), Amount::from_major(10_000));
}

#[test]
fn test_transfer_entry_records_both_balances() {
    let fx = Fixture::new();
    let entry = fx
        .core
        .transfers()
        .transfer(
            &fx.client.id,
            &fx.customer.id,
            Amount::from_major(100),
            TransferKind::Seed,
            &fx.client.id,
        )
        .unwrap();

    assert_eq!(entry.log, LogType::Deposit);
    assert_eq!(entry.note, "Client deposit to customer");
    let from = entry.from_balance.unwrap();
    assert_eq!(from.before, Amount::from_major(9_000));
    assert_eq!(from.after, Amount::from_major(8_900));
    assert_eq!(entry.to_balance.after, Amount::from_major(1_100));

    let stored = fx.core.ledger().entry(&entry.entry_id).unwrap().unwrap();
    assert_eq!(stored, entry);
}

#[test]
fn test_illegal_paths_rejected_without_side_effects() {
    let fx = Fixture::new();
    let transfers = fx.core.transfers();

    // admin may not skip the client level
    let err = transfers
        .transfer(&fx.client.id, &fx.customer.id, Amount::from_major(1), TransferKind::Seed, &fx.admin.id)
        .unwrap_err();
    assert!(matches!(err, WagerError::Unauthorized(_)));

    let stranger = fx
        .core
        .accounts()
        .create_account(&fx.admin.id, Role::Client, "Other", "other@example.com")
        .unwrap();
    let err = transfers
        .transfer(&stranger.id, &fx.customer.id, Amount::from_major(1), TransferKind::Seed, &stranger.id)
        .unwrap_err();
    assert!(err.is_rejection());

    let err = transfers
        .issue(&fx.admin.id, &fx.customer.id, Amount::from_major(1))
        .unwrap_err();
    assert!(matches!(err, WagerError::Unauthorized(_)));

    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(1_000));
    assert_eq!(fx.core.ledger().total_balance().unwrap(), Amount::from_major(10_000));
}

#[test]
fn test_insufficient_funds_reports_minor_units() {
    let fx = Fixture::new();
    let err = fx
        .core
        .transfers()
        .transfer(
            &fx.customer.id,
            &fx.client.id,
            Amount::from_major(1_001),
            TransferKind::Withdraw,
            &fx.client.id,
        )
        .unwrap_err();
    match err {
        WagerError::InsufficientFunds { balance, required } => {
            assert_eq!(balance, 100_000);
            assert_eq!(required, 100_100);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(1_000));
}

#[test]
fn test_logs_respect_visibility() {
    let fx = Fixture::new();
    let transfers = fx.core.transfers();
    let other = fx
        .core
        .accounts()
        .create_account(&fx.root, Role::Admin, "Other Admin", "other-admin@example.com")
        .unwrap();

    let everything = transfers.deposit_logs(&fx.root, None).unwrap();
    assert_eq!(everything.len(), 4);

    let mine = transfers.deposit_logs(&fx.client.id, None).unwrap();
    assert!(mine.iter().all(|e| e.to == fx.client.id || e.from.as_ref() == Some(&fx.client.id)));
    assert_eq!(mine.len(), 2);

    assert!(transfers.deposit_logs(&other.id, None).unwrap().is_empty());

    let narrowed = transfers.deposit_logs(&fx.root, Some(&fx.customer.id)).unwrap();
    assert_eq!(narrowed.len(), 1);
    assert!(transfers.withdraw_logs(&fx.root, None).unwrap().is_empty());
}

#[test]
fn test_blocked_account_cannot_move_funds() {
    let fx = Fixture::new();
    fx.core.accounts().set_active(&fx.root, &fx.client.id, false).unwrap();

    let err = fx
        .core
        .transfers()
        .transfer(&fx.client.id, &fx.customer.id, Amount::from_major(5), TransferKind::Seed, &fx.client.id)
        .unwrap_err();
    assert!(matches!(err, WagerError::Unauthorized(_)));
}

#[test]
fn test_delete_customer_refused_while_wager_pending() {
    let fx = Fixture::new();
    let rounds = fx.core.rounds();
    let round = rounds.open_round(wagerbook::GameKind::TeenPattiAb).unwrap();
    rounds
        .place_wager(
            &fx.customer.id,
            &round.round_id,
            wagerbook::Selection::Side(wagerbook::Side::A),
            Amount::from_major(100),
        )
        .unwrap();

    let accounts = fx.core.accounts();
    assert!(accounts.delete_customer(&fx.client.id, &fx.customer.id).is_err());
    assert!(accounts.find(&fx.customer.id).unwrap().is_some());

    rounds.settle(&round.round_id).unwrap();
    fx.core
        .catalog()
        .set_customer_game_enabled(&fx.client.id, &fx.customer.id, wagerbook::GameKind::AndarBahar.slug(), false)
        .unwrap();
    let summary = accounts.delete_customer(&fx.client.id, &fx.customer.id).unwrap();
    assert_eq!(summary.accounts, vec![fx.customer.id.clone()]);
    assert_eq!(summary.bet_records, 1);
    assert_eq!(summary.round_wagers, 1);
    assert_eq!(summary.game_controls, 1);
    assert!(rounds.wagers(&round.round_id).unwrap().is_empty());
    assert!(fx.core.catalog().customer_controls(&fx.customer.id).unwrap().is_empty());
    assert!(summary.ledger_entries >= 1);
    assert!(accounts.find(&fx.customer.id).unwrap().is_none());
    assert!(accounts.find_by_email("customer@example.com").unwrap().is_none());
    assert!(fx.core.ledger().wallet(&fx.customer.id).is_err());
}
