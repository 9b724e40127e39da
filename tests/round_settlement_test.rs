//! Round lifecycle: open, wager, close, settle against the ledger

mod common;

use common::Fixture;
use wagerbook::games::{ControlUpdate, ForceResult, RoundStatus};
use wagerbook::{Amount, GameKind, Outcome, ReportPeriod, Selection, Side, Symbol, WagerError, WagerState};

fn force(fx: &Fixture, kind: GameKind, result: ForceResult) {
    fx.core
        .catalog()
        .set_control(
            kind.slug(),
            ControlUpdate {
                rtp: None,
                force_result: Some(Some(result)),
            },
        )
        .unwrap();
}

#[test]
fn test_forced_side_pays_winner() {
    let fx = Fixture::new();
    force(&fx, GameKind::TeenPattiAb, ForceResult::B);
    let rounds = fx.core.rounds();

    let round = rounds.open_round(GameKind::TeenPattiAb).unwrap();
    assert!(round.round_id.starts_with("TP-"));
    let wager = rounds
        .place_wager(&fx.customer.id, &round.round_id, Selection::Side(Side::B), Amount::from_major(100))
        .unwrap();
    assert_eq!(wager.state, WagerState::Pending);
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(900));

    // the override outranks the declared winner
    let report = rounds.close_round(&round.round_id, Some(Outcome::Side(Side::A))).unwrap();
    assert_eq!(report.winner, Outcome::Side(Side::B));
    assert_eq!(report.total_staked, Amount::from_major(100));
    assert_eq!(report.total_paid, Amount::from_major(198));
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(1_098));

    let settled = rounds.wager(&wager.wager_id).unwrap();
    assert_eq!(settled.state, WagerState::Win);
    assert_eq!(settled.payout, Amount::from_major(198));

    let records = fx.core.reports().bets_for(&fx.customer.id, 10).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].profit, 9_800);
    assert_eq!(records[0].game, "teen-patti-ab");
}

#[test]
fn test_andar_bahar_deal_matches_winner() {
    let fx = Fixture::new();
    force(&fx, GameKind::AndarBahar, ForceResult::Andar);
    let rounds = fx.core.rounds();

    let round = rounds.open_round(GameKind::AndarBahar).unwrap();
    let joker = round.joker.expect("andar bahar reveals a joker at open");
    rounds
        .place_wager(&fx.customer.id, &round.round_id, Selection::Side(Side::Bahar), Amount::from_major(100))
        .unwrap();
    rounds.close_round(&round.round_id, None).unwrap();

    let closed = rounds.get(&round.round_id).unwrap();
    assert_eq!(closed.winner, Some(Outcome::Side(Side::Andar)));
    let dealt = closed.dealt.unwrap();
    assert_eq!(dealt.andar.rank, joker.rank);
    assert_ne!(dealt.bahar.rank, joker.rank);
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(900));
}

#[test]
fn test_settle_is_idempotent() {
    let fx = Fixture::new();
    force(&fx, GameKind::TeenPattiAb, ForceResult::A);
    let rounds = fx.core.rounds();

    let round = rounds.open_round(GameKind::TeenPattiAb).unwrap();
    rounds
        .place_wager(&fx.customer.id, &round.round_id, Selection::Side(Side::A), Amount::from_major(100))
        .unwrap();

    // settle closes a betting round first
    let first = rounds.settle(&round.round_id).unwrap();
    let after_first = fx.balance(&fx.customer.id);
    assert_eq!(after_first, Amount::from_major(1_098));

    let second = rounds.settle(&round.round_id).unwrap();
    assert_eq!(first, second);
    assert_eq!(fx.balance(&fx.customer.id), after_first);
    assert_eq!(fx.core.reports().bets_for(&fx.customer.id, 10).unwrap().len(), 1);
}

#[test]
fn test_second_close_conflicts() {
    let fx = Fixture::new();
    let rounds = fx.core.rounds();
    let round = rounds.open_round(GameKind::TeenPattiAb).unwrap();

    rounds.close_round(&round.round_id, None).unwrap();
    let err = rounds.close_round(&round.round_id, None).unwrap_err();
    assert!(matches!(err, WagerError::ConcurrencyConflict(_)));
    assert!(err.is_benign());
}

#[test]
fn test_closed_round_rejects_wagers() {
    let fx = Fixture::new();
    let rounds = fx.core.rounds();
    let round = rounds.open_round(GameKind::TeenPattiAb).unwrap();
    rounds.close_round(&round.round_id, None).unwrap();

    let err = rounds
        .place_wager(&fx.customer.id, &round.round_id, Selection::Side(Side::A), Amount::from_major(100))
        .unwrap_err();
    assert!(matches!(err, WagerError::RoundNotOpen(_)));
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(1_000));
}

#[test]
fn test_wager_rejections_leave_balance() {
    let fx = Fixture::new();
    let rounds = fx.core.rounds();
    let round = rounds.open_round(GameKind::TeenPattiAb).unwrap();

    let err = rounds
        .place_wager(&fx.customer.id, &round.round_id, Selection::Side(Side::A), Amount::from_major(10))
        .unwrap_err();
    match err {
        WagerError::BelowMinimum { amount, minimum } => {
            assert_eq!(amount, 1_000);
            assert_eq!(minimum, 5_000);
        }
        other => panic!("unexpected error: {}", other),
    }

    let err = rounds
        .place_wager(&fx.customer.id, &round.round_id, Selection::Side(Side::Andar), Amount::from_major(100))
        .unwrap_err();
    assert!(matches!(err, WagerError::Validation(_)));

    let err = rounds
        .place_wager(&fx.client.id, &round.round_id, Selection::Side(Side::A), Amount::from_major(100))
        .unwrap_err();
    assert!(matches!(err, WagerError::Unauthorized(_)));

    let err = rounds
        .place_wager(&fx.customer.id, &round.round_id, Selection::Side(Side::A), Amount::from_major(5_000))
        .unwrap_err();
    assert!(matches!(err, WagerError::InsufficientFunds { .. }));

    rounds
        .place_wager(&fx.customer.id, &round.round_id, Selection::Side(Side::A), Amount::from_major(100))
        .unwrap();
    let err = rounds
        .place_wager(&fx.customer.id, &round.round_id, Selection::Side(Side::B), Amount::from_major(100))
        .unwrap_err();
    assert!(matches!(err, WagerError::DuplicateWager { .. }));

    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(900));
    assert!(fx.core.metrics().snapshot().rejections >= 5);
}

#[test]
fn test_disabled_games_refuse_wagers() {
    let fx = Fixture::new();
    let rounds = fx.core.rounds();
    let round = rounds.open_round(GameKind::TeenPattiAb).unwrap();

    fx.core
        .catalog()
        .set_customer_game_enabled(&fx.client.id, &fx.customer.id, GameKind::TeenPattiAb.slug(), false)
        .unwrap();
    let err = rounds
        .place_wager(&fx.customer.id, &round.round_id, Selection::Side(Side::A), Amount::from_major(100))
        .unwrap_err();
    assert!(matches!(err, WagerError::GameDisabled { .. }));

    fx.core.catalog().toggle(GameKind::AndarBahar.slug()).unwrap();
    let err = rounds.open_round(GameKind::AndarBahar).unwrap_err();
    assert!(matches!(err, WagerError::GameInactive(_)));
}

#[test]
fn test_opening_replaces_active_round() {
    let fx = Fixture::new();
    let rounds = fx.core.rounds();

    let first = rounds.open_round(GameKind::TeenPattiAb).unwrap();
    rounds
        .place_wager(&fx.customer.id, &first.round_id, Selection::Side(Side::A), Amount::from_major(100))
        .unwrap();
    let second = rounds.open_round(GameKind::TeenPattiAb).unwrap();

    let previous = rounds.get(&first.round_id).unwrap();
    assert_eq!(previous.status, RoundStatus::Closed);
    assert!(previous.settled);
    assert_eq!(
        rounds.current(GameKind::TeenPattiAb).unwrap().map(|r| r.round_id),
        Some(second.round_id)
    );
    let history = rounds.history(GameKind::TeenPattiAb, 10).unwrap();
    assert_eq!(history.first().map(|r| r.round_id.as_str()), Some(first.round_id.as_str()));
}

#[test]
fn test_picture_game_forced_win_and_loss() {
    let fx = Fixture::new();
    let rounds = fx.core.rounds();
    let picks = vec![Symbol::Cow, Symbol::Rose];

    force(&fx, GameKind::PappuPlayingPictures, ForceResult::Win);
    let round = rounds.open_personal_round(GameKind::PappuPlayingPictures, &fx.customer.id).unwrap();
    rounds
        .place_wager(&fx.customer.id, &round.round_id, Selection::Symbols(picks.clone()), Amount::from_major(20))
        .unwrap();
    let report = rounds.close_round(&round.round_id, None).unwrap();
    match report.winner {
        Outcome::Symbol(symbol) => assert!(picks.contains(&symbol)),
        other => panic!("unexpected winner {}", other),
    }
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(1_180));

    force(&fx, GameKind::PappuPlayingPictures, ForceResult::Lose);
    let round = rounds.open_personal_round(GameKind::PappuPlayingPictures, &fx.customer.id).unwrap();
    rounds
        .place_wager(&fx.customer.id, &round.round_id, Selection::Symbols(picks.clone()), Amount::from_major(20))
        .unwrap();
    let report = rounds.close_round(&round.round_id, None).unwrap();
    match report.winner {
        Outcome::Symbol(symbol) => assert!(!picks.contains(&symbol)),
        other => panic!("unexpected winner {}", other),
    }
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(1_160));

    let pnl = fx.core.reports().profit_loss(ReportPeriod::Daily).unwrap();
    assert_eq!(pnl.bets, 2);
    assert_eq!(pnl.wins, 1);
    assert_eq!(pnl.house_profit, -16_000);
}

#[test]
fn test_picture_round_belongs_to_its_opener() {
    let fx = Fixture::new();
    let rounds = fx.core.rounds();
    let other = fx.extra_customer("stranger", 100);

    let err = rounds.open_round(GameKind::PappuPlayingPictures).unwrap_err();
    assert!(matches!(err, WagerError::Validation(_)));
    let err = rounds.open_personal_round(GameKind::PappuPlayingPictures, &fx.client.id).unwrap_err();
    assert!(matches!(err, WagerError::Unauthorized(_)));

    let round = rounds.open_personal_round(GameKind::PappuPlayingPictures, &fx.customer.id).unwrap();
    assert_eq!(round.owner.as_ref(), Some(&fx.customer.id));

    let err = rounds
        .place_wager(&other.id, &round.round_id, Selection::Symbols(vec![Symbol::Cow]), Amount::from_major(20))
        .unwrap_err();
    assert!(matches!(err, WagerError::Unauthorized(_)));
    assert_eq!(fx.balance(&other.id), Amount::from_major(100));

    rounds
        .place_wager(&fx.customer.id, &round.round_id, Selection::Symbols(vec![Symbol::Cow]), Amount::from_major(20))
        .unwrap();
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(980));
}

#[test]
fn test_oracle_override_and_rtp() {
    let fx = Fixture::new();
    let oracle = fx.core.oracle();
    let mut def = fx.core.catalog().get(GameKind::TeenPattiAb.slug()).unwrap();

    def.force_result = Some(ForceResult::Win);
    assert!((0..1_000).all(|_| oracle.decide_win(&def)));
    def.force_result = Some(ForceResult::Lose);
    assert!((0..1_000).all(|_| !oracle.decide_win(&def)));

    def.force_result = None;
    def.rtp = 50;
    let wins = (0..10_000).filter(|_| oracle.decide_win(&def)).count();
    assert!((4_700..=5_300).contains(&wins), "win count {} outside tolerance", wins);
}

#[test]
fn test_control_rejects_bad_values() {
    let fx = Fixture::new();
    let catalog = fx.core.catalog();
    let err = catalog
        .set_control(
            GameKind::TeenPattiAb.slug(),
            ControlUpdate {
                rtp: Some(101),
                force_result: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, WagerError::Validation(_)));

    let err = catalog
        .set_control(
            GameKind::TeenPattiAb.slug(),
            ControlUpdate {
                rtp: None,
                force_result: Some(Some(ForceResult::Andar)),
            },
        )
        .unwrap_err();
    assert!(matches!(err, WagerError::Validation(_)));

    let before = catalog.get(GameKind::TeenPattiAb.slug()).unwrap();
    let after = catalog
        .set_control(
            GameKind::TeenPattiAb.slug(),
            ControlUpdate {
                rtp: Some(75),
                force_result: None,
            },
        )
        .unwrap();
    assert_eq!(after.rtp, 75);
    assert_eq!(after.version, before.version + 1);
}
