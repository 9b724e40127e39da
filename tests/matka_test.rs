//! Matka markets: sessions, bet validation and result settlement

mod common;

use common::Fixture;
use wagerbook::matka::{BetRequest, BetType, MarketStatus, Session};
use wagerbook::{Amount, WagerError, WagerState};

const MARKET: &str = "kalyan_day";

fn bet(bet_type: BetType, number: &str, session: Session, amount: u64) -> BetRequest {
    BetRequest {
        bet_type,
        number: number.to_string(),
        session,
        amount: Amount::from_major(amount),
    }
}

#[test]
fn test_declared_result_settles_winners() {
    let fx = Fixture::new();
    let matka = fx.core.matka();

    let placed = matka
        .place_bets(
            &fx.customer.id,
            MARKET,
            vec![
                bet(BetType::SingleAnk, "6", Session::Open, 20),
                bet(BetType::Jodi, "68", Session::Open, 20),
                bet(BetType::SinglePatti, "123", Session::Open, 20),
                bet(BetType::SingleAnk, "6", Session::Close, 20),
                bet(BetType::SinglePatti, "123", Session::Close, 20),
                bet(BetType::DoublePatti, "112", Session::Open, 20),
            ],
        )
        .unwrap();
    assert_eq!(placed.len(), 6);
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(880));

    let settlement = matka.declare_result(MARKET, "123-4-567").unwrap();
    assert_eq!(settlement.result.jodi, "68");
    assert_eq!(settlement.total_staked, Amount::from_major(120));
    assert_eq!(settlement.total_paid, Amount::from_major(570));

    let winners: Vec<&str> = settlement
        .outcomes
        .iter()
        .filter(|o| o.result == WagerState::Win)
        .map(|o| o.selection.as_str())
        .collect();
    assert_eq!(winners.len(), 3);
    assert!(winners.contains(&"SINGLE_ANK OPEN 6"));
    assert!(winners.contains(&"JODI OPEN 68"));
    assert!(winners.contains(&"SINGLE_PATTI OPEN 123"));
    for outcome in settlement.outcomes.iter().filter(|o| o.result == WagerState::Win) {
        assert_eq!(outcome.payout, Amount::from_major(190));
    }

    // 880 + 3 * 190
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(1_450));

    let market = matka.market(MARKET).unwrap();
    assert_eq!(market.status, MarketStatus::Closed);
    let again = matka.declare_result(MARKET, "123-4-567").unwrap();
    assert_eq!(again, settlement);
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(1_450));

    let err = matka.declare_result(MARKET, "124-7-567").unwrap_err();
    assert!(matches!(err, WagerError::Validation(_)));
}

#[test]
fn test_closed_session_rejects_whole_batch() {
    let fx = Fixture::new();
    let matka = fx.core.matka();
    matka.close_session(MARKET, Session::Open).unwrap();

    let err = matka
        .place_bets(
            &fx.customer.id,
            MARKET,
            vec![
                bet(BetType::SingleAnk, "3", Session::Close, 20),
                bet(BetType::SingleAnk, "3", Session::Open, 20),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, WagerError::MarketSessionClosed { .. }));
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(1_000));

    matka
        .place_bets(&fx.customer.id, MARKET, vec![bet(BetType::SingleAnk, "3", Session::Close, 20)])
        .unwrap();
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(980));

    matka.close_market(MARKET).unwrap();
    let err = matka
        .place_bets(&fx.customer.id, MARKET, vec![bet(BetType::SingleAnk, "3", Session::Close, 20)])
        .unwrap_err();
    assert!(matches!(err, WagerError::RoundNotOpen(_)));
}

#[test]
fn test_invalid_bets_rejected_up_front() {
    let fx = Fixture::new();
    let matka = fx.core.matka();

    let err = matka
        .place_bets(&fx.customer.id, MARKET, vec![bet(BetType::SingleAnk, "3", Session::Open, 10)])
        .unwrap_err();
    match err {
        WagerError::BelowMinimum { amount, minimum } => {
            assert_eq!(amount, 1_000);
            assert_eq!(minimum, 2_000);
        }
        other => panic!("unexpected error: {}", other),
    }

    for (bet_type, number) in [
        (BetType::SinglePatti, "321"),
        (BetType::DoublePatti, "123"),
        (BetType::TriplePatti, "556"),
        (BetType::Jodi, "6"),
    ] {
        let err = matka
            .place_bets(&fx.customer.id, MARKET, vec![bet(bet_type, number, Session::Open, 20)])
            .unwrap_err();
        assert!(matches!(err, WagerError::Validation(_)), "{} {}", bet_type, number);
    }

    let err = matka.place_bets(&fx.customer.id, MARKET, vec![]).unwrap_err();
    assert!(matches!(err, WagerError::Validation(_)));
    assert_eq!(fx.balance(&fx.customer.id), Amount::from_major(1_000));
}

#[test]
fn test_reopen_starts_fresh_round() {
    let fx = Fixture::new();
    let matka = fx.core.matka();
    let first_round = matka.market(MARKET).unwrap().round_id;

    matka
        .place_bets(&fx.customer.id, MARKET, vec![bet(BetType::SingleAnk, "1", Session::Open, 20)])
        .unwrap();
    // unsettled bets block a new round
    assert!(matka.open_market(MARKET).is_err());

    matka.declare_result(MARKET, "389-08-190").unwrap();
    let reopened = matka.open_market(MARKET).unwrap();
    assert_ne!(reopened.round_id, first_round);
    assert_eq!(reopened.status, MarketStatus::Running);
    assert!(reopened.result.is_none());
    assert!(matka.round_bets(MARKET, &reopened.round_id).unwrap().is_empty());
    assert_eq!(matka.round_bets(MARKET, &first_round).unwrap().len(), 1);
    assert_eq!(matka.bets_for(&fx.customer.id, 10).unwrap()[0].state, WagerState::Lose);
}
