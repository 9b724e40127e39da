//! Game round state machine
//!
//! `BETTING → CLOSED`, forward only. Binary games keep at most one betting
//! round per game: opening a new one first closes and settles the previous
//! one under the game lock. Picture rounds are personal and take a single
//! wager.
//!
//! Lock order: game, then round, then wallets.

use crate::accounts::{pending_key, AccountRegistry, Role};
use crate::common::types::{newest_first, short_id};
use crate::common::{AccountId, Amount, Odds, WagerState};
use crate::config::GamesConfig;
use crate::errors::{WagerError, WagerResult};
use crate::games::catalog::GameCatalog;
use crate::games::oracle::OutcomeOracle;
use crate::games::settlement::{
    account_round_key, account_wager_key, round_record_key, round_wager_prefix, wager_key, SettlementProcessor,
    SettlementReport,
};
use crate::games::types::{GameDefinition, GameKind, Outcome, Round, RoundStatus, Selection, Side, Symbol, Wager};
use crate::ledger::Ledger;
use crate::locks::{game_key, round_key, wallet_key, LockTable};
use crate::metrics::CoreMetrics;
use crate::storage::{Db, StoreBatch};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn active_key(kind: GameKind) -> String {
    format!("round:active:{}", kind.slug())
}

fn history_key(round: &Round) -> String {
    let closed = round.closed_at.unwrap_or(round.opened_at);
    format!("round:hist:{}:{}:{}", round.game.slug(), newest_first(closed), round.round_id)
}

pub struct RoundEngine {
    db: Db,
    accounts: Arc<AccountRegistry>,
    ledger: Arc<Ledger>,
    catalog: Arc<GameCatalog>,
    oracle: Arc<OutcomeOracle>,
    settlement: Arc<SettlementProcessor>,
    locks: Arc<LockTable>,
    metrics: Arc<CoreMetrics>,
    config: GamesConfig,
}

impl RoundEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Db,
        accounts: Arc<AccountRegistry>,
        ledger: Arc<Ledger>,
        catalog: Arc<GameCatalog>,
        oracle: Arc<OutcomeOracle>,
        settlement: Arc<SettlementProcessor>,
        locks: Arc<LockTable>,
        metrics: Arc<CoreMetrics>,
        config: GamesConfig,
    ) -> Self {
        Self {
            db,
            accounts,
            ledger,
            catalog,
            oracle,
            settlement,
            locks,
            metrics,
            config,
        }
    }

    pub fn find(&self, round_id: &str) -> WagerResult<Option<Round>> {
        self.db.get_json(&round_record_key(round_id))
    }

    pub fn get(&self, round_id: &str) -> WagerResult<Round> {
        self.find(round_id)?
            .ok_or_else(|| WagerError::not_found(format!("round {}", round_id)))
    }

    /// The betting round of a single-round game, if any
    pub fn current(&self, kind: GameKind) -> WagerResult<Option<Round>> {
        let Some(id) = self.db.get_string(&active_key(kind))? else {
            return Ok(None);
        };
        Ok(self.find(&id)?.filter(Round::is_open))
    }

    /// Most recently closed rounds of a game, newest first
    pub fn history(&self, kind: GameKind, limit: usize) -> WagerResult<Vec<Round>> {
        let limit = limit.min(self.config.history_limit);
        let prefix = format!("round:hist:{}:", kind.slug());
        let mut rounds = Vec::new();
        for id in self.db.scan_values(&prefix, limit)? {
            if let Some(round) = self.find(&id)? {
                rounds.push(round);
            }
        }
        Ok(rounds)
    }

    pub fn wager(&self, wager_id: &str) -> WagerResult<Wager> {
        self.db
            .get_json(&wager_key(wager_id))?
            .ok_or_else(|| WagerError::not_found(format!("wager {}", wager_id)))
    }

    pub fn wagers(&self, round_id: &str) -> WagerResult<Vec<Wager>> {
        self.settlement.wagers(round_id)
    }

    /// Open a round. For single-round games any betting round of the same
    /// game is closed and settled first. Picture rounds are personal and
    /// are opened with [`RoundEngine::open_personal_round`].
    pub fn open_round(&self, kind: GameKind) -> WagerResult<Round> {
        if !kind.single_active_round() {
            return Err(WagerError::validation(format!("{} rounds are opened per customer", kind)));
        }
        self.open_inner(kind, None)
    }

    /// Open a picture round that only `account` may wager on
    pub fn open_personal_round(&self, kind: GameKind, account: &AccountId) -> WagerResult<Round> {
        if kind.single_active_round() {
            return Err(WagerError::validation(format!("{} rounds are shared", kind)));
        }
        let customer = self.accounts.get(account)?;
        if customer.role != Role::Customer {
            return Err(WagerError::unauthorized("only customers may open a picture round"));
        }
        if !customer.is_active {
            return Err(WagerError::unauthorized(format!("{} is blocked", customer.user_code)));
        }
        self.open_inner(kind, Some(customer.id))
    }

    fn open_inner(&self, kind: GameKind, owner: Option<AccountId>) -> WagerResult<Round> {
        let def = self.catalog.get(kind.slug())?;
        if !def.is_active {
            return Err(WagerError::GameInactive(kind.slug().to_string()));
        }

        let set = self.locks.handles([game_key(kind.slug())]);
        let _game_guard = set.acquire();

        if kind.single_active_round() {
            if let Some(previous) = self.current(kind)? {
                info!(round_id = %previous.round_id, game = %kind, "Force-closing previous round");
                match self.close_round(&previous.round_id, None) {
                    Ok(_) => {}
                    Err(e) if e.is_benign() => debug!(round_id = %previous.round_id, "Previous round already closed"),
                    Err(e) => return Err(e),
                }
            }
        }

        let now = Utc::now();
        let joker = match kind {
            GameKind::AndarBahar => Some(self.oracle.draw_joker()?),
            _ => None,
        };
        let round = Round {
            round_id: format!("{}-{}-{}", kind.round_prefix(), now.format("%Y%m%d%H%M%S"), short_id()),
            game: kind,
            status: RoundStatus::Betting,
            joker,
            winner: None,
            dealt: None,
            owner,
            game_version: def.version,
            opened_at: now,
            closed_at: None,
            settled: false,
        };

        let mut batch = StoreBatch::new();
        batch.put_json(round_record_key(&round.round_id), &round)?;
        if kind.single_active_round() {
            batch.put_raw(active_key(kind), round.round_id.as_bytes().to_vec());
        }
        self.db.commit(batch)?;

        info!(round_id = %round.round_id, game = %kind, joker = ?round.joker.map(|c| c.to_string()), "Round opened");
        Ok(round)
    }

    /// Stake `amount` from a customer's wallet on an open round
    pub fn place_wager(
        &self,
        account: &AccountId,
        round_id: &str,
        selection: Selection,
        amount: Amount,
    ) -> WagerResult<Wager> {
        let result = self.place_wager_inner(account, round_id, selection, amount);
        if let Err(e) = &result {
            self.metrics.record_rejection();
            debug!(account = %account, round_id = %round_id, error = %e, "Wager rejected");
        }
        let wager = result?;

        if self.config.rules(wager.game).auto_close_on_wager {
            match self.close_round(round_id, None) {
                Ok(_) => {}
                Err(e) if e.is_benign() => {}
                Err(e) => return Err(e),
            }
            return self.wager(&wager.wager_id);
        }
        Ok(wager)
    }

    fn place_wager_inner(
        &self,
        account: &AccountId,
        round_id: &str,
        selection: Selection,
        amount: Amount,
    ) -> WagerResult<Wager> {
        if amount.is_zero() {
            return Err(WagerError::validation("amount must be greater than zero"));
        }
        let customer = self.accounts.get(account)?;
        if customer.role != Role::Customer {
            return Err(WagerError::unauthorized("only customers may wager"));
        }
        if !customer.is_active {
            return Err(WagerError::unauthorized(format!("{} is blocked", customer.user_code)));
        }

        let round = self.get(round_id)?;
        if round.owner.as_ref().is_some_and(|owner| owner != account) {
            return Err(WagerError::unauthorized(format!(
                "round {} belongs to another customer",
                round_id
            )));
        }
        let kind = round.game;
        let def = self.catalog.get(kind.slug())?;
        if !def.is_active {
            return Err(WagerError::GameInactive(kind.slug().to_string()));
        }
        if !self.catalog.is_enabled_for(account, kind.slug())? {
            return Err(WagerError::GameDisabled {
                account: account.to_string(),
                slug: kind.slug().to_string(),
            });
        }

        let rules = self.config.rules(kind);
        let minimum = Amount::from_major(rules.min_wager);
        if amount < minimum {
            return Err(WagerError::BelowMinimum {
                amount: amount.minor(),
                minimum: minimum.minor(),
            });
        }
        let selection = validate_selection(kind, selection, rules.max_selections)?;

        let set = self.locks.handles([round_key(round_id), wallet_key(account)]);
        let _guards = set.acquire();

        let round = self.get(round_id)?;
        if !round.is_open() {
            return Err(WagerError::RoundNotOpen(round_id.to_string()));
        }
        let taken = if kind.single_active_round() {
            self.db.contains(&account_round_key(round_id, account))?
        } else {
            !self.db.scan_keys(&round_wager_prefix(round_id), 1)?.is_empty()
        };
        if taken {
            return Err(WagerError::DuplicateWager {
                account: account.to_string(),
                round_id: round_id.to_string(),
            });
        }

        let mut batch = StoreBatch::new();
        let change = self.ledger.stage_debit(&mut batch, account, amount)?;
        let wager = Wager {
            wager_id: uuid::Uuid::new_v4().to_string(),
            round_id: round_id.to_string(),
            game: kind,
            account: account.clone(),
            selection,
            amount,
            odds: Odds::from_hundredths(rules.odds_hundredths),
            state: WagerState::Pending,
            payout: Amount::ZERO,
            placed_at: Utc::now(),
            settled_at: None,
        };
        let id = wager.wager_id.as_bytes().to_vec();
        batch.put_json(wager_key(&wager.wager_id), &wager)?;
        batch.put_raw(format!("{}{}", round_wager_prefix(round_id), wager.wager_id), id.clone());
        batch.put_raw(account_round_key(round_id, account), id.clone());
        batch.put_raw(account_wager_key(account, &wager.wager_id), id.clone());
        batch.put_raw(pending_key(account, &wager.wager_id), id);
        self.db.commit(batch)?;

        self.metrics.record_wagers(1, amount);
        info!(
            wager_id = %wager.wager_id,
            account = %account,
            round_id = %round_id,
            selection = %wager.selection,
            amount = %amount,
            balance = %change.after,
            "Wager placed"
        );
        Ok(wager)
    }

    /// Close a betting round, fix its winner and settle it. A second close
    /// of the same round fails with `ConcurrencyConflict`.
    ///
    /// Winner precedence: the game's override, then `declared`, then a draw.
    pub fn close_round(&self, round_id: &str, declared: Option<Outcome>) -> WagerResult<SettlementReport> {
        let set = self.locks.handles([round_key(round_id)]);
        let _guards = set.acquire();

        let round = self.get(round_id)?;
        if !round.is_open() {
            return Err(WagerError::ConcurrencyConflict(format!("round {} already closed", round_id)));
        }
        let closed = self.close_locked(round, declared)?;
        let winner = closed
            .winner
            .ok_or_else(|| WagerError::ConcurrencyConflict(format!("round {} closed without winner", round_id)))?;
        self.settlement.settle_locked(&closed, winner)
    }

    /// Settle a round, closing it first if it is still betting. Idempotent:
    /// a settled round returns its recorded report.
    pub fn settle(&self, round_id: &str) -> WagerResult<SettlementReport> {
        let set = self.locks.handles([round_key(round_id)]);
        let _guards = set.acquire();

        let round = self.get(round_id)?;
        let round = if round.is_open() {
            self.close_locked(round, None)?
        } else {
            round
        };
        let winner = match round.winner {
            Some(winner) => winner,
            None => {
                warn!(round_id = %round_id, "Closed round has no winner, deciding now");
                let def = self.catalog.get(round.game.slug())?;
                self.decide_winner(&round, &def, None)?
            }
        };
        self.settlement.settle_locked(&round, winner)
    }

    /// Caller holds the round lock and has checked the round is open
    fn close_locked(&self, mut round: Round, declared: Option<Outcome>) -> WagerResult<Round> {
        let def = self.catalog.get(round.game.slug())?;
        let winner = self.decide_winner(&round, &def, declared)?;

        if let (GameKind::AndarBahar, Outcome::Side(side), Some(joker)) = (round.game, winner, round.joker) {
            round.dealt = Some(self.oracle.deal_andar_bahar(joker, side)?);
        }
        round.status = RoundStatus::Closed;
        round.winner = Some(winner);
        round.closed_at = Some(Utc::now());

        let mut batch = StoreBatch::new();
        batch.put_json(round_record_key(&round.round_id), &round)?;
        batch.put_raw(history_key(&round), round.round_id.as_bytes().to_vec());
        self.db.commit(batch)?;

        self.metrics.record_round_closed();
        info!(round_id = %round.round_id, game = %round.game, winner = %winner, version = def.version, "Round closed");
        Ok(round)
    }

    fn decide_winner(&self, round: &Round, def: &GameDefinition, declared: Option<Outcome>) -> WagerResult<Outcome> {
        let kind = round.game;
        if kind.single_active_round() {
            let sides = kind.sides();
            if let Some(side) = self.oracle.forced_side(def, sides) {
                return Ok(Outcome::Side(side));
            }
            return match declared {
                Some(Outcome::Side(side)) if sides.contains(&side) => Ok(Outcome::Side(side)),
                Some(other) => Err(WagerError::validation(format!("{} is not a result of {}", other, kind))),
                None => Ok(Outcome::Side(self.oracle.decide_side(def, sides)?)),
            };
        }

        // picture game: an override decides win/lose against the single wager
        let wager = self.settlement.wagers(&round.round_id)?.into_iter().next();
        match (declared, def.force_result, wager) {
            (Some(Outcome::Symbol(symbol)), None, _) => Ok(Outcome::Symbol(symbol)),
            (Some(other @ Outcome::Side(_)), None, _) => {
                Err(WagerError::validation(format!("{} is not a result of {}", other, kind)))
            }
            (_, _, Some(wager)) => match &wager.selection {
                Selection::Symbols(picks) => Ok(Outcome::Symbol(self.oracle.resolve_symbol(def, picks))),
                Selection::Side(_) => Err(WagerError::validation("picture wager without symbols")),
            },
            (_, _, None) => Ok(Outcome::Symbol(self.oracle.any_symbol())),
        }
    }
}

/// Check a selection against the game's family; symbol picks come back
/// de-duplicated
fn validate_selection(kind: GameKind, selection: Selection, max_selections: usize) -> WagerResult<Selection> {
    match (kind.single_active_round(), selection) {
        (true, Selection::Side(side)) if kind.sides().contains(&side) => Ok(Selection::Side(side)),
        (false, Selection::Symbols(picks)) => {
            let mut unique: Vec<Symbol> = Vec::with_capacity(picks.len());
            for symbol in picks {
                if unique.contains(&symbol) {
                    return Err(WagerError::validation(format!("{} selected twice", symbol)));
                }
                unique.push(symbol);
            }
            if unique.is_empty() || unique.len() > max_selections {
                return Err(WagerError::validation(format!(
                    "select between 1 and {} symbols",
                    max_selections
                )));
            }
            Ok(Selection::Symbols(unique))
        }
        (_, other) => Err(WagerError::validation(format!("{} is not a valid pick for {}", other, kind))),
    }
}

/// Parse a side token for `kind`
pub fn parse_side(kind: GameKind, raw: &str) -> WagerResult<Side> {
    Side::parse(raw)
        .filter(|side| kind.sides().contains(side))
        .ok_or_else(|| WagerError::validation(format!("'{}' is not a side of {}", raw, kind)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::ForceResult;

    #[test]
    fn test_validate_selection() {
        let ok = validate_selection(GameKind::TeenPattiAb, Selection::Side(Side::A), 1).unwrap();
        assert_eq!(ok, Selection::Side(Side::A));
        assert!(validate_selection(GameKind::TeenPattiAb, Selection::Side(Side::Andar), 1).is_err());
        assert!(validate_selection(GameKind::AndarBahar, Selection::Symbols(vec![Symbol::Cow]), 1).is_err());

        let picks = Selection::Symbols(vec![Symbol::Cow, Symbol::Rose]);
        assert!(validate_selection(GameKind::PappuPlayingPictures, picks, 5).is_ok());
        let dup = Selection::Symbols(vec![Symbol::Cow, Symbol::Cow]);
        assert!(validate_selection(GameKind::PappuPlayingPictures, dup, 5).is_err());
        let too_many = Selection::Symbols(Symbol::ALL[..6].to_vec());
        assert!(validate_selection(GameKind::PappuPlayingPictures, too_many, 5).is_err());
        assert!(validate_selection(GameKind::PappuPlayingPictures, Selection::Symbols(vec![]), 5).is_err());
    }

    #[test]
    fn test_parse_side() {
        assert_eq!(parse_side(GameKind::AndarBahar, "andar").unwrap(), Side::Andar);
        assert!(parse_side(GameKind::AndarBahar, "A").is_err());
        assert!(ForceResult::parse("bahar").is_some());
    }
}
