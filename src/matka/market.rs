//! Matka markets
//!
//! A market runs one round at a time with two independently closeable
//! sessions (OPEN and CLOSE). Bets are validated and debited at placement;
//! declaring the result closes the market and settles every pending bet of
//! the current round at the fixed payout multiplier.

use crate::accounts::{pending_key, AccountRegistry, Role};
use crate::common::types::{newest_first, short_id};
use crate::common::{AccountId, Amount, Odds, WagerState};
use crate::config::{MarketSeed, MatkaConfig};
use crate::errors::{WagerError, WagerResult};
use crate::games::settlement::{stage_bet_record, BetRecord, WagerOutcome};
use crate::ledger::Ledger;
use crate::locks::{market_key, wallet_key, LockTable};
use crate::matka::patti::{BetType, MatkaResult};
use crate::metrics::CoreMetrics;
use crate::storage::{Db, StoreBatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Running,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Session {
    Open,
    Close,
}

impl Session {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(Session::Open),
            "CLOSE" => Some(Session::Close),
            _ => None,
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Session::Open => write!(f, "OPEN"),
            Session::Close => write!(f, "CLOSE"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatkaMarket {
    pub market_id: String,
    pub name: String,
    pub status: MarketStatus,
    pub open_session: MarketStatus,
    pub close_session: MarketStatus,
    pub open_time: String,
    pub close_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<MatkaResult>,
    pub round_id: String,
    pub updated_at: DateTime<Utc>,
}

impl MatkaMarket {
    pub fn session_status(&self, session: Session) -> MarketStatus {
        match session {
            Session::Open => self.open_session,
            Session::Close => self.close_session,
        }
    }

    fn session_mut(&mut self, session: Session) -> &mut MarketStatus {
        match session {
            Session::Open => &mut self.open_session,
            Session::Close => &mut self.close_session,
        }
    }
}

/// One bet in a placement request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BetRequest {
    pub bet_type: BetType,
    pub number: String,
    pub session: Session,
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatkaBet {
    pub bet_id: String,
    pub account: AccountId,
    pub market_id: String,
    pub round_id: String,
    pub bet_type: BetType,
    pub number: String,
    pub session: Session,
    pub amount: Amount,
    pub odds: Odds,
    pub state: WagerState,
    pub payout: Amount,
    pub placed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl MatkaBet {
    /// Whether the bet wins against a declared result
    pub fn wins(&self, result: &MatkaResult) -> bool {
        let (ank, patti) = match self.session {
            Session::Open => (result.open_ank, &result.open_patti),
            Session::Close => (result.close_ank, &result.close_patti),
        };
        match self.bet_type {
            BetType::SingleAnk => self.number == ank.to_string(),
            BetType::Jodi => self.number == result.jodi,
            BetType::SinglePatti | BetType::DoublePatti | BetType::TriplePatti => self.number == *patti,
        }
    }

    fn selection(&self) -> String {
        format!("{} {} {}", self.bet_type, self.session, self.number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatkaSettlement {
    pub market_id: String,
    pub round_id: String,
    pub result: MatkaResult,
    pub outcomes: Vec<WagerOutcome>,
    pub total_staked: Amount,
    pub total_paid: Amount,
    pub declared_at: DateTime<Utc>,
}

fn market_record_key(market_id: &str) -> String {
    format!("matka:market:{}", market_id)
}

fn bet_key(bet_id: &str) -> String {
    format!("matka:bet:{}", bet_id)
}

fn round_bets_prefix(market_id: &str, round_id: &str) -> String {
    format!("matka:bet:round:{}:{}:", market_id, round_id)
}

fn account_bet_key(bet: &MatkaBet) -> String {
    format!("matka:bet:acct:{}:{}:{}", bet.account, newest_first(bet.placed_at), bet.bet_id)
}

fn settlement_key(market_id: &str, round_id: &str) -> String {
    format!("matka:settlement:{}:{}", market_id, round_id)
}

fn new_round_id() -> String {
    format!("MK-{}-{}", Utc::now().format("%Y%m%d%H%M%S"), short_id())
}

/// Stage removal of every matka bet of `account`
pub(crate) fn purge_matka_bets(db: &Db, batch: &mut StoreBatch, account: &AccountId) -> WagerResult<usize> {
    let ids = db.scan_values(&format!("matka:bet:acct:{}:", account), usize::MAX)?;
    let mut removed = 0;
    for id in ids {
        let Some(bet) = db.get_json::<MatkaBet>(&bet_key(&id))? else {
            continue;
        };
        batch.delete(bet_key(&id));
        batch.delete(format!("{}{}", round_bets_prefix(&bet.market_id, &bet.round_id), bet.bet_id));
        batch.delete(account_bet_key(&bet));
        removed += 1;
    }
    Ok(removed)
}

pub struct MatkaEngine {
    db: Db,
    accounts: Arc<AccountRegistry>,
    ledger: Arc<Ledger>,
    locks: Arc<LockTable>,
    metrics: Arc<CoreMetrics>,
    config: MatkaConfig,
}

impl MatkaEngine {
    pub fn new(
        db: Db,
        accounts: Arc<AccountRegistry>,
        ledger: Arc<Ledger>,
        locks: Arc<LockTable>,
        metrics: Arc<CoreMetrics>,
        config: MatkaConfig,
    ) -> Self {
        Self {
            db,
            accounts,
            ledger,
            locks,
            metrics,
            config,
        }
    }

    fn odds(&self) -> Odds {
        Odds::from_hundredths(self.config.payout_hundredths)
    }

    /// Seed the configured markets; existing markets are left alone
    pub fn ensure_markets(&self) -> WagerResult<Vec<MatkaMarket>> {
        let mut seeded = Vec::new();
        for seed in &self.config.markets {
            let set = self.locks.handles([market_key(&seed.market_id)]);
            let _guards = set.acquire();
            if self.find_market(&seed.market_id)?.is_some() {
                continue;
            }
            let market = fresh_market(seed);
            self.store_market(&market)?;
            info!(market_id = %market.market_id, round_id = %market.round_id, "Matka market seeded");
            seeded.push(market);
        }
        Ok(seeded)
    }

    pub fn find_market(&self, market_id: &str) -> WagerResult<Option<MatkaMarket>> {
        self.db.get_json(&market_record_key(market_id))
    }

    pub fn market(&self, market_id: &str) -> WagerResult<MatkaMarket> {
        self.find_market(market_id)?
            .ok_or_else(|| WagerError::not_found(format!("market {}", market_id)))
    }

    /// All markets ordered by name
    pub fn markets(&self) -> WagerResult<Vec<MatkaMarket>> {
        let mut markets: Vec<MatkaMarket> = self.db.scan_json("matka:market:", usize::MAX)?;
        markets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(markets)
    }

    fn store_market(&self, market: &MatkaMarket) -> WagerResult<()> {
        let mut batch = StoreBatch::new();
        batch.put_json(market_record_key(&market.market_id), market)?;
        self.db.commit(batch)
    }

    fn update_market(
        &self,
        market_id: &str,
        apply: impl FnOnce(&mut MatkaMarket) -> WagerResult<()>,
    ) -> WagerResult<MatkaMarket> {
        let set = self.locks.handles([market_key(market_id)]);
        let _guards = set.acquire();
        let mut market = self.market(market_id)?;
        apply(&mut market)?;
        market.updated_at = Utc::now();
        self.store_market(&market)?;
        Ok(market)
    }

    /// Start a new round: running, no result, both sessions open. Refused
    /// while the current round still holds unsettled bets.
    pub fn open_market(&self, market_id: &str) -> WagerResult<MatkaMarket> {
        let market = self.update_market(market_id, |market| {
            if market.result.is_none() && self.has_pending(market_id, &market.round_id)? {
                return Err(WagerError::validation(format!(
                    "round {} of {} has unsettled bets; declare its result first",
                    market.round_id, market_id
                )));
            }
            market.status = MarketStatus::Running;
            market.open_session = MarketStatus::Running;
            market.close_session = MarketStatus::Running;
            market.result = None;
            market.round_id = new_round_id();
            Ok(())
        })?;
        info!(market_id = %market_id, round_id = %market.round_id, "Matka market opened");
        Ok(market)
    }

    /// Stop all betting without declaring a result
    pub fn close_market(&self, market_id: &str) -> WagerResult<MatkaMarket> {
        let market = self.update_market(market_id, |market| {
            market.status = MarketStatus::Closed;
            Ok(())
        })?;
        info!(market_id = %market_id, "Matka market closed");
        Ok(market)
    }

    pub fn close_session(&self, market_id: &str, session: Session) -> WagerResult<MatkaMarket> {
        let market = self.update_market(market_id, |market| {
            *market.session_mut(session) = MarketStatus::Closed;
            Ok(())
        })?;
        info!(market_id = %market_id, session = %session, "Matka session closed");
        Ok(market)
    }

    fn has_pending(&self, market_id: &str, round_id: &str) -> WagerResult<bool> {
        Ok(self
            .round_bets(market_id, round_id)?
            .iter()
            .any(|bet| bet.state == WagerState::Pending))
    }

    /// Place a batch of bets. Every bet is validated first; the total is
    /// debited once and all bets land in the same commit.
    pub fn place_bets(&self, account: &AccountId, market_id: &str, bets: Vec<BetRequest>) -> WagerResult<Vec<MatkaBet>> {
        let result = self.place_bets_inner(account, market_id, bets);
        if let Err(e) = &result {
            self.metrics.record_rejection();
            debug!(account = %account, market_id = %market_id, error = %e, "Matka bets rejected");
        }
        result
    }

    fn place_bets_inner(&self, account: &AccountId, market_id: &str, bets: Vec<BetRequest>) -> WagerResult<Vec<MatkaBet>> {
        if bets.is_empty() {
            return Err(WagerError::validation("no bets supplied"));
        }
        let customer = self.accounts.get(account)?;
        if customer.role != Role::Customer {
            return Err(WagerError::unauthorized("only customers may bet"));
        }
        if !customer.is_active {
            return Err(WagerError::unauthorized(format!("{} is blocked", customer.user_code)));
        }

        let minimum = Amount::from_major(self.config.min_wager);
        let mut total = Amount::ZERO;
        for bet in &bets {
            if bet.amount.is_zero() {
                return Err(WagerError::validation("amount must be greater than zero"));
            }
            if bet.amount < minimum {
                return Err(WagerError::BelowMinimum {
                    amount: bet.amount.minor(),
                    minimum: minimum.minor(),
                });
            }
            if !bet.bet_type.accepts(bet.number.trim()) {
                return Err(WagerError::validation(format!(
                    "'{}' is not a valid {} number",
                    bet.number, bet.bet_type
                )));
            }
            total = total
                .checked_add(bet.amount)
                .ok_or_else(|| WagerError::validation("bet total overflow"))?;
        }

        let set = self.locks.handles([market_key(market_id), wallet_key(account)]);
        let _guards = set.acquire();

        let market = self.market(market_id)?;
        if market.status != MarketStatus::Running {
            return Err(WagerError::RoundNotOpen(format!("market {} is closed", market_id)));
        }
        for bet in &bets {
            if market.session_status(bet.session) == MarketStatus::Closed {
                return Err(WagerError::MarketSessionClosed {
                    market_id: market_id.to_string(),
                    session: bet.session.to_string(),
                });
            }
        }

        let mut batch = StoreBatch::new();
        let change = self.ledger.stage_debit(&mut batch, account, total)?;
        let now = Utc::now();
        let mut placed = Vec::with_capacity(bets.len());
        for request in bets {
            let bet = MatkaBet {
                bet_id: uuid::Uuid::new_v4().to_string(),
                account: account.clone(),
                market_id: market_id.to_string(),
                round_id: market.round_id.clone(),
                bet_type: request.bet_type,
                number: request.number.trim().to_string(),
                session: request.session,
                amount: request.amount,
                odds: self.odds(),
                state: WagerState::Pending,
                payout: Amount::ZERO,
                placed_at: now,
                settled_at: None,
            };
            let id = bet.bet_id.as_bytes().to_vec();
            batch.put_json(bet_key(&bet.bet_id), &bet)?;
            batch.put_raw(format!("{}{}", round_bets_prefix(market_id, &market.round_id), bet.bet_id), id.clone());
            batch.put_raw(account_bet_key(&bet), id.clone());
            batch.put_raw(pending_key(account, &bet.bet_id), id);
            placed.push(bet);
        }
        self.db.commit(batch)?;

        self.metrics.record_wagers(placed.len() as u64, total);
        info!(
            account = %account,
            market_id = %market_id,
            round_id = %market.round_id,
            count = placed.len(),
            total = %total,
            balance = %change.after,
            "Matka bets placed"
        );
        Ok(placed)
    }

    /// Declare the current round's result and settle its pending bets.
    /// Repeating the same result returns the recorded settlement; a
    /// different result for a declared round is rejected.
    pub fn declare_result(&self, market_id: &str, raw: &str) -> WagerResult<MatkaSettlement> {
        let result = MatkaResult::parse(raw)?;

        let set = self.locks.handles([market_key(market_id)]);
        let _guards = set.acquire();

        let mut market = self.market(market_id)?;
        match &market.result {
            Some(existing) if existing.raw != result.raw => {
                return Err(WagerError::validation(format!(
                    "round {} of {} already declared as {}",
                    market.round_id, market_id, existing.raw
                )));
            }
            Some(_) => {
                if let Some(done) = self.db.get_json(&settlement_key(market_id, &market.round_id))? {
                    debug!(market_id = %market_id, "Result already settled");
                    return Ok(done);
                }
            }
            None => {
                market.result = Some(result.clone());
                market.status = MarketStatus::Closed;
                market.open_session = MarketStatus::Closed;
                market.close_session = MarketStatus::Closed;
                market.updated_at = Utc::now();
                self.store_market(&market)?;
                info!(market_id = %market_id, round_id = %market.round_id, result = %result.raw, "Matka result declared");
            }
        }

        let mut outcomes = Vec::new();
        for id in self.db.scan_values(&round_bets_prefix(market_id, &market.round_id), usize::MAX)? {
            if let Some(outcome) = self.settle_bet(&id, &result)? {
                outcomes.push(outcome);
            }
        }

        let mut total_staked = Amount::ZERO;
        let mut total_paid = Amount::ZERO;
        for outcome in &outcomes {
            total_staked = total_staked
                .checked_add(outcome.amount)
                .ok_or_else(|| WagerError::validation("settlement total overflow"))?;
            total_paid = total_paid
                .checked_add(outcome.payout)
                .ok_or_else(|| WagerError::validation("settlement total overflow"))?;
        }
        let settlement = MatkaSettlement {
            market_id: market_id.to_string(),
            round_id: market.round_id.clone(),
            result,
            outcomes,
            total_staked,
            total_paid,
            declared_at: Utc::now(),
        };
        let mut batch = StoreBatch::new();
        batch.put_json(settlement_key(market_id, &market.round_id), &settlement)?;
        self.db.commit(batch)?;

        info!(
            market_id = %market_id,
            round_id = %settlement.round_id,
            bets = settlement.outcomes.len(),
            paid = %total_paid,
            "Matka round settled"
        );
        Ok(settlement)
    }

    fn settle_bet(&self, bet_id: &str, result: &MatkaResult) -> WagerResult<Option<WagerOutcome>> {
        let Some(peek) = self.db.get_json::<MatkaBet>(&bet_key(bet_id))? else {
            return Ok(None);
        };
        let set = self.locks.handles([wallet_key(&peek.account)]);
        let _guards = set.acquire();

        let Some(mut bet) = self.db.get_json::<MatkaBet>(&bet_key(bet_id))? else {
            return Ok(None);
        };
        if bet.state.is_terminal() {
            return Ok(Some(outcome_of(&bet)));
        }

        let won = bet.wins(result);
        let payout = if won {
            bet.amount
                .apply_odds(bet.odds)
                .ok_or_else(|| WagerError::validation(format!("payout overflow on {}", bet_id)))?
        } else {
            Amount::ZERO
        };
        let now = Utc::now();
        bet.state = if won { WagerState::Win } else { WagerState::Lose };
        bet.payout = payout;
        bet.settled_at = Some(now);

        let mut batch = StoreBatch::new();
        batch.put_json(bet_key(bet_id), &bet)?;
        if !payout.is_zero() {
            self.ledger.stage_credit(&mut batch, &bet.account, payout)?;
        }
        stage_bet_record(
            &mut batch,
            &BetRecord {
                bet_id: bet.bet_id.clone(),
                account: bet.account.clone(),
                game: format!("matka:{}", bet.market_id),
                round_id: bet.round_id.clone(),
                selection: bet.selection(),
                amount: bet.amount,
                odds: bet.odds,
                result: bet.state,
                payout,
                profit: payout.signed_diff(bet.amount),
                created_at: now,
            },
        )?;
        batch.delete(pending_key(&bet.account, bet_id));
        self.db.commit(batch)?;

        self.metrics.record_settled(payout);
        Ok(Some(outcome_of(&bet)))
    }

    pub fn settlement(&self, market_id: &str, round_id: &str) -> WagerResult<Option<MatkaSettlement>> {
        self.db.get_json(&settlement_key(market_id, round_id))
    }

    pub fn bet(&self, bet_id: &str) -> WagerResult<Option<MatkaBet>> {
        self.db.get_json(&bet_key(bet_id))
    }

    pub fn round_bets(&self, market_id: &str, round_id: &str) -> WagerResult<Vec<MatkaBet>> {
        self.load_bets(self.db.scan_values(&round_bets_prefix(market_id, round_id), usize::MAX)?)
    }

    /// A customer's bets, newest first
    pub fn bets_for(&self, account: &AccountId, limit: usize) -> WagerResult<Vec<MatkaBet>> {
        self.load_bets(self.db.scan_values(&format!("matka:bet:acct:{}:", account), limit)?)
    }

    fn load_bets(&self, ids: Vec<String>) -> WagerResult<Vec<MatkaBet>> {
        let mut bets = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bet) = self.bet(&id)? {
                bets.push(bet);
            }
        }
        Ok(bets)
    }
}

fn fresh_market(seed: &MarketSeed) -> MatkaMarket {
    MatkaMarket {
        market_id: seed.market_id.clone(),
        name: seed.name.clone(),
        status: MarketStatus::Running,
        open_session: MarketStatus::Running,
        close_session: MarketStatus::Running,
        open_time: seed.open_time.clone(),
        close_time: seed.close_time.clone(),
        result: None,
        round_id: new_round_id(),
        updated_at: Utc::now(),
    }
}

fn outcome_of(bet: &MatkaBet) -> WagerOutcome {
    WagerOutcome {
        wager_id: bet.bet_id.clone(),
        account: bet.account.clone(),
        selection: bet.selection(),
        amount: bet.amount,
        result: bet.state,
        payout: bet.payout,
    }
}
