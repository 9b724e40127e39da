//! Settlement processor
//!
//! Resolves every pending wager of a closed round. Each wager is settled in
//! its own batch (terminal wager, wallet credit, bet record, pending marker
//! removal) so a crash leaves the round resumable: re-running skips wagers
//! already in a terminal state and pays the rest exactly once.

use crate::accounts::pending_key;
use crate::common::types::newest_first;
use crate::common::{AccountId, Amount, Odds, WagerState};
use crate::errors::{WagerError, WagerResult};
use crate::games::types::{GameKind, Outcome, Round, Wager};
use crate::ledger::Ledger;
use crate::locks::{wallet_key, LockTable};
use crate::metrics::CoreMetrics;
use crate::storage::{Db, StoreBatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Append-only audit row for one settled stake
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BetRecord {
    pub bet_id: String,
    pub account: AccountId,
    /// Game slug, or `matka:{market}` for lottery bets
    pub game: String,
    pub round_id: String,
    pub selection: String,
    pub amount: Amount,
    pub odds: Odds,
    pub result: WagerState,
    pub payout: Amount,
    /// `payout - amount` in minor units
    pub profit: i64,
    pub created_at: DateTime<Utc>,
}

/// Per-wager line of a settlement report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WagerOutcome {
    pub wager_id: String,
    pub account: AccountId,
    pub selection: String,
    pub amount: Amount,
    pub result: WagerState,
    pub payout: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementReport {
    pub round_id: String,
    pub game: GameKind,
    pub winner: Outcome,
    pub outcomes: Vec<WagerOutcome>,
    pub total_staked: Amount,
    pub total_paid: Amount,
    pub settled_at: DateTime<Utc>,
}

pub(crate) fn round_record_key(round_id: &str) -> String {
    format!("round:{}", round_id)
}

pub(crate) fn wager_key(wager_id: &str) -> String {
    format!("wager:{}", wager_id)
}

pub(crate) fn round_wager_prefix(round_id: &str) -> String {
    format!("wager:round:{}:", round_id)
}

pub(crate) fn account_round_key(round_id: &str, account: &AccountId) -> String {
    format!("wager:acct-round:{}:{}", round_id, account)
}

pub(crate) fn account_wager_key(account: &AccountId, wager_id: &str) -> String {
    format!("wager:acct:{}:{}", account, wager_id)
}

fn report_key(round_id: &str) -> String {
    format!("settlement:{}", round_id)
}

fn bet_all_key(record: &BetRecord) -> String {
    format!("bet:all:{}:{}", newest_first(record.created_at), record.bet_id)
}

fn bet_account_key(record: &BetRecord) -> String {
    format!(
        "bet:acct:{}:{}:{}",
        record.account,
        newest_first(record.created_at),
        record.bet_id
    )
}

/// Stage a bet record under the house-wide and per-account indexes
pub(crate) fn stage_bet_record(batch: &mut StoreBatch, record: &BetRecord) -> WagerResult<()> {
    batch.put_json(bet_all_key(record), record)?;
    batch.put_json(bet_account_key(record), record)
}

/// Stage removal of every bet record of `account`
pub(crate) fn purge_bet_records(db: &Db, batch: &mut StoreBatch, account: &AccountId) -> WagerResult<usize> {
    let records: Vec<BetRecord> = db.scan_json(&format!("bet:acct:{}:", account), usize::MAX)?;
    for record in &records {
        batch.delete(bet_all_key(record));
        batch.delete(bet_account_key(record));
    }
    Ok(records.len())
}

/// Stage removal of every round wager of `account` with its indexes
pub(crate) fn purge_round_wagers(db: &Db, batch: &mut StoreBatch, account: &AccountId) -> WagerResult<usize> {
    let ids = db.scan_values(&format!("wager:acct:{}:", account), usize::MAX)?;
    let mut removed = 0;
    for id in ids {
        batch.delete(account_wager_key(account, &id));
        let Some(wager) = db.get_json::<Wager>(&wager_key(&id))? else {
            continue;
        };
        batch.delete(wager_key(&id));
        batch.delete(format!("{}{}", round_wager_prefix(&wager.round_id), id));
        batch.delete(account_round_key(&wager.round_id, account));
        removed += 1;
    }
    Ok(removed)
}

pub struct SettlementProcessor {
    db: Db,
    ledger: Arc<Ledger>,
    locks: Arc<LockTable>,
    metrics: Arc<CoreMetrics>,
}

impl SettlementProcessor {
    pub fn new(db: Db, ledger: Arc<Ledger>, locks: Arc<LockTable>, metrics: Arc<CoreMetrics>) -> Self {
        Self {
            db,
            ledger,
            locks,
            metrics,
        }
    }

    pub fn report(&self, round_id: &str) -> WagerResult<Option<SettlementReport>> {
        self.db.get_json(&report_key(round_id))
    }

    /// Wagers of a round in placement-key order
    pub fn wagers(&self, round_id: &str) -> WagerResult<Vec<Wager>> {
        let mut wagers = Vec::new();
        for id in self.db.scan_values(&round_wager_prefix(round_id), usize::MAX)? {
            if let Some(wager) = self.db.get_json::<Wager>(&wager_key(&id))? {
                wagers.push(wager);
            }
        }
        Ok(wagers)
    }

    /// Settle a closed round against `winner`. The caller holds the round
    /// lock; wallet locks are taken here one wager at a time.
    pub(crate) fn settle_locked(&self, round: &Round, winner: Outcome) -> WagerResult<SettlementReport> {
        if round.is_open() {
            return Err(WagerError::RoundNotOpen(format!("{} is still taking wagers", round.round_id)));
        }
        if round.settled {
            if let Some(report) = self.report(&round.round_id)? {
                debug!(round_id = %round.round_id, "Settlement already recorded");
                return Ok(report);
            }
        }

        let mut outcomes = Vec::new();
        for id in self.db.scan_values(&round_wager_prefix(&round.round_id), usize::MAX)? {
            if let Some(outcome) = self.settle_wager(&id, winner)? {
                outcomes.push(outcome);
            }
        }

        let total_staked = sum(outcomes.iter().map(|o| o.amount))?;
        let total_paid = sum(outcomes.iter().map(|o| o.payout))?;
        let report = SettlementReport {
            round_id: round.round_id.clone(),
            game: round.game,
            winner,
            outcomes,
            total_staked,
            total_paid,
            settled_at: Utc::now(),
        };

        let mut settled = round.clone();
        settled.settled = true;
        let mut batch = StoreBatch::new();
        batch.put_json(report_key(&round.round_id), &report)?;
        batch.put_json(round_record_key(&round.round_id), &settled)?;
        self.db.commit(batch)?;

        info!(
            round_id = %round.round_id,
            winner = %winner,
            wagers = report.outcomes.len(),
            staked = %total_staked,
            paid = %total_paid,
            "Round settled"
        );
        Ok(report)
    }

    /// Resolve one wager; already-terminal wagers are reported as they stand
    fn settle_wager(&self, wager_id: &str, winner: Outcome) -> WagerResult<Option<WagerOutcome>> {
        let Some(peek) = self.db.get_json::<Wager>(&wager_key(wager_id))? else {
            return Ok(None);
        };
        let set = self.locks.handles([wallet_key(&peek.account)]);
        let _guards = set.acquire();

        // re-read under the wallet lock
        let Some(mut wager) = self.db.get_json::<Wager>(&wager_key(wager_id))? else {
            return Ok(None);
        };
        if wager.state.is_terminal() {
            return Ok(Some(outcome_of(&wager)));
        }

        let won = wager.selection.matches(&winner);
        let payout = if won {
            wager
                .amount
                .apply_odds(wager.odds)
                .ok_or_else(|| WagerError::validation(format!("payout overflow on {}", wager_id)))?
        } else {
            Amount::ZERO
        };
        let now = Utc::now();
        wager.state = if won { WagerState::Win } else { WagerState::Lose };
        wager.payout = payout;
        wager.settled_at = Some(now);

        let mut batch = StoreBatch::new();
        batch.put_json(wager_key(wager_id), &wager)?;
        if !payout.is_zero() {
            self.ledger.stage_credit(&mut batch, &wager.account, payout)?;
        }
        stage_bet_record(
            &mut batch,
            &BetRecord {
                bet_id: wager.wager_id.clone(),
                account: wager.account.clone(),
                game: wager.game.slug().to_string(),
                round_id: wager.round_id.clone(),
                selection: wager.selection.to_string(),
                amount: wager.amount,
                odds: wager.odds,
                result: wager.state,
                payout,
                profit: payout.signed_diff(wager.amount),
                created_at: now,
            },
        )?;
        batch.delete(pending_key(&wager.account, wager_id));
        self.db.commit(batch)?;

        self.metrics.record_settled(payout);
        debug!(
            wager_id = %wager_id,
            account = %wager.account,
            result = %wager.state,
            payout = %payout,
            "Wager settled"
        );
        Ok(Some(outcome_of(&wager)))
    }
}

fn outcome_of(wager: &Wager) -> WagerOutcome {
    WagerOutcome {
        wager_id: wager.wager_id.clone(),
        account: wager.account.clone(),
        selection: wager.selection.to_string(),
        amount: wager.amount,
        result: wager.state,
        payout: wager.payout,
    }
}

fn sum(amounts: impl Iterator<Item = Amount>) -> WagerResult<Amount> {
    let mut total = Amount::ZERO;
    for amount in amounts {
        total = total
            .checked_add(amount)
            .ok_or_else(|| WagerError::validation("settlement total overflow"))?;
    }
    Ok(total)
}
