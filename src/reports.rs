//! Profit/loss reporting over settled bet records

use crate::common::{AccountId, Amount, WagerState};
use crate::errors::{WagerError, WagerResult};
use crate::games::settlement::BetRecord;
use crate::storage::Db;
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    Daily,
    Weekly,
    Monthly,
    All,
}

impl ReportPeriod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(ReportPeriod::Daily),
            "weekly" => Some(ReportPeriod::Weekly),
            "monthly" => Some(ReportPeriod::Monthly),
            "all" => Some(ReportPeriod::All),
            _ => None,
        }
    }

    /// Earliest record time included; daily starts at midnight UTC
    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ReportPeriod::Daily => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc()),
            ReportPeriod::Weekly => Some(now - Duration::days(7)),
            ReportPeriod::Monthly => now.checked_sub_months(Months::new(1)),
            ReportPeriod::All => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfitLoss {
    pub period: ReportPeriod,
    pub since: Option<DateTime<Utc>>,
    pub bets: u64,
    pub wins: u64,
    pub total_staked: Amount,
    pub total_paid: Amount,
    /// Staked minus paid, in minor units; negative when the house lost
    pub house_profit: i64,
}

pub struct ReportService {
    db: Db,
}

impl ReportService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn profit_loss(&self, period: ReportPeriod) -> WagerResult<ProfitLoss> {
        let since = period.since(Utc::now());
        let records: Vec<BetRecord> = self.db.scan_json("bet:all:", usize::MAX)?;

        let mut report = ProfitLoss {
            period,
            since,
            bets: 0,
            wins: 0,
            total_staked: Amount::ZERO,
            total_paid: Amount::ZERO,
            house_profit: 0,
        };
        // records are newest first, so stop at the first one outside the window
        for record in records
            .iter()
            .take_while(|r| since.map_or(true, |since| r.created_at >= since))
        {
            report.bets += 1;
            if record.result == WagerState::Win {
                report.wins += 1;
            }
            report.total_staked = report
                .total_staked
                .checked_add(record.amount)
                .ok_or_else(|| WagerError::validation("report overflow"))?;
            report.total_paid = report
                .total_paid
                .checked_add(record.payout)
                .ok_or_else(|| WagerError::validation("report overflow"))?;
        }
        report.house_profit = report.total_staked.signed_diff(report.total_paid);
        Ok(report)
    }

    /// An account's settled bets, newest first
    pub fn bets_for(&self, account: &AccountId, limit: usize) -> WagerResult<Vec<BetRecord>> {
        self.db.scan_json(&format!("bet:acct:{}:", account), limit)
    }

    /// House-wide settled bets, newest first
    pub fn recent_bets(&self, limit: usize) -> WagerResult<Vec<BetRecord>> {
        self.db.scan_json("bet:all:", limit)
    }
}
