//! Shared type definitions for the wagering core
//!
//! Money is fixed-point: an `Amount` counts minor units (1/100 of the
//! currency), odds are expressed in hundredths (`198` is 1.98x).

use crate::errors::WagerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minor units per whole currency unit
pub const MINOR_PER_MAJOR: u64 = 100;

/// Non-negative monetary amount in minor units
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Whole currency units, e.g. `from_major(1000)` is 1000.00
    pub const fn from_major(major: u64) -> Self {
        Self(major * MINOR_PER_MAJOR)
    }

    pub const fn minor(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Gross payout for a winning stake, rounded half-up to the minor unit
    pub fn apply_odds(self, odds: Odds) -> Option<Amount> {
        let scaled = (self.0 as u128) * (odds.hundredths() as u128) + 50;
        u64::try_from(scaled / 100).ok().map(Amount)
    }

    /// Signed difference `self - other` in minor units
    pub fn signed_diff(self, other: Amount) -> i64 {
        self.0 as i64 - other.0 as i64
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / MINOR_PER_MAJOR, self.0 % MINOR_PER_MAJOR)
    }
}

/// Parses whole or two-decimal currency strings: `"1000"`, `"12.5"`, `"0.05"`
impl FromStr for Amount {
    type Err = WagerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || WagerError::Validation(format!("invalid amount '{}'", raw));
        let raw = raw.trim();
        let (whole, frac) = raw.split_once('.').unwrap_or((raw, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > 2 || !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
        let frac: u64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };
        whole
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|minor| minor.checked_add(frac))
            .map(Amount)
            .ok_or_else(invalid)
    }
}

/// Payout multiplier in hundredths
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Odds(u32);

impl Odds {
    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    pub const fn hundredths(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Opaque account identifier
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Outcome state shared by round wagers and matka bets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WagerState {
    Pending,
    Win,
    Lose,
}

impl WagerState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WagerState::Pending)
    }
}

impl fmt::Display for WagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WagerState::Pending => write!(f, "PENDING"),
            WagerState::Win => write!(f, "WIN"),
            WagerState::Lose => write!(f, "LOSE"),
        }
    }
}

/// Sort component that orders keys newest-first under a shared prefix
pub fn newest_first(at: DateTime<Utc>) -> String {
    let millis = at.timestamp_millis().max(0) as u64;
    format!("{:016x}", u64::MAX - millis)
}

/// Short random suffix for human-readable identifiers
pub fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_amount_display() {
        assert_eq!(Amount::from_major(1000).to_string(), "1000.00");
        assert_eq!(Amount::from_minor(19_805).to_string(), "198.05");
    }

    #[test]
    fn test_apply_odds_rounds_half_up() {
        let stake = Amount::from_major(100);
        assert_eq!(stake.apply_odds(Odds::from_hundredths(198)), Some(Amount::from_major(198)));
        // 0.03 * 1.98 = 0.0594 -> 0.06
        assert_eq!(
            Amount::from_minor(3).apply_odds(Odds::from_hundredths(198)),
            Some(Amount::from_minor(6))
        );
        // 0.01 * 9.5 = 0.095 -> 0.10
        assert_eq!(
            Amount::from_minor(1).apply_odds(Odds::from_hundredths(950)),
            Some(Amount::from_minor(10))
        );
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!("1000".parse::<Amount>().unwrap(), Amount::from_major(1000));
        assert_eq!("12.5".parse::<Amount>().unwrap(), Amount::from_minor(1250));
        assert_eq!("0.05".parse::<Amount>().unwrap(), Amount::from_minor(5));
        assert_eq!(".5".parse::<Amount>().unwrap(), Amount::from_minor(50));
        for bad in ["", ".", "1.234", "-3", "abc", "1e3"] {
            assert!(bad.parse::<Amount>().is_err(), "{} should fail", bad);
        }
    }

    #[test]
    fn test_newest_first_ordering() {
        let earlier = Utc::now();
        let later = earlier + Duration::seconds(5);
        assert!(newest_first(later) < newest_first(earlier));
    }

    #[test]
    fn test_checked_sub_never_negative() {
        assert_eq!(Amount::from_minor(5).checked_sub(Amount::from_minor(6)), None);
        assert_eq!(Amount::from_major(1).signed_diff(Amount::from_major(3)), -200);
    }
}
