use crate::common::{AccountId, Amount, Odds, WagerState};
use crate::games::cards::Card;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Games with a round engine behind them
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum GameKind {
    PappuPlayingPictures,
    TeenPattiAb,
    AndarBahar,
}

impl GameKind {
    pub const ALL: [GameKind; 3] = [
        GameKind::PappuPlayingPictures,
        GameKind::TeenPattiAb,
        GameKind::AndarBahar,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            GameKind::PappuPlayingPictures => "pappu-playing-pictures",
            GameKind::TeenPattiAb => "teen-patti-ab",
            GameKind::AndarBahar => "andar-bahar",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            GameKind::PappuPlayingPictures => "Pappu Playing Pictures",
            GameKind::TeenPattiAb => "Teen Patti A/B",
            GameKind::AndarBahar => "Andar Bahar",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.slug() == slug)
    }

    /// Prefix of generated round ids
    pub fn round_prefix(self) -> &'static str {
        match self {
            GameKind::PappuPlayingPictures => "PP",
            GameKind::TeenPattiAb => "TP",
            GameKind::AndarBahar => "AB",
        }
    }

    /// Sides a binary game resolves to; empty for picture games
    pub fn sides(self) -> &'static [Side] {
        match self {
            GameKind::PappuPlayingPictures => &[],
            GameKind::TeenPattiAb => &[Side::A, Side::B],
            GameKind::AndarBahar => &[Side::Andar, Side::Bahar],
        }
    }

    /// Binary games keep a single shared round open at a time
    pub fn single_active_round(self) -> bool {
        !self.sides().is_empty()
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    A,
    B,
    Andar,
    Bahar,
}

impl Side {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "A" => Some(Side::A),
            "B" => Some(Side::B),
            "ANDAR" => Some(Side::Andar),
            "BAHAR" => Some(Side::Bahar),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
            Side::Andar => write!(f, "ANDAR"),
            Side::Bahar => write!(f, "BAHAR"),
        }
    }
}

/// Pappu Playing Pictures board symbols
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Symbol {
    Cow,
    Football,
    Diya,
    Rose,
    Butterfly,
    Rabbit,
    Umbrella,
    Kabutar,
    Bucket,
    Joker,
    Star,
    Coin,
}

impl Symbol {
    pub const ALL: [Symbol; 12] = [
        Symbol::Cow,
        Symbol::Football,
        Symbol::Diya,
        Symbol::Rose,
        Symbol::Butterfly,
        Symbol::Rabbit,
        Symbol::Umbrella,
        Symbol::Kabutar,
        Symbol::Bucket,
        Symbol::Joker,
        Symbol::Star,
        Symbol::Coin,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Symbol::Cow => "cow",
            Symbol::Football => "football",
            Symbol::Diya => "diya",
            Symbol::Rose => "rose",
            Symbol::Butterfly => "butterfly",
            Symbol::Rabbit => "rabbit",
            Symbol::Umbrella => "umbrella",
            Symbol::Kabutar => "kabutar",
            Symbol::Bucket => "bucket",
            Symbol::Joker => "joker",
            Symbol::Star => "star",
            Symbol::Coin => "coin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|s| s.name() == raw)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a wager backs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    Side(Side),
    Symbols(Vec<Symbol>),
}

impl Selection {
    pub fn matches(&self, winner: &Outcome) -> bool {
        match (self, winner) {
            (Selection::Side(side), Outcome::Side(won)) => side == won,
            (Selection::Symbols(symbols), Outcome::Symbol(won)) => symbols.contains(won),
            _ => false,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Side(side) => write!(f, "{}", side),
            Selection::Symbols(symbols) => {
                let names: Vec<&str> = symbols.iter().map(|s| s.name()).collect();
                write!(f, "{}", names.join(","))
            }
        }
    }
}

/// A round's declared result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Side(Side),
    Symbol(Symbol),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Side(side) => write!(f, "{}", side),
            Outcome::Symbol(symbol) => write!(f, "{}", symbol),
        }
    }
}

/// Administrator override on a game definition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ForceResult {
    Win,
    Lose,
    A,
    B,
    Andar,
    Bahar,
}

impl ForceResult {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "WIN" => Some(ForceResult::Win),
            "LOSE" => Some(ForceResult::Lose),
            "A" => Some(ForceResult::A),
            "B" => Some(ForceResult::B),
            "ANDAR" => Some(ForceResult::Andar),
            "BAHAR" => Some(ForceResult::Bahar),
            _ => None,
        }
    }

    pub fn as_side(self) -> Option<Side> {
        match self {
            ForceResult::A => Some(Side::A),
            ForceResult::B => Some(Side::B),
            ForceResult::Andar => Some(Side::Andar),
            ForceResult::Bahar => Some(Side::Bahar),
            ForceResult::Win | ForceResult::Lose => None,
        }
    }

    /// Whether the override is meaningful for the game; games without a
    /// round engine only accept WIN/LOSE
    pub fn fits(self, kind: Option<GameKind>) -> bool {
        match (kind, self.as_side()) {
            (Some(kind), Some(side)) => kind.sides().contains(&side),
            (Some(kind), None) => kind.sides().is_empty(),
            (None, side) => side.is_none(),
        }
    }
}

impl fmt::Display for ForceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_side() {
            Some(side) => write!(f, "{}", side),
            None if *self == ForceResult::Win => write!(f, "WIN"),
            None => write!(f, "LOSE"),
        }
    }
}

/// Versioned game configuration, read fresh on every outcome decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameDefinition {
    pub slug: String,
    pub name: String,
    pub is_active: bool,
    /// Win probability in percent, 0..=100
    pub rtp: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_result: Option<ForceResult>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl GameDefinition {
    pub fn kind(&self) -> Option<GameKind> {
        GameKind::from_slug(&self.slug)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    Betting,
    Closed,
}

/// Cards shown at close of an Andar Bahar round
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DealtCards {
    pub andar: Card,
    pub bahar: Card,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub round_id: String,
    pub game: GameKind,
    pub status: RoundStatus,
    /// Public card revealed at open (Andar Bahar)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joker: Option<Card>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dealt: Option<DealtCards>,
    /// Customer a personal picture round belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<AccountId>,
    /// Definition version in force when the round opened
    pub game_version: u64,
    pub opened_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub settled: bool,
}

impl Round {
    pub fn is_open(&self) -> bool {
        self.status == RoundStatus::Betting
    }
}

/// One customer's stake on a round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wager {
    pub wager_id: String,
    pub round_id: String,
    pub game: GameKind,
    pub account: AccountId,
    pub selection: Selection,
    pub amount: Amount,
    pub odds: Odds,
    pub state: WagerState,
    pub payout: Amount,
    pub placed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_roundtrip() {
        for kind in GameKind::ALL {
            assert_eq!(GameKind::from_slug(kind.slug()), Some(kind));
        }
        assert_eq!(GameKind::from_slug("roulette"), None);
        assert_eq!(serde_json::to_string(&GameKind::TeenPattiAb).unwrap(), "\"teen-patti-ab\"");
    }

    #[test]
    fn test_force_fits_family() {
        assert!(ForceResult::Andar.fits(Some(GameKind::AndarBahar)));
        assert!(!ForceResult::A.fits(Some(GameKind::AndarBahar)));
        assert!(ForceResult::Win.fits(Some(GameKind::PappuPlayingPictures)));
        assert!(!ForceResult::Win.fits(Some(GameKind::TeenPattiAb)));
        assert!(ForceResult::Lose.fits(None));
        assert!(!ForceResult::B.fits(None));
    }

    #[test]
    fn test_selection_matches() {
        let pick = Selection::Symbols(vec![Symbol::Cow, Symbol::Star]);
        assert!(pick.matches(&Outcome::Symbol(Symbol::Star)));
        assert!(!pick.matches(&Outcome::Symbol(Symbol::Coin)));
        assert!(Selection::Side(Side::A).matches(&Outcome::Side(Side::A)));
        assert!(!Selection::Side(Side::A).matches(&Outcome::Side(Side::B)));
    }
}
