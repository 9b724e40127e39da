//! Outcome oracle
//!
//! Decides round results from a game definition: an administrator override
//! always wins, otherwise a uniform draw against the RTP (picture games) or
//! among the valid sides (binary games). The generator is seeded from OS
//! entropy once and never from round ids, timestamps or other public data.

use crate::errors::{WagerError, WagerResult};
use crate::games::cards::Card;
use crate::games::types::{DealtCards, ForceResult, GameDefinition, Side, Symbol};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

pub struct OutcomeOracle {
    rng: Mutex<StdRng>,
}

impl OutcomeOracle {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    /// Win/lose for continuous-RTP games: `draw <= rtp` with `draw` uniform in [0, 100)
    pub fn decide_win(&self, game: &GameDefinition) -> bool {
        match game.force_result {
            Some(ForceResult::Win) => true,
            Some(ForceResult::Lose) => false,
            _ => {
                let draw: f64 = self.with_rng(|rng| rng.gen_range(0.0..100.0));
                draw <= f64::from(game.rtp)
            }
        }
    }

    /// The override side, when the definition names one of `valid_sides`
    pub fn forced_side(&self, game: &GameDefinition, valid_sides: &[Side]) -> Option<Side> {
        game.force_result
            .and_then(ForceResult::as_side)
            .filter(|side| valid_sides.contains(side))
    }

    /// Winning side for binary games
    pub fn decide_side(&self, game: &GameDefinition, valid_sides: &[Side]) -> WagerResult<Side> {
        if let Some(side) = self.forced_side(game, valid_sides) {
            return Ok(side);
        }
        self.with_rng(|rng| valid_sides.choose(rng).copied())
            .ok_or_else(|| WagerError::validation(format!("{} has no sides to draw from", game.slug)))
    }

    /// Public card revealed when an Andar Bahar round opens
    pub fn draw_joker(&self) -> WagerResult<Card> {
        let deck = Card::deck();
        self.with_rng(|rng| deck.choose(rng).copied())
            .ok_or_else(|| WagerError::validation("empty deck"))
    }

    /// Deal one matching-rank card and one other card, one per side; the
    /// side given the matching card is `winner`
    pub fn deal_andar_bahar(&self, joker: Card, winner: Side) -> WagerResult<DealtCards> {
        let deck: Vec<Card> = Card::deck().into_iter().filter(|c| *c != joker).collect();
        let matching: Vec<Card> = deck.iter().copied().filter(|c| c.rank == joker.rank).collect();
        let other: Vec<Card> = deck.iter().copied().filter(|c| c.rank != joker.rank).collect();

        let (hit, miss) = self.with_rng(|rng| (matching.choose(rng).copied(), other.choose(rng).copied()));
        let (hit, miss) = hit
            .zip(miss)
            .ok_or_else(|| WagerError::validation("deck cannot produce a deal"))?;

        match winner {
            Side::Andar => Ok(DealtCards { andar: hit, bahar: miss }),
            Side::Bahar => Ok(DealtCards { andar: miss, bahar: hit }),
            other => Err(WagerError::validation(format!("{} is not an Andar Bahar side", other))),
        }
    }

    /// Result symbol for a picture wager: a winning draw lands on one of the
    /// selected symbols, a losing draw on any other
    pub fn resolve_symbol(&self, game: &GameDefinition, selected: &[Symbol]) -> Symbol {
        let pool: Vec<Symbol> = if self.decide_win(game) {
            selected.to_vec()
        } else {
            Symbol::ALL.into_iter().filter(|s| !selected.contains(s)).collect()
        };
        self.with_rng(|rng| pool.choose(rng).copied().unwrap_or(Symbol::Joker))
    }

    /// Uniform symbol, used when a round closes with no wager on it
    pub fn any_symbol(&self) -> Symbol {
        self.with_rng(|rng| Symbol::ALL.choose(rng).copied().unwrap_or(Symbol::Joker))
    }
}

impl Default for OutcomeOracle {
    fn default() -> Self {
        Self::new()
    }
}
