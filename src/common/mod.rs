//! Common utilities and shared functionality
//!
//! Money, identifiers and key helpers used across the ledger, rounds and matka.

pub mod types;

pub use types::{AccountId, Amount, Odds, WagerState};
