pub mod cards;
pub mod catalog;
pub mod oracle;
pub mod rounds;
pub mod settlement;
pub mod types;

pub use catalog::{ControlUpdate, CustomerGameControl, GameCatalog};
pub use oracle::OutcomeOracle;
pub use rounds::RoundEngine;
pub use settlement::{BetRecord, SettlementProcessor, SettlementReport, WagerOutcome};
pub use types::*;
