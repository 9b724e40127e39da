//! Wagerbook - wallet ledger and game-round settlement engine
//!
//! Moves money down a SUPER_ADMIN → ADMIN → CLIENT → CUSTOMER hierarchy,
//! decides game outcomes under an administrator-controlled RTP and override,
//! and settles rounds and matka markets against the ledger atomically.

pub mod accounts;
pub mod common;
pub mod config;
pub mod errors;
pub mod factory;
pub mod games;
pub mod ledger;
pub mod locks;
pub mod matka;
pub mod metrics;
pub mod reports;
pub mod storage;
pub mod transfer;

pub use accounts::{Account, AccountRegistry, Role};
pub use common::{AccountId, Amount, Odds, WagerState};
pub use config::WagerConfig;
pub use errors::{StorageError, WagerError, WagerResult};
pub use factory::{Bootstrap, WagerCore};
pub use games::{GameKind, Outcome, Selection, Side, Symbol};
pub use ledger::{Ledger, LedgerEntry, LogType};
pub use reports::{ProfitLoss, ReportPeriod};
pub use transfer::{TransferEngine, TransferKind};
