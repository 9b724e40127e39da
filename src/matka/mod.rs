pub mod market;
pub mod patti;

pub use market::{BetRequest, MarketStatus, MatkaBet, MatkaEngine, MatkaMarket, MatkaSettlement, Session};
pub use patti::{BetType, MatkaResult};
