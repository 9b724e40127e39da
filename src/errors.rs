//! Error types for the wagering core
//!
//! Every public operation returns `WagerResult<T>`. Failures raised before any
//! mutation (validation, funds, round state) leave the store untouched.

use thiserror::Error;

/// Root error type for all core operations
#[derive(Debug, Error)]
pub enum WagerError {
    /// Malformed amount, unknown selection, bad number format
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: u64, required: u64 },

    #[error("Round not open: {0}")]
    RoundNotOpen(String),

    #[error("Account {account} already has a wager on round {round_id}")]
    DuplicateWager { account: String, round_id: String },

    #[error("Wager of {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: u64, minimum: u64 },

    #[error("Market {market_id} {session} session is closed")]
    MarketSessionClosed { market_id: String, session: String },

    /// Lost a race to close/settle, or a conditional update no longer holds
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The actor is not allowed to act on the target account
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Game is off: {0}")]
    GameInactive(String),

    #[error("Game {slug} is disabled for account {account}")]
    GameDisabled { account: String, slug: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Storage system errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

impl WagerError {
    /// Failures the caller should treat as "re-read state" rather than surface
    pub fn is_benign(&self) -> bool {
        matches!(self, WagerError::ConcurrencyConflict(_))
    }

    /// Failures raised before any state was touched
    pub fn is_rejection(&self) -> bool {
        !matches!(self, WagerError::Storage(_) | WagerError::Configuration(_))
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        WagerError::Validation(msg.into())
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        WagerError::NotFound(what.into())
    }

    pub(crate) fn unauthorized(msg: impl Into<String>) -> Self {
        WagerError::Unauthorized(msg.into())
    }
}

// External error conversions
impl From<rocksdb::Error> for WagerError {
    fn from(e: rocksdb::Error) -> Self {
        WagerError::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<std::io::Error> for WagerError {
    fn from(e: std::io::Error) -> Self {
        WagerError::Storage(StorageError::ReadFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for WagerError {
    fn from(e: serde_json::Error) -> Self {
        WagerError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

impl From<toml::de::Error> for WagerError {
    fn from(e: toml::de::Error) -> Self {
        WagerError::Configuration(e.to_string())
    }
}

// Convenience type alias for Results
pub type WagerResult<T> = Result<T, WagerError>;
