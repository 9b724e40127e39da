//! Configuration management with validation and defaults
//!
//! Loaded from an optional TOML file, then overridden by `WAGER_*`
//! environment variables, then validated.

use crate::errors::{WagerError, WagerResult};
use crate::games::types::GameKind;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Top-level configuration for the wagering core
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WagerConfig {
    pub storage: StorageConfig,
    pub games: GamesConfig,
    pub matka: MatkaConfig,
    pub monitoring: MonitoringConfig,
}

/// Storage backend selection
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    RocksDb,
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Snappy,
    Lz4,
    Zstd,
}

/// Storage configuration with optimization settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    pub max_write_buffer_number: usize,
    pub compression_type: CompressionType,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
            data_directory: "./DB/wager_data".to_string(),
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            compression_type: CompressionType::Lz4,
            clear_on_start: false,
        }
    }
}

/// Per-game wagering rules
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameRules {
    /// Minimum stake in whole currency units
    pub min_wager: u64,
    /// Payout multiplier in hundredths (198 = 1.98x)
    pub odds_hundredths: u32,
    /// Close and settle the round as soon as the first wager lands
    pub auto_close_on_wager: bool,
    /// Upper bound on symbols a single wager may select (picture games)
    pub max_selections: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GamesConfig {
    pub pappu: GameRules,
    pub teen_patti: GameRules,
    pub andar_bahar: GameRules,
    /// Default return-to-player for newly created games
    pub default_rtp: u8,
    /// Upper bound for round history queries
    pub history_limit: usize,
}

impl Default for GamesConfig {
    fn default() -> Self {
        Self {
            pappu: GameRules {
                min_wager: 20,
                odds_hundredths: 1000,
                auto_close_on_wager: false,
                max_selections: 5,
            },
            teen_patti: GameRules {
                min_wager: 50,
                odds_hundredths: 198,
                auto_close_on_wager: false,
                max_selections: 1,
            },
            andar_bahar: GameRules {
                min_wager: 50,
                odds_hundredths: 198,
                auto_close_on_wager: false,
                max_selections: 1,
            },
            default_rtp: 90,
            history_limit: 50,
        }
    }
}

impl GamesConfig {
    pub fn rules(&self, kind: GameKind) -> &GameRules {
        match kind {
            GameKind::PappuPlayingPictures => &self.pappu,
            GameKind::TeenPattiAb => &self.teen_patti,
            GameKind::AndarBahar => &self.andar_bahar,
        }
    }
}

/// Seed entry for a matka market
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarketSeed {
    pub market_id: String,
    pub name: String,
    pub open_time: String,
    pub close_time: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatkaConfig {
    pub min_wager: u64,
    pub payout_hundredths: u32,
    pub markets: Vec<MarketSeed>,
}

impl Default for MatkaConfig {
    fn default() -> Self {
        let seed = |id: &str, name: &str, open: &str, close: &str| MarketSeed {
            market_id: id.to_string(),
            name: name.to_string(),
            open_time: open.to_string(),
            close_time: close.to_string(),
        };
        Self {
            min_wager: 20,
            payout_hundredths: 950,
            markets: vec![
                seed("tara_mumbai_day", "Tara Mumbai Day", "10:00 AM", "02:30 PM"),
                seed("tara_mumbai_night", "Tara Mumbai Night", "05:30 PM", "10:30 PM"),
                seed("kalyan_day", "Kalyan", "11:30 AM", "03:30 PM"),
                seed("kalyan_night", "Kalyan Night", "06:30 PM", "11:00 PM"),
            ],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Monitoring and metrics configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    pub log_level: LogLevel,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            log_level: LogLevel::Info,
        }
    }
}

impl WagerConfig {
    /// Persistent RocksDB store, data preserved across restarts
    pub fn production() -> Self {
        Self {
            storage: StorageConfig {
                write_buffer_size_mb: 128,
                clear_on_start: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// In-memory store for tests and simulations
    pub fn testing() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                data_directory: ":memory:".to_string(),
                clear_on_start: true,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load configuration from an optional TOML file plus environment overrides
    pub fn load(path: Option<&Path>) -> WagerResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &Path) -> WagerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WagerError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env_overrides(&mut self) -> WagerResult<()> {
        if let Ok(dir) = env::var("WAGER_DATA_DIR") {
            self.storage.data_directory = dir;
        }
        if let Ok(backend) = env::var("WAGER_STORAGE_BACKEND") {
            self.storage.backend = match backend.to_lowercase().as_str() {
                "rocksdb" => StorageBackend::RocksDb,
                "memory" => StorageBackend::Memory,
                _ => {
                    return Err(WagerError::Configuration(format!(
                        "WAGER_STORAGE_BACKEND: unknown backend '{}'",
                        backend
                    )))
                }
            };
        }
        if let Ok(min) = env::var("WAGER_MATKA_MIN_WAGER") {
            self.matka.min_wager = min.parse().map_err(|_| {
                WagerError::Configuration(format!("WAGER_MATKA_MIN_WAGER: invalid number '{}'", min))
            })?;
        }
        if let Ok(flag) = env::var("WAGER_ENABLE_METRICS") {
            self.monitoring.enable_metrics = match flag.to_lowercase().as_str() {
                "1" | "true" | "on" => true,
                "0" | "false" | "off" => false,
                _ => {
                    return Err(WagerError::Configuration(format!(
                        "WAGER_ENABLE_METRICS: expected true or false, got '{}'",
                        flag
                    )))
                }
            };
        }
        if let Ok(level) = env::var("WAGER_LOG_LEVEL") {
            self.monitoring.log_level = match level.to_lowercase().as_str() {
                "error" => LogLevel::Error,
                "warn" => LogLevel::Warn,
                "info" => LogLevel::Info,
                "debug" => LogLevel::Debug,
                "trace" => LogLevel::Trace,
                _ => {
                    return Err(WagerError::Configuration(format!(
                        "WAGER_LOG_LEVEL: unknown level '{}'",
                        level
                    )))
                }
            };
        }
        Ok(())
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> WagerResult<()> {
        if self.storage.backend == StorageBackend::RocksDb && self.storage.data_directory.is_empty() {
            return Err(WagerError::Configuration(
                "data_directory must be set for the rocksdb backend".to_string(),
            ));
        }

        for kind in GameKind::ALL {
            let rules = self.games.rules(kind);
            if rules.min_wager == 0 {
                return Err(WagerError::Configuration(format!("{}: min_wager must be > 0", kind)));
            }
            if rules.odds_hundredths <= 100 {
                return Err(WagerError::Configuration(format!(
                    "{}: odds must pay more than the stake",
                    kind
                )));
            }
            if rules.max_selections == 0 {
                return Err(WagerError::Configuration(format!(
                    "{}: max_selections must be > 0",
                    kind
                )));
            }
        }

        if self.games.default_rtp > 100 {
            return Err(WagerError::Configuration("default_rtp must be within 0..=100".to_string()));
        }

        if self.matka.min_wager == 0 || self.matka.payout_hundredths <= 100 {
            return Err(WagerError::Configuration(
                "matka min_wager must be > 0 and payout must exceed the stake".to_string(),
            ));
        }

        Ok(())
    }
}
