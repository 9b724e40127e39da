//! Wiring for the wagering core
//!
//! Centralizes construction so the binary, tests and embedding services all
//! share one store, one lock table and one set of counters.

use crate::{
    accounts::{Account, AccountRegistry},
    config::WagerConfig,
    errors::WagerResult,
    games::{GameCatalog, GameDefinition, OutcomeOracle, RoundEngine, SettlementProcessor},
    ledger::Ledger,
    locks::LockTable,
    matka::{MatkaEngine, MatkaMarket},
    metrics::CoreMetrics,
    reports::ReportService,
    storage::Db,
    transfer::TransferEngine,
};
use std::sync::Arc;
use tracing::info;

/// Result of seeding a fresh store
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub super_admin: Account,
    pub games_seeded: Vec<GameDefinition>,
    pub markets_seeded: Vec<MatkaMarket>,
}

/// Every core service over one shared store
pub struct WagerCore {
    config: WagerConfig,
    accounts: Arc<AccountRegistry>,
    ledger: Arc<Ledger>,
    transfers: Arc<TransferEngine>,
    catalog: Arc<GameCatalog>,
    oracle: Arc<OutcomeOracle>,
    settlement: Arc<SettlementProcessor>,
    rounds: Arc<RoundEngine>,
    matka: Arc<MatkaEngine>,
    reports: Arc<ReportService>,
    metrics: Arc<CoreMetrics>,
}

impl WagerCore {
    /// Validate the configuration, open its store and assemble the services
    pub fn open(config: WagerConfig) -> WagerResult<Self> {
        config.validate()?;
        let db = Db::open(&config.storage)?;
        Ok(Self::with_db(config, db))
    }

    /// Fresh in-memory core with test settings
    pub fn in_memory() -> Self {
        Self::with_db(WagerConfig::testing(), Db::in_memory())
    }

    pub fn with_db(config: WagerConfig, db: Db) -> Self {
        let locks = Arc::new(LockTable::new());
        let metrics = Arc::new(CoreMetrics::with_enabled(config.monitoring.enable_metrics));
        let oracle = Arc::new(OutcomeOracle::new());

        let accounts = Arc::new(AccountRegistry::new(db.clone(), locks.clone()));
        let ledger = Arc::new(Ledger::new(db.clone(), accounts.clone(), locks.clone()));
        let transfers = Arc::new(TransferEngine::new(
            db.clone(),
            accounts.clone(),
            ledger.clone(),
            locks.clone(),
            metrics.clone(),
        ));
        let catalog = Arc::new(GameCatalog::new(
            db.clone(),
            accounts.clone(),
            locks.clone(),
            config.games.default_rtp,
        ));
        let settlement = Arc::new(SettlementProcessor::new(
            db.clone(),
            ledger.clone(),
            locks.clone(),
            metrics.clone(),
        ));
        let rounds = Arc::new(RoundEngine::new(
            db.clone(),
            accounts.clone(),
            ledger.clone(),
            catalog.clone(),
            oracle.clone(),
            settlement.clone(),
            locks.clone(),
            metrics.clone(),
            config.games.clone(),
        ));
        let matka = Arc::new(MatkaEngine::new(
            db.clone(),
            accounts.clone(),
            ledger.clone(),
            locks,
            metrics.clone(),
            config.matka.clone(),
        ));
        let reports = Arc::new(ReportService::new(db));

        Self {
            config,
            accounts,
            ledger,
            transfers,
            catalog,
            oracle,
            settlement,
            rounds,
            matka,
            reports,
            metrics,
        }
    }

    /// Seed the super admin, default games and configured markets. Safe to
    /// run on every start.
    pub fn bootstrap(&self, admin_name: &str, admin_email: &str) -> WagerResult<Bootstrap> {
        let super_admin = self.accounts.bootstrap_super_admin(admin_name, admin_email)?;
        let games_seeded = self.catalog.ensure_defaults()?;
        let markets_seeded = self.matka.ensure_markets()?;
        info!(
            super_admin = %super_admin.id,
            games = games_seeded.len(),
            markets = markets_seeded.len(),
            "Core bootstrapped"
        );
        Ok(Bootstrap {
            super_admin,
            games_seeded,
            markets_seeded,
        })
    }

    pub fn config(&self) -> &WagerConfig {
        &self.config
    }

    pub fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn transfers(&self) -> &TransferEngine {
        &self.transfers
    }

    pub fn catalog(&self) -> &GameCatalog {
        &self.catalog
    }

    pub fn oracle(&self) -> &OutcomeOracle {
        &self.oracle
    }

    pub fn settlement(&self) -> &SettlementProcessor {
        &self.settlement
    }

    pub fn rounds(&self) -> &RoundEngine {
        &self.rounds
    }

    pub fn matka(&self) -> &MatkaEngine {
        &self.matka
    }

    pub fn reports(&self) -> &ReportService {
        &self.reports
    }

    pub fn metrics(&self) -> &CoreMetrics {
        &self.metrics
    }
}
