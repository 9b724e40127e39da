//! Game catalog: definitions, admin controls and per-customer switches
//!
//! Definitions are read straight from the store on every call; nothing here
//! caches a definition across rounds.

use crate::accounts::AccountRegistry;
use crate::common::AccountId;
use crate::errors::{WagerError, WagerResult};
use crate::games::types::{ForceResult, GameDefinition, GameKind};
use crate::locks::{game_key, LockTable};
use crate::storage::{Db, StoreBatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Partial update of a game's outcome controls
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlUpdate {
    pub rtp: Option<u8>,
    /// `Some(None)` clears the override
    pub force_result: Option<Option<ForceResult>>,
}

/// A customer's switch for one game; absent means enabled
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerGameControl {
    pub customer: AccountId,
    pub slug: String,
    pub enabled: bool,
    pub updated_by: AccountId,
    pub updated_at: DateTime<Utc>,
}

fn definition_key(slug: &str) -> String {
    format!("game:def:{}", slug)
}

fn control_key(customer: &AccountId, slug: &str) -> String {
    format!("game:control:{}:{}", customer, slug)
}

/// Stage removal of every game switch of `customer`
pub(crate) fn purge_customer_controls(db: &Db, batch: &mut StoreBatch, customer: &AccountId) -> WagerResult<usize> {
    let keys = db.scan_keys(&format!("game:control:{}:", customer), usize::MAX)?;
    let removed = keys.len();
    for key in keys {
        batch.delete(key);
    }
    Ok(removed)
}

/// Lower-case, spaces to `-`, anything else outside `[a-z0-9_-]` dropped
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

pub struct GameCatalog {
    db: Db,
    accounts: Arc<AccountRegistry>,
    locks: Arc<LockTable>,
    default_rtp: u8,
}

impl GameCatalog {
    pub fn new(db: Db, accounts: Arc<AccountRegistry>, locks: Arc<LockTable>, default_rtp: u8) -> Self {
        Self {
            db,
            accounts,
            locks,
            default_rtp,
        }
    }

    fn fresh(&self, slug: &str, name: &str) -> GameDefinition {
        GameDefinition {
            slug: slug.to_string(),
            name: name.to_string(),
            is_active: true,
            rtp: self.default_rtp,
            force_result: None,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    /// Seed the built-in games; existing definitions are left alone
    pub fn ensure_defaults(&self) -> WagerResult<Vec<GameDefinition>> {
        let mut seeded = Vec::new();
        for kind in GameKind::ALL {
            let set = self.locks.handles([game_key(kind.slug())]);
            let _guards = set.acquire();
            if self.find(kind.slug())?.is_some() {
                continue;
            }
            let def = self.fresh(kind.slug(), kind.display_name());
            self.store(&def)?;
            info!(slug = %def.slug, "Default game seeded");
            seeded.push(def);
        }
        Ok(seeded)
    }

    pub fn create_game(&self, name: &str) -> WagerResult<GameDefinition> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(WagerError::validation("game name must contain letters or digits"));
        }
        let set = self.locks.handles([game_key(&slug)]);
        let _guards = set.acquire();
        if self.find(&slug)?.is_some() {
            return Err(WagerError::validation(format!("game '{}' already exists", slug)));
        }
        let def = self.fresh(&slug, name.trim());
        self.store(&def)?;
        info!(slug = %slug, "Game created");
        Ok(def)
    }

    pub fn find(&self, slug: &str) -> WagerResult<Option<GameDefinition>> {
        self.db.get_json(&definition_key(slug))
    }

    pub fn get(&self, slug: &str) -> WagerResult<GameDefinition> {
        self.find(slug)?
            .ok_or_else(|| WagerError::not_found(format!("game {}", slug)))
    }

    pub fn list(&self) -> WagerResult<Vec<GameDefinition>> {
        self.db.scan_json("game:def:", usize::MAX)
    }

    /// Flip the active flag
    pub fn toggle(&self, slug: &str) -> WagerResult<GameDefinition> {
        self.update(slug, |def| {
            def.is_active = !def.is_active;
            Ok(())
        })
    }

    pub fn set_control(&self, slug: &str, update: ControlUpdate) -> WagerResult<GameDefinition> {
        self.update(slug, |def| {
            if let Some(rtp) = update.rtp {
                if rtp > 100 {
                    return Err(WagerError::validation(format!("rtp {} outside 0..=100", rtp)));
                }
                def.rtp = rtp;
            }
            if let Some(force) = update.force_result {
                if let Some(value) = force {
                    if !value.fits(def.kind()) {
                        return Err(WagerError::validation(format!(
                            "force result {} does not apply to {}",
                            value, def.slug
                        )));
                    }
                }
                def.force_result = force;
            }
            Ok(())
        })
    }

    fn update(
        &self,
        slug: &str,
        apply: impl FnOnce(&mut GameDefinition) -> WagerResult<()>,
    ) -> WagerResult<GameDefinition> {
        let set = self.locks.handles([game_key(slug)]);
        let _guards = set.acquire();
        let mut def = self.get(slug)?;
        apply(&mut def)?;
        def.version += 1;
        def.updated_at = Utc::now();
        self.store(&def)?;
        info!(
            slug = %slug,
            version = def.version,
            active = def.is_active,
            rtp = def.rtp,
            force = ?def.force_result,
            "Game definition updated"
        );
        Ok(def)
    }

    fn store(&self, def: &GameDefinition) -> WagerResult<()> {
        let mut batch = StoreBatch::new();
        batch.put_json(definition_key(&def.slug), def)?;
        self.db.commit(batch)
    }

    /// Enable or disable one game for one customer
    pub fn set_customer_game_enabled(
        &self,
        actor: &AccountId,
        customer: &AccountId,
        slug: &str,
        enabled: bool,
    ) -> WagerResult<CustomerGameControl> {
        if !self.accounts.can_manage_customer(actor, customer)? {
            return Err(WagerError::unauthorized(format!("{} does not manage {}", actor, customer)));
        }
        self.get(slug)?;

        let control = CustomerGameControl {
            customer: customer.clone(),
            slug: slug.to_string(),
            enabled,
            updated_by: actor.clone(),
            updated_at: Utc::now(),
        };
        let mut batch = StoreBatch::new();
        batch.put_json(control_key(customer, slug), &control)?;
        self.db.commit(batch)?;
        info!(customer = %customer, slug = %slug, enabled, "Customer game control set");
        Ok(control)
    }

    pub fn is_enabled_for(&self, customer: &AccountId, slug: &str) -> WagerResult<bool> {
        Ok(self
            .db
            .get_json::<CustomerGameControl>(&control_key(customer, slug))?
            .map_or(true, |c| c.enabled))
    }

    pub fn customer_controls(&self, customer: &AccountId) -> WagerResult<Vec<CustomerGameControl>> {
        self.db.scan_json(&format!("game:control:{}:", customer), usize::MAX)
    }
}
