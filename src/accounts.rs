//! Account hierarchy
//!
//! SUPER_ADMIN → ADMIN → CLIENT → CUSTOMER. Every account records the
//! account that created it and, materialized at creation time, the ADMIN that
//! owns its branch, so legality checks are single record reads.

use crate::common::types::newest_first;
use crate::common::AccountId;
use crate::errors::{WagerError, WagerResult};
use crate::games::catalog::purge_customer_controls;
use crate::games::settlement::{purge_bet_records, purge_round_wagers};
use crate::ledger::{purge_ledger_entries, stage_open_wallet, wallet_record_key};
use crate::locks::{wallet_key, LockTable};
use crate::matka::market::purge_matka_bets;
use crate::storage::{Db, StoreBatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

const REGISTRY_LOCK: &str = "registry:accounts";
const LIST_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Admin,
    Client,
    Customer,
}

impl Role {
    /// Whether an account of this role may create one of `child`
    pub fn can_create(self, child: Role) -> bool {
        matches!(
            (self, child),
            (Role::SuperAdmin, Role::Admin)
                | (Role::SuperAdmin, Role::Client)
                | (Role::Admin, Role::Client)
                | (Role::Client, Role::Customer)
        )
    }

    fn code_prefix(self) -> &'static str {
        match self {
            Role::SuperAdmin => "SA",
            Role::Admin => "AD",
            Role::Client => "CL",
            Role::Customer => "CS",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().replace('-', "_").as_str() {
            "SUPER_ADMIN" => Some(Role::SuperAdmin),
            "ADMIN" => Some(Role::Admin),
            "CLIENT" => Some(Role::Client),
            "CUSTOMER" => Some(Role::Customer),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::SuperAdmin => write!(f, "SUPER_ADMIN"),
            Role::Admin => write!(f, "ADMIN"),
            Role::Client => write!(f, "CLIENT"),
            Role::Customer => write!(f, "CUSTOMER"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub user_code: String,
    /// Funding parent; `None` only for the super admin
    pub created_by: Option<AccountId>,
    /// ADMIN owning this branch (an ADMIN owns itself)
    pub owner_admin: Option<AccountId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// What a cascading delete removed
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DeleteSummary {
    pub accounts: Vec<AccountId>,
    pub ledger_entries: usize,
    pub bet_records: usize,
    pub round_wagers: usize,
    pub matka_bets: usize,
    pub game_controls: usize,
}

fn account_key(id: &AccountId) -> String {
    format!("account:{}", id)
}

fn email_key(email: &str) -> String {
    format!("account:email:{}", email)
}

fn child_key(parent: &AccountId, child: &AccountId) -> String {
    format!("account:child:{}:{}", parent, child)
}

fn role_key(role: Role, id: &AccountId) -> String {
    format!("account:role:{}:{}", role, id)
}

fn seq_key(role: Role) -> String {
    format!("account:seq:{}", role.code_prefix())
}

/// Marker written while a wager of `account` awaits settlement
pub(crate) fn pending_key(account: &AccountId, wager_id: &str) -> String {
    format!("pending:{}:{}", account, wager_id)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub struct AccountRegistry {
    db: Db,
    locks: Arc<LockTable>,
}

impl AccountRegistry {
    pub fn new(db: Db, locks: Arc<LockTable>) -> Self {
        Self { db, locks }
    }

    /// Create the super admin if none exists yet; returns the existing one otherwise
    pub fn bootstrap_super_admin(&self, name: &str, email: &str) -> WagerResult<Account> {
        let set = self.locks.handles([REGISTRY_LOCK]);
        let _guards = set.acquire();

        if let Some(existing) = self.list_by_role(Role::SuperAdmin)?.into_iter().next() {
            return Ok(existing);
        }
        let account = self.insert_locked(Role::SuperAdmin, name, email, None, None)?;
        info!(account = %account.id, "Super admin bootstrapped");
        Ok(account)
    }

    /// Create a child account of `actor`
    pub fn create_account(&self, actor: &AccountId, role: Role, name: &str, email: &str) -> WagerResult<Account> {
        let parent = self.get(actor)?;
        if !parent.is_active {
            return Err(WagerError::unauthorized(format!("{} is blocked", parent.user_code)));
        }
        if !parent.role.can_create(role) {
            return Err(WagerError::unauthorized(format!("{} may not create {}", parent.role, role)));
        }

        let owner_admin = match (parent.role, role) {
            (Role::SuperAdmin, Role::Client) => None,
            (Role::Admin, _) => Some(parent.id.clone()),
            _ => parent.owner_admin.clone(),
        };

        let set = self.locks.handles([REGISTRY_LOCK]);
        let _guards = set.acquire();
        // the parent may have been deleted since it was read
        if self.find(&parent.id)?.is_none() {
            return Err(WagerError::not_found(format!("account {}", parent.id)));
        }
        let account = self.insert_locked(role, name, email, Some(parent.id.clone()), owner_admin)?;
        info!(
            account = %account.id,
            role = %role,
            user_code = %account.user_code,
            created_by = %actor,
            "Account created"
        );
        Ok(account)
    }

    /// Caller holds the registry lock
    fn insert_locked(
        &self,
        role: Role,
        name: &str,
        email: &str,
        created_by: Option<AccountId>,
        owner_admin: Option<AccountId>,
    ) -> WagerResult<Account> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() {
            return Err(WagerError::validation("name must not be empty"));
        }
        if !email.contains('@') {
            return Err(WagerError::validation(format!("invalid email '{}'", email)));
        }
        if self.db.contains(&email_key(&email))? {
            return Err(WagerError::validation(format!("email '{}' already registered", email)));
        }

        let seq = self.db.get_json::<u64>(&seq_key(role))?.unwrap_or(0) + 1;
        let id = AccountId::generate();
        // an ADMIN owns its own branch
        let owner_admin = if role == Role::Admin { Some(id.clone()) } else { owner_admin };
        let account = Account {
            id: id.clone(),
            role,
            name: name.to_string(),
            email: email.clone(),
            user_code: format!("{}{:04}", role.code_prefix(), seq),
            created_by: created_by.clone(),
            owner_admin,
            is_active: true,
            created_at: Utc::now(),
        };

        let mut batch = StoreBatch::new();
        batch.put_json(account_key(&id), &account)?;
        batch.put_json(seq_key(role), &seq)?;
        batch.put_raw(email_key(&email), id.as_str().as_bytes().to_vec());
        batch.put_raw(role_key(role, &id), id.as_str().as_bytes().to_vec());
        if let Some(parent) = &created_by {
            batch.put_raw(child_key(parent, &id), id.as_str().as_bytes().to_vec());
        }
        stage_open_wallet(&mut batch, &id)?;
        self.db.commit(batch)?;
        Ok(account)
    }

    pub fn find(&self, id: &AccountId) -> WagerResult<Option<Account>> {
        self.db.get_json(&account_key(id))
    }

    pub fn get(&self, id: &AccountId) -> WagerResult<Account> {
        self.find(id)?
            .ok_or_else(|| WagerError::not_found(format!("account {}", id)))
    }

    pub fn find_by_email(&self, email: &str) -> WagerResult<Option<Account>> {
        match self.db.get_string(&email_key(&normalize_email(email)))? {
            Some(id) => self.find(&AccountId::new(id)),
            None => Ok(None),
        }
    }

    pub fn list_by_role(&self, role: Role) -> WagerResult<Vec<Account>> {
        let prefix = format!("account:role:{}:", role);
        self.load_all(self.db.scan_values(&prefix, LIST_LIMIT)?)
    }

    /// Direct children: an admin's clients, a client's customers
    pub fn children(&self, parent: &AccountId) -> WagerResult<Vec<Account>> {
        let prefix = format!("account:child:{}:", parent);
        let mut accounts = self.load_all(self.db.scan_values(&prefix, LIST_LIMIT)?)?;
        accounts.sort_by_key(|a| newest_first(a.created_at));
        Ok(accounts)
    }

    fn load_all(&self, ids: Vec<String>) -> WagerResult<Vec<Account>> {
        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(account) = self.find(&AccountId::new(id))? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    /// Block or unblock an account; super admin only
    pub fn set_active(&self, actor: &AccountId, target: &AccountId, active: bool) -> WagerResult<Account> {
        let actor = self.get(actor)?;
        if actor.role != Role::SuperAdmin {
            return Err(WagerError::unauthorized("only the super admin may block accounts"));
        }

        let set = self.locks.handles([REGISTRY_LOCK]);
        let _guards = set.acquire();
        let mut account = self.get(target)?;
        if account.role == Role::SuperAdmin {
            return Err(WagerError::validation("the super admin cannot be blocked"));
        }
        account.is_active = active;

        let mut batch = StoreBatch::new();
        batch.put_json(account_key(target), &account)?;
        self.db.commit(batch)?;
        info!(account = %target, active, "Account status changed");
        Ok(account)
    }

    pub fn can_manage_customer(&self, actor: &AccountId, customer: &AccountId) -> WagerResult<bool> {
        let actor = self.get(actor)?;
        let customer = self.get(customer)?;
        if customer.role != Role::Customer {
            return Ok(false);
        }
        Ok(match actor.role {
            Role::SuperAdmin => true,
            Role::Admin => customer.owner_admin.as_ref() == Some(&actor.id),
            Role::Client => customer.created_by.as_ref() == Some(&actor.id),
            Role::Customer => false,
        })
    }

    pub fn can_manage_client(&self, actor: &AccountId, client: &AccountId) -> WagerResult<bool> {
        let actor = self.get(actor)?;
        let client = self.get(client)?;
        if client.role != Role::Client {
            return Ok(false);
        }
        Ok(match actor.role {
            Role::SuperAdmin => true,
            Role::Admin => client.created_by.as_ref() == Some(&actor.id),
            Role::Client | Role::Customer => false,
        })
    }

    /// Delete a customer with its wallet, ledger entries and bet history
    pub fn delete_customer(&self, actor: &AccountId, customer: &AccountId) -> WagerResult<DeleteSummary> {
        let target = self.get(customer)?;
        if target.role != Role::Customer {
            return Err(WagerError::validation(format!("{} is not a customer", target.user_code)));
        }
        let actor_account = self.get(actor)?;
        let allowed = match actor_account.role {
            Role::SuperAdmin => true,
            Role::Client => target.created_by.as_ref() == Some(actor),
            // an admin reaches customers through its own clients
            Role::Admin => match &target.created_by {
                Some(client) => self.find(client)?.and_then(|c| c.created_by).as_ref() == Some(actor),
                None => false,
            },
            Role::Customer => false,
        };
        if !allowed {
            return Err(WagerError::unauthorized(format!(
                "{} may not delete {}",
                actor_account.user_code, target.user_code
            )));
        }

        self.delete_cascade(customer, false)
    }

    /// Delete a client and every customer under it
    pub fn delete_client(&self, actor: &AccountId, client: &AccountId) -> WagerResult<DeleteSummary> {
        let target = self.get(client)?;
        if target.role != Role::Client {
            return Err(WagerError::validation(format!("{} is not a client", target.user_code)));
        }
        if !self.can_manage_client(actor, client)? {
            return Err(WagerError::unauthorized(format!("{} may not delete {}", actor, target.user_code)));
        }

        self.delete_cascade(client, true)
    }

    /// Registry lock first, so no child can be created between reading the
    /// branch and committing its removal; wallet locks sort after it.
    fn delete_cascade(&self, target: &AccountId, with_children: bool) -> WagerResult<DeleteSummary> {
        let registry = self.locks.handles([REGISTRY_LOCK]);
        let _registry_guard = registry.acquire();

        let target = self.get(target)?;
        let mut doomed = if with_children {
            self.children(&target.id)?
        } else {
            Vec::new()
        };
        doomed.push(target);

        let wallets = self.locks.handles(doomed.iter().map(|a| wallet_key(&a.id)));
        let _wallet_guards = wallets.acquire();

        for account in &doomed {
            if !self.db.scan_keys(&format!("pending:{}:", account.id), 1)?.is_empty() {
                warn!(account = %account.id, "Delete refused: pending wagers");
                return Err(WagerError::validation(format!(
                    "{} has wagers awaiting settlement",
                    account.user_code
                )));
            }
        }

        let mut batch = StoreBatch::new();
        let mut summary = DeleteSummary::default();
        for account in &doomed {
            summary.ledger_entries += purge_ledger_entries(&self.db, &mut batch, &account.id)?;
            summary.bet_records += purge_bet_records(&self.db, &mut batch, &account.id)?;
            summary.round_wagers += purge_round_wagers(&self.db, &mut batch, &account.id)?;
            summary.matka_bets += purge_matka_bets(&self.db, &mut batch, &account.id)?;
            summary.game_controls += purge_customer_controls(&self.db, &mut batch, &account.id)?;

            batch.delete(account_key(&account.id));
            batch.delete(email_key(&account.email));
            batch.delete(role_key(account.role, &account.id));
            batch.delete(wallet_record_key(&account.id));
            if let Some(parent) = &account.created_by {
                batch.delete(child_key(parent, &account.id));
            }
            summary.accounts.push(account.id.clone());
        }
        self.db.commit(batch)?;

        info!(
            accounts = summary.accounts.len(),
            ledger_entries = summary.ledger_entries,
            bet_records = summary.bet_records,
            round_wagers = summary.round_wagers,
            matka_bets = summary.matka_bets,
            "Accounts deleted"
        );
        Ok(summary)
    }
}
