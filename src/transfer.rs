//! Transfer engine
//!
//! Moves money between exactly two accounts: the debit, the credit and the
//! ledger entry are staged into one batch and committed together while both
//! wallet locks are held.

use crate::accounts::{Account, AccountRegistry, Role};
use crate::common::{AccountId, Amount};
use crate::errors::{WagerError, WagerResult};
use crate::ledger::{EntryKind, Ledger, LedgerEntry, LogType, DEFAULT_LOG_LIMIT};
use crate::locks::{wallet_key, LockTable};
use crate::metrics::CoreMetrics;
use crate::storage::{Db, StoreBatch};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Audit window scanned when filtering logs by visibility
const AUDIT_SCAN_WINDOW: usize = 5_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferKind {
    /// Parent funds a child; the actor is the payer
    Seed,
    /// Parent pulls funds back from a child; the actor is the payee
    Withdraw,
    /// Super admin moves funds between any two accounts
    Transfer,
}

impl TransferKind {
    fn entry_kind(self) -> EntryKind {
        match self {
            TransferKind::Seed => EntryKind::Seed,
            TransferKind::Withdraw => EntryKind::Withdraw,
            TransferKind::Transfer => EntryKind::Transfer,
        }
    }

    fn log(self) -> LogType {
        match self {
            TransferKind::Withdraw => LogType::Withdraw,
            TransferKind::Seed | TransferKind::Transfer => LogType::Deposit,
        }
    }
}

pub struct TransferEngine {
    db: Db,
    accounts: Arc<AccountRegistry>,
    ledger: Arc<Ledger>,
    locks: Arc<LockTable>,
    metrics: Arc<CoreMetrics>,
}

impl TransferEngine {
    pub fn new(
        db: Db,
        accounts: Arc<AccountRegistry>,
        ledger: Arc<Ledger>,
        locks: Arc<LockTable>,
        metrics: Arc<CoreMetrics>,
    ) -> Self {
        Self {
            db,
            accounts,
            ledger,
            locks,
            metrics,
        }
    }

    /// Move `amount` from `from` to `to` as one atomic unit
    pub fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
        kind: TransferKind,
        actor: &AccountId,
    ) -> WagerResult<LedgerEntry> {
        if amount.is_zero() {
            return Err(WagerError::validation("amount must be greater than zero"));
        }
        if from == to {
            return Err(WagerError::validation("cannot transfer to the same account"));
        }

        let payer = self.accounts.get(from)?;
        let payee = self.accounts.get(to)?;
        let acting = self.accounts.get(actor)?;
        for account in [&payer, &payee, &acting] {
            if !account.is_active {
                return Err(WagerError::unauthorized(format!("{} is blocked", account.user_code)));
            }
        }
        let note = transfer_note(kind, &acting, &payer, &payee)?;

        let set = self.locks.handles([wallet_key(from), wallet_key(to)]);
        let _guards = set.acquire();

        let mut batch = StoreBatch::new();
        let from_balance = self.ledger.stage_debit(&mut batch, from, amount)?;
        let to_balance = self.ledger.stage_credit(&mut batch, to, amount)?;
        let entry = LedgerEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            kind: kind.entry_kind(),
            log: kind.log(),
            from: Some(from.clone()),
            to: to.clone(),
            actor: actor.clone(),
            amount,
            from_balance: Some(from_balance),
            to_balance,
            note,
            created_at: Utc::now(),
        };
        self.ledger.stage_entry(&mut batch, &entry)?;
        self.db.commit(batch)?;

        self.metrics.record_transfer();
        info!(
            entry_id = %entry.entry_id,
            kind = ?kind,
            from = %from,
            to = %to,
            amount = %amount,
            "Transfer committed"
        );
        Ok(entry)
    }

    /// Mint new funds into `to`; super admin only
    pub fn issue(&self, actor: &AccountId, to: &AccountId, amount: Amount) -> WagerResult<LedgerEntry> {
        if amount.is_zero() {
            return Err(WagerError::validation("amount must be greater than zero"));
        }
        let acting = self.accounts.get(actor)?;
        if acting.role != Role::SuperAdmin {
            return Err(WagerError::unauthorized("only the super admin may issue funds"));
        }
        let payee = self.accounts.get(to)?;

        let set = self.locks.handles([wallet_key(to)]);
        let _guards = set.acquire();

        let mut batch = StoreBatch::new();
        let to_balance = self.ledger.stage_credit(&mut batch, to, amount)?;
        let entry = LedgerEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            kind: EntryKind::Issue,
            log: LogType::Deposit,
            from: None,
            to: to.clone(),
            actor: actor.clone(),
            amount,
            from_balance: None,
            to_balance,
            note: format!("Funds issued to {}", payee.user_code),
            created_at: Utc::now(),
        };
        self.ledger.stage_entry(&mut batch, &entry)?;
        self.db.commit(batch)?;

        self.metrics.record_transfer();
        info!(entry_id = %entry.entry_id, to = %to, amount = %amount, "Funds issued");
        Ok(entry)
    }

    pub fn deposit_logs(&self, actor: &AccountId, party: Option<&AccountId>) -> WagerResult<Vec<LedgerEntry>> {
        self.visible_logs(actor, LogType::Deposit, party)
    }

    pub fn withdraw_logs(&self, actor: &AccountId, party: Option<&AccountId>) -> WagerResult<Vec<LedgerEntry>> {
        self.visible_logs(actor, LogType::Withdraw, party)
    }

    /// Newest-first log entries the actor may see, optionally narrowed to
    /// entries where `party` is payer or payee
    fn visible_logs(
        &self,
        actor: &AccountId,
        log: LogType,
        party: Option<&AccountId>,
    ) -> WagerResult<Vec<LedgerEntry>> {
        let acting = self.accounts.get(actor)?;
        let mut visible = Vec::new();
        for entry in self.ledger.log(log, AUDIT_SCAN_WINDOW)? {
            if let Some(party) = party {
                if entry.to != *party && entry.from.as_ref() != Some(party) {
                    continue;
                }
            }
            if self.can_see(&acting, &entry)? {
                visible.push(entry);
            }
            if visible.len() >= DEFAULT_LOG_LIMIT {
                break;
            }
        }
        Ok(visible)
    }

    fn can_see(&self, acting: &Account, entry: &LedgerEntry) -> WagerResult<bool> {
        if acting.role == Role::SuperAdmin {
            return Ok(true);
        }
        let parties = entry.from.iter().chain(std::iter::once(&entry.to));
        for party in parties {
            if *party == acting.id {
                return Ok(true);
            }
            let Some(account) = self.accounts.find(party)? else {
                continue;
            };
            let below = match acting.role {
                Role::Admin => account.owner_admin.as_ref() == Some(&acting.id),
                Role::Client => account.created_by.as_ref() == Some(&acting.id),
                Role::SuperAdmin | Role::Customer => false,
            };
            if below {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Check that the fund path is legal for `kind` and describe it
fn transfer_note(kind: TransferKind, actor: &Account, payer: &Account, payee: &Account) -> WagerResult<String> {
    let child_of = |child: &Account, parent: &Account| child.created_by.as_ref() == Some(&parent.id);

    let note = match kind {
        TransferKind::Seed => {
            if actor.id != payer.id {
                return Err(WagerError::unauthorized("a seed must be made by the paying account"));
            }
            match (payer.role, payee.role) {
                (Role::SuperAdmin, Role::Admin) => "Super admin deposit to admin",
                (Role::SuperAdmin, Role::Client) => "Super admin deposit to client",
                (Role::Admin, Role::Client) if child_of(payee, payer) => "Admin deposit to client",
                (Role::Client, Role::Customer) if child_of(payee, payer) => "Client deposit to customer",
                _ => return Err(illegal_path(kind, payer, payee)),
            }
        }
        TransferKind::Withdraw => {
            if actor.id != payee.id {
                return Err(WagerError::unauthorized("a withdrawal must be made by the receiving account"));
            }
            match (payer.role, payee.role) {
                (Role::Admin, Role::SuperAdmin) => "Super admin withdrawal from admin",
                (Role::Client, Role::SuperAdmin) => "Super admin withdrawal from client",
                (Role::Client, Role::Admin) if child_of(payer, payee) => "Admin withdrawal from client",
                (Role::Customer, Role::Client) if child_of(payer, payee) => "Client withdrawal from customer",
                _ => return Err(illegal_path(kind, payer, payee)),
            }
        }
        TransferKind::Transfer => {
            if actor.role != Role::SuperAdmin {
                return Err(WagerError::unauthorized("only the super admin may transfer between accounts"));
            }
            "Super admin transfer"
        }
    };
    Ok(note.to_string())
}

fn illegal_path(kind: TransferKind, payer: &Account, payee: &Account) -> WagerError {
    WagerError::unauthorized(format!(
        "{:?} from {} ({}) to {} ({}) is not permitted",
        kind, payer.user_code, payer.role, payee.user_code, payee.role
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        engine: TransferEngine,
        ledger: Arc<Ledger>,
        root: AccountId,
        admin: AccountId,
        client: AccountId,
        customer: AccountId,
    }

    fn fixture() -> Fixture {
        let db = Db::in_memory();
        let locks = Arc::new(LockTable::new());
        let accounts = Arc::new(AccountRegistry::new(db.clone(), locks.clone()));
        let ledger = Arc::new(Ledger::new(db.clone(), accounts.clone(), locks.clone()));
        let engine = TransferEngine::new(db, accounts.clone(), ledger.clone(), locks, Arc::new(CoreMetrics::new()));

        let root = accounts.bootstrap_super_admin("Root", "root@example.com").unwrap().id;
        let admin = accounts.create_account(&root, Role::Admin, "Adm", "adm@example.com").unwrap().id;
        let client = accounts.create_account(&admin, Role::Client, "Cli", "cli@example.com").unwrap().id;
        let customer = accounts.create_account(&client, Role::Customer, "Cus", "cus@example.com").unwrap().id;
        engine.issue(&root, &root, Amount::from_major(10_000)).unwrap();

        Fixture {
            engine,
            ledger,
            root,
            admin,
            client,
            customer,
        }
    }

    #[test]
    fn test_seed_down_the_hierarchy() {
        let f = fixture();
        f.engine
            .transfer(&f.root, &f.admin, Amount::from_major(5000), TransferKind::Seed, &f.root)
            .unwrap();
        f.engine
            .transfer(&f.admin, &f.client, Amount::from_major(2000), TransferKind::Seed, &f.admin)
            .unwrap();
        let entry = f
            .engine
            .transfer(&f.client, &f.customer, Amount::from_major(1000), TransferKind::Seed, &f.client)
            .unwrap();

        assert_eq!(entry.note, "Client deposit to customer");
        assert_eq!(entry.to_balance.after, Amount::from_major(1000));
        let from = entry.from_balance.unwrap();
        assert_eq!(from.before, Amount::from_major(2000));
        assert_eq!(from.after, Amount::from_major(1000));
    }

    #[test]
    fn test_withdraw_requires_parent_as_actor() {
        let f = fixture();
        f.engine
            .transfer(&f.root, &f.client, Amount::from_major(100), TransferKind::Seed, &f.root)
            .unwrap();
        f.engine
            .transfer(&f.client, &f.customer, Amount::from_major(100), TransferKind::Seed, &f.client)
            .unwrap();

        let err = f
            .engine
            .transfer(&f.customer, &f.client, Amount::from_major(50), TransferKind::Withdraw, &f.customer)
            .unwrap_err();
        assert!(matches!(err, WagerError::Unauthorized(_)));

        let entry = f
            .engine
            .transfer(&f.customer, &f.client, Amount::from_major(50), TransferKind::Withdraw, &f.client)
            .unwrap();
        assert_eq!(entry.log, LogType::Withdraw);
        assert_eq!(f.ledger.balance(&f.customer).unwrap(), Amount::from_major(50));
    }

    #[test]
    fn test_skipping_a_level_is_rejected() {
        let f = fixture();
        let err = f
            .engine
            .transfer(&f.root, &f.customer, Amount::from_major(10), TransferKind::Seed, &f.root)
            .unwrap_err();
        assert!(matches!(err, WagerError::Unauthorized(_)));
        assert_eq!(f.ledger.balance(&f.customer).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_insufficient_funds_touches_nothing() {
        let f = fixture();
        let err = f
            .engine
            .transfer(&f.admin, &f.client, Amount::from_major(1), TransferKind::Seed, &f.admin)
            .unwrap_err();
        assert!(matches!(err, WagerError::InsufficientFunds { .. }));
        assert_eq!(f.ledger.balance(&f.client).unwrap(), Amount::ZERO);
        assert!(f.ledger.entries_for(&f.client, 10).unwrap().is_empty());
    }

    #[test]
    fn test_log_visibility() {
        let f = fixture();
        f.engine
            .transfer(&f.root, &f.admin, Amount::from_major(100), TransferKind::Seed, &f.root)
            .unwrap();
        f.engine
            .transfer(&f.admin, &f.client, Amount::from_major(100), TransferKind::Seed, &f.admin)
            .unwrap();

        assert_eq!(f.engine.deposit_logs(&f.root, None).unwrap().len(), 3);
        // the admin sees both transfers it took part in, but not the issue
        assert_eq!(f.engine.deposit_logs(&f.admin, None).unwrap().len(), 2);
        assert_eq!(f.engine.deposit_logs(&f.customer, None).unwrap().len(), 0);
        assert_eq!(f.engine.deposit_logs(&f.root, Some(&f.client)).unwrap().len(), 1);
    }
}
