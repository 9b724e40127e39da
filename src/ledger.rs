//! Ledger store: wallet balances and the append-only transfer log
//!
//! Balances live only in wallet records. Mutations come in two flavours:
//! `credit`/`debit` lock the wallet and commit on their own, while the
//! `stage_*` methods add the change to a caller's batch and expect the caller
//! to already hold the wallet lock until that batch commits.

use crate::accounts::AccountRegistry;
use crate::common::types::newest_first;
use crate::common::{AccountId, Amount};
use crate::errors::{WagerError, WagerResult};
use crate::locks::{wallet_key, LockTable};
use crate::storage::{Db, StoreBatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default cap for audit queries
pub const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    pub account: AccountId,
    pub balance: Amount,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    fn empty(account: &AccountId) -> Self {
        Self {
            account: account.clone(),
            balance: Amount::ZERO,
            updated_at: Utc::now(),
        }
    }
}

pub(crate) fn wallet_record_key(account: &AccountId) -> String {
    format!("wallet:{}", account)
}

pub(crate) fn stage_open_wallet(batch: &mut StoreBatch, account: &AccountId) -> WagerResult<()> {
    batch.put_json(wallet_record_key(account), &Wallet::empty(account))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// New money minted by the super admin
    Issue,
    Seed,
    Withdraw,
    Transfer,
}

/// Audit log an entry belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Deposit,
    Withdraw,
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogType::Deposit => write!(f, "deposit"),
            LogType::Withdraw => write!(f, "withdraw"),
        }
    }
}

/// Balance of one party around a change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceChange {
    pub before: Amount,
    pub after: Amount,
}

/// Immutable record of one balance-moving operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub kind: EntryKind,
    pub log: LogType,
    /// `None` for issued funds
    pub from: Option<AccountId>,
    pub to: AccountId,
    pub actor: AccountId,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_balance: Option<BalanceChange>,
    pub to_balance: BalanceChange,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

fn entry_key(entry_id: &str) -> String {
    format!("ledger:entry:{}", entry_id)
}

fn log_index_key(entry: &LedgerEntry) -> String {
    format!(
        "ledger:log:{}:{}:{}",
        entry.log,
        newest_first(entry.created_at),
        entry.entry_id
    )
}

fn account_index_key(account: &AccountId, entry: &LedgerEntry) -> String {
    format!(
        "ledger:acct:{}:{}:{}",
        account,
        newest_first(entry.created_at),
        entry.entry_id
    )
}

pub struct Ledger {
    db: Db,
    accounts: Arc<AccountRegistry>,
    locks: Arc<LockTable>,
}

impl Ledger {
    pub fn new(db: Db, accounts: Arc<AccountRegistry>, locks: Arc<LockTable>) -> Self {
        Self { db, accounts, locks }
    }

    /// Current wallet; created at zero when the account exists but has none
    pub fn wallet(&self, account: &AccountId) -> WagerResult<Wallet> {
        if let Some(wallet) = self.db.get_json::<Wallet>(&wallet_record_key(account))? {
            return Ok(wallet);
        }
        self.accounts.get(account)?;
        Ok(Wallet::empty(account))
    }

    pub fn balance(&self, account: &AccountId) -> WagerResult<Amount> {
        Ok(self.wallet(account)?.balance)
    }

    /// Balance for display only; any failure reads as zero
    pub fn display_balance(&self, account: &AccountId) -> Amount {
        match self.balance(account) {
            Ok(balance) => balance,
            Err(e) => {
                warn!(account = %account, error = %e, "Balance lookup failed, showing zero");
                Amount::ZERO
            }
        }
    }

    pub fn credit(&self, account: &AccountId, amount: Amount) -> WagerResult<Amount> {
        let set = self.locks.handles([wallet_key(account)]);
        let _guards = set.acquire();
        let mut batch = StoreBatch::new();
        let change = self.stage_credit(&mut batch, account, amount)?;
        self.db.commit(batch)?;
        Ok(change.after)
    }

    /// Fails with `InsufficientFunds` and leaves the wallet untouched if short
    pub fn debit(&self, account: &AccountId, amount: Amount) -> WagerResult<Amount> {
        let set = self.locks.handles([wallet_key(account)]);
        let _guards = set.acquire();
        let mut batch = StoreBatch::new();
        let change = self.stage_debit(&mut batch, account, amount)?;
        self.db.commit(batch)?;
        Ok(change.after)
    }

    /// Stage a credit. Caller holds the wallet lock; at most one staged
    /// change per account per batch.
    pub(crate) fn stage_credit(
        &self,
        batch: &mut StoreBatch,
        account: &AccountId,
        amount: Amount,
    ) -> WagerResult<BalanceChange> {
        let mut wallet = self.wallet(account)?;
        let before = wallet.balance;
        wallet.balance = before
            .checked_add(amount)
            .ok_or_else(|| WagerError::validation(format!("balance overflow on {}", account)))?;
        wallet.updated_at = Utc::now();
        batch.put_json(wallet_record_key(account), &wallet)?;
        debug!(account = %account, amount = %amount, "Credit staged");
        Ok(BalanceChange {
            before,
            after: wallet.balance,
        })
    }

    /// Stage a debit. Caller holds the wallet lock; at most one staged
    /// change per account per batch.
    pub(crate) fn stage_debit(
        &self,
        batch: &mut StoreBatch,
        account: &AccountId,
        amount: Amount,
    ) -> WagerResult<BalanceChange> {
        let mut wallet = self.wallet(account)?;
        let before = wallet.balance;
        wallet.balance = before.checked_sub(amount).ok_or(WagerError::InsufficientFunds {
            balance: before.minor(),
            required: amount.minor(),
        })?;
        wallet.updated_at = Utc::now();
        batch.put_json(wallet_record_key(account), &wallet)?;
        debug!(account = %account, amount = %amount, "Debit staged");
        Ok(BalanceChange {
            before,
            after: wallet.balance,
        })
    }

    /// Stage an entry with its log and per-party indexes
    pub(crate) fn stage_entry(&self, batch: &mut StoreBatch, entry: &LedgerEntry) -> WagerResult<()> {
        batch.put_json(entry_key(&entry.entry_id), entry)?;
        let id = entry.entry_id.as_bytes().to_vec();
        batch.put_raw(log_index_key(entry), id.clone());
        batch.put_raw(account_index_key(&entry.to, entry), id.clone());
        if let Some(from) = &entry.from {
            batch.put_raw(account_index_key(from, entry), id);
        }
        Ok(())
    }

    pub fn entry(&self, entry_id: &str) -> WagerResult<Option<LedgerEntry>> {
        self.db.get_json(&entry_key(entry_id))
    }

    /// Entries touching `account`, newest first
    pub fn entries_for(&self, account: &AccountId, limit: usize) -> WagerResult<Vec<LedgerEntry>> {
        self.load_indexed(&format!("ledger:acct:{}:", account), limit)
    }

    /// One audit log, newest first
    pub fn log(&self, log: LogType, limit: usize) -> WagerResult<Vec<LedgerEntry>> {
        self.load_indexed(&format!("ledger:log:{}:", log), limit)
    }

    fn load_indexed(&self, prefix: &str, limit: usize) -> WagerResult<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        for id in self.db.scan_values(prefix, limit)? {
            if let Some(entry) = self.entry(&id)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Sum of every wallet balance
    pub fn total_balance(&self) -> WagerResult<Amount> {
        let wallets: Vec<Wallet> = self.db.scan_json("wallet:", usize::MAX)?;
        wallets.iter().try_fold(Amount::ZERO, |acc, w| {
            acc.checked_add(w.balance)
                .ok_or_else(|| WagerError::validation("total balance overflow"))
        })
    }
}

/// Stage removal of every entry indexed to `account`, including the
/// counterparty's index row. Returns the number of entries removed.
pub(crate) fn purge_ledger_entries(db: &Db, batch: &mut StoreBatch, account: &AccountId) -> WagerResult<usize> {
    let ids = db.scan_values(&format!("ledger:acct:{}:", account), usize::MAX)?;
    let mut removed = 0;
    for id in ids {
        let Some(entry) = db.get_json::<LedgerEntry>(&entry_key(&id))? else {
            continue;
        };
        batch.delete(entry_key(&id));
        batch.delete(log_index_key(&entry));
        batch.delete(account_index_key(&entry.to, &entry));
        if let Some(from) = &entry.from {
            batch.delete(account_index_key(from, &entry));
        }
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::Role;

    fn setup() -> (Ledger, AccountId) {
        let db = Db::in_memory();
        let locks = Arc::new(LockTable::new());
        let accounts = Arc::new(AccountRegistry::new(db.clone(), locks.clone()));
        let root = accounts.bootstrap_super_admin("Root", "root@example.com").unwrap();
        (Ledger::new(db, accounts, locks), root.id)
    }

    #[test]
    fn test_credit_then_debit() {
        let (ledger, root) = setup();
        assert_eq!(ledger.balance(&root).unwrap(), Amount::ZERO);
        ledger.credit(&root, Amount::from_major(10)).unwrap();
        assert_eq!(ledger.debit(&root, Amount::from_major(4)).unwrap(), Amount::from_major(6));
    }

    #[test]
    fn test_overdraw_leaves_balance() {
        let (ledger, root) = setup();
        ledger.credit(&root, Amount::from_major(5)).unwrap();
        let err = ledger.debit(&root, Amount::from_major(6)).unwrap_err();
        assert!(matches!(err, WagerError::InsufficientFunds { balance: 500, required: 600 }));
        assert_eq!(ledger.balance(&root).unwrap(), Amount::from_major(5));
    }

    #[test]
    fn test_unknown_account_has_no_wallet() {
        let (ledger, _) = setup();
        let ghost = AccountId::new("ghost");
        assert!(matches!(ledger.balance(&ghost), Err(WagerError::NotFound(_))));
        assert_eq!(ledger.display_balance(&ghost), Amount::ZERO);
        assert!(ledger.credit(&ghost, Amount::from_major(1)).is_err());
    }

    #[test]
    fn test_entries_are_indexed_per_party() {
        let (ledger, root) = setup();
        let admin = ledger
            .accounts
            .create_account(&root, Role::Admin, "Adm", "adm@example.com")
            .unwrap();
        let entry = LedgerEntry {
            entry_id: "e1".to_string(),
            kind: EntryKind::Seed,
            log: LogType::Deposit,
            from: Some(root.clone()),
            to: admin.id.clone(),
            actor: root.clone(),
            amount: Amount::from_major(1),
            from_balance: None,
            to_balance: BalanceChange {
                before: Amount::ZERO,
                after: Amount::from_major(1),
            },
            note: "test".to_string(),
            created_at: Utc::now(),
        };
        let mut batch = StoreBatch::new();
        ledger.stage_entry(&mut batch, &entry).unwrap();
        ledger.db.commit(batch).unwrap();

        assert_eq!(ledger.entries_for(&root, 10).unwrap().len(), 1);
        assert_eq!(ledger.entries_for(&admin.id, 10).unwrap().len(), 1);
        assert_eq!(ledger.log(LogType::Deposit, 10).unwrap().len(), 1);
        assert!(ledger.log(LogType::Withdraw, 10).unwrap().is_empty());

        let mut batch = StoreBatch::new();
        assert_eq!(purge_ledger_entries(&ledger.db, &mut batch, &admin.id).unwrap(), 1);
        ledger.db.commit(batch).unwrap();
        assert!(ledger.entries_for(&root, 10).unwrap().is_empty());
    }
}
