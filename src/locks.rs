//! Per-key mutual exclusion
//!
//! Check-then-act sequences (balance check then debit, status check then
//! close) hold the locks for every key they touch until their batch commits.
//! Keys are namespaced (`wallet:`, `round:`, `market:`, `game:`) and a
//! `LockSet` always acquires in sorted order, so two callers can never wait
//! on each other. Callers that need a round or market lock plus wallet locks
//! take the round/market lock first and the wallet locks second.

use crate::common::AccountId;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub fn wallet_key(account: &AccountId) -> String {
    format!("wallet:{}", account)
}

pub fn round_key(round_id: &str) -> String {
    format!("round:{}", round_id)
}

pub fn market_key(market_id: &str) -> String {
    format!("market:{}", market_id)
}

pub fn game_key(slug: &str) -> String {
    format!("game:{}", slug)
}

/// Thread-safe table of named locks, created on first use
#[derive(Default)]
pub struct LockTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Sorted, de-duplicated handles for `keys`
    pub fn handles<I, S>(&self, keys: I) -> LockSet
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
        names.sort();
        names.dedup();
        LockSet {
            handles: names.iter().map(|name| self.handle(name)).collect(),
        }
    }

    /// Number of distinct keys ever locked
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Lock handles ready to be acquired together
pub struct LockSet {
    handles: Vec<Arc<Mutex<()>>>,
}

impl LockSet {
    /// Block until every lock in the set is held. A poisoned lock is still
    /// acquired: the guarded state lives in the store, not behind the mutex.
    pub fn acquire(&self) -> Vec<MutexGuard<'_, ()>> {
        self.handles
            .iter()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_handles_are_deduplicated() {
        let table = LockTable::new();
        let set = table.handles(["wallet:b", "wallet:a", "wallet:b"]);
        assert_eq!(set.handles.len(), 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_opposite_order_does_not_deadlock() {
        let table = LockTable::new();
        let counter = AtomicU64::new(0);

        std::thread::scope(|s| {
            for i in 0..8 {
                let table = &table;
                let counter = &counter;
                s.spawn(move || {
                    let keys = if i % 2 == 0 {
                        ["wallet:x", "wallet:y"]
                    } else {
                        ["wallet:y", "wallet:x"]
                    };
                    for _ in 0..200 {
                        let set = table.handles(keys);
                        let _guards = set.acquire();
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1600);
    }
}
