//! Operational counters for the wagering core
//!
//! With metrics switched off in the monitoring config every `record_*` call
//! is a no-op and snapshots stay at zero.

use crate::common::Amount;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct CoreMetrics {
    enabled: bool,
    start_time: Instant,
    transfers: AtomicU64,
    wagers_placed: AtomicU64,
    wagers_settled: AtomicU64,
    rounds_closed: AtomicU64,
    staked_minor: AtomicU64,
    paid_out_minor: AtomicU64,
    rejections: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub transfers: u64,
    pub wagers_placed: u64,
    pub wagers_settled: u64,
    pub rounds_closed: u64,
    pub total_staked: Amount,
    pub total_paid_out: Amount,
    pub rejections: u64,
    pub uptime_secs: u64,
}

impl CoreMetrics {
    pub fn new() -> Self {
        Self::with_enabled(true)
    }

    pub fn with_enabled(enabled: bool) -> Self {
        Self {
            enabled,
            start_time: Instant::now(),
            transfers: AtomicU64::new(0),
            wagers_placed: AtomicU64::new(0),
            wagers_settled: AtomicU64::new(0),
            rounds_closed: AtomicU64::new(0),
            staked_minor: AtomicU64::new(0),
            paid_out_minor: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    pub fn record_transfer(&self) {
        if !self.enabled {
            return;
        }
        self.transfers.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_wagers(&self, count: u64, staked: Amount) {
        if !self.enabled {
            return;
        }
        self.wagers_placed.fetch_add(count, Ordering::SeqCst);
        self.staked_minor.fetch_add(staked.minor(), Ordering::SeqCst);
    }

    pub fn record_settled(&self, payout: Amount) {
        if !self.enabled {
            return;
        }
        self.wagers_settled.fetch_add(1, Ordering::SeqCst);
        self.paid_out_minor.fetch_add(payout.minor(), Ordering::SeqCst);
    }

    pub fn record_round_closed(&self) {
        if !self.enabled {
            return;
        }
        self.rounds_closed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_rejection(&self) {
        if !self.enabled {
            return;
        }
        self.rejections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn total_runtime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transfers: self.transfers.load(Ordering::SeqCst),
            wagers_placed: self.wagers_placed.load(Ordering::SeqCst),
            wagers_settled: self.wagers_settled.load(Ordering::SeqCst),
            rounds_closed: self.rounds_closed.load(Ordering::SeqCst),
            total_staked: Amount::from_minor(self.staked_minor.load(Ordering::SeqCst)),
            total_paid_out: Amount::from_minor(self.paid_out_minor.load(Ordering::SeqCst)),
            rejections: self.rejections.load(Ordering::SeqCst),
            uptime_secs: self.total_runtime().as_secs(),
        }
    }
}

impl Default for CoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}
