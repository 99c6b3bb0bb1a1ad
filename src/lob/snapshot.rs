//! Immutable book snapshots and the policy deciding when to take them.

use serde::{Deserialize, Serialize};

use crate::types::{BookConsistency, Price, Symbol, Timestamp};

/// One aggregated price level in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelQuote {
    pub price: Price,
    pub shares: u64,
    pub orders: u32,
}

/// Point-in-time copy of one symbol's book.
///
/// Both sides are ordered best price first. A snapshot shares nothing with
/// the live book, so it can be sent to another thread or persisted while the
/// engine keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    pub stock_locate: u16,
    /// Timestamp of the message after which the snapshot was taken
    pub timestamp: Timestamp,
    /// Engine message count at the time of the snapshot
    pub sequence: u64,
    pub bids: Vec<LevelQuote>,
    pub asks: Vec<LevelQuote>,
}

impl BookSnapshot {
    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    /// Spread in raw price units.
    pub fn spread(&self) -> Option<i64> {
        Some(self.best_ask()?.raw() - self.best_bid()?.raw())
    }

    /// Mid-price in currency units (presentation only).
    pub fn mid_price(&self) -> Option<f64> {
        Some((self.best_bid()?.to_f64() + self.best_ask()?.to_f64()) / 2.0)
    }

    pub fn consistency(&self) -> BookConsistency {
        BookConsistency::classify(self.best_bid(), self.best_ask())
    }

    pub fn total_bid_shares(&self) -> u64 {
        self.bids.iter().map(|l| l.shares).sum()
    }

    pub fn total_ask_shares(&self) -> u64 {
        self.asks.iter().map(|l| l.shares).sum()
    }
}

/// When the engine takes snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SnapshotPolicy {
    /// No automatic snapshots
    #[default]
    Never,
    /// After every `n` messages applied by the engine
    EveryMessages(u64),
    /// Whenever event time crosses a multiple of `ns` nanoseconds
    EveryNanos(u64),
}

/// Trigger state for a [`SnapshotPolicy`].
#[derive(Debug, Clone, Default)]
pub(crate) struct SnapshotSchedule {
    policy: SnapshotPolicy,
    since_last: u64,
    last_bucket: Option<u64>,
}

impl SnapshotSchedule {
    pub(crate) fn new(policy: SnapshotPolicy) -> Self {
        Self {
            policy,
            since_last: 0,
            last_bucket: None,
        }
    }

    /// Register one applied message; returns true if a snapshot is due.
    pub(crate) fn on_message(&mut self, timestamp: Timestamp) -> bool {
        match self.policy {
            SnapshotPolicy::Never => false,
            SnapshotPolicy::EveryMessages(0) | SnapshotPolicy::EveryNanos(0) => false,
            SnapshotPolicy::EveryMessages(n) => {
                self.since_last += 1;
                if self.since_last >= n {
                    self.since_last = 0;
                    true
                } else {
                    false
                }
            }
            SnapshotPolicy::EveryNanos(ns) => {
                let bucket = timestamp.nanos() / ns;
                match self.last_bucket {
                    // The first message only anchors the clock
                    None => {
                        self.last_bucket = Some(bucket);
                        false
                    }
                    Some(last) if bucket > last => {
                        self.last_bucket = Some(bucket);
                        true
                    }
                    Some(_) => false,
                }
            }
        }
    }
}
