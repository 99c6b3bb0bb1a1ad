//! Single-symbol order book.
//!
//! Implementation uses:
//! - BTreeMap for sorted price levels (aggregates only)
//! - ahash HashMap for the order reference index
//! - Clamping instead of failing on over-execution
//!
//! Every operation either applies fully or reports a [`BookAnomaly`] and
//! leaves the book untouched, so a bad reference in one book can never
//! corrupt another.

use std::collections::BTreeMap;
use std::fmt;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use super::price_level::PriceLevel;
use super::snapshot::{BookSnapshot, LevelQuote};
use crate::anomalies::AnomalyKind;
use crate::error::{ItchError, Result};
use crate::types::{BookConsistency, Order, Price, Side, Symbol, Timestamp};

/// Non-fatal book consistency problem caused by one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookAnomaly {
    /// Add for a reference that is already live; the message was dropped.
    DuplicateOrder { order_ref: u64 },

    /// Reference not present in the book; the message was dropped.
    UnknownOrderRef { order_ref: u64 },

    /// Execute or cancel for more than the live size; clamped to `live`.
    Overexecution {
        order_ref: u64,
        requested: u32,
        live: u32,
    },

    /// Replace whose original is unknown: without a side the new order
    /// cannot be placed.
    OrphanReplace {
        original_order_ref: u64,
        new_order_ref: u64,
    },
}

impl BookAnomaly {
    pub fn kind(&self) -> AnomalyKind {
        match self {
            BookAnomaly::DuplicateOrder { .. } => AnomalyKind::DuplicateOrder,
            BookAnomaly::UnknownOrderRef { .. } => AnomalyKind::UnknownOrderRef,
            BookAnomaly::Overexecution { .. } => AnomalyKind::Overexecution,
            BookAnomaly::OrphanReplace { .. } => AnomalyKind::OrphanReplace,
        }
    }

    /// Order reference the anomaly is about.
    pub fn order_ref(&self) -> u64 {
        match *self {
            BookAnomaly::DuplicateOrder { order_ref }
            | BookAnomaly::UnknownOrderRef { order_ref }
            | BookAnomaly::Overexecution { order_ref, .. } => order_ref,
            BookAnomaly::OrphanReplace {
                original_order_ref, ..
            } => original_order_ref,
        }
    }
}

impl fmt::Display for BookAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookAnomaly::DuplicateOrder { order_ref } => {
                write!(f, "duplicate add for live order {order_ref}")
            }
            BookAnomaly::UnknownOrderRef { order_ref } => {
                write!(f, "unknown order reference {order_ref}")
            }
            BookAnomaly::Overexecution {
                order_ref,
                requested,
                live,
            } => write!(
                f,
                "order {order_ref}: {requested} shares requested, {live} live (clamped)"
            ),
            BookAnomaly::OrphanReplace {
                original_order_ref,
                new_order_ref,
            } => write!(
                f,
                "replace {original_order_ref} -> {new_order_ref}: original unknown, new order not placed"
            ),
        }
    }
}

/// Result of an execute or cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reduction {
    /// Order state before the reduction
    pub order: Order,
    /// Shares actually removed (clamped to the live size)
    pub applied: u32,
    /// Shares the message asked for
    pub requested: u32,
}

impl Reduction {
    /// True if the order left the book.
    #[inline]
    pub fn removed(&self) -> bool {
        self.applied == self.order.shares
    }

    #[inline]
    pub fn is_clamped(&self) -> bool {
        self.requested > self.applied
    }

    /// The over-execution anomaly, if the request exceeded the live size.
    pub fn anomaly(&self) -> Option<BookAnomaly> {
        self.is_clamped().then_some(BookAnomaly::Overexecution {
            order_ref: self.order.order_ref,
            requested: self.requested,
            live: self.order.shares,
        })
    }
}

/// Statistics for monitoring book health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookStats {
    pub adds: u64,
    pub executions: u64,
    pub cancels: u64,
    pub deletes: u64,
    pub replaces: u64,

    /// Shares removed by executions
    pub executed_shares: u64,

    /// Messages rejected or clamped
    pub anomalies: u64,

    /// Number of times the top of book was crossed after a message
    pub crossed_quotes: u64,

    /// Number of times the top of book was locked after a message
    pub locked_quotes: u64,

    pub last_timestamp: Option<Timestamp>,
}

/// Order book for one stock locate.
#[derive(Debug, Clone)]
pub struct OrderBook {
    stock_locate: u16,
    symbol: Symbol,

    /// Bid levels; best is the highest key
    bids: BTreeMap<Price, PriceLevel>,

    /// Ask levels; best is the lowest key
    asks: BTreeMap<Price, PriceLevel>,

    /// Reference index: order_ref -> live order
    orders: AHashMap<u64, Order>,

    stats: BookStats,
}

impl OrderBook {
    /// Create an empty book.
    ///
    /// # Example
    /// ```
    /// use itch_lob_reconstructor::lob::OrderBook;
    /// use itch_lob_reconstructor::Symbol;
    ///
    /// let book = OrderBook::new(1, Symbol::new("AAPL"));
    /// assert!(book.is_empty());
    /// ```
    pub fn new(stock_locate: u16, symbol: Symbol) -> Self {
        Self {
            stock_locate,
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: AHashMap::new(),
            stats: BookStats::default(),
        }
    }

    #[inline]
    pub fn stock_locate(&self) -> u16 {
        self.stock_locate
    }

    #[inline]
    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub(crate) fn set_symbol(&mut self, symbol: Symbol) {
        self.symbol = symbol;
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Insert a new resting order.
    ///
    /// A zero-share add has nothing to rest and is ignored.
    pub fn add_order(
        &mut self,
        order_ref: u64,
        side: Side,
        price: Price,
        shares: u32,
    ) -> std::result::Result<(), BookAnomaly> {
        if self.orders.contains_key(&order_ref) {
            return Err(BookAnomaly::DuplicateOrder { order_ref });
        }
        self.stats.adds += 1;
        if shares == 0 {
            log::debug!("{}: zero-share add for order {order_ref} ignored", self.symbol);
            return Ok(());
        }
        self.insert(Order {
            order_ref,
            stock_locate: self.stock_locate,
            side,
            price,
            shares,
        });
        Ok(())
    }

    /// Execute shares against a resting order.
    pub fn execute(
        &mut self,
        order_ref: u64,
        shares: u32,
    ) -> std::result::Result<Reduction, BookAnomaly> {
        let reduction = self.reduce(order_ref, shares)?;
        self.stats.executions += 1;
        self.stats.executed_shares += u64::from(reduction.applied);
        Ok(reduction)
    }

    /// Cancel part of a resting order.
    pub fn cancel(
        &mut self,
        order_ref: u64,
        shares: u32,
    ) -> std::result::Result<Reduction, BookAnomaly> {
        let reduction = self.reduce(order_ref, shares)?;
        self.stats.cancels += 1;
        Ok(reduction)
    }

    /// Remove an order with all of its remaining shares.
    pub fn delete(&mut self, order_ref: u64) -> std::result::Result<Order, BookAnomaly> {
        let order = self
            .orders
            .remove(&order_ref)
            .ok_or(BookAnomaly::UnknownOrderRef { order_ref })?;
        self.detach(&order, order.shares, true);
        self.stats.deletes += 1;
        Ok(order)
    }

    /// Replace an order: delete the original, add the new reference on the
    /// same side at the new price and size.
    ///
    /// Applied atomically; on error the book is unchanged. Returns the
    /// removed original.
    pub fn replace(
        &mut self,
        original_order_ref: u64,
        new_order_ref: u64,
        shares: u32,
        price: Price,
    ) -> std::result::Result<Order, BookAnomaly> {
        let original = *self
            .orders
            .get(&original_order_ref)
            .ok_or(BookAnomaly::UnknownOrderRef {
                order_ref: original_order_ref,
            })?;
        if new_order_ref != original_order_ref && self.orders.contains_key(&new_order_ref) {
            return Err(BookAnomaly::DuplicateOrder {
                order_ref: new_order_ref,
            });
        }

        self.orders.remove(&original_order_ref);
        self.detach(&original, original.shares, true);
        if shares > 0 {
            self.insert(Order {
                order_ref: new_order_ref,
                stock_locate: self.stock_locate,
                side: original.side,
                price,
                shares,
            });
        }
        self.stats.replaces += 1;
        Ok(original)
    }

    /// Count an anomaly against this book.
    pub(crate) fn note_anomaly(&mut self) {
        self.stats.anomalies += 1;
    }

    /// Record the timestamp and top-of-book state after a message.
    ///
    /// Crossed and locked books are counted, not rejected: the feed is the
    /// source of truth.
    pub(crate) fn track_consistency(&mut self, timestamp: Timestamp, log_warnings: bool) {
        self.stats.last_timestamp = Some(timestamp);
        match self.consistency() {
            BookConsistency::Crossed => {
                self.stats.crossed_quotes += 1;
                if log_warnings {
                    if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
                        log::debug!(
                            "{}: crossed book bid={bid} > ask={ask} at {timestamp}",
                            self.symbol
                        );
                    }
                }
            }
            BookConsistency::Locked => self.stats.locked_quotes += 1,
            BookConsistency::Valid | BookConsistency::Empty => {}
        }
    }

    fn reduce(&mut self, order_ref: u64, shares: u32) -> std::result::Result<Reduction, BookAnomaly> {
        let order = self
            .orders
            .get_mut(&order_ref)
            .ok_or(BookAnomaly::UnknownOrderRef { order_ref })?;
        let before = *order;
        let applied = shares.min(order.shares);
        order.shares -= applied;
        let removed = order.shares == 0;
        if removed {
            self.orders.remove(&order_ref);
        }
        self.detach(&before, applied, removed);
        Ok(Reduction {
            order: before,
            applied,
            requested: shares,
        })
    }

    fn insert(&mut self, order: Order) {
        self.side_mut(order.side)
            .entry(order.price)
            .or_insert_with(|| PriceLevel::new(order.price))
            .add_order(order.shares);
        self.orders.insert(order.order_ref, order);
    }

    /// Take `shares` of `order` off its level, dropping the order from the
    /// level count if `remove` and the level itself once empty.
    fn detach(&mut self, order: &Order, shares: u32, remove: bool) {
        let side = self.side_mut(order.side);
        if let Some(level) = side.get_mut(&order.price) {
            if remove {
                level.remove_order(shares);
            } else {
                level.reduce(shares);
            }
            if level.is_empty() {
                side.remove(&order.price);
            }
        }
    }

    #[inline]
    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Price, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Highest bid price.
    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    /// Lowest ask price.
    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
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

    #[inline]
    pub fn order(&self, order_ref: u64) -> Option<&Order> {
        self.orders.get(&order_ref)
    }

    #[inline]
    pub fn contains_order(&self, order_ref: u64) -> bool {
        self.orders.contains_key(&order_ref)
    }

    /// Live orders in no particular order.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Level at `price` on `side`, if present.
    pub fn level(&self, side: Side, price: Price) -> Option<&PriceLevel> {
        match side {
            Side::Buy => self.bids.get(&price),
            Side::Sell => self.asks.get(&price),
        }
    }

    /// Bid levels, best (highest) first.
    pub fn bids(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values().rev()
    }

    /// Ask levels, best (lowest) first.
    pub fn asks(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    pub fn stats(&self) -> &BookStats {
        &self.stats
    }

    /// Immutable copy of the top `depth` levels per side (all if `None`).
    pub fn snapshot(
        &self,
        depth: Option<usize>,
        timestamp: Timestamp,
        sequence: u64,
    ) -> BookSnapshot {
        let depth = depth.unwrap_or(usize::MAX);
        let quote = |level: &PriceLevel| LevelQuote {
            price: level.price(),
            shares: level.total_shares(),
            orders: level.order_count(),
        };
        BookSnapshot {
            symbol: self.symbol,
            stock_locate: self.stock_locate,
            timestamp,
            sequence,
            bids: self.bids().take(depth).map(quote).collect(),
            asks: self.asks().take(depth).map(quote).collect(),
        }
    }

    /// Verify the book's structural invariants.
    ///
    /// - every level's aggregate equals the live shares resting there
    /// - every live order is on a level of its own side
    /// - no level is empty
    pub fn check_invariants(&self) -> Result<()> {
        let mut expected: AHashMap<(Side, Price), (u64, u32)> = AHashMap::new();
        for order in self.orders.values() {
            if order.shares == 0 {
                return Err(ItchError::InconsistentState(format!(
                    "{}: order {} is live with zero shares",
                    self.symbol, order.order_ref
                )));
            }
            let entry = expected.entry((order.side, order.price)).or_insert((0, 0));
            entry.0 += u64::from(order.shares);
            entry.1 += 1;
        }

        let sides = [(Side::Buy, &self.bids), (Side::Sell, &self.asks)];
        let mut levels = 0;
        for (side, ladder) in sides {
            for (price, level) in ladder {
                levels += 1;
                if level.is_empty() {
                    return Err(ItchError::InconsistentState(format!(
                        "{}: empty {side:?} level at {price}",
                        self.symbol
                    )));
                }
                let (shares, count) = expected.get(&(side, *price)).copied().unwrap_or((0, 0));
                if level.total_shares() != shares || level.order_count() != count {
                    return Err(ItchError::InconsistentState(format!(
                        "{}: {side:?} level {price} holds {} shares / {} orders, orders sum to {shares} / {count}",
                        self.symbol,
                        level.total_shares(),
                        level.order_count()
                    )));
                }
            }
        }
        if levels != expected.len() {
            return Err(ItchError::InconsistentState(format!(
                "{}: {} live price points but {levels} levels",
                self.symbol,
                expected.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(raw: i64) -> Price {
        Price::from_raw(raw)
    }

    fn book() -> OrderBook {
        OrderBook::new(1, Symbol::new("AAPL"))
    }

    #[test]
    fn test_new_book() {
        let book = book();
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.consistency(), BookConsistency::Empty);
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_add_bid_and_ask() {
        let mut book = book();
        book.add_order(1, Side::Buy, p(1_000_000), 100).unwrap();
        book.add_order(2, Side::Sell, p(1_000_100), 200).unwrap();
        assert_eq!(book.best_bid(), Some(p(1_000_000)));
        assert_eq!(book.best_ask(), Some(p(1_000_100)));
        assert_eq!(book.spread(), Some(100));
        assert!((book.mid_price().unwrap() - 100.005).abs() < 1e-9);
        assert!(book.consistency().is_valid());
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_multiple_orders_same_price() {
        let mut book = book();
        book.add_order(1, Side::Buy, p(100), 100).unwrap();
        book.add_order(2, Side::Buy, p(100), 200).unwrap();
        let level = book.level(Side::Buy, p(100)).unwrap();
        assert_eq!(level.total_shares(), 300);
        assert_eq!(level.order_count(), 2);
        assert_eq!(book.bid_levels(), 1);
    }

    #[test]
    fn test_duplicate_add_is_dropped() {
        let mut book = book();
        book.add_order(1, Side::Buy, p(100), 100).unwrap();
        let err = book.add_order(1, Side::Sell, p(200), 50).unwrap_err();
        assert_eq!(err, BookAnomaly::DuplicateOrder { order_ref: 1 });
        assert_eq!(book.ask_levels(), 0);
        assert_eq!(book.order(1).unwrap().shares, 100);
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_partial_and_full_execution() {
        let mut book = book();
        book.add_order(1, Side::Sell, p(100), 100).unwrap();

        let r = book.execute(1, 30).unwrap();
        assert_eq!(r.applied, 30);
        assert!(!r.removed());
        assert_eq!(book.order(1).unwrap().shares, 70);
        assert_eq!(book.level(Side::Sell, p(100)).unwrap().total_shares(), 70);

        let r = book.execute(1, 70).unwrap();
        assert!(r.removed());
        assert!(book.level(Side::Sell, p(100)).is_none());
        assert_eq!(book.stats().executed_shares, 100);
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_overexecution_is_clamped() {
        let mut book = book();
        book.add_order(1, Side::Buy, p(100), 100).unwrap();
        book.add_order(2, Side::Buy, p(100), 50).unwrap();

        let r = book.execute(1, 150).unwrap();
        assert_eq!(r.applied, 100);
        assert!(r.removed());
        assert_eq!(
            r.anomaly(),
            Some(BookAnomaly::Overexecution {
                order_ref: 1,
                requested: 150,
                live: 100
            })
        );
        assert_eq!(book.level(Side::Buy, p(100)).unwrap().total_shares(), 50);
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_cancel_reduces() {
        let mut book = book();
        book.add_order(1, Side::Buy, p(100), 100).unwrap();
        let r = book.cancel(1, 40).unwrap();
        assert!(r.anomaly().is_none());
        assert_eq!(book.order(1).unwrap().shares, 60);
        assert_eq!(book.stats().cancels, 1);
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_delete_removes_level() {
        let mut book = book();
        book.add_order(1, Side::Buy, p(1_000_000), 100).unwrap();
        let removed = book.delete(1).unwrap();
        assert_eq!(removed.shares, 100);
        assert!(book.level(Side::Buy, p(1_000_000)).is_none());
        assert_eq!(book.bid_levels(), 0);
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_unknown_refs_leave_book_untouched() {
        let mut book = book();
        book.add_order(1, Side::Buy, p(100), 100).unwrap();
        assert_eq!(
            book.execute(9, 10).unwrap_err(),
            BookAnomaly::UnknownOrderRef { order_ref: 9 }
        );
        assert!(book.cancel(9, 10).is_err());
        assert!(book.delete(9).is_err());
        assert!(book.replace(9, 10, 5, p(1)).is_err());
        assert_eq!(book.order_count(), 1);
        assert_eq!(book.level(Side::Buy, p(100)).unwrap().total_shares(), 100);
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_replace_semantics() {
        let mut book = book();
        book.add_order(1, Side::Sell, p(500), 50).unwrap();
        let original = book.replace(1, 2, 30, p(600)).unwrap();
        assert_eq!(original.order_ref, 1);

        assert!(!book.contains_order(1));
        let new = book.order(2).unwrap();
        assert_eq!((new.side, new.price, new.shares), (Side::Sell, p(600), 30));
        assert!(book.level(Side::Sell, p(500)).is_none());
        assert_eq!(book.level(Side::Sell, p(600)).unwrap().total_shares(), 30);
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_replace_onto_live_ref_is_atomic() {
        let mut book = book();
        book.add_order(1, Side::Buy, p(100), 10).unwrap();
        book.add_order(2, Side::Buy, p(101), 20).unwrap();
        assert_eq!(
            book.replace(1, 2, 5, p(99)).unwrap_err(),
            BookAnomaly::DuplicateOrder { order_ref: 2 }
        );
        assert_eq!(book.order(1).unwrap().shares, 10);
        assert_eq!(book.order(2).unwrap().shares, 20);
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_zero_share_add_does_not_create_level() {
        let mut book = book();
        book.add_order(1, Side::Buy, p(100), 0).unwrap();
        assert_eq!(book.bid_levels(), 0);
        assert!(!book.contains_order(1));
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_snapshot_depth_and_order() {
        let mut book = book();
        for (i, px) in [100, 102, 101].into_iter().enumerate() {
            book.add_order(i as u64, Side::Buy, p(px), 10).unwrap();
        }
        for (i, px) in [105, 103, 104].into_iter().enumerate() {
            book.add_order(10 + i as u64, Side::Sell, p(px), 10).unwrap();
        }

        let full = book.snapshot(None, Timestamp::from_nanos(5), 7);
        let bids: Vec<i64> = full.bids.iter().map(|l| l.price.raw()).collect();
        let asks: Vec<i64> = full.asks.iter().map(|l| l.price.raw()).collect();
        assert_eq!(bids, vec![102, 101, 100]);
        assert_eq!(asks, vec![103, 104, 105]);
        assert_eq!(full.sequence, 7);

        let top = book.snapshot(Some(1), Timestamp::from_nanos(5), 7);
        assert_eq!(top.bids.len(), 1);
        assert_eq!(top.asks.len(), 1);

        // Snapshot is detached from the live book
        book.delete(0).unwrap();
        assert_eq!(full.bids.len(), 3);
    }

    #[test]
    fn test_crossed_and_locked_tracking() {
        let mut book = book();
        book.add_order(1, Side::Buy, p(100), 10).unwrap();
        book.add_order(2, Side::Sell, p(100), 10).unwrap();
        book.track_consistency(Timestamp::from_nanos(1), false);
        assert_eq!(book.stats().locked_quotes, 1);

        book.add_order(3, Side::Buy, p(101), 10).unwrap();
        book.track_consistency(Timestamp::from_nanos(2), false);
        assert_eq!(book.stats().crossed_quotes, 1);
        assert_eq!(book.stats().last_timestamp, Some(Timestamp::from_nanos(2)));
    }

    #[test]
    fn test_anomaly_display() {
        let text = BookAnomaly::Overexecution {
            order_ref: 1,
            requested: 150,
            live: 100,
        }
        .to_string();
        assert!(text.contains("150"));
        assert_eq!(
            BookAnomaly::OrphanReplace {
                original_order_ref: 4,
                new_order_ref: 5
            }
            .kind(),
            AnomalyKind::OrphanReplace
        );
    }
}
