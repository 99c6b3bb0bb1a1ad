//! Aggregate price level.
//!
//! A `PriceLevel` holds only the running totals for one price on one side of
//! a book. Individual orders live in the book's reference index; the level
//! never stores copies of them.
//!
//! # Invariant
//!
//! `total_shares` MUST always equal the sum of live shares of the orders
//! resting at this price, and `order_count` their number. The book upholds
//! this by routing every mutation through the methods below, and verifies it
//! with [`crate::lob::OrderBook::check_invariants`].
//!
//! # Performance
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | `add_order` | O(1) |
//! | `reduce` | O(1) |
//! | `remove_order` | O(1) |
//! | `total_shares` | O(1) |

use serde::{Deserialize, Serialize};

use crate::types::Price;

/// A price level in the order book with aggregate size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    price: Price,
    total_shares: u64,
    order_count: u32,
}

impl PriceLevel {
    /// Create a new empty price level.
    #[inline]
    pub fn new(price: Price) -> Self {
        Self {
            price,
            total_shares: 0,
            order_count: 0,
        }
    }

    /// Account for a new order resting at this price.
    #[inline]
    pub fn add_order(&mut self, shares: u32) {
        self.total_shares += u64::from(shares);
        self.order_count += 1;
    }

    /// Reduce the aggregate after a partial execution or cancel.
    ///
    /// The caller clamps `shares` to the order's live size, so the level can
    /// never go below zero. Returns the new total.
    #[inline]
    pub fn reduce(&mut self, shares: u32) -> u64 {
        debug_assert!(u64::from(shares) <= self.total_shares);
        self.total_shares = self.total_shares.saturating_sub(u64::from(shares));
        self.total_shares
    }

    /// Remove an order carrying `remaining` live shares.
    #[inline]
    pub fn remove_order(&mut self, remaining: u32) -> u64 {
        debug_assert!(self.order_count > 0);
        self.order_count = self.order_count.saturating_sub(1);
        self.reduce(remaining)
    }

    #[inline]
    pub fn price(&self) -> Price {
        self.price
    }

    /// Aggregate live shares at this price (O(1)).
    #[inline]
    pub fn total_shares(&self) -> u64 {
        self.total_shares
    }

    /// Number of live orders at this price.
    #[inline]
    pub fn order_count(&self) -> u32 {
        self.order_count
    }

    /// A level with no shares left must be removed from its side.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total_shares == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level() -> PriceLevel {
        PriceLevel::new(Price::from_raw(1_000_000))
    }

    #[test]
    fn test_new_price_level_is_empty() {
        let level = level();
        assert!(level.is_empty());
        assert_eq!(level.total_shares(), 0);
        assert_eq!(level.order_count(), 0);
        assert_eq!(level.price().to_string(), "100.0000");
    }

    #[test]
    fn test_add_multiple_orders() {
        let mut level = level();
        level.add_order(100);
        level.add_order(200);
        level.add_order(150);
        assert_eq!(level.total_shares(), 450);
        assert_eq!(level.order_count(), 3);
    }

    #[test]
    fn test_reduce_keeps_order_count() {
        let mut level = level();
        level.add_order(100);
        assert_eq!(level.reduce(30), 70);
        assert_eq!(level.order_count(), 1);
        assert!(!level.is_empty());
    }

    #[test]
    fn test_remove_order() {
        let mut level = level();
        level.add_order(100);
        level.add_order(200);
        assert_eq!(level.remove_order(100), 200);
        assert_eq!(level.order_count(), 1);
        assert_eq!(level.remove_order(200), 0);
        assert!(level.is_empty());
    }

    #[test]
    fn test_no_u32_overflow() {
        let mut level = level();
        level.add_order(u32::MAX);
        level.add_order(u32::MAX);
        assert_eq!(level.total_shares(), 2 * u64::from(u32::MAX));
    }

    #[test]
    fn test_realistic_order_lifecycle() {
        let mut level = level();
        level.add_order(500);
        level.add_order(300);
        assert_eq!(level.total_shares(), 800);
        level.reduce(100);
        assert_eq!(level.total_shares(), 700);
        level.remove_order(400);
        assert_eq!(level.total_shares(), 300);
        level.remove_order(300);
        assert!(level.is_empty());
        assert_eq!(level.order_count(), 0);
    }
}
