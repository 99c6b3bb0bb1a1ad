//! Trade tape with aggressor side detection.
//!
//! Every execution against a displayed order (`E`, `C`) and every
//! non-displayed trade (`P`) becomes one [`TradePrint`]. ITCH already gives
//! each fill its own match number, so prints are never merged.
//!
//! # How Aggressor Detection Works
//!
//! The side on the feed is the side of the *resting* order:
//! - a resting **bid** was hit, so the aggressor is a **seller**
//! - a resting **ask** was lifted, so the aggressor is a **buyer**
//!
//! # Example
//!
//! ```
//! use itch_lob_reconstructor::lob::{PrintKind, TradePrint, TradeTape, TradeTapeConfig};
//! use itch_lob_reconstructor::{Price, Side, Symbol, Timestamp};
//!
//! let mut tape = TradeTape::new(TradeTapeConfig::default());
//! tape.record(TradePrint::new(
//!     PrintKind::Execution,
//!     Timestamp::from_nanos(1),
//!     1,
//!     Symbol::new("AAPL"),
//!     Side::Sell,
//!     100,
//!     Price::from_raw(1_000_000),
//! ));
//! assert_eq!(tape.total_buy_volume(), 100);
//! assert_eq!(tape.trade_imbalance(), 1.0);
//! ```

use std::collections::VecDeque;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::types::{Price, Side, Symbol, Timestamp};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the trade tape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeTapeConfig {
    /// Maximum number of recent prints kept in memory.
    ///
    /// Totals are kept for the whole run regardless.
    /// Default: 1000
    pub max_recent: usize,
}

impl Default for TradeTapeConfig {
    fn default() -> Self {
        Self { max_recent: 1000 }
    }
}

impl TradeTapeConfig {
    pub fn with_max_recent(mut self, max: usize) -> Self {
        self.max_recent = max;
        self
    }
}

// ============================================================================
// Prints
// ============================================================================

/// Which message produced a print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrintKind {
    /// `E`: executed at the resting order's price
    Execution,
    /// `C`: executed at a different price, possibly non-printable
    ExecutionWithPrice,
    /// `P`: execution of a non-displayed order
    NonDisplayed,
}

/// A single trade print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradePrint {
    pub kind: PrintKind,
    pub timestamp: Timestamp,
    pub stock_locate: u16,
    pub symbol: Symbol,
    pub order_ref: u64,
    pub match_number: u64,

    /// Side of the resting order that was filled
    pub resting_side: Side,

    pub shares: u32,
    pub price: Price,

    /// False for `C` executions flagged non-printable; those stay out of
    /// volume and VWAP totals.
    pub printable: bool,

    /// Tick direction relative to the previous printable trade of the same
    /// locate: `1` uptick, `-1` downtick, `0` same or first.
    pub tick_direction: i8,

    /// Set when a later Broken Trade message cancelled this match
    pub broken: bool,
}

impl TradePrint {
    /// Build a printable trade with no order reference or match number.
    pub fn new(
        kind: PrintKind,
        timestamp: Timestamp,
        stock_locate: u16,
        symbol: Symbol,
        resting_side: Side,
        shares: u32,
        price: Price,
    ) -> Self {
        Self {
            kind,
            timestamp,
            stock_locate,
            symbol,
            order_ref: 0,
            match_number: 0,
            resting_side,
            shares,
            price,
            printable: true,
            tick_direction: 0,
            broken: false,
        }
    }

    pub fn with_refs(mut self, order_ref: u64, match_number: u64) -> Self {
        self.order_ref = order_ref;
        self.match_number = match_number;
        self
    }

    pub fn with_printable(mut self, printable: bool) -> Self {
        self.printable = printable;
        self
    }

    /// Side that initiated the trade.
    #[inline]
    pub fn aggressor_side(&self) -> Side {
        match self.resting_side {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    #[inline]
    pub fn is_buy(&self) -> bool {
        self.aggressor_side() == Side::Buy
    }

    /// Notional in raw price units times shares.
    #[inline]
    pub fn notional_raw(&self) -> i128 {
        i128::from(self.price.raw()) * i128::from(self.shares)
    }
}

// ============================================================================
// Tape
// ============================================================================

/// Running record of trade prints for one run.
#[derive(Debug, Clone)]
pub struct TradeTape {
    config: TradeTapeConfig,
    recent: VecDeque<TradePrint>,
    last_price: AHashMap<u16, Price>,
    total_buy_volume: u64,
    total_sell_volume: u64,
    total_trades: u64,
    non_printable: u64,
    broken_trades: u64,
    notional_raw: i128,
}

impl Default for TradeTape {
    fn default() -> Self {
        Self::new(TradeTapeConfig::default())
    }
}

impl TradeTape {
    pub fn new(config: TradeTapeConfig) -> Self {
        Self {
            config,
            recent: VecDeque::new(),
            last_price: AHashMap::new(),
            total_buy_volume: 0,
            total_sell_volume: 0,
            total_trades: 0,
            non_printable: 0,
            broken_trades: 0,
            notional_raw: 0,
        }
    }

    /// Append a print, filling in its tick direction.
    pub fn record(&mut self, mut print: TradePrint) -> TradePrint {
        self.total_trades += 1;

        if print.printable {
            print.tick_direction = match self.last_price.get(&print.stock_locate) {
                Some(last) if print.price > *last => 1,
                Some(last) if print.price < *last => -1,
                _ => 0,
            };
            self.last_price.insert(print.stock_locate, print.price);

            if print.is_buy() {
                self.total_buy_volume += u64::from(print.shares);
            } else {
                self.total_sell_volume += u64::from(print.shares);
            }
            self.notional_raw += print.notional_raw();
        } else {
            self.non_printable += 1;
        }

        self.recent.push_back(print);
        while self.recent.len() > self.config.max_recent {
            self.recent.pop_front();
        }
        print
    }

    /// Mark a print as broken by its match number.
    ///
    /// Totals are not rewound; only prints still in the recent window can be
    /// flagged. Returns true if one was found.
    pub fn break_trade(&mut self, match_number: u64) -> bool {
        self.broken_trades += 1;
        match self
            .recent
            .iter_mut()
            .rev()
            .find(|p| p.match_number == match_number)
        {
            Some(print) => {
                print.broken = true;
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn recent_trades(&self) -> &VecDeque<TradePrint> {
        &self.recent
    }

    /// Get the N most recent prints, newest first.
    pub fn last_n_trades(&self, n: usize) -> Vec<&TradePrint> {
        self.recent.iter().rev().take(n).collect()
    }

    /// Compute trade imbalance: (buy_volume - sell_volume) / total_volume.
    ///
    /// Returns a value in [-1, 1]; `0.0` when nothing printed.
    pub fn trade_imbalance(&self) -> f64 {
        let total = self.total_buy_volume + self.total_sell_volume;
        if total == 0 {
            return 0.0;
        }
        (self.total_buy_volume as f64 - self.total_sell_volume as f64) / total as f64
    }

    /// Volume-weighted average price over all printable trades.
    pub fn vwap(&self) -> Option<f64> {
        let volume = self.total_volume();
        if volume == 0 {
            return None;
        }
        Some(self.notional_raw as f64 / volume as f64 / Price::SCALE as f64)
    }

    pub fn total_buy_volume(&self) -> u64 {
        self.total_buy_volume
    }

    pub fn total_sell_volume(&self) -> u64 {
        self.total_sell_volume
    }

    pub fn total_volume(&self) -> u64 {
        self.total_buy_volume + self.total_sell_volume
    }

    /// Number of prints recorded, printable or not.
    pub fn total_trades(&self) -> u64 {
        self.total_trades
    }

    pub fn non_printable_trades(&self) -> u64 {
        self.non_printable
    }

    pub fn broken_trades(&self) -> u64 {
        self.broken_trades
    }

    /// Last printable price for a locate.
    pub fn last_trade_price(&self, stock_locate: u16) -> Option<Price> {
        self.last_price.get(&stock_locate).copied()
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn print(resting: Side, shares: u32, price: i64) -> TradePrint {
        TradePrint::new(
            PrintKind::Execution,
            Timestamp::from_nanos(0),
            1,
            Symbol::new("AAPL"),
            resting,
            shares,
            Price::from_raw(price),
        )
    }

    #[test]
    fn test_config_default() {
        assert_eq!(TradeTapeConfig::default().max_recent, 1000);
    }

    #[test]
    fn test_aggressor_detection() {
        // Resting ask lifted by a buyer
        assert_eq!(print(Side::Sell, 1, 1).aggressor_side(), Side::Buy);
        // Resting bid hit by a seller
        assert_eq!(print(Side::Buy, 1, 1).aggressor_side(), Side::Sell);
    }

    #[test]
    fn test_trade_imbalance() {
        let mut tape = TradeTape::default();
        assert_eq!(tape.trade_imbalance(), 0.0);

        tape.record(print(Side::Sell, 300, 100));
        tape.record(print(Side::Buy, 100, 100));
        assert_eq!(tape.total_buy_volume(), 300);
        assert_eq!(tape.total_sell_volume(), 100);
        assert!((tape.trade_imbalance() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_tick_direction_is_per_locate() {
        let mut tape = TradeTape::default();
        assert_eq!(tape.record(print(Side::Sell, 1, 100)).tick_direction, 0);
        assert_eq!(tape.record(print(Side::Sell, 1, 101)).tick_direction, 1);
        assert_eq!(tape.record(print(Side::Sell, 1, 99)).tick_direction, -1);
        assert_eq!(tape.record(print(Side::Sell, 1, 99)).tick_direction, 0);

        let mut other = print(Side::Sell, 1, 500);
        other.stock_locate = 2;
        assert_eq!(tape.record(other).tick_direction, 0);
        assert_eq!(tape.last_trade_price(1), Some(Price::from_raw(99)));
        assert_eq!(tape.last_trade_price(2), Some(Price::from_raw(500)));
    }

    #[test]
    fn test_non_printable_excluded_from_volume() {
        let mut tape = TradeTape::default();
        tape.record(print(Side::Sell, 100, 1_000_000).with_printable(false));
        assert_eq!(tape.total_trades(), 1);
        assert_eq!(tape.non_printable_trades(), 1);
        assert_eq!(tape.total_volume(), 0);
        assert_eq!(tape.vwap(), None);
        assert_eq!(tape.last_trade_price(1), None);
    }

    #[test]
    fn test_vwap() {
        let mut tape = TradeTape::default();
        tape.record(print(Side::Sell, 100, 1_000_000)); // 100.00
        tape.record(print(Side::Buy, 300, 1_010_000)); // 101.00
        let vwap = tape.vwap().unwrap();
        assert!((vwap - 100.75).abs() < 1e-9);
    }

    #[test]
    fn test_recent_limit() {
        let mut tape = TradeTape::new(TradeTapeConfig::default().with_max_recent(3));
        for i in 0..5 {
            tape.record(print(Side::Sell, 1, i));
        }
        assert_eq!(tape.recent_trades().len(), 3);
        assert_eq!(tape.total_trades(), 5);
        let last: Vec<i64> = tape.last_n_trades(2).iter().map(|p| p.price.raw()).collect();
        assert_eq!(last, vec![4, 3]);
    }

    #[test]
    fn test_break_trade() {
        let mut tape = TradeTape::default();
        tape.record(print(Side::Sell, 1, 1).with_refs(7, 900));
        assert!(tape.break_trade(900));
        assert!(tape.recent_trades()[0].broken);
        assert!(!tape.break_trade(901));
        assert_eq!(tape.broken_trades(), 2);
    }

    #[test]
    fn test_reset() {
        let mut tape = TradeTape::default();
        tape.record(print(Side::Sell, 10, 1));
        tape.reset();
        assert_eq!(tape.total_trades(), 0);
        assert!(tape.recent_trades().is_empty());
    }
}
