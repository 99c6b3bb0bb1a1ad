//! Limit Order Book (LOB) reconstruction module.
//!
//! This module rebuilds per-symbol order books from the ITCH order message
//! stream, using only the order reference indirection the feed carries.

mod book;
mod engine;
pub mod price_level;
pub mod snapshot;
mod symbols;
pub mod trade_tape;

pub use book::{BookAnomaly, BookStats, OrderBook, Reduction};
pub use engine::{Applied, EngineConfig, EngineStats, OrderBookEngine};
pub use price_level::PriceLevel;
pub use snapshot::{BookSnapshot, LevelQuote, SnapshotPolicy};
pub use symbols::SymbolTable;
pub use trade_tape::{PrintKind, TradePrint, TradeTape, TradeTapeConfig};
