//! Multi-symbol order book engine.
//!
//! Applies decoded messages, in feed order, to one [`OrderBook`] per stock
//! locate. Books are created lazily on the first Add for a locate and live
//! for the rest of the run. The engine owns all run state: the books, the
//! locate to symbol table, the trade tape and the anomaly tracker.
//!
//! # Example
//! ```
//! use itch_lob_reconstructor::lob::{Applied, EngineConfig, OrderBookEngine};
//! use itch_lob_reconstructor::messages::{AddOrder, Header, Message};
//! use itch_lob_reconstructor::{Price, Side, Symbol};
//!
//! let mut engine = OrderBookEngine::new(EngineConfig::default());
//! let add = Message::AddOrder(AddOrder {
//!     header: Header { stock_locate: 1, ..Header::default() },
//!     order_ref: 7,
//!     side: Side::Buy,
//!     shares: 100,
//!     stock: Symbol::new("AAPL"),
//!     price: Price::from_raw(1_000_000),
//!     attribution: None,
//! });
//!
//! assert_eq!(engine.apply(&add).unwrap(), Applied::Booked);
//! let book = engine.book_by_symbol("AAPL").unwrap();
//! assert_eq!(book.best_bid(), Some(Price::from_raw(1_000_000)));
//! ```

use ahash::AHashSet;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::book::{BookAnomaly, OrderBook, Reduction};
use super::snapshot::{BookSnapshot, SnapshotPolicy, SnapshotSchedule};
use super::symbols::SymbolTable;
use super::trade_tape::{PrintKind, TradePrint, TradeTape, TradeTapeConfig};
use crate::anomalies::{AnomalyRecord, AnomalyTracker, AnomalyTrackerConfig};
use crate::error::Result;
use crate::messages::{AddOrder, Message, OrderExecuted, OrderReplace};
use crate::types::{Symbol, Timestamp};

/// Configuration for the order book engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Symbols to book. `None` books every symbol on the feed; others are
    /// still decoded but never reach a book.
    pub symbols: Option<Vec<String>>,

    pub snapshot_policy: SnapshotPolicy,

    /// Levels per side in each snapshot (`None` = full ladder)
    pub snapshot_depth: Option<usize>,

    /// Whether to log anomalies and crossed books
    pub log_anomalies: bool,

    /// Verify book invariants after every booked message (slow; tests)
    pub check_invariants: bool,

    pub tape: TradeTapeConfig,

    pub anomalies: AnomalyTrackerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: None,
            snapshot_policy: SnapshotPolicy::Never,
            snapshot_depth: None,
            log_anomalies: true,
            check_invariants: false,
            tape: TradeTapeConfig::default(),
            anomalies: AnomalyTrackerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict booking to these symbols.
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.symbols = Some(symbols.into_iter().map(|s| s.as_ref().to_string()).collect());
        self
    }

    pub fn with_snapshot_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.snapshot_policy = policy;
        self
    }

    pub fn with_snapshot_depth(mut self, depth: usize) -> Self {
        self.snapshot_depth = Some(depth);
        self
    }

    pub fn with_logging(mut self, log: bool) -> Self {
        self.log_anomalies = log;
        self.anomalies.log_anomalies = log;
        self
    }

    pub fn with_invariant_checks(mut self, check: bool) -> Self {
        self.check_invariants = check;
        self
    }

    pub fn with_tape(mut self, tape: TradeTapeConfig) -> Self {
        self.tape = tape;
        self
    }

    pub fn with_anomaly_config(mut self, anomalies: AnomalyTrackerConfig) -> Self {
        self.anomalies = anomalies;
        self
    }
}

/// What the engine did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A book changed
    Booked,
    /// Only the trade tape changed (`P`, `B`)
    Traded,
    /// Message has no book effect
    Ignored,
    /// Symbol is outside the allow-list
    Filtered,
    /// Rejected or clamped; see the anomaly tracker
    Anomaly(BookAnomaly),
}

/// Statistics for one engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Every message passed to `apply`
    pub messages: u64,
    pub booked: u64,
    pub traded: u64,
    pub ignored: u64,
    pub filtered: u64,
    pub anomalies: u64,
    pub snapshots_taken: u64,
}

/// Per-run order book engine.
pub struct OrderBookEngine {
    config: EngineConfig,
    allow: Option<AHashSet<Symbol>>,
    books: IndexMap<u16, OrderBook>,
    symbols: SymbolTable,
    tape: TradeTape,
    anomalies: AnomalyTracker,
    schedule: SnapshotSchedule,
    pending_snapshots: Vec<BookSnapshot>,
    stats: EngineStats,
}

impl Default for OrderBookEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl OrderBookEngine {
    pub fn new(config: EngineConfig) -> Self {
        let allow = config
            .symbols
            .as_ref()
            .map(|list| list.iter().map(|s| Symbol::new(s)).collect());
        Self {
            allow,
            books: IndexMap::new(),
            symbols: SymbolTable::new(),
            tape: TradeTape::new(config.tape.clone()),
            anomalies: AnomalyTracker::with_config(config.anomalies.clone()),
            schedule: SnapshotSchedule::new(config.snapshot_policy),
            pending_snapshots: Vec::new(),
            stats: EngineStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply one message.
    pub fn apply(&mut self, message: &Message) -> Result<Applied> {
        self.apply_inner(None, message)
    }

    /// Apply one message read at byte `offset`; the offset is attached to
    /// any anomaly it raises.
    pub fn apply_at(&mut self, offset: u64, message: &Message) -> Result<Applied> {
        self.apply_inner(Some(offset), message)
    }

    fn apply_inner(&mut self, offset: Option<u64>, message: &Message) -> Result<Applied> {
        self.stats.messages += 1;
        let locate = message.stock_locate();
        let timestamp = message.timestamp();

        let applied = match message {
            Message::StockDirectory(m) => {
                if let Some(old) = self.symbols.bind(locate, m.stock) {
                    log::debug!("locate {locate} rebound from {old} to {}", m.stock);
                }
                if let Some(book) = self.books.get_mut(&locate) {
                    book.set_symbol(m.stock);
                }
                Applied::Ignored
            }
            Message::AddOrder(m) => self.on_add(m),
            Message::OrderExecuted(m) => self.on_execute(m),
            Message::OrderCancel(m) => {
                self.on_reduce(locate, m.order_ref, |book| {
                    book.cancel(m.order_ref, m.canceled_shares)
                })
            }
            Message::OrderDelete(m) => {
                self.with_book(locate, m.order_ref, |book| book.delete(m.order_ref).map(|_| ()))
            }
            Message::OrderReplace(m) => self.on_replace(m),
            Message::Trade(m) => {
                if !self.is_allowed(&m.stock) {
                    Applied::Filtered
                } else {
                    self.tape.record(
                        TradePrint::new(
                            PrintKind::NonDisplayed,
                            timestamp,
                            locate,
                            m.stock,
                            m.side,
                            m.shares,
                            m.price,
                        )
                        .with_refs(m.order_ref, m.match_number),
                    );
                    Applied::Traded
                }
            }
            Message::BrokenTrade(m) => {
                if !self.tape.break_trade(m.match_number) {
                    log::debug!("broken trade {} not in recent prints", m.match_number);
                }
                Applied::Traded
            }
            _ => Applied::Ignored,
        };

        match applied {
            Applied::Booked => self.stats.booked += 1,
            Applied::Traded => self.stats.traded += 1,
            Applied::Ignored => self.stats.ignored += 1,
            Applied::Filtered => self.stats.filtered += 1,
            Applied::Anomaly(anomaly) => {
                // An orphan replace is also an unknown reference
                if let BookAnomaly::OrphanReplace {
                    original_order_ref, ..
                } = anomaly
                {
                    let unknown = BookAnomaly::UnknownOrderRef {
                        order_ref: original_order_ref,
                    };
                    self.record_anomaly(offset, locate, timestamp, unknown);
                }
                self.record_anomaly(offset, locate, timestamp, anomaly);
            }
        }

        if matches!(applied, Applied::Booked | Applied::Anomaly(_)) {
            if let Some(book) = self.books.get_mut(&locate) {
                book.track_consistency(timestamp, self.config.log_anomalies);
                if self.config.check_invariants {
                    book.check_invariants()?;
                }
            }
        }

        if self.schedule.on_message(timestamp) {
            let snapshots = self.snapshot_all(timestamp);
            self.stats.snapshots_taken += snapshots.len() as u64;
            self.pending_snapshots.extend(snapshots);
        }

        Ok(applied)
    }

    fn on_add(&mut self, m: &AddOrder) -> Applied {
        let locate = m.header.stock_locate;
        let symbol = match self.symbols.resolve(locate) {
            Some(symbol) => symbol,
            None => {
                // No directory entry yet: the add's own stock field binds it
                self.symbols.bind(locate, m.stock);
                m.stock
            }
        };
        if !self.is_allowed(&symbol) {
            return Applied::Filtered;
        }

        let book = self
            .books
            .entry(locate)
            .or_insert_with(|| OrderBook::new(locate, symbol));
        match book.add_order(m.order_ref, m.side, m.price, m.shares) {
            Ok(()) => Applied::Booked,
            Err(anomaly) => Applied::Anomaly(anomaly),
        }
    }

    fn on_execute(&mut self, m: &OrderExecuted) -> Applied {
        let locate = m.header.stock_locate;
        let reduction = match self.books.get_mut(&locate) {
            Some(book) => book.execute(m.order_ref, m.executed_shares),
            None => return self.missing_book(locate, m.order_ref),
        };
        let reduction = match reduction {
            Ok(reduction) => reduction,
            Err(anomaly) => return Applied::Anomaly(anomaly),
        };

        if reduction.applied > 0 {
            let (kind, price, printable) = match m.with_price {
                Some(p) => (
                    PrintKind::ExecutionWithPrice,
                    p.execution_price,
                    p.printable == 'Y',
                ),
                None => (PrintKind::Execution, reduction.order.price, true),
            };
            let symbol = self.symbol_of(locate);
            self.tape.record(
                TradePrint::new(
                    kind,
                    m.header.timestamp,
                    locate,
                    symbol,
                    reduction.order.side,
                    reduction.applied,
                    price,
                )
                .with_refs(m.order_ref, m.match_number)
                .with_printable(printable),
            );
        }
        Self::reduction_outcome(reduction)
    }

    fn on_reduce<F>(&mut self, locate: u16, order_ref: u64, reduce: F) -> Applied
    where
        F: FnOnce(&mut OrderBook) -> std::result::Result<Reduction, BookAnomaly>,
    {
        let Some(book) = self.books.get_mut(&locate) else {
            return self.missing_book(locate, order_ref);
        };
        match reduce(book) {
            Ok(reduction) => Self::reduction_outcome(reduction),
            Err(anomaly) => Applied::Anomaly(anomaly),
        }
    }

    fn on_replace(&mut self, m: &OrderReplace) -> Applied {
        let locate = m.header.stock_locate;
        let outcome = match self.books.get_mut(&locate) {
            Some(book) => match book.replace(m.original_order_ref, m.new_order_ref, m.shares, m.price) {
                Ok(_) => return Applied::Booked,
                Err(anomaly) => Applied::Anomaly(anomaly),
            },
            None => self.missing_book(locate, m.original_order_ref),
        };
        match outcome {
            Applied::Anomaly(BookAnomaly::UnknownOrderRef { .. }) => {
                Applied::Anomaly(BookAnomaly::OrphanReplace {
                    original_order_ref: m.original_order_ref,
                    new_order_ref: m.new_order_ref,
                })
            }
            other => other,
        }
    }

    fn with_book<F>(&mut self, locate: u16, order_ref: u64, op: F) -> Applied
    where
        F: FnOnce(&mut OrderBook) -> std::result::Result<(), BookAnomaly>,
    {
        let Some(book) = self.books.get_mut(&locate) else {
            return self.missing_book(locate, order_ref);
        };
        match op(book) {
            Ok(()) => Applied::Booked,
            Err(anomaly) => Applied::Anomaly(anomaly),
        }
    }

    fn reduction_outcome(reduction: Reduction) -> Applied {
        match reduction.anomaly() {
            Some(anomaly) => Applied::Anomaly(anomaly),
            None => Applied::Booked,
        }
    }

    /// Outcome for an order-reference message whose locate has no book.
    ///
    /// With an allow-list, a locate that does not resolve to an allowed
    /// symbol is filtered; otherwise the reference is unknown.
    fn missing_book(&self, locate: u16, order_ref: u64) -> Applied {
        let filtered = match (&self.allow, self.symbols.resolve(locate)) {
            (None, _) => false,
            (Some(allow), Some(symbol)) => !allow.contains(&symbol),
            (Some(_), None) => true,
        };
        if filtered {
            Applied::Filtered
        } else {
            Applied::Anomaly(BookAnomaly::UnknownOrderRef { order_ref })
        }
    }

    fn record_anomaly(
        &mut self,
        offset: Option<u64>,
        locate: u16,
        timestamp: Timestamp,
        anomaly: BookAnomaly,
    ) {
        self.stats.anomalies += 1;
        let symbol = self.symbol_of(locate);
        if let Some(book) = self.books.get_mut(&locate) {
            book.note_anomaly();
        }
        let mut record = AnomalyRecord::new(anomaly.kind(), format!("{symbol}: {anomaly}"))
            .with_timestamp(timestamp)
            .with_stock_locate(locate)
            .with_order_ref(anomaly.order_ref());
        if let Some(offset) = offset {
            record = record.with_offset(offset);
        }
        self.anomalies.record(record);
    }

    fn is_allowed(&self, symbol: &Symbol) -> bool {
        self.allow.as_ref().map_or(true, |allow| allow.contains(symbol))
    }

    fn symbol_of(&self, locate: u16) -> Symbol {
        self.symbols
            .resolve(locate)
            .or_else(|| self.books.get(&locate).map(|b| b.symbol()))
            .unwrap_or_default()
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Snapshot every tracked book, in first-seen order.
    pub fn snapshot_all(&self, timestamp: Timestamp) -> Vec<BookSnapshot> {
        self.books
            .values()
            .map(|book| book.snapshot(self.config.snapshot_depth, timestamp, self.stats.messages))
            .collect()
    }

    /// Snapshot one book by symbol.
    pub fn snapshot(&self, symbol: &str, timestamp: Timestamp) -> Option<BookSnapshot> {
        self.book_by_symbol(symbol)
            .map(|book| book.snapshot(self.config.snapshot_depth, timestamp, self.stats.messages))
    }

    /// Take the snapshots produced by the policy since the last call.
    pub fn drain_snapshots(&mut self) -> Vec<BookSnapshot> {
        std::mem::take(&mut self.pending_snapshots)
    }

    pub fn pending_snapshots(&self) -> usize {
        self.pending_snapshots.len()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn book(&self, stock_locate: u16) -> Option<&OrderBook> {
        self.books.get(&stock_locate)
    }

    pub fn book_by_symbol(&self, symbol: &str) -> Option<&OrderBook> {
        let locate = self.symbols.locate_of(&Symbol::new(symbol))?;
        self.books.get(&locate)
    }

    /// Tracked books in first-seen order.
    pub fn books(&self) -> impl Iterator<Item = &OrderBook> {
        self.books.values()
    }

    pub fn book_count(&self) -> usize {
        self.books.len()
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn tape(&self) -> &TradeTape {
        &self.tape
    }

    pub fn anomalies(&self) -> &AnomalyTracker {
        &self.anomalies
    }

    /// The pipeline records decode errors here.
    pub fn anomalies_mut(&mut self) -> &mut AnomalyTracker {
        &mut self.anomalies
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Verify invariants of every book.
    pub fn check_invariants(&self) -> Result<()> {
        self.books.values().try_for_each(OrderBook::check_invariants)
    }
}
