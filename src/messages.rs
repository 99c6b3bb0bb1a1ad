//! Decoded ITCH 5.0 message model.
//!
//! [`Message`] is a closed enum over every message kind of the protocol. Each
//! variant wraps a plain struct whose fields follow the published layout; all
//! of them carry the common [`Header`]. [`MessageKind`] is the static table
//! mapping a type tag to its kind, fixed body length and storage category.

use serde::{Deserialize, Serialize};

use crate::types::{Alpha, Mpid, Price, Price8, Side, Symbol, Timestamp};

/// Fields shared by every ITCH message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Header {
    /// Locate code identifying the security for the day
    pub stock_locate: u16,
    /// NASDAQ internal tracking number
    pub tracking_number: u16,
    /// Nanoseconds since midnight
    pub timestamp: Timestamp,
}

// ============================================================================
// System / administrative messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub header: Header,
    pub event_code: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDirectory {
    pub header: Header,
    pub stock: Symbol,
    pub market_category: char,
    pub financial_status: char,
    pub round_lot_size: u32,
    pub round_lots_only: char,
    pub issue_classification: char,
    pub issue_subtype: Alpha<2>,
    pub authenticity: char,
    pub short_sale_threshold: char,
    pub ipo_flag: char,
    pub luld_ref_price_tier: char,
    pub etp_flag: char,
    pub etp_leverage_factor: u32,
    pub inverse_indicator: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTradingAction {
    pub header: Header,
    pub stock: Symbol,
    pub trading_state: char,
    pub reserved: char,
    pub reason: Alpha<4>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegShoRestriction {
    pub header: Header,
    pub stock: Symbol,
    pub reg_sho_action: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParticipantPosition {
    pub header: Header,
    pub mpid: Mpid,
    pub stock: Symbol,
    pub primary_market_maker: char,
    pub market_maker_mode: char,
    pub market_participant_state: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MwcbDeclineLevel {
    pub header: Header,
    pub level1: Price8,
    pub level2: Price8,
    pub level3: Price8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MwcbStatus {
    pub header: Header,
    pub breached_level: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpoQuotingPeriodUpdate {
    pub header: Header,
    pub stock: Symbol,
    /// Seconds since midnight
    pub release_time: u32,
    pub release_qualifier: char,
    pub ipo_price: Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LuldAuctionCollar {
    pub header: Header,
    pub stock: Symbol,
    pub reference_price: Price,
    pub upper_price: Price,
    pub lower_price: Price,
    pub extension: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalHalt {
    pub header: Header,
    pub stock: Symbol,
    pub market_code: char,
    pub halt_action: char,
}

// ============================================================================
// Order messages
// ============================================================================

/// Add Order (`A`) and Add Order with MPID attribution (`F`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOrder {
    pub header: Header,
    pub order_ref: u64,
    pub side: Side,
    pub shares: u32,
    pub stock: Symbol,
    pub price: Price,
    /// Present only on `F` messages
    pub attribution: Option<Mpid>,
}

/// Order Executed (`E`) and Order Executed with Price (`C`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExecuted {
    pub header: Header,
    pub order_ref: u64,
    pub executed_shares: u32,
    pub match_number: u64,
    /// Present only on `C` messages
    pub with_price: Option<ExecutionPrice>,
}

/// Price extension of an `OrderExecutedWithPrice` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPrice {
    pub printable: char,
    pub execution_price: Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancel {
    pub header: Header,
    pub order_ref: u64,
    pub canceled_shares: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelete {
    pub header: Header,
    pub order_ref: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReplace {
    pub header: Header,
    pub original_order_ref: u64,
    pub new_order_ref: u64,
    pub shares: u32,
    pub price: Price,
}

// ============================================================================
// Trade and auction messages
// ============================================================================

/// Non-displayable order execution (`P`). Has no effect on the visible book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub header: Header,
    pub order_ref: u64,
    pub side: Side,
    pub shares: u32,
    pub stock: Symbol,
    pub price: Price,
    pub match_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossTrade {
    pub header: Header,
    pub shares: u64,
    pub stock: Symbol,
    pub cross_price: Price,
    pub match_number: u64,
    pub cross_type: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenTrade {
    pub header: Header,
    pub match_number: u64,
}

/// Net Order Imbalance Indicator (`I`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Noii {
    pub header: Header,
    pub paired_shares: u64,
    pub imbalance_shares: u64,
    pub imbalance_direction: char,
    pub stock: Symbol,
    pub far_price: Price,
    pub near_price: Price,
    pub current_reference_price: Price,
    pub cross_type: char,
    pub price_variation_indicator: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetailPriceImprovement {
    pub header: Header,
    pub stock: Symbol,
    pub interest_flag: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectListingPriceDiscovery {
    pub header: Header,
    pub stock: Symbol,
    pub open_eligibility: char,
    pub min_allowable_price: Price,
    pub max_allowable_price: Price,
    pub near_execution_price: Price,
    pub near_execution_time: u64,
    pub lower_collar: Price,
    pub upper_collar: Price,
}

// ============================================================================
// Message enum
// ============================================================================

/// One decoded ITCH 5.0 message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    SystemEvent(SystemEvent),
    StockDirectory(StockDirectory),
    StockTradingAction(StockTradingAction),
    RegShoRestriction(RegShoRestriction),
    MarketParticipantPosition(MarketParticipantPosition),
    MwcbDeclineLevel(MwcbDeclineLevel),
    MwcbStatus(MwcbStatus),
    IpoQuotingPeriodUpdate(IpoQuotingPeriodUpdate),
    LuldAuctionCollar(LuldAuctionCollar),
    OperationalHalt(OperationalHalt),
    AddOrder(AddOrder),
    OrderExecuted(OrderExecuted),
    OrderCancel(OrderCancel),
    OrderDelete(OrderDelete),
    OrderReplace(OrderReplace),
    Trade(Trade),
    CrossTrade(CrossTrade),
    BrokenTrade(BrokenTrade),
    Noii(Noii),
    RetailPriceImprovement(RetailPriceImprovement),
    DirectListingPriceDiscovery(DirectListingPriceDiscovery),
}

impl Message {
    /// Common header of the message.
    pub fn header(&self) -> &Header {
        match self {
            Message::SystemEvent(m) => &m.header,
            Message::StockDirectory(m) => &m.header,
            Message::StockTradingAction(m) => &m.header,
            Message::RegShoRestriction(m) => &m.header,
            Message::MarketParticipantPosition(m) => &m.header,
            Message::MwcbDeclineLevel(m) => &m.header,
            Message::MwcbStatus(m) => &m.header,
            Message::IpoQuotingPeriodUpdate(m) => &m.header,
            Message::LuldAuctionCollar(m) => &m.header,
            Message::OperationalHalt(m) => &m.header,
            Message::AddOrder(m) => &m.header,
            Message::OrderExecuted(m) => &m.header,
            Message::OrderCancel(m) => &m.header,
            Message::OrderDelete(m) => &m.header,
            Message::OrderReplace(m) => &m.header,
            Message::Trade(m) => &m.header,
            Message::CrossTrade(m) => &m.header,
            Message::BrokenTrade(m) => &m.header,
            Message::Noii(m) => &m.header,
            Message::RetailPriceImprovement(m) => &m.header,
            Message::DirectListingPriceDiscovery(m) => &m.header,
        }
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.header().timestamp
    }

    #[inline]
    pub fn stock_locate(&self) -> u16 {
        self.header().stock_locate
    }

    /// Exact kind, distinguishing `A`/`F` and `E`/`C`.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::SystemEvent(_) => MessageKind::SystemEvent,
            Message::StockDirectory(_) => MessageKind::StockDirectory,
            Message::StockTradingAction(_) => MessageKind::StockTradingAction,
            Message::RegShoRestriction(_) => MessageKind::RegShoRestriction,
            Message::MarketParticipantPosition(_) => MessageKind::MarketParticipantPosition,
            Message::MwcbDeclineLevel(_) => MessageKind::MwcbDeclineLevel,
            Message::MwcbStatus(_) => MessageKind::MwcbStatus,
            Message::IpoQuotingPeriodUpdate(_) => MessageKind::IpoQuotingPeriodUpdate,
            Message::LuldAuctionCollar(_) => MessageKind::LuldAuctionCollar,
            Message::OperationalHalt(_) => MessageKind::OperationalHalt,
            Message::AddOrder(m) if m.attribution.is_some() => MessageKind::AddOrderMpid,
            Message::AddOrder(_) => MessageKind::AddOrder,
            Message::OrderExecuted(m) if m.with_price.is_some() => {
                MessageKind::OrderExecutedWithPrice
            }
            Message::OrderExecuted(_) => MessageKind::OrderExecuted,
            Message::OrderCancel(_) => MessageKind::OrderCancel,
            Message::OrderDelete(_) => MessageKind::OrderDelete,
            Message::OrderReplace(_) => MessageKind::OrderReplace,
            Message::Trade(_) => MessageKind::Trade,
            Message::CrossTrade(_) => MessageKind::CrossTrade,
            Message::BrokenTrade(_) => MessageKind::BrokenTrade,
            Message::Noii(_) => MessageKind::Noii,
            Message::RetailPriceImprovement(_) => MessageKind::RetailPriceImprovement,
            Message::DirectListingPriceDiscovery(_) => MessageKind::DirectListingPriceDiscovery,
        }
    }

    #[inline]
    pub fn category(&self) -> MessageCategory {
        self.kind().category()
    }

    /// Stock symbol carried in the message body, if the layout has one.
    ///
    /// Order-reference messages (`E`, `C`, `X`, `D`, `U`) carry no symbol and
    /// must be resolved through the locate code.
    pub fn stock(&self) -> Option<Symbol> {
        match self {
            Message::StockDirectory(m) => Some(m.stock),
            Message::StockTradingAction(m) => Some(m.stock),
            Message::RegShoRestriction(m) => Some(m.stock),
            Message::MarketParticipantPosition(m) => Some(m.stock),
            Message::IpoQuotingPeriodUpdate(m) => Some(m.stock),
            Message::LuldAuctionCollar(m) => Some(m.stock),
            Message::OperationalHalt(m) => Some(m.stock),
            Message::AddOrder(m) => Some(m.stock),
            Message::Trade(m) => Some(m.stock),
            Message::CrossTrade(m) => Some(m.stock),
            Message::Noii(m) => Some(m.stock),
            Message::RetailPriceImprovement(m) => Some(m.stock),
            Message::DirectListingPriceDiscovery(m) => Some(m.stock),
            Message::SystemEvent(_)
            | Message::MwcbDeclineLevel(_)
            | Message::MwcbStatus(_)
            | Message::OrderExecuted(_)
            | Message::OrderCancel(_)
            | Message::OrderDelete(_)
            | Message::OrderReplace(_)
            | Message::BrokenTrade(_) => None,
        }
    }
}

// ============================================================================
// Kind table
// ============================================================================

/// Every ITCH 5.0 message kind, keyed by its type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    SystemEvent,
    StockDirectory,
    StockTradingAction,
    RegShoRestriction,
    MarketParticipantPosition,
    MwcbDeclineLevel,
    MwcbStatus,
    IpoQuotingPeriodUpdate,
    LuldAuctionCollar,
    OperationalHalt,
    AddOrder,
    AddOrderMpid,
    OrderExecuted,
    OrderExecutedWithPrice,
    OrderCancel,
    OrderDelete,
    OrderReplace,
    Trade,
    CrossTrade,
    BrokenTrade,
    Noii,
    RetailPriceImprovement,
    DirectListingPriceDiscovery,
}

impl MessageKind {
    /// All kinds in tag-table order.
    pub const ALL: [MessageKind; 23] = [
        MessageKind::SystemEvent,
        MessageKind::StockDirectory,
        MessageKind::StockTradingAction,
        MessageKind::RegShoRestriction,
        MessageKind::MarketParticipantPosition,
        MessageKind::MwcbDeclineLevel,
        MessageKind::MwcbStatus,
        MessageKind::IpoQuotingPeriodUpdate,
        MessageKind::LuldAuctionCollar,
        MessageKind::OperationalHalt,
        MessageKind::AddOrder,
        MessageKind::AddOrderMpid,
        MessageKind::OrderExecuted,
        MessageKind::OrderExecutedWithPrice,
        MessageKind::OrderCancel,
        MessageKind::OrderDelete,
        MessageKind::OrderReplace,
        MessageKind::Trade,
        MessageKind::CrossTrade,
        MessageKind::BrokenTrade,
        MessageKind::Noii,
        MessageKind::RetailPriceImprovement,
        MessageKind::DirectListingPriceDiscovery,
    ];

    /// Look up a kind by its type tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        let kind = match tag {
            b'S' => MessageKind::SystemEvent,
            b'R' => MessageKind::StockDirectory,
            b'H' => MessageKind::StockTradingAction,
            b'Y' => MessageKind::RegShoRestriction,
            b'L' => MessageKind::MarketParticipantPosition,
            b'V' => MessageKind::MwcbDeclineLevel,
            b'W' => MessageKind::MwcbStatus,
            b'K' => MessageKind::IpoQuotingPeriodUpdate,
            b'J' => MessageKind::LuldAuctionCollar,
            b'h' => MessageKind::OperationalHalt,
            b'A' => MessageKind::AddOrder,
            b'F' => MessageKind::AddOrderMpid,
            b'E' => MessageKind::OrderExecuted,
            b'C' => MessageKind::OrderExecutedWithPrice,
            b'X' => MessageKind::OrderCancel,
            b'D' => MessageKind::OrderDelete,
            b'U' => MessageKind::OrderReplace,
            b'P' => MessageKind::Trade,
            b'Q' => MessageKind::CrossTrade,
            b'B' => MessageKind::BrokenTrade,
            b'I' => MessageKind::Noii,
            b'N' => MessageKind::RetailPriceImprovement,
            b'O' => MessageKind::DirectListingPriceDiscovery,
            _ => return None,
        };
        Some(kind)
    }

    /// Type tag byte.
    pub fn tag(self) -> u8 {
        match self {
            MessageKind::SystemEvent => b'S',
            MessageKind::StockDirectory => b'R',
            MessageKind::StockTradingAction => b'H',
            MessageKind::RegShoRestriction => b'Y',
            MessageKind::MarketParticipantPosition => b'L',
            MessageKind::MwcbDeclineLevel => b'V',
            MessageKind::MwcbStatus => b'W',
            MessageKind::IpoQuotingPeriodUpdate => b'K',
            MessageKind::LuldAuctionCollar => b'J',
            MessageKind::OperationalHalt => b'h',
            MessageKind::AddOrder => b'A',
            MessageKind::AddOrderMpid => b'F',
            MessageKind::OrderExecuted => b'E',
            MessageKind::OrderExecutedWithPrice => b'C',
            MessageKind::OrderCancel => b'X',
            MessageKind::OrderDelete => b'D',
            MessageKind::OrderReplace => b'U',
            MessageKind::Trade => b'P',
            MessageKind::CrossTrade => b'Q',
            MessageKind::BrokenTrade => b'B',
            MessageKind::Noii => b'I',
            MessageKind::RetailPriceImprovement => b'N',
            MessageKind::DirectListingPriceDiscovery => b'O',
        }
    }

    /// Fixed body length in bytes, tag byte included.
    pub fn body_len(self) -> usize {
        match self {
            MessageKind::SystemEvent => 12,
            MessageKind::StockDirectory => 39,
            MessageKind::StockTradingAction => 25,
            MessageKind::RegShoRestriction => 20,
            MessageKind::MarketParticipantPosition => 26,
            MessageKind::MwcbDeclineLevel => 35,
            MessageKind::MwcbStatus => 12,
            MessageKind::IpoQuotingPeriodUpdate => 28,
            MessageKind::LuldAuctionCollar => 35,
            MessageKind::OperationalHalt => 21,
            MessageKind::AddOrder => 36,
            MessageKind::AddOrderMpid => 40,
            MessageKind::OrderExecuted => 31,
            MessageKind::OrderExecutedWithPrice => 36,
            MessageKind::OrderCancel => 23,
            MessageKind::OrderDelete => 19,
            MessageKind::OrderReplace => 35,
            MessageKind::Trade => 44,
            MessageKind::CrossTrade => 40,
            MessageKind::BrokenTrade => 19,
            MessageKind::Noii => 50,
            MessageKind::RetailPriceImprovement => 20,
            MessageKind::DirectListingPriceDiscovery => 48,
        }
    }

    /// Storage category the kind is grouped under.
    pub fn category(self) -> MessageCategory {
        match self {
            MessageKind::SystemEvent => MessageCategory::SystemEvents,
            MessageKind::StockDirectory => MessageCategory::StockDirectory,
            MessageKind::StockTradingAction => MessageCategory::TradingActions,
            MessageKind::AddOrder | MessageKind::AddOrderMpid => MessageCategory::AddOrders,
            MessageKind::Trade => MessageCategory::Trades,
            MessageKind::OrderExecuted | MessageKind::OrderExecutedWithPrice => {
                MessageCategory::OrderExecutions
            }
            MessageKind::OrderCancel => MessageCategory::OrderCancels,
            MessageKind::OrderDelete => MessageCategory::OrderDeletes,
            MessageKind::OrderReplace => MessageCategory::OrderReplaces,
            MessageKind::RegShoRestriction
            | MessageKind::MarketParticipantPosition
            | MessageKind::MwcbDeclineLevel
            | MessageKind::MwcbStatus
            | MessageKind::IpoQuotingPeriodUpdate
            | MessageKind::LuldAuctionCollar
            | MessageKind::OperationalHalt
            | MessageKind::CrossTrade
            | MessageKind::BrokenTrade
            | MessageKind::Noii
            | MessageKind::RetailPriceImprovement
            | MessageKind::DirectListingPriceDiscovery => MessageCategory::Other,
        }
    }

    /// Human-readable protocol name.
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::SystemEvent => "System Event",
            MessageKind::StockDirectory => "Stock Directory",
            MessageKind::StockTradingAction => "Stock Trading Action",
            MessageKind::RegShoRestriction => "Reg SHO Restriction",
            MessageKind::MarketParticipantPosition => "Market Participant Position",
            MessageKind::MwcbDeclineLevel => "MWCB Decline Level",
            MessageKind::MwcbStatus => "MWCB Status",
            MessageKind::IpoQuotingPeriodUpdate => "IPO Quoting Period Update",
            MessageKind::LuldAuctionCollar => "LULD Auction Collar",
            MessageKind::OperationalHalt => "Operational Halt",
            MessageKind::AddOrder => "Add Order No MPID",
            MessageKind::AddOrderMpid => "Add Order With MPID",
            MessageKind::OrderExecuted => "Order Executed",
            MessageKind::OrderExecutedWithPrice => "Order Executed With Price",
            MessageKind::OrderCancel => "Order Cancel",
            MessageKind::OrderDelete => "Order Delete",
            MessageKind::OrderReplace => "Order Replace",
            MessageKind::Trade => "Trade",
            MessageKind::CrossTrade => "Cross Trade",
            MessageKind::BrokenTrade => "Broken Trade",
            MessageKind::Noii => "NOII",
            MessageKind::RetailPriceImprovement => "RPII",
            MessageKind::DirectListingPriceDiscovery => "Direct Listing Price Discovery",
        }
    }
}

/// Persistence grouping of decoded messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageCategory {
    SystemEvents,
    StockDirectory,
    TradingActions,
    AddOrders,
    Trades,
    OrderExecutions,
    OrderCancels,
    OrderDeletes,
    OrderReplaces,
    /// Remaining administrative and auction kinds
    Other,
}

impl MessageCategory {
    pub const ALL: [MessageCategory; 10] = [
        MessageCategory::SystemEvents,
        MessageCategory::StockDirectory,
        MessageCategory::TradingActions,
        MessageCategory::AddOrders,
        MessageCategory::Trades,
        MessageCategory::OrderExecutions,
        MessageCategory::OrderCancels,
        MessageCategory::OrderDeletes,
        MessageCategory::OrderReplaces,
        MessageCategory::Other,
    ];

    /// Storage key, e.g. `"add_orders"`.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageCategory::SystemEvents => "system_events",
            MessageCategory::StockDirectory => "stock_directory",
            MessageCategory::TradingActions => "trading_actions",
            MessageCategory::AddOrders => "add_orders",
            MessageCategory::Trades => "trades",
            MessageCategory::OrderExecutions => "order_executions",
            MessageCategory::OrderCancels => "order_cancels",
            MessageCategory::OrderDeletes => "order_deletes",
            MessageCategory::OrderReplaces => "order_replaces",
            MessageCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_table_is_bijective() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(MessageKind::from_tag(b'Z'), None);
        assert_eq!(MessageKind::from_tag(b'a'), None);
    }

    #[test]
    fn test_body_lengths() {
        assert_eq!(MessageKind::AddOrder.body_len(), 36);
        assert_eq!(MessageKind::AddOrderMpid.body_len(), 40);
        assert_eq!(MessageKind::OrderDelete.body_len(), 19);
        assert_eq!(MessageKind::Noii.body_len(), 50);
        for kind in MessageKind::ALL {
            // Every layout has at least the 11-byte header
            assert!(kind.body_len() >= 12, "{kind:?}");
        }
    }

    #[test]
    fn test_categories_follow_storage_grouping() {
        assert_eq!(MessageKind::AddOrderMpid.category(), MessageCategory::AddOrders);
        assert_eq!(
            MessageKind::OrderExecutedWithPrice.category(),
            MessageCategory::OrderExecutions
        );
        assert_eq!(MessageKind::Trade.category(), MessageCategory::Trades);
        assert_eq!(MessageKind::Noii.category(), MessageCategory::Other);
        assert_eq!(MessageCategory::AddOrders.to_string(), "add_orders");
    }

    #[test]
    fn test_kind_distinguishes_variants() {
        let header = Header::default();
        let add = AddOrder {
            header,
            order_ref: 1,
            side: Side::Buy,
            shares: 100,
            stock: Symbol::new("AAPL"),
            price: Price::from_raw(1_000_000),
            attribution: None,
        };
        assert_eq!(Message::AddOrder(add).kind(), MessageKind::AddOrder);

        let add_mpid = AddOrder {
            attribution: Some(Mpid::new("GSCO")),
            ..add
        };
        assert_eq!(Message::AddOrder(add_mpid).kind(), MessageKind::AddOrderMpid);
        assert_eq!(Message::AddOrder(add_mpid).stock(), Some(Symbol::new("AAPL")));
    }
}
