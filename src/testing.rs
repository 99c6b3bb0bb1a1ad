//! Feed construction helpers for tests, benchmarks and demos.
//!
//! [`encode_message`] is the exact inverse of [`crate::decoder::decode`], and
//! [`FeedBuilder`] strings encoded bodies together into a framed byte stream.
//!
//! ```
//! use itch_lob_reconstructor::testing::FeedBuilder;
//! use itch_lob_reconstructor::Side;
//!
//! let feed = FeedBuilder::new()
//!     .at(34_200_000_000_000)
//!     .stock_directory(1, "AAPL")
//!     .add(1, 42, Side::Buy, 100, 1_500_000)
//!     .build();
//! assert_eq!(feed.len(), 2 + 39 + 2 + 36);
//! ```

use ahash::AHashMap;
use byteorder::{BigEndian, ByteOrder};

use crate::messages::*;
use crate::types::{Alpha, Mpid, Price, Price8, Side, Symbol, Timestamp};

/// Fixed-layout body writer.
struct BodyWriter {
    buf: Vec<u8>,
}

impl BodyWriter {
    fn new(kind: MessageKind, header: &Header) -> Self {
        let mut w = Self {
            buf: vec![0u8; kind.body_len()],
        };
        w.buf[0] = kind.tag();
        w.u16(1, header.stock_locate);
        w.u16(3, header.tracking_number);
        BigEndian::write_u48(&mut w.buf[5..11], header.timestamp.nanos());
        w
    }

    fn u16(&mut self, offset: usize, v: u16) {
        BigEndian::write_u16(&mut self.buf[offset..offset + 2], v);
    }

    fn u32(&mut self, offset: usize, v: u32) {
        BigEndian::write_u32(&mut self.buf[offset..offset + 4], v);
    }

    fn u64(&mut self, offset: usize, v: u64) {
        BigEndian::write_u64(&mut self.buf[offset..offset + 8], v);
    }

    fn ch(&mut self, offset: usize, c: char) {
        self.buf[offset] = c as u8;
    }

    fn alpha<const N: usize>(&mut self, offset: usize, a: &Alpha<N>) {
        self.buf[offset..offset + N].copy_from_slice(a.raw());
    }

    // Price(4) fields are unsigned 32-bit on the wire
    fn price4(&mut self, offset: usize, p: Price) {
        self.u32(offset, p.raw() as u32);
    }

    fn price8(&mut self, offset: usize, p: Price8) {
        self.u64(offset, p.raw() as u64);
    }

    fn side(&mut self, offset: usize, side: Side) {
        self.buf[offset] = side.to_byte();
    }
}

/// Encode a message to its wire body (tag byte first, no length prefix).
pub fn encode_message(message: &Message) -> Vec<u8> {
    let mut w = BodyWriter::new(message.kind(), message.header());

    match message {
        Message::SystemEvent(m) => w.ch(11, m.event_code),
        Message::StockDirectory(m) => {
            w.alpha(11, &m.stock);
            w.ch(19, m.market_category);
            w.ch(20, m.financial_status);
            w.u32(21, m.round_lot_size);
            w.ch(25, m.round_lots_only);
            w.ch(26, m.issue_classification);
            w.alpha(27, &m.issue_subtype);
            w.ch(29, m.authenticity);
            w.ch(30, m.short_sale_threshold);
            w.ch(31, m.ipo_flag);
            w.ch(32, m.luld_ref_price_tier);
            w.ch(33, m.etp_flag);
            w.u32(34, m.etp_leverage_factor);
            w.ch(38, m.inverse_indicator);
        }
        Message::StockTradingAction(m) => {
            w.alpha(11, &m.stock);
            w.ch(19, m.trading_state);
            w.ch(20, m.reserved);
            w.alpha(21, &m.reason);
        }
        Message::RegShoRestriction(m) => {
            w.alpha(11, &m.stock);
            w.ch(19, m.reg_sho_action);
        }
        Message::MarketParticipantPosition(m) => {
            w.alpha(11, &m.mpid);
            w.alpha(15, &m.stock);
            w.ch(23, m.primary_market_maker);
            w.ch(24, m.market_maker_mode);
            w.ch(25, m.market_participant_state);
        }
        Message::MwcbDeclineLevel(m) => {
            w.price8(11, m.level1);
            w.price8(19, m.level2);
            w.price8(27, m.level3);
        }
        Message::MwcbStatus(m) => w.ch(11, m.breached_level),
        Message::IpoQuotingPeriodUpdate(m) => {
            w.alpha(11, &m.stock);
            w.u32(19, m.release_time);
            w.ch(23, m.release_qualifier);
            w.price4(24, m.ipo_price);
        }
        Message::LuldAuctionCollar(m) => {
            w.alpha(11, &m.stock);
            w.price4(19, m.reference_price);
            w.price4(23, m.upper_price);
            w.price4(27, m.lower_price);
            w.u32(31, m.extension);
        }
        Message::OperationalHalt(m) => {
            w.alpha(11, &m.stock);
            w.ch(19, m.market_code);
            w.ch(20, m.halt_action);
        }
        Message::AddOrder(m) => {
            w.u64(11, m.order_ref);
            w.side(19, m.side);
            w.u32(20, m.shares);
            w.alpha(24, &m.stock);
            w.price4(32, m.price);
            if let Some(mpid) = &m.attribution {
                w.alpha(36, mpid);
            }
        }
        Message::OrderExecuted(m) => {
            w.u64(11, m.order_ref);
            w.u32(19, m.executed_shares);
            w.u64(23, m.match_number);
            if let Some(p) = &m.with_price {
                w.ch(31, p.printable);
                w.price4(32, p.execution_price);
            }
        }
        Message::OrderCancel(m) => {
            w.u64(11, m.order_ref);
            w.u32(19, m.canceled_shares);
        }
        Message::OrderDelete(m) => w.u64(11, m.order_ref),
        Message::OrderReplace(m) => {
            w.u64(11, m.original_order_ref);
            w.u64(19, m.new_order_ref);
            w.u32(27, m.shares);
            w.price4(31, m.price);
        }
        Message::Trade(m) => {
            w.u64(11, m.order_ref);
            w.side(19, m.side);
            w.u32(20, m.shares);
            w.alpha(24, &m.stock);
            w.price4(32, m.price);
            w.u64(36, m.match_number);
        }
        Message::CrossTrade(m) => {
            w.u64(11, m.shares);
            w.alpha(19, &m.stock);
            w.price4(27, m.cross_price);
            w.u64(31, m.match_number);
            w.ch(39, m.cross_type);
        }
        Message::BrokenTrade(m) => w.u64(11, m.match_number),
        Message::Noii(m) => {
            w.u64(11, m.paired_shares);
            w.u64(19, m.imbalance_shares);
            w.ch(27, m.imbalance_direction);
            w.alpha(28, &m.stock);
            w.price4(36, m.far_price);
            w.price4(40, m.near_price);
            w.price4(44, m.current_reference_price);
            w.ch(48, m.cross_type);
            w.ch(49, m.price_variation_indicator);
        }
        Message::RetailPriceImprovement(m) => {
            w.alpha(11, &m.stock);
            w.ch(19, m.interest_flag);
        }
        Message::DirectListingPriceDiscovery(m) => {
            w.alpha(11, &m.stock);
            w.ch(19, m.open_eligibility);
            w.price4(20, m.min_allowable_price);
            w.price4(24, m.max_allowable_price);
            w.price4(28, m.near_execution_price);
            w.u64(32, m.near_execution_time);
            w.price4(40, m.lower_collar);
            w.price4(44, m.upper_collar);
        }
    }

    w.buf
}

/// Builder for a framed ITCH byte stream.
///
/// Order messages take the stock symbol from the latest
/// [`FeedBuilder::stock_directory`] call for their locate, or `L<locate>`
/// if none was made. Prices are raw Price(4) integers.
#[derive(Debug, Clone, Default)]
pub struct FeedBuilder {
    buf: Vec<u8>,
    frames: usize,
    timestamp: u64,
    tracking_number: u16,
    symbols: AHashMap<u16, Symbol>,
}

impl FeedBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timestamp for subsequent messages.
    pub fn at(mut self, nanos: u64) -> Self {
        self.timestamp = nanos;
        self
    }

    /// Set the tracking number for subsequent messages.
    pub fn tracking(mut self, tracking_number: u16) -> Self {
        self.tracking_number = tracking_number;
        self
    }

    /// Append raw bytes that are not a frame (a vendor preamble, garbage).
    pub fn with_preamble(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    fn header(&self, locate: u16) -> Header {
        Header {
            stock_locate: locate,
            tracking_number: self.tracking_number,
            timestamp: Timestamp::from_nanos(self.timestamp),
        }
    }

    fn symbol(&self, locate: u16) -> Symbol {
        self.symbols
            .get(&locate)
            .copied()
            .unwrap_or_else(|| Symbol::new(&format!("L{locate}")))
    }

    /// Append one frame with `body` as-is (no validation).
    pub fn raw_frame(mut self, body: &[u8]) -> Self {
        let mut prefix = [0u8; 2];
        BigEndian::write_u16(&mut prefix, body.len() as u16);
        self.buf.extend_from_slice(&prefix);
        self.buf.extend_from_slice(body);
        self.frames += 1;
        self
    }

    /// Append an encoded message.
    pub fn message(self, message: &Message) -> Self {
        let body = encode_message(message);
        self.raw_frame(&body)
    }

    pub fn system_event(self, event_code: u8) -> Self {
        let msg = Message::SystemEvent(SystemEvent {
            header: self.header(0),
            event_code: event_code as char,
        });
        self.message(&msg)
    }

    pub fn stock_directory(mut self, locate: u16, stock: &str) -> Self {
        let symbol = Symbol::new(stock);
        self.symbols.insert(locate, symbol);
        let msg = Message::StockDirectory(StockDirectory {
            header: self.header(locate),
            stock: symbol,
            market_category: 'Q',
            financial_status: 'N',
            round_lot_size: 100,
            round_lots_only: 'N',
            issue_classification: 'C',
            issue_subtype: Alpha::new("Z"),
            authenticity: 'P',
            short_sale_threshold: 'N',
            ipo_flag: 'N',
            luld_ref_price_tier: '1',
            etp_flag: 'N',
            etp_leverage_factor: 0,
            inverse_indicator: 'N',
        });
        self.message(&msg)
    }

    pub fn add(self, locate: u16, order_ref: u64, side: Side, shares: u32, price: u32) -> Self {
        self.add_with(locate, order_ref, side, shares, price, None)
    }

    /// Add with MPID attribution (`F`).
    pub fn add_mpid(
        self,
        locate: u16,
        order_ref: u64,
        side: Side,
        shares: u32,
        price: u32,
        mpid: &str,
    ) -> Self {
        self.add_with(locate, order_ref, side, shares, price, Some(Mpid::new(mpid)))
    }

    fn add_with(
        self,
        locate: u16,
        order_ref: u64,
        side: Side,
        shares: u32,
        price: u32,
        attribution: Option<Mpid>,
    ) -> Self {
        let msg = Message::AddOrder(AddOrder {
            header: self.header(locate),
            order_ref,
            side,
            shares,
            stock: self.symbol(locate),
            price: Price::from_raw(i64::from(price)),
            attribution,
        });
        self.message(&msg)
    }

    pub fn execute(self, locate: u16, order_ref: u64, shares: u32, match_number: u64) -> Self {
        let msg = Message::OrderExecuted(OrderExecuted {
            header: self.header(locate),
            order_ref,
            executed_shares: shares,
            match_number,
            with_price: None,
        });
        self.message(&msg)
    }

    pub fn execute_with_price(
        self,
        locate: u16,
        order_ref: u64,
        shares: u32,
        match_number: u64,
        printable: bool,
        price: u32,
    ) -> Self {
        let msg = Message::OrderExecuted(OrderExecuted {
            header: self.header(locate),
            order_ref,
            executed_shares: shares,
            match_number,
            with_price: Some(ExecutionPrice {
                printable: if printable { 'Y' } else { 'N' },
                execution_price: Price::from_raw(i64::from(price)),
            }),
        });
        self.message(&msg)
    }

    pub fn cancel(self, locate: u16, order_ref: u64, shares: u32) -> Self {
        let msg = Message::OrderCancel(OrderCancel {
            header: self.header(locate),
            order_ref,
            canceled_shares: shares,
        });
        self.message(&msg)
    }

    pub fn delete(self, locate: u16, order_ref: u64) -> Self {
        let msg = Message::OrderDelete(OrderDelete {
            header: self.header(locate),
            order_ref,
        });
        self.message(&msg)
    }

    pub fn replace(
        self,
        locate: u16,
        original_order_ref: u64,
        new_order_ref: u64,
        shares: u32,
        price: u32,
    ) -> Self {
        let msg = Message::OrderReplace(OrderReplace {
            header: self.header(locate),
            original_order_ref,
            new_order_ref,
            shares,
            price: Price::from_raw(i64::from(price)),
        });
        self.message(&msg)
    }

    /// Non-displayed trade (`P`).
    pub fn trade(
        self,
        locate: u16,
        order_ref: u64,
        side: Side,
        shares: u32,
        price: u32,
        match_number: u64,
    ) -> Self {
        let msg = Message::Trade(Trade {
            header: self.header(locate),
            order_ref,
            side,
            shares,
            stock: self.symbol(locate),
            price: Price::from_raw(i64::from(price)),
            match_number,
        });
        self.message(&msg)
    }

    pub fn broken_trade(self, locate: u16, match_number: u64) -> Self {
        let msg = Message::BrokenTrade(BrokenTrade {
            header: self.header(locate),
            match_number,
        });
        self.message(&msg)
    }

    /// Frames appended so far.
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_body;
    use crate::reader::{ReaderConfig, SliceReader};

    #[test]
    fn test_encode_decode_order_messages() {
        let feed = FeedBuilder::new()
            .at(34_200_000_000_123)
            .stock_directory(7, "MSFT")
            .add_mpid(7, 1, Side::Sell, 300, 4_201_500, "GSCO")
            .execute_with_price(7, 1, 100, 55, false, 4_201_400)
            .replace(7, 1, 2, 150, 4_200_000)
            .build();

        let messages: Vec<Message> = SliceReader::new(&feed, ReaderConfig::default())
            .map(|frame| decode_body(frame.unwrap().body).unwrap())
            .collect();
        assert_eq!(messages.len(), 4);

        let Message::AddOrder(add) = &messages[1] else {
            panic!("expected AddOrder");
        };
        assert_eq!(add.stock.as_str(), Some("MSFT"));
        assert_eq!(add.attribution.map(|m| m.to_string()), Some("GSCO".into()));
        assert_eq!(add.header.timestamp.nanos(), 34_200_000_000_123);
        assert_eq!(messages[1].kind(), MessageKind::AddOrderMpid);

        let Message::OrderExecuted(exec) = &messages[2] else {
            panic!("expected OrderExecuted");
        };
        assert_eq!(exec.with_price.unwrap().printable, 'N');

        // Every encoded message decodes back to itself
        for msg in &messages {
            assert_eq!(&decode_body(&encode_message(msg)).unwrap(), msg);
        }
    }

    #[test]
    fn test_symbol_fallback_and_frame_count() {
        let builder = FeedBuilder::new().add(9, 1, Side::Buy, 1, 1);
        assert_eq!(builder.frame_count(), 1);
        let feed = builder.build();
        let Message::AddOrder(add) = decode_body(&feed[2..]).unwrap() else {
            panic!("expected AddOrder");
        };
        assert_eq!(add.stock.as_str(), Some("L9"));
    }

    #[test]
    fn test_raw_frame_is_unvalidated() {
        let feed = FeedBuilder::new().raw_frame(b"Zjunk").build();
        assert_eq!(feed, vec![0, 5, b'Z', b'j', b'u', b'n', b'k']);
    }
}
