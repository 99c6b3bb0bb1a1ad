//! Message decoder: one length-delimited body to one [`Message`].
//!
//! The decoder is a pure function of its input. It validates the type tag
//! against [`MessageKind`] and the body length against the kind's fixed
//! layout before reading any field, so a frame is either decoded completely
//! or rejected with a per-message error:
//!
//! - unknown tag: [`ItchError::UnknownMessageType`]
//! - short or long body: [`ItchError::MalformedMessage`]
//! - side byte other than `B`/`S`: [`ItchError::InvalidField`]
//!
//! None of these are fatal for a stream; callers count and skip them.

use crate::codec::{
    read_alpha, read_char, read_price4, read_price8, read_side, read_timestamp, read_u16,
    read_u32, read_u64, read_u8,
};
use crate::error::{ItchError, Result};
use crate::messages::*;
use crate::reader::RawFrame;

/// Decode a body whose first byte is `tag`.
///
/// `body` is the whole length-delimited payload, tag byte included.
pub fn decode(tag: u8, body: &[u8]) -> Result<Message> {
    let kind = MessageKind::from_tag(tag).ok_or(ItchError::UnknownMessageType(tag))?;
    let expected_len = kind.body_len();
    if body.len() != expected_len {
        return Err(ItchError::MalformedMessage {
            tag,
            expected_len,
            actual_len: body.len(),
        });
    }
    decode_kind(kind, body)
}

/// Decode a body, taking the tag from its first byte.
pub fn decode_body(body: &[u8]) -> Result<Message> {
    let tag = read_u8(body, 0)?;
    decode(tag, body)
}

/// Decode a frame produced by a [`crate::reader::StreamReader`].
#[inline]
pub fn decode_frame(frame: &RawFrame<'_>) -> Result<Message> {
    decode(frame.tag, frame.body)
}

fn decode_header(body: &[u8]) -> Result<Header> {
    Ok(Header {
        stock_locate: read_u16(body, 1)?,
        tracking_number: read_u16(body, 3)?,
        timestamp: read_timestamp(body, 5)?,
    })
}

fn decode_kind(kind: MessageKind, b: &[u8]) -> Result<Message> {
    let header = decode_header(b)?;
    let tag = kind.tag();

    let msg = match kind {
        MessageKind::SystemEvent => Message::SystemEvent(SystemEvent {
            header,
            event_code: read_char(b, 11)?,
        }),
        MessageKind::StockDirectory => Message::StockDirectory(StockDirectory {
            header,
            stock: read_alpha(b, 11)?,
            market_category: read_char(b, 19)?,
            financial_status: read_char(b, 20)?,
            round_lot_size: read_u32(b, 21)?,
            round_lots_only: read_char(b, 25)?,
            issue_classification: read_char(b, 26)?,
            issue_subtype: read_alpha(b, 27)?,
            authenticity: read_char(b, 29)?,
            short_sale_threshold: read_char(b, 30)?,
            ipo_flag: read_char(b, 31)?,
            luld_ref_price_tier: read_char(b, 32)?,
            etp_flag: read_char(b, 33)?,
            etp_leverage_factor: read_u32(b, 34)?,
            inverse_indicator: read_char(b, 38)?,
        }),
        MessageKind::StockTradingAction => Message::StockTradingAction(StockTradingAction {
            header,
            stock: read_alpha(b, 11)?,
            trading_state: read_char(b, 19)?,
            reserved: read_char(b, 20)?,
            reason: read_alpha(b, 21)?,
        }),
        MessageKind::RegShoRestriction => Message::RegShoRestriction(RegShoRestriction {
            header,
            stock: read_alpha(b, 11)?,
            reg_sho_action: read_char(b, 19)?,
        }),
        MessageKind::MarketParticipantPosition => {
            Message::MarketParticipantPosition(MarketParticipantPosition {
                header,
                mpid: read_alpha(b, 11)?,
                stock: read_alpha(b, 15)?,
                primary_market_maker: read_char(b, 23)?,
                market_maker_mode: read_char(b, 24)?,
                market_participant_state: read_char(b, 25)?,
            })
        }
        MessageKind::MwcbDeclineLevel => Message::MwcbDeclineLevel(MwcbDeclineLevel {
            header,
            level1: read_price8(b, 11)?,
            level2: read_price8(b, 19)?,
            level3: read_price8(b, 27)?,
        }),
        MessageKind::MwcbStatus => Message::MwcbStatus(MwcbStatus {
            header,
            breached_level: read_char(b, 11)?,
        }),
        MessageKind::IpoQuotingPeriodUpdate => {
            Message::IpoQuotingPeriodUpdate(IpoQuotingPeriodUpdate {
                header,
                stock: read_alpha(b, 11)?,
                release_time: read_u32(b, 19)?,
                release_qualifier: read_char(b, 23)?,
                ipo_price: read_price4(b, 24)?,
            })
        }
        MessageKind::LuldAuctionCollar => Message::LuldAuctionCollar(LuldAuctionCollar {
            header,
            stock: read_alpha(b, 11)?,
            reference_price: read_price4(b, 19)?,
            upper_price: read_price4(b, 23)?,
            lower_price: read_price4(b, 27)?,
            extension: read_u32(b, 31)?,
        }),
        MessageKind::OperationalHalt => Message::OperationalHalt(OperationalHalt {
            header,
            stock: read_alpha(b, 11)?,
            market_code: read_char(b, 19)?,
            halt_action: read_char(b, 20)?,
        }),
        MessageKind::AddOrder | MessageKind::AddOrderMpid => Message::AddOrder(AddOrder {
            header,
            order_ref: read_u64(b, 11)?,
            side: read_side(b, 19, tag)?,
            shares: read_u32(b, 20)?,
            stock: read_alpha(b, 24)?,
            price: read_price4(b, 32)?,
            attribution: match kind {
                MessageKind::AddOrderMpid => Some(read_alpha(b, 36)?),
                _ => None,
            },
        }),
        MessageKind::OrderExecuted | MessageKind::OrderExecutedWithPrice => {
            Message::OrderExecuted(OrderExecuted {
                header,
                order_ref: read_u64(b, 11)?,
                executed_shares: read_u32(b, 19)?,
                match_number: read_u64(b, 23)?,
                with_price: match kind {
                    MessageKind::OrderExecutedWithPrice => Some(ExecutionPrice {
                        printable: read_char(b, 31)?,
                        execution_price: read_price4(b, 32)?,
                    }),
                    _ => None,
                },
            })
        }
        MessageKind::OrderCancel => Message::OrderCancel(OrderCancel {
            header,
            order_ref: read_u64(b, 11)?,
            canceled_shares: read_u32(b, 19)?,
        }),
        MessageKind::OrderDelete => Message::OrderDelete(OrderDelete {
            header,
            order_ref: read_u64(b, 11)?,
        }),
        MessageKind::OrderReplace => Message::OrderReplace(OrderReplace {
            header,
            original_order_ref: read_u64(b, 11)?,
            new_order_ref: read_u64(b, 19)?,
            shares: read_u32(b, 27)?,
            price: read_price4(b, 31)?,
        }),
        MessageKind::Trade => Message::Trade(Trade {
            header,
            order_ref: read_u64(b, 11)?,
            side: read_side(b, 19, tag)?,
            shares: read_u32(b, 20)?,
            stock: read_alpha(b, 24)?,
            price: read_price4(b, 32)?,
            match_number: read_u64(b, 36)?,
        }),
        MessageKind::CrossTrade => Message::CrossTrade(CrossTrade {
            header,
            shares: read_u64(b, 11)?,
            stock: read_alpha(b, 19)?,
            cross_price: read_price4(b, 27)?,
            match_number: read_u64(b, 31)?,
            cross_type: read_char(b, 39)?,
        }),
        MessageKind::BrokenTrade => Message::BrokenTrade(BrokenTrade {
            header,
            match_number: read_u64(b, 11)?,
        }),
        MessageKind::Noii => Message::Noii(Noii {
            header,
            paired_shares: read_u64(b, 11)?,
            imbalance_shares: read_u64(b, 19)?,
            imbalance_direction: read_char(b, 27)?,
            stock: read_alpha(b, 28)?,
            far_price: read_price4(b, 36)?,
            near_price: read_price4(b, 40)?,
            current_reference_price: read_price4(b, 44)?,
            cross_type: read_char(b, 48)?,
            price_variation_indicator: read_char(b, 49)?,
        }),
        MessageKind::RetailPriceImprovement => {
            Message::RetailPriceImprovement(RetailPriceImprovement {
                header,
                stock: read_alpha(b, 11)?,
                interest_flag: read_char(b, 19)?,
            })
        }
        MessageKind::DirectListingPriceDiscovery => {
            Message::DirectListingPriceDiscovery(DirectListingPriceDiscovery {
                header,
                stock: read_alpha(b, 11)?,
                open_eligibility: read_char(b, 19)?,
                min_allowable_price: read_price4(b, 20)?,
                max_allowable_price: read_price4(b, 24)?,
                near_execution_price: read_price4(b, 28)?,
                near_execution_time: read_u64(b, 32)?,
                lower_collar: read_price4(b, 40)?,
                upper_collar: read_price4(b, 44)?,
            })
        }
    };

    Ok(msg)
}
