//! Property tests over randomly generated order flow.

use std::io::Cursor;

use itch_lob_reconstructor::testing::FeedBuilder;
use itch_lob_reconstructor::{
    decode_frame, EngineConfig, ItchError, Message, OrderBook, OrderBookEngine, ReaderConfig,
    Side, SliceReader, StreamReader, Timestamp,
};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Add { order_ref: u64, side: Side, shares: u32, tick: u32 },
    Execute { order_ref: u64, shares: u32 },
    Cancel { order_ref: u64, shares: u32 },
    Delete { order_ref: u64 },
    Replace { original: u64, new: u64, shares: u32, tick: u32 },
}

const LOCATE: u16 = 1;

fn price(tick: u32) -> u32 {
    1_000_000 + tick * 100
}

fn any_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

fn any_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1u64..64, any_side(), 0u32..500, 0u32..20)
            .prop_map(|(order_ref, side, shares, tick)| Op::Add { order_ref, side, shares, tick }),
        2 => (1u64..64, 1u32..600).prop_map(|(order_ref, shares)| Op::Execute { order_ref, shares }),
        2 => (1u64..64, 1u32..600).prop_map(|(order_ref, shares)| Op::Cancel { order_ref, shares }),
        1 => (1u64..64).prop_map(|order_ref| Op::Delete { order_ref }),
        2 => (1u64..64, 1u64..64, 0u32..500, 0u32..20)
            .prop_map(|(original, new, shares, tick)| Op::Replace { original, new, shares, tick }),
    ]
}

fn build_feed(ops: &[Op]) -> Vec<u8> {
    let mut builder = FeedBuilder::new().stock_directory(LOCATE, "TEST");
    for (i, op) in ops.iter().enumerate() {
        builder = builder.at(i as u64 * 1_000);
        builder = match *op {
            Op::Add { order_ref, side, shares, tick } => {
                builder.add(LOCATE, order_ref, side, shares, price(tick))
            }
            Op::Execute { order_ref, shares } => {
                builder.execute(LOCATE, order_ref, shares, i as u64)
            }
            Op::Cancel { order_ref, shares } => builder.cancel(LOCATE, order_ref, shares),
            Op::Delete { order_ref } => builder.delete(LOCATE, order_ref),
            Op::Replace { original, new, shares, tick } => {
                builder.replace(LOCATE, original, new, shares, price(tick))
            }
        };
    }
    builder.build()
}

fn quiet_engine() -> OrderBookEngine {
    OrderBookEngine::new(EngineConfig::default().with_logging(false))
}

fn side_totals(book: &OrderBook, side: Side) -> (u64, u64) {
    let from_levels: u64 = match side {
        Side::Buy => book.bids().map(|l| l.total_shares()).sum(),
        Side::Sell => book.asks().map(|l| l.total_shares()).sum(),
    };
    let from_orders: u64 = book
        .orders()
        .filter(|o| o.side == side)
        .map(|o| u64::from(o.shares))
        .sum();
    (from_levels, from_orders)
}

fn decode_all(feed: &[u8], config: ReaderConfig) -> Vec<Message> {
    let mut reader = StreamReader::new(Cursor::new(feed), config);
    let mut out = Vec::new();
    while let Some(batch) = reader.next_batch().unwrap() {
        out.extend(batch.iter().map(|f| decode_frame(&f).unwrap()));
    }
    out
}

fn final_state(messages: &[Message]) -> OrderBookEngine {
    let mut engine = quiet_engine();
    for message in messages {
        engine.apply(message).unwrap();
    }
    engine
}

proptest! {
    #[test]
    fn conservation_holds_after_every_message(ops in prop::collection::vec(any_op(), 1..300)) {
        let feed = build_feed(&ops);
        let mut engine = quiet_engine();

        for frame in SliceReader::new(&feed, ReaderConfig::default()) {
            let frame = frame.unwrap();
            let message = decode_frame(&frame).unwrap();
            engine.apply_at(frame.offset, &message).unwrap();

            if let Some(book) = engine.book(LOCATE) {
                for side in [Side::Buy, Side::Sell] {
                    let (levels, orders) = side_totals(book, side);
                    prop_assert_eq!(levels, orders);
                }
                prop_assert!(book.bids().chain(book.asks()).all(|l| l.total_shares() > 0));
                prop_assert!(book.check_invariants().is_ok());
            }
        }
    }

    #[test]
    fn limit_and_chunking_do_not_change_output(
        ops in prop::collection::vec(any_op(), 1..200),
        chunksize in 1usize..50,
    ) {
        let feed = build_feed(&ops);
        let full = decode_all(&feed, ReaderConfig::default());
        let limited = decode_all(
            &feed,
            ReaderConfig::default()
                .with_limit(full.len() as u64)
                .with_chunksize(chunksize),
        );
        prop_assert_eq!(&full, &limited);

        let a = final_state(&full).snapshot_all(Timestamp::default());
        let b = final_state(&limited).snapshot_all(Timestamp::default());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn truncated_input_never_panics(
        ops in prop::collection::vec(any_op(), 1..50),
        cut in any::<prop::sample::Index>(),
    ) {
        let feed = build_feed(&ops);
        let cut = cut.index(feed.len());
        let data = &feed[..cut];

        let mut frame_ends = Vec::new();
        let mut error = None;
        for frame in SliceReader::new(data, ReaderConfig::default()) {
            match frame {
                Ok(f) => frame_ends.push(f.end_offset()),
                Err(e) => error = Some(e),
            }
        }

        let consumed = frame_ends.last().copied().unwrap_or(0);
        if consumed == cut as u64 {
            prop_assert_eq!(error, None);
        } else {
            prop_assert_eq!(error, Some(ItchError::TruncatedStream { offset: consumed }));
        }
    }
}
