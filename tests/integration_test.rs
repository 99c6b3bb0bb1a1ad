//! End-to-end tests: framed bytes in, books / sink contents / run summary out.
//!
//! Most tests build their feed with `FeedBuilder`. The real-data test runs
//! only when a NASDAQ sample file is present:
//!
//! ```bash
//! cargo test --test integration_test --release
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use itch_lob_reconstructor::sink::{JsonLinesSink, NullSink};
use itch_lob_reconstructor::testing::FeedBuilder;
use itch_lob_reconstructor::{
    decode_frame, AnomalyKind, BookConsistency, EngineConfig, FileSource, ItchError, MemoryStore,
    Message, MessageCategory, MessageKind, OrderBookEngine, Pipeline, PipelineConfig, Price,
    ReaderConfig, Side, SliceReader, SnapshotPolicy, StreamReader, Timestamp,
};

/// NASDAQ sample feed (plain or `.zst`)
const TEST_DATA_PATHS: [&str; 2] = [
    "data/01302020.NASDAQ_ITCH50",
    "data/01302020.NASDAQ_ITCH50.zst",
];

fn test_data_path() -> Option<PathBuf> {
    TEST_DATA_PATHS
        .iter()
        .flat_map(|p| [PathBuf::from(p), Path::new("..").join(p)])
        .find(|p| p.exists())
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("itch_lob_it_{}_{name}", std::process::id()))
}

fn quiet_engine() -> EngineConfig {
    EngineConfig::default()
        .with_logging(false)
        .with_invariant_checks(true)
}

fn quiet_pipeline() -> PipelineConfig {
    PipelineConfig::default().with_engine(quiet_engine())
}

/// Decode and apply every frame, panicking on anything fatal.
fn replay(feed: &[u8], config: EngineConfig) -> OrderBookEngine {
    let mut engine = OrderBookEngine::new(config);
    for frame in SliceReader::new(feed, ReaderConfig::default()) {
        let frame = frame.expect("framing");
        let message = decode_frame(&frame).expect("decode");
        engine.apply_at(frame.offset, &message).expect("apply");
    }
    engine
}

// ============================================================================
// Test: Real Data
// ============================================================================

#[test]
fn test_reconstruction_with_real_data() {
    let Some(path) = test_data_path() else {
        eprintln!("Skipping test: no sample feed under data/");
        return;
    };
    println!("\nTesting reconstruction with: {}", path.display());

    let config = PipelineConfig::default()
        .with_reader(ReaderConfig::default().with_limit(2_000_000))
        .with_engine(EngineConfig::default().with_logging(false))
        .with_persist_messages(false);
    let mut pipeline = Pipeline::new(config, NullSink::default());

    let start = Instant::now();
    let summary = pipeline.run_path(&path);
    let elapsed = start.elapsed();

    println!(
        "  Processed {} messages in {:.2}s ({:.0} msg/s)",
        summary.messages_seen,
        elapsed.as_secs_f64(),
        summary.messages_seen as f64 / elapsed.as_secs_f64()
    );
    println!("  Books: {}, anomalies: {:?}", summary.books_tracked, summary.anomalies);

    assert!(summary.is_complete(), "run failed: {:?}", summary.failure);
    assert_eq!(summary.decode_error_count(), 0);
    assert!(summary.count(MessageKind::AddOrder) > 0);
    assert!(summary.books_tracked > 0);
    pipeline.engine().check_invariants().unwrap();
}

// ============================================================================
// Test: Book Semantics
// ============================================================================

#[test]
fn test_level_removed_after_delete() {
    let feed = FeedBuilder::new()
        .stock_directory(1, "AAPL")
        .add(1, 1, Side::Buy, 100, 1_000_000)
        .delete(1, 1)
        .build();
    let engine = replay(&feed, quiet_engine());

    let book = engine.book_by_symbol("AAPL").unwrap();
    assert!(book.level(Side::Buy, Price::from_raw(1_000_000)).is_none());
    assert_eq!(book.bid_levels(), 0);
    assert_eq!(book.best_bid(), None);
}

#[test]
fn test_replace_moves_order() {
    let p1 = 1_000_000;
    let p2 = 1_001_000;
    let feed = FeedBuilder::new()
        .stock_directory(1, "AAPL")
        .add(1, 1, Side::Buy, 50, p1)
        .replace(1, 1, 2, 30, p2)
        .build();
    let engine = replay(&feed, quiet_engine());

    let book = engine.book(1).unwrap();
    assert!(!book.contains_order(1));
    let order = book.order(2).unwrap();
    assert_eq!(order.side, Side::Buy);
    assert_eq!(order.shares, 30);
    assert_eq!(order.price, Price::from_raw(i64::from(p2)));
    assert!(book.level(Side::Buy, Price::from_raw(i64::from(p1))).is_none());
    assert_eq!(
        book.level(Side::Buy, Price::from_raw(i64::from(p2)))
            .unwrap()
            .total_shares(),
        30
    );
}

#[test]
fn test_unknown_reference_is_counted() {
    let feed = FeedBuilder::new()
        .stock_directory(1, "AAPL")
        .add(1, 1, Side::Sell, 100, 1_000_000)
        .cancel(1, 999, 10)
        .build();
    let engine = replay(&feed, quiet_engine());

    assert_eq!(engine.anomalies().count(AnomalyKind::UnknownOrderRef), 1);
    let book = engine.book(1).unwrap();
    assert_eq!(book.order(1).unwrap().shares, 100);
    assert_eq!(book.asks().next().unwrap().total_shares(), 100);

    let sample = engine.anomalies().samples_of(AnomalyKind::UnknownOrderRef).next().unwrap();
    assert_eq!(sample.order_ref, Some(999));
    assert!(sample.offset.is_some());
}

#[test]
fn test_partial_fills_then_overexecution() {
    let feed = FeedBuilder::new()
        .stock_directory(3, "NVDA")
        .add(3, 7, Side::Sell, 100, 1_200_000)
        .execute(3, 7, 40, 1)
        .execute_with_price(3, 7, 30, 2, true, 1_199_900)
        .execute(3, 7, 50, 3)
        .build();
    let engine = replay(&feed, quiet_engine());

    let book = engine.book(3).unwrap();
    assert!(book.is_empty());
    assert_eq!(book.ask_levels(), 0);
    assert_eq!(engine.anomalies().count(AnomalyKind::Overexecution), 1);

    // The third print carries only what was actually resting
    let tape = engine.tape();
    assert_eq!(tape.total_trades(), 3);
    assert_eq!(tape.total_volume(), 100);
    assert_eq!(tape.last_trade_price(3), Some(Price::from_raw(1_200_000)));
}

#[test]
fn test_same_reference_on_two_symbols() {
    let feed = FeedBuilder::new()
        .stock_directory(1, "AAPL")
        .stock_directory(2, "MSFT")
        .add(1, 5, Side::Buy, 10, 1_000_000)
        .add(2, 5, Side::Sell, 20, 2_000_000)
        .delete(1, 5)
        .build();
    let engine = replay(&feed, quiet_engine());

    assert!(engine.book_by_symbol("AAPL").unwrap().is_empty());
    assert_eq!(engine.book_by_symbol("MSFT").unwrap().order(5).unwrap().shares, 20);
    assert!(engine.anomalies().is_empty());
}

#[test]
fn test_crossed_book_is_reported_not_fixed() {
    let feed = FeedBuilder::new()
        .stock_directory(1, "AAPL")
        .add(1, 1, Side::Sell, 100, 1_000_000)
        .add(1, 2, Side::Buy, 100, 1_000_100)
        .build();
    let engine = replay(&feed, quiet_engine());

    let book = engine.book(1).unwrap();
    assert_eq!(book.consistency(), BookConsistency::Crossed);
    assert_eq!(book.stats().crossed_quotes, 1);
    assert_eq!(book.order_count(), 2);
}

#[test]
fn test_allow_list_limits_books() {
    let feed = FeedBuilder::new()
        .stock_directory(1, "AAPL")
        .stock_directory(2, "MSFT")
        .add(1, 1, Side::Buy, 100, 1_000_000)
        .add(2, 2, Side::Buy, 100, 2_000_000)
        .execute(2, 2, 10, 1)
        .build();
    let engine = replay(&feed, quiet_engine().with_symbols(["MSFT"]));

    assert_eq!(engine.book_count(), 1);
    assert!(engine.book_by_symbol("AAPL").is_none());
    assert_eq!(engine.book_by_symbol("MSFT").unwrap().order(2).unwrap().shares, 90);
    assert!(engine.anomalies().is_empty());
    assert_eq!(engine.stats().filtered, 1);
}

// ============================================================================
// Test: Reader Behaviour on Files
// ============================================================================

fn sample_feed() -> Vec<u8> {
    FeedBuilder::new()
        .at(34_200_000_000_000)
        .system_event(b'O')
        .stock_directory(1, "AAPL")
        .stock_directory(2, "MSFT")
        .add(1, 1, Side::Buy, 100, 1_000_000)
        .add(1, 2, Side::Sell, 100, 1_000_500)
        .at(34_200_000_001_000)
        .add(2, 3, Side::Buy, 300, 2_000_000)
        .execute(1, 2, 60, 11)
        .at(34_200_000_002_000)
        .cancel(2, 3, 100)
        .replace(1, 1, 4, 80, 1_000_100)
        .trade(2, 0, Side::Buy, 25, 2_000_100, 12)
        .broken_trade(2, 12)
        .build()
}

#[test]
fn test_file_run_matches_in_memory_run() {
    let feed = sample_feed();
    let path = temp_path("plain.itch");
    std::fs::write(&path, &feed).unwrap();

    let mut from_file = Pipeline::new(quiet_pipeline(), MemoryStore::new());
    let file_summary = from_file.run_source(FileSource::new(&path).unwrap());
    let mut in_memory = Pipeline::new(quiet_pipeline(), MemoryStore::new());
    let memory_summary = in_memory.run_slice(&feed);
    std::fs::remove_file(&path).ok();

    assert!(file_summary.is_complete());
    assert_eq!(file_summary.per_kind, memory_summary.per_kind);
    assert_eq!(file_summary.bytes_read, feed.len() as u64);
    assert_eq!(
        from_file.engine().snapshot_all(Timestamp::default()),
        in_memory.engine().snapshot_all(Timestamp::default())
    );
}

#[cfg(feature = "zstd")]
#[test]
fn test_compressed_file_is_transparent() {
    let feed = sample_feed();
    let path = temp_path("feed.itch.zst");
    std::fs::write(&path, zstd::encode_all(&feed[..], 3).unwrap()).unwrap();

    let mut reader = StreamReader::open(&path, ReaderConfig::default()).unwrap();
    let mut decoded = Vec::new();
    while let Some(frame) = reader.next_frame().unwrap() {
        decoded.push(decode_frame(&frame).unwrap());
    }
    std::fs::remove_file(&path).ok();

    let expected: Vec<Message> = SliceReader::new(&feed, ReaderConfig::default())
        .map(|f| decode_frame(&f.unwrap()).unwrap())
        .collect();
    assert_eq!(decoded, expected);
}

#[test]
fn test_resume_from_reported_offset() {
    let feed = sample_feed();
    let path = temp_path("resume.itch");
    std::fs::write(&path, &feed).unwrap();

    let mut first = StreamReader::open(&path, ReaderConfig::default().with_limit(4)).unwrap();
    while first.next_frame().unwrap().is_some() {}
    let resume_at = first.offset();

    let mut second =
        StreamReader::open(&path, ReaderConfig::default().with_start_offset(resume_at)).unwrap();
    let mut tail = Vec::new();
    while let Some(frame) = second.next_frame().unwrap() {
        tail.push(frame.offset);
    }
    std::fs::remove_file(&path).ok();

    let all: Vec<u64> = SliceReader::new(&feed, ReaderConfig::default())
        .map(|f| f.unwrap().offset)
        .collect();
    assert_eq!(tail, all[4..]);
}

#[test]
fn test_vendor_preamble_is_skipped() {
    let body = sample_feed();
    let mut feed = b"HDR!".to_vec();
    feed.extend_from_slice(&body);

    let config = quiet_pipeline().with_reader(ReaderConfig::default().with_header_len(4));
    let mut pipeline = Pipeline::new(config, MemoryStore::new());
    let summary = pipeline.run_slice(&feed);

    assert!(summary.is_complete());
    assert_eq!(summary.decode_error_count(), 0);
    assert_eq!(summary.last_offset, feed.len() as u64);
}

#[test]
fn test_truncated_tail_keeps_applied_state() {
    let mut feed = sample_feed();
    let good = feed.len() as u64;
    // Declared length 36, only 10 bytes follow
    feed.extend_from_slice(&[0x00, 0x24]);
    feed.extend_from_slice(&[b'A'; 10]);

    let mut pipeline = Pipeline::new(quiet_pipeline(), MemoryStore::new());
    let summary = pipeline.run_slice(&feed);

    let failure = summary.failure.as_ref().unwrap();
    assert_eq!(failure.error, ItchError::TruncatedStream { offset: good });
    assert_eq!(failure.offset, good);
    assert_eq!(summary.messages_seen, 11);
    assert_eq!(pipeline.engine().book_by_symbol("AAPL").unwrap().order(4).unwrap().shares, 80);
    assert_eq!(pipeline.sink().len(), 11);
}

// ============================================================================
// Test: Sinks and Queries
// ============================================================================

#[test]
fn test_memory_store_queries() {
    let mut pipeline = Pipeline::new(quiet_pipeline().with_batch_size(2), MemoryStore::new());
    let summary = pipeline.run_slice(&sample_feed());
    assert!(summary.is_complete());

    let store = pipeline.sink();
    let (start, end) = (Timestamp::from_nanos(0), Timestamp::from_nanos(u64::MAX >> 16));
    let adds = store.query(MessageCategory::AddOrders, None, start, end);
    assert_eq!(adds.len(), 3);

    let aapl_adds = store.query(MessageCategory::AddOrders, Some("AAPL"), start, end);
    assert_eq!(aapl_adds.len(), 2);

    // Cancels carry no symbol; the store resolves it from the directory
    let msft_cancels = store.query(MessageCategory::OrderCancels, Some("MSFT"), start, end);
    assert_eq!(msft_cancels.len(), 1);

    let late = store.query(
        MessageCategory::AddOrders,
        None,
        Timestamp::from_nanos(34_200_000_000_500),
        Timestamp::from_nanos(34_200_000_001_000),
    );
    assert_eq!(late.len(), 1);
    assert!(store.batches_written() >= 6);
    assert_eq!(store.flushes(), 1);
}

#[test]
fn test_json_lines_sink() {
    let config = quiet_pipeline().with_engine(
        quiet_engine()
            .with_snapshot_policy(SnapshotPolicy::EveryMessages(3))
            .with_snapshot_depth(5),
    );
    let mut pipeline = Pipeline::new(config, JsonLinesSink::new(Vec::new()));
    let summary = pipeline.run_slice(&sample_feed());
    assert!(summary.is_complete());

    let (_, sink) = pipeline.into_parts();
    let bytes = sink.into_inner().unwrap();
    let lines: Vec<serde_json::Value> = std::str::from_utf8(&bytes)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    let messages = lines.iter().filter(|l| l["record"] == "message").count();
    let snapshots = lines.iter().filter(|l| l["record"] == "snapshot").count();
    assert_eq!(messages, 11);
    // Due after messages 3, 6 and 9; no book exists at the first
    assert_eq!(snapshots as u64, summary.snapshots_emitted);
    assert_eq!(snapshots, 4);
}

#[test]
fn test_summary_reports_everything() {
    let feed = FeedBuilder::new()
        .stock_directory(1, "AAPL")
        .add(1, 1, Side::Buy, 100, 1_000_000)
        .add(1, 1, Side::Buy, 100, 1_000_000)
        .replace(1, 50, 51, 10, 1_000_000)
        .raw_frame(&[b'A', 0, 1])
        .build();
    let mut pipeline = Pipeline::new(quiet_pipeline(), NullSink::default());
    let summary = pipeline.run_slice(&feed);

    assert!(summary.is_complete());
    assert_eq!(summary.messages_seen, 5);
    assert_eq!(summary.messages_decoded, 4);
    assert_eq!(summary.decode_errors.get("A"), Some(&1));
    assert_eq!(summary.anomalies.get("DUPLICATE_ORDER"), Some(&1));
    assert_eq!(summary.anomalies.get("ORPHAN_REPLACE"), Some(&1));
    assert_eq!(summary.anomalies.get("UNKNOWN_ORDER_REF"), Some(&1));
    assert_eq!(pipeline.sink().messages, 4);

    let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
    assert_eq!(json["decode_errors"]["A"], 1);
}
