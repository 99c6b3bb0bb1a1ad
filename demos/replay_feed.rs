//! Replay an ITCH 5.0 feed and print the reconstructed books.
//!
//! Usage:
//! ```bash
//! cargo run --release --example replay_feed <feed[.zst]> [limit] [SYMBOL,SYMBOL,...]
//! ```
//!
//! Without arguments a small synthetic feed is replayed instead.

use std::env;

use itch_lob_reconstructor::sink::MemoryStore;
use itch_lob_reconstructor::testing::FeedBuilder;
use itch_lob_reconstructor::{
    EngineConfig, Pipeline, PipelineConfig, ReaderConfig, RunSummary, Side, SnapshotPolicy,
};

fn synthetic_feed() -> Vec<u8> {
    FeedBuilder::new()
        .at(34_200_000_000_000)
        .system_event(b'O')
        .stock_directory(1, "AAPL")
        .stock_directory(2, "MSFT")
        .add(1, 1, Side::Buy, 100, 3_189_900)
        .add(1, 2, Side::Buy, 200, 3_189_800)
        .add(1, 3, Side::Sell, 150, 3_190_100)
        .add_mpid(2, 4, Side::Sell, 500, 1_702_500, "GSCO")
        .add(2, 5, Side::Buy, 300, 1_702_000)
        .at(34_200_500_000_000)
        .execute(1, 3, 50, 1)
        .execute_with_price(2, 4, 100, 2, true, 1_702_400)
        .cancel(1, 2, 100)
        .replace(2, 5, 6, 300, 1_702_100)
        .at(34_201_000_000_000)
        .trade(1, 0, Side::Buy, 75, 3_190_000, 3)
        .delete(1, 1)
        .cancel(1, 999, 10)
        .build()
}

fn print_summary(summary: &RunSummary) {
    println!("\nRun summary");
    println!("  Messages seen:    {}", summary.messages_seen);
    println!("  Messages decoded: {}", summary.messages_decoded);
    println!("  Bytes read:       {}", summary.bytes_read);
    println!("  Books tracked:    {}", summary.books_tracked);
    println!("  Trades:           {}", summary.trades);
    println!("  Snapshots:        {}", summary.snapshots_emitted);
    println!("  Elapsed:          {:.3}s", summary.elapsed_secs);
    if !summary.decode_errors.is_empty() {
        println!("  Decode errors:    {:?}", summary.decode_errors);
    }
    if !summary.anomalies.is_empty() {
        println!("  Anomalies:        {:?}", summary.anomalies);
    }
    if let Some(failure) = &summary.failure {
        println!("  Stopped at offset {}: {}", failure.offset, failure.error);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = env::args().collect();
    let limit = args.get(2).map(|s| s.parse::<u64>()).transpose()?;
    let symbols = args
        .get(3)
        .map(|s| s.split(',').map(str::to_string).collect::<Vec<_>>());

    let mut reader = ReaderConfig::default();
    if let Some(limit) = limit {
        reader = reader.with_limit(limit);
    }
    let mut engine = EngineConfig::default()
        .with_snapshot_policy(SnapshotPolicy::EveryNanos(60_000_000_000))
        .with_snapshot_depth(5);
    if let Some(symbols) = symbols {
        engine = engine.with_symbols(symbols);
    }
    let config = PipelineConfig::default()
        .with_reader(reader)
        .with_engine(engine)
        .with_progress_interval(5_000_000);

    let mut pipeline = Pipeline::new(config, MemoryStore::new());
    let summary = match args.get(1) {
        Some(path) => {
            println!("Input file: {path}");
            pipeline.run_path(path)
        }
        None => {
            println!("No input file given, replaying a synthetic feed");
            pipeline.run_slice(&synthetic_feed())
        }
    };
    print_summary(&summary);

    let engine = pipeline.engine();
    println!("\nTop of book ({} symbols)", engine.book_count());
    for book in engine.books().take(20) {
        let bid = book.best_bid().map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        let ask = book.best_ask().map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "  {:<8} bid {:>12}  ask {:>12}  orders {:>6}  {:?}",
            book.symbol(),
            bid,
            ask,
            book.order_count(),
            book.consistency()
        );
    }

    let tape = engine.tape();
    if let Some(vwap) = tape.vwap() {
        println!(
            "\nTape: {} trades, volume {}, VWAP {vwap:.4}",
            tape.total_trades(),
            tape.total_volume()
        );
    }

    let store = pipeline.sink();
    println!("\nStored records by category");
    for (category, count) in store.counts() {
        println!("  {:<18} {count}", category.as_str());
    }
    println!("  snapshots          {}", store.snapshots().len());

    println!("\nAnomalies\n{}", serde_json::to_string_pretty(&engine.anomalies().summary())?);
    Ok(())
}
