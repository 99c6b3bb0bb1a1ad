//! # ITCH-LOB-Reconstructor
//!
//! NASDAQ TotalView-ITCH 5.0 decoding and per-symbol limit order book
//! reconstruction.
//!
//! The crate reads a length-delimited ITCH byte stream, decodes each frame
//! into a typed [`Message`], and rebuilds one order book per instrument from
//! the add / execute / cancel / delete / replace sequence. Feed anomalies
//! (unknown references, duplicates, over-execution) are counted and sampled
//! instead of aborting the run.
//!
//! ## Features
//!
//! - **Bounded-memory reading**: [`StreamReader`] walks arbitrarily large
//!   files in frame batches with resume offsets and frame limits
//! - **Exact decoding**: all 21 ITCH 5.0 message layouts, fixed-point prices,
//!   byte-faithful alpha fields
//! - **Order book engine**: price-time aggregated levels, replace as an
//!   atomic cancel + add, clamped over-execution
//! - **Observability**: anomaly tracking, trade tape, book snapshots and a
//!   per-run summary
//!
//! ## Quick Start
//!
//! ```rust
//! use itch_lob_reconstructor::{EngineConfig, OrderBookEngine, ReaderConfig, SliceReader};
//! use itch_lob_reconstructor::{decode_frame, Side};
//! use itch_lob_reconstructor::testing::FeedBuilder;
//!
//! let feed = FeedBuilder::new()
//!     .stock_directory(1, "AAPL")
//!     .add(1, 1, Side::Buy, 100, 1_500_000)
//!     .add(1, 2, Side::Sell, 200, 1_500_100)
//!     .build();
//!
//! let mut engine = OrderBookEngine::new(EngineConfig::default());
//! for frame in SliceReader::new(&feed, ReaderConfig::default()) {
//!     let frame = frame.unwrap();
//!     let message = decode_frame(&frame).unwrap();
//!     engine.apply_at(frame.offset, &message).unwrap();
//! }
//!
//! let book = engine.book_by_symbol("AAPL").unwrap();
//! assert_eq!(book.best_bid().unwrap().to_string(), "150.0000");
//! assert_eq!(book.spread(), Some(100));
//! ```
//!
//! ### Whole-file runs
//!
//! ```ignore
//! use itch_lob_reconstructor::{Pipeline, PipelineConfig};
//! use itch_lob_reconstructor::sink::MemoryStore;
//!
//! let mut pipeline = Pipeline::new(PipelineConfig::default(), MemoryStore::new());
//! let summary = pipeline.run_path("data/01302020.NASDAQ_ITCH50.zst");
//! println!("{}", summary.to_json()?);
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | `Price`, `Symbol`, `Timestamp`, `Side`, `Order` |
//! | [`codec`] | Big-endian field readers over a byte window |
//! | [`messages`] | Typed message structs, `MessageKind`, `MessageCategory` |
//! | [`decoder`] | Body to `Message` |
//! | [`reader`] | Frame reader over any `Read` or a byte slice |
//! | [`source`] | File / memory feed sources, `.zst` detection |
//! | [`lob`] | `OrderBook`, `OrderBookEngine`, snapshots, trade tape |
//! | [`anomalies`] | `AnomalyTracker` and anomaly records |
//! | [`sink`] | Batched persistence and the in-memory query store |
//! | [`pipeline`] | Whole-run driver and `RunSummary` |
//! | [`testing`] | Feed builder and message encoder |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `zstd` | ✅ | Transparent decoding of `.zst` feed files |

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod anomalies;
pub mod codec;
pub mod decoder;
pub mod error;
pub mod lob;
pub mod messages;
pub mod pipeline;
pub mod reader;
pub mod sink;
pub mod source;
pub mod testing;
pub mod types;

// Re-exports - Core types
pub use error::{ItchError, Result};
pub use types::{BookConsistency, Mpid, Order, Price, Side, Symbol, Timestamp};

// Re-exports - Decoding
pub use decoder::{decode, decode_body, decode_frame};
pub use messages::{Message, MessageCategory, MessageKind};
pub use reader::{FrameBatch, RawFrame, ReaderConfig, ReaderStats, SliceReader, StreamReader};

// Re-exports - Order books
pub use lob::{
    Applied, BookAnomaly, BookSnapshot, EngineConfig, EngineStats, OrderBook, OrderBookEngine,
    SnapshotPolicy,
};

// Re-exports - Anomalies
pub use anomalies::{AnomalyKind, AnomalyRecord, AnomalySummary, AnomalyTracker};

// Re-exports - Sources and sinks
pub use sink::{MemoryStore, MessageSink};
pub use source::{FeedSource, FileSource, MemorySource, SourceMetadata};

// Re-exports - Pipeline
pub use pipeline::{Pipeline, PipelineConfig, RunFailure, RunSummary};
