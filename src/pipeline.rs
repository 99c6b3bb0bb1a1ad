//! Run driver: reader -> decoder -> engine + sink.
//!
//! A [`Pipeline`] processes one feed strictly in order. Decode errors are
//! counted and skipped, book anomalies are counted by the engine, and any
//! framing, I/O or sink failure ends the run. Every run, complete or not,
//! produces a [`RunSummary`].
//!
//! # Example
//!
//! ```
//! use itch_lob_reconstructor::pipeline::{Pipeline, PipelineConfig};
//! use itch_lob_reconstructor::sink::MemoryStore;
//! use itch_lob_reconstructor::testing::FeedBuilder;
//! use itch_lob_reconstructor::Side;
//!
//! let feed = FeedBuilder::new()
//!     .stock_directory(1, "AAPL")
//!     .add(1, 10, Side::Buy, 100, 1_000_000)
//!     .delete(1, 10)
//!     .build();
//!
//! let mut pipeline = Pipeline::new(PipelineConfig::default(), MemoryStore::new());
//! let summary = pipeline.run_slice(&feed);
//! assert!(summary.is_complete());
//! assert_eq!(summary.messages_decoded, 3);
//! assert_eq!(pipeline.sink().len(), 3);
//! ```

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize, Serializer};

use crate::anomalies::{AnomalyKind, AnomalyRecord};
use crate::decoder::decode_frame;
use crate::error::{ItchError, Result};
use crate::lob::{EngineConfig, OrderBookEngine};
use crate::messages::MessageKind;
use crate::reader::{RawFrame, ReaderConfig, SliceReader, StreamReader};
use crate::sink::{BatchAccumulator, MessageSink};
use crate::source::FeedSource;

/// Configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub reader: ReaderConfig,
    pub engine: EngineConfig,

    /// Maximum records per category in one sink batch
    pub batch_size: usize,

    /// Hand decoded messages to the sink (snapshots are always written)
    pub persist_messages: bool,

    /// Log progress every N frames (0 = never)
    pub progress_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reader: ReaderConfig::default(),
            engine: EngineConfig::default(),
            batch_size: 10_000,
            persist_messages: true,
            progress_interval: 10_000_000,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reader(mut self, reader: ReaderConfig) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_persist_messages(mut self, persist: bool) -> Self {
        self.persist_messages = persist;
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// Why a run stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    /// Last offset whose effects are fully applied (or, for a sink failure,
    /// fully persisted)
    pub offset: u64,

    #[serde(serialize_with = "serialize_display")]
    pub error: ItchError,
}

fn serialize_display<S: Serializer>(error: &ItchError, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Frames read from the source
    pub messages_seen: u64,

    /// Frames decoded successfully
    pub messages_decoded: u64,

    pub per_kind: BTreeMap<MessageKind, u64>,

    /// Decode failures keyed by tag (`"Z"`, or `"0x01"` if unprintable)
    pub decode_errors: BTreeMap<String, u64>,

    /// Book anomalies keyed by kind name
    pub anomalies: BTreeMap<String, u64>,

    pub snapshots_emitted: u64,
    pub books_tracked: usize,
    pub trades: u64,
    pub messages_persisted: u64,

    /// Offset one past the last fully applied frame
    pub last_offset: u64,

    pub bytes_read: u64,
    pub elapsed_secs: f64,

    pub failure: Option<RunFailure>,
}

impl RunSummary {
    /// True if the run reached the end of input (or its limit).
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    pub fn decode_error_count(&self) -> u64 {
        self.decode_errors.values().sum()
    }

    pub fn anomaly_count(&self) -> u64 {
        self.anomalies.values().sum()
    }

    pub fn count(&self, kind: MessageKind) -> u64 {
        self.per_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One-feed processing pipeline.
pub struct Pipeline<S: MessageSink> {
    config: PipelineConfig,
    engine: OrderBookEngine,
    sink: S,
    accumulator: BatchAccumulator,
    summary: RunSummary,
    committed_offset: u64,
}

impl<S: MessageSink> Pipeline<S> {
    pub fn new(config: PipelineConfig, sink: S) -> Self {
        Self {
            engine: OrderBookEngine::new(config.engine.clone()),
            accumulator: BatchAccumulator::new(config.batch_size),
            sink,
            summary: RunSummary::default(),
            committed_offset: config.reader.first_frame_offset(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &OrderBookEngine {
        &self.engine
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_parts(self) -> (OrderBookEngine, S) {
        (self.engine, self.sink)
    }

    /// Open and process a feed file (`.zst` decoded transparently).
    pub fn run_path<P: AsRef<Path>>(&mut self, path: P) -> RunSummary {
        let path = path.as_ref();
        log::info!("Processing {}", path.display());
        match StreamReader::open(path, self.config.reader.clone()) {
            Ok(mut reader) => self.run_reader(&mut reader),
            Err(e) => self.fail_before_start(e),
        }
    }

    /// Process a feed source from its first byte.
    pub fn run_source<F: FeedSource>(&mut self, source: F) -> RunSummary {
        let meta = source.metadata();
        log::info!(
            "Processing {} source{}{}",
            meta.provider.as_deref().unwrap_or("feed"),
            meta.date.map(|d| format!(" for {d}")).unwrap_or_default(),
            meta.file_size.map(|s| format!(" ({s} bytes)")).unwrap_or_default()
        );
        match source.into_reader() {
            Ok(inner) => self.run(inner),
            Err(e) => self.fail_before_start(e),
        }
    }

    /// Process a byte stream read from its first byte.
    pub fn run<R: Read>(&mut self, inner: R) -> RunSummary {
        let mut reader = StreamReader::new(inner, self.config.reader.clone());
        self.run_reader(&mut reader)
    }

    /// Process frames from a stream reader until it ends or fails.
    pub fn run_reader<R: Read>(&mut self, reader: &mut StreamReader<R>) -> RunSummary {
        self.begin();
        let started = Instant::now();

        loop {
            match reader.next_batch() {
                Ok(Some(batch)) => {
                    for frame in batch.iter() {
                        if let Err(e) = self.process_frame(&frame) {
                            return self.finish(started, reader.bytes_read(), Some(e));
                        }
                    }
                    if let Err(e) = self.commit() {
                        return self.finish(started, reader.bytes_read(), Some(e));
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // Keep everything applied before the failure
                    let failure = self.commit().err().unwrap_or(e);
                    return self.finish(started, reader.bytes_read(), Some(failure));
                }
            }
        }
        self.finish(started, reader.bytes_read(), None)
    }

    /// Process an in-memory feed.
    pub fn run_slice(&mut self, data: &[u8]) -> RunSummary {
        self.begin();
        let started = Instant::now();
        let chunksize = self.config.reader.chunksize.max(1);
        let mut reader = SliceReader::new(data, self.config.reader.clone());
        let mut in_chunk = 0;

        let failure = loop {
            match reader.next_frame() {
                Ok(Some(frame)) => {
                    if let Err(e) = self.process_frame(&frame) {
                        break Some(e);
                    }
                    in_chunk += 1;
                    if in_chunk == chunksize {
                        in_chunk = 0;
                        if let Err(e) = self.commit() {
                            break Some(e);
                        }
                    }
                }
                Ok(None) => break None,
                Err(e) => break Some(self.commit().err().unwrap_or(e)),
            }
        };
        self.finish(started, reader.bytes_read(), failure)
    }

    fn begin(&mut self) {
        let first = self.config.reader.first_frame_offset();
        self.summary = RunSummary {
            last_offset: first,
            ..RunSummary::default()
        };
        self.committed_offset = first;
    }

    /// Decode and apply one frame. Only fatal errors are returned.
    fn process_frame(&mut self, frame: &RawFrame<'_>) -> Result<()> {
        self.summary.messages_seen += 1;

        match decode_frame(frame) {
            Ok(message) => {
                self.summary.messages_decoded += 1;
                *self.summary.per_kind.entry(message.kind()).or_insert(0) += 1;
                self.engine.apply_at(frame.offset, &message)?;
                if self.config.persist_messages {
                    if let Some(batch) = self.accumulator.push(frame.offset, message) {
                        let written = batch.len() as u64;
                        let committed = self.committed_offset;
                        self.sink
                            .write_batch(batch)
                            .map_err(|e| sink_error(committed, e))?;
                        self.summary.messages_persisted += written;
                    }
                }
            }
            Err(e) => {
                *self.summary.decode_errors.entry(tag_key(frame.tag)).or_insert(0) += 1;
                log::debug!("Skipping frame at offset {}: {e}", frame.offset);
                self.engine.anomalies_mut().record(
                    AnomalyRecord::new(AnomalyKind::DecodeError, e.to_string())
                        .with_offset(frame.offset),
                );
            }
        }

        self.summary.last_offset = frame.end_offset();
        let interval = self.config.progress_interval;
        if interval > 0 && self.summary.messages_seen % interval == 0 {
            log::info!(
                "Processed {} messages ({} books, offset {})",
                self.summary.messages_seen,
                self.engine.book_count(),
                self.summary.last_offset
            );
        }
        Ok(())
    }

    /// Hand everything pending to the sink.
    fn commit(&mut self) -> Result<()> {
        let committed = self.committed_offset;
        for batch in self.accumulator.drain() {
            let written = batch.len() as u64;
            self.sink
                .write_batch(batch)
                .map_err(|e| sink_error(committed, e))?;
            self.summary.messages_persisted += written;
        }

        let snapshots = self.engine.drain_snapshots();
        if !snapshots.is_empty() {
            self.summary.snapshots_emitted += snapshots.len() as u64;
            self.sink
                .write_snapshots(&snapshots)
                .map_err(|e| sink_error(committed, e))?;
        }

        self.committed_offset = self.summary.last_offset;
        Ok(())
    }

    fn fail_before_start(&mut self, error: ItchError) -> RunSummary {
        self.begin();
        log::warn!("Run failed before reading: {error}");
        self.finish(Instant::now(), 0, Some(error))
    }

    fn finish(&mut self, started: Instant, bytes_read: u64, failure: Option<ItchError>) -> RunSummary {
        let failure = failure.or_else(|| {
            self.commit()
                .and_then(|()| {
                    let committed = self.committed_offset;
                    self.sink.flush().map_err(|e| sink_error(committed, e))
                })
                .err()
        });

        let summary = &mut self.summary;
        summary.bytes_read = bytes_read;
        summary.elapsed_secs = started.elapsed().as_secs_f64();
        summary.books_tracked = self.engine.book_count();
        summary.trades = self.engine.tape().total_trades();
        summary.anomalies = self
            .engine
            .anomalies()
            .counts()
            .iter()
            .filter(|(kind, _)| **kind != AnomalyKind::DecodeError)
            .map(|(kind, count)| (kind.name().to_string(), *count))
            .collect();

        let last_offset = summary.last_offset;
        summary.failure = failure.map(|error| {
            let offset = match &error {
                ItchError::Sink { offset, .. } => *offset,
                _ => last_offset,
            };
            log::warn!("Run stopped at offset {offset}: {error}");
            RunFailure { offset, error }
        });

        log::info!(
            "Run {}: {} messages ({} decoded, {} decode errors, {} anomalies), {} books, {} snapshots in {:.2}s",
            if summary.failure.is_none() { "complete" } else { "incomplete" },
            summary.messages_seen,
            summary.messages_decoded,
            summary.decode_error_count(),
            summary.anomaly_count(),
            summary.books_tracked,
            summary.snapshots_emitted,
            summary.elapsed_secs
        );
        summary.clone()
    }
}

fn sink_error(committed: u64, error: ItchError) -> ItchError {
    match error {
        ItchError::Sink { .. } => error,
        other => ItchError::Sink {
            offset: committed,
            message: other.to_string(),
        },
    }
}

fn tag_key(tag: u8) -> String {
    if tag.is_ascii_graphic() {
        (tag as char).to_string()
    } else {
        format!("0x{tag:02x}")
    }
}
