//! Persistence and query collaborators.
//!
//! The pipeline hands decoded messages to a [`MessageSink`] in batches grouped
//! by [`MessageCategory`], each record tagged with the byte offset of its
//! frame, and hands book snapshots over as they are produced. Columnar
//! storage is left to implementors; this module ships an in-memory
//! reference store with time-range queries, a JSON-lines writer and a
//! null sink.

use std::collections::BTreeMap;
use std::io::{BufWriter, Write};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ItchError, Result};
use crate::lob::BookSnapshot;
use crate::messages::{Message, MessageCategory};
use crate::types::{Symbol, Timestamp};

// ============================================================================
// Batches
// ============================================================================

/// A decoded message and the byte offset of its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetMessage {
    pub offset: u64,
    pub message: Message,
}

/// Messages of one category, in feed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBatch {
    pub category: MessageCategory,
    pub first_offset: u64,
    pub last_offset: u64,
    pub records: Vec<OffsetMessage>,
}

impl MessageBatch {
    pub fn new(category: MessageCategory) -> Self {
        Self {
            category,
            first_offset: 0,
            last_offset: 0,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, offset: u64, message: Message) {
        if self.records.is_empty() {
            self.first_offset = offset;
        }
        self.last_offset = offset;
        self.records.push(OffsetMessage { offset, message });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Groups messages by category and releases a batch once it is full.
#[derive(Debug, Clone)]
pub struct BatchAccumulator {
    batch_size: usize,
    pending: BTreeMap<MessageCategory, MessageBatch>,
}

impl BatchAccumulator {
    /// `batch_size` of zero is treated as one.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pending: BTreeMap::new(),
        }
    }

    /// Add a message; returns its category's batch if that is now full.
    pub fn push(&mut self, offset: u64, message: Message) -> Option<MessageBatch> {
        let category = message.category();
        let batch = self
            .pending
            .entry(category)
            .or_insert_with(|| MessageBatch::new(category));
        batch.push(offset, message);
        if batch.len() >= self.batch_size {
            self.pending.remove(&category)
        } else {
            None
        }
    }

    /// Take every non-empty pending batch, in category order.
    pub fn drain(&mut self) -> Vec<MessageBatch> {
        std::mem::take(&mut self.pending)
            .into_values()
            .filter(|b| !b.is_empty())
            .collect()
    }

    /// Messages held but not yet released.
    pub fn pending_len(&self) -> usize {
        self.pending.values().map(MessageBatch::len).sum()
    }
}

// ============================================================================
// Sink trait
// ============================================================================

/// Receiver of decoded messages and book snapshots.
///
/// Errors returned here are fatal for the run; the pipeline reports the last
/// offset it committed before the failing write.
pub trait MessageSink {
    fn write_batch(&mut self, batch: MessageBatch) -> Result<()>;

    fn write_snapshots(&mut self, snapshots: &[BookSnapshot]) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: MessageSink + ?Sized> MessageSink for &mut S {
    fn write_batch(&mut self, batch: MessageBatch) -> Result<()> {
        (**self).write_batch(batch)
    }

    fn write_snapshots(&mut self, snapshots: &[BookSnapshot]) -> Result<()> {
        (**self).write_snapshots(snapshots)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl<S: MessageSink + ?Sized> MessageSink for Box<S> {
    fn write_batch(&mut self, batch: MessageBatch) -> Result<()> {
        (**self).write_batch(batch)
    }

    fn write_snapshots(&mut self, snapshots: &[BookSnapshot]) -> Result<()> {
        (**self).write_snapshots(snapshots)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Discards everything, counting what it saw.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink {
    pub messages: u64,
    pub snapshots: u64,
}

impl MessageSink for NullSink {
    fn write_batch(&mut self, batch: MessageBatch) -> Result<()> {
        self.messages += batch.len() as u64;
        Ok(())
    }

    fn write_snapshots(&mut self, snapshots: &[BookSnapshot]) -> Result<()> {
        self.snapshots += snapshots.len() as u64;
        Ok(())
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory message store with time-range queries.
///
/// Symbols of messages that carry none (executions, cancels, deletes,
/// replaces) are resolved through the Stock Directory messages the store has
/// received.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<MessageCategory, Vec<OffsetMessage>>,
    directory: AHashMap<u16, Symbol>,
    snapshots: Vec<BookSnapshot>,
    batches_written: u64,
    flushes: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of `category` with `start <= timestamp <= end`, optionally for
    /// one symbol, in timestamp order (feed order among equal timestamps).
    pub fn query(
        &self,
        category: MessageCategory,
        symbol: Option<&str>,
        start: Timestamp,
        end: Timestamp,
    ) -> Vec<&OffsetMessage> {
        let Some(table) = self.tables.get(&category) else {
            return Vec::new();
        };
        let symbol = symbol.map(Symbol::new);
        let mut hits: Vec<&OffsetMessage> = table
            .iter()
            .filter(|r| {
                let ts = r.message.timestamp();
                ts >= start && ts <= end
            })
            .filter(|r| match symbol {
                None => true,
                Some(wanted) => self.symbol_of(&r.message) == Some(wanted),
            })
            .collect();
        hits.sort_by_key(|r| r.message.timestamp());
        hits
    }

    /// Symbol of a stored message, from its body or the stored directory.
    pub fn symbol_of(&self, message: &Message) -> Option<Symbol> {
        message
            .stock()
            .or_else(|| self.directory.get(&message.stock_locate()).copied())
    }

    /// Snapshots of one symbol, in the order they were written.
    pub fn snapshots_for(&self, symbol: &str) -> Vec<&BookSnapshot> {
        let symbol = Symbol::new(symbol);
        self.snapshots.iter().filter(|s| s.symbol == symbol).collect()
    }

    pub fn snapshots(&self) -> &[BookSnapshot] {
        &self.snapshots
    }

    pub fn records(&self, category: MessageCategory) -> &[OffsetMessage] {
        self.tables
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count(&self, category: MessageCategory) -> usize {
        self.records(category).len()
    }

    /// Stored record count per category.
    pub fn counts(&self) -> BTreeMap<MessageCategory, usize> {
        self.tables.iter().map(|(c, t)| (*c, t.len())).collect()
    }

    /// Total stored messages.
    pub fn len(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn batches_written(&self) -> u64 {
        self.batches_written
    }

    pub fn flushes(&self) -> u64 {
        self.flushes
    }
}

impl MessageSink for MemoryStore {
    fn write_batch(&mut self, batch: MessageBatch) -> Result<()> {
        for record in &batch.records {
            if let Message::StockDirectory(dir) = &record.message {
                self.directory.insert(dir.header.stock_locate, dir.stock);
            }
        }
        self.tables
            .entry(batch.category)
            .or_default()
            .extend(batch.records);
        self.batches_written += 1;
        Ok(())
    }

    fn write_snapshots(&mut self, snapshots: &[BookSnapshot]) -> Result<()> {
        self.snapshots.extend_from_slice(snapshots);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

// ============================================================================
// JSON lines
// ============================================================================

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum JsonLine<'a> {
    Message {
        category: MessageCategory,
        offset: u64,
        message: &'a Message,
    },
    Snapshot {
        #[serde(flatten)]
        snapshot: &'a BookSnapshot,
    },
}

/// Writes one JSON object per message and per snapshot.
pub struct JsonLinesSink<W: Write> {
    writer: BufWriter<W>,
    lines: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            lines: 0,
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| ItchError::generic(format!("Failed to flush JSON lines: {}", e.error())))
    }

    fn write_line(&mut self, line: &JsonLine<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, line)?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }
}

impl<W: Write> MessageSink for JsonLinesSink<W> {
    fn write_batch(&mut self, batch: MessageBatch) -> Result<()> {
        for record in &batch.records {
            self.write_line(&JsonLine::Message {
                category: batch.category,
                offset: record.offset,
                message: &record.message,
            })?;
        }
        Ok(())
    }

    fn write_snapshots(&mut self, snapshots: &[BookSnapshot]) -> Result<()> {
        for snapshot in snapshots {
            self.write_line(&JsonLine::Snapshot { snapshot })?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
