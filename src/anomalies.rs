//! Anomaly tracking for decoding and book reconstruction.
//!
//! Real feeds are not perfectly clean: a reference can arrive for an order
//! the book never saw, a frame can carry an unknown tag, an execution can
//! exceed the live size. None of these stop a run. They are counted per kind,
//! a bounded sample is kept with enough context to find the root cause, and
//! the whole record can be exported as JSON.
//!
//! # Example
//!
//! ```
//! use itch_lob_reconstructor::anomalies::{AnomalyKind, AnomalyRecord, AnomalyTracker};
//!
//! let mut tracker = AnomalyTracker::new();
//! tracker.record(
//!     AnomalyRecord::new(AnomalyKind::UnknownOrderRef, "delete for unknown order 42")
//!         .with_order_ref(42)
//!         .with_offset(1_024),
//! );
//!
//! assert_eq!(tracker.count(AnomalyKind::UnknownOrderRef), 1);
//! let summary = tracker.summary();
//! assert_eq!(summary.total, 1);
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Timestamp;

/// Category of anomaly for classification and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// Add for a reference already live in the book (message dropped)
    DuplicateOrder,

    /// Execute/cancel/delete/replace for a reference the book does not hold
    UnknownOrderRef,

    /// Execute/cancel for more shares than are live (clamped)
    Overexecution,

    /// Replace whose original order is unknown, so the new order has no side
    OrphanReplace,

    /// Frame rejected by the decoder
    DecodeError,
}

impl AnomalyKind {
    pub const ALL: [AnomalyKind; 5] = [
        AnomalyKind::DuplicateOrder,
        AnomalyKind::UnknownOrderRef,
        AnomalyKind::Overexecution,
        AnomalyKind::OrphanReplace,
        AnomalyKind::DecodeError,
    ];

    /// Get a human-readable name for the kind.
    pub fn name(&self) -> &'static str {
        match self {
            AnomalyKind::DuplicateOrder => "DUPLICATE_ORDER",
            AnomalyKind::UnknownOrderRef => "UNKNOWN_ORDER_REF",
            AnomalyKind::Overexecution => "OVEREXECUTION",
            AnomalyKind::OrphanReplace => "ORPHAN_REPLACE",
            AnomalyKind::DecodeError => "DECODE_ERROR",
        }
    }

    /// Get severity level (1=low, 2=medium, 3=high).
    pub fn severity(&self) -> u8 {
        match self {
            AnomalyKind::UnknownOrderRef => 1,
            AnomalyKind::OrphanReplace => 1,
            AnomalyKind::DecodeError => 2,
            AnomalyKind::Overexecution => 2,
            AnomalyKind::DuplicateOrder => 3,
        }
    }
}

/// A single anomaly record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// Sequential ID assigned by the tracker
    pub id: u64,

    pub kind: AnomalyKind,

    /// Human-readable description
    pub message: String,

    /// Byte offset of the frame that triggered it
    pub offset: Option<u64>,

    /// Feed timestamp of the triggering message
    pub timestamp: Option<Timestamp>,

    pub stock_locate: Option<u16>,

    pub order_ref: Option<u64>,
}

impl AnomalyRecord {
    /// Create a record with minimal information; the tracker assigns the ID.
    pub fn new(kind: AnomalyKind, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            kind,
            message: message.into(),
            offset: None,
            timestamp: None,
            stock_locate: None,
            order_ref: None,
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_stock_locate(mut self, locate: u16) -> Self {
        self.stock_locate = Some(locate);
        self
    }

    pub fn with_order_ref(mut self, order_ref: u64) -> Self {
        self.order_ref = Some(order_ref);
        self
    }
}

/// Summary statistics for anomalies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalySummary {
    /// Total number of anomalies (sampled or not)
    pub total: u64,

    /// Count by kind name
    pub by_kind: BTreeMap<String, u64>,

    /// Count by severity
    pub by_severity: BTreeMap<u8, u64>,

    /// Feed timestamp of the first sampled anomaly
    pub first_timestamp: Option<Timestamp>,

    /// Feed timestamp of the last sampled anomaly
    pub last_timestamp: Option<Timestamp>,

    /// Number of distinct order references involved (a lower bound once
    /// `max_tracked_orders` is reached)
    pub unique_orders: u64,
}

/// Configuration for the anomaly tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyTrackerConfig {
    /// Maximum number of records kept in memory (counts are never capped)
    pub max_samples: usize,

    /// Maximum number of distinct order references remembered for
    /// `unique_orders`
    pub max_tracked_orders: usize,

    /// Whether to emit each anomaly through `log::debug!`
    pub log_anomalies: bool,

    /// Minimum severity to log (1=all, 2=medium+, 3=high only)
    pub min_log_severity: u8,
}

impl Default for AnomalyTrackerConfig {
    fn default() -> Self {
        Self {
            max_samples: 10_000,
            max_tracked_orders: 1_000_000,
            log_anomalies: true,
            min_log_severity: 1,
        }
    }
}

impl AnomalyTrackerConfig {
    pub fn with_max_samples(mut self, max: usize) -> Self {
        self.max_samples = max;
        self
    }

    pub fn with_max_tracked_orders(mut self, max: usize) -> Self {
        self.max_tracked_orders = max;
        self
    }

    pub fn with_logging(mut self, log: bool) -> Self {
        self.log_anomalies = log;
        self
    }
}

/// Counts and bounded samples of anomalies for one run.
#[derive(Debug, Clone)]
pub struct AnomalyTracker {
    config: AnomalyTrackerConfig,
    samples: Vec<AnomalyRecord>,
    next_id: u64,
    counts: BTreeMap<AnomalyKind, u64>,
    unique_orders: AHashSet<u64>,
}

impl Default for AnomalyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyTracker {
    /// Create a new tracker with default configuration.
    pub fn new() -> Self {
        Self::with_config(AnomalyTrackerConfig::default())
    }

    pub fn with_config(config: AnomalyTrackerConfig) -> Self {
        Self {
            config,
            samples: Vec::new(),
            next_id: 1,
            counts: BTreeMap::new(),
            unique_orders: AHashSet::new(),
        }
    }

    pub fn config(&self) -> &AnomalyTrackerConfig {
        &self.config
    }

    /// Record an anomaly and return its ID.
    pub fn record(&mut self, mut record: AnomalyRecord) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        record.id = id;

        if self.config.log_anomalies && record.kind.severity() >= self.config.min_log_severity {
            log::debug!(
                "[{}] #{id} {}{}",
                record.kind.name(),
                record.message,
                record
                    .offset
                    .map(|o| format!(" (offset {o})"))
                    .unwrap_or_default()
            );
        }

        if let Some(order_ref) = record.order_ref {
            if self.unique_orders.len() < self.config.max_tracked_orders {
                self.unique_orders.insert(order_ref);
            }
        }
        *self.counts.entry(record.kind).or_insert(0) += 1;

        if self.samples.len() < self.config.max_samples {
            self.samples.push(record);
        }
        id
    }

    /// Total count including unsampled records.
    pub fn total_count(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn count(&self, kind: AnomalyKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Counts per kind.
    pub fn counts(&self) -> &BTreeMap<AnomalyKind, u64> {
        &self.counts
    }

    /// Sampled records in recording order.
    pub fn samples(&self) -> &[AnomalyRecord] {
        &self.samples
    }

    pub fn samples_of(&self, kind: AnomalyKind) -> impl Iterator<Item = &AnomalyRecord> {
        self.samples.iter().filter(move |r| r.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Get summary statistics.
    pub fn summary(&self) -> AnomalySummary {
        let mut by_kind = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        for (kind, count) in &self.counts {
            by_kind.insert(kind.name().to_string(), *count);
            *by_severity.entry(kind.severity()).or_insert(0) += *count;
        }

        AnomalySummary {
            total: self.total_count(),
            by_kind,
            by_severity,
            first_timestamp: self.samples.iter().find_map(|r| r.timestamp),
            last_timestamp: self.samples.iter().rev().find_map(|r| r.timestamp),
            unique_orders: self.unique_orders.len() as u64,
        }
    }

    /// Summary plus samples as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "summary": self.summary(),
            "anomalies": self.samples,
        })
    }

    /// Export summary and samples to a JSON file.
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.to_json())?;
        writer.flush()?;
        Ok(())
    }

    /// Clear all records and counts.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.counts.clear();
        self.unique_orders.clear();
    }
}
