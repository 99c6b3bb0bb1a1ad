//! Core value types shared by the decoder and the order book engine.
//!
//! These types are designed to be:
//! - Memory efficient (use smallest types possible)
//! - Exact (prices are integer fixed-point, never floats)
//! - Byte-faithful (alpha fields keep their padding until they are read)

use std::borrow::Cow;
use std::fmt;

use chrono::NaiveTime;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

// ============================================================================
// Side
// ============================================================================

/// Buy/sell indicator of an order or trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// Buy order (bid)
    Buy = b'B',
    /// Sell order (ask)
    Sell = b'S',
}

impl Side {
    /// Parse side from its ITCH byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'B' => Some(Side::Buy),
            b'S' => Some(Side::Sell),
            _ => None,
        }
    }

    /// Convert to byte representation.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Check if this is a bid.
    #[inline(always)]
    pub fn is_bid(self) -> bool {
        matches!(self, Side::Buy)
    }

    /// Check if this is an ask.
    #[inline(always)]
    pub fn is_ask(self) -> bool {
        matches!(self, Side::Sell)
    }
}

// ============================================================================
// Fixed-point prices
// ============================================================================

/// Signed fixed-point price with `DECIMALS` implied decimal places.
///
/// The wire integer is kept as-is; `FixedPrice::<4>::from_raw(1_000_000)` is
/// `100.0000`. Arithmetic and ordering work on the raw integer, so the order
/// book never accumulates rounding drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixedPrice<const DECIMALS: u32>(i64);

/// Standard ITCH price (4 decimal places).
pub type Price = FixedPrice<4>;

/// MWCB decline level price (8 decimal places).
pub type Price8 = FixedPrice<8>;

impl<const DECIMALS: u32> FixedPrice<DECIMALS> {
    /// Scale factor between raw units and whole currency units.
    pub const SCALE: i64 = 10i64.pow(DECIMALS);

    /// Wrap a raw scaled integer.
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw scaled integer.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Presentation-only conversion to floating point.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }
}

impl<const DECIMALS: u32> fmt::Display for FixedPrice<DECIMALS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = Self::SCALE as u64;
        write!(
            f,
            "{sign}{}.{:0width$}",
            abs / scale,
            abs % scale,
            width = DECIMALS as usize
        )
    }
}

// ============================================================================
// Alpha fields
// ============================================================================

/// Fixed-width, right space-padded ASCII field.
///
/// The bytes are stored exactly as they appeared on the wire. Trimming only
/// happens in [`Alpha::as_str`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Alpha<const N: usize>([u8; N]);

/// 8-byte stock symbol.
pub type Symbol = Alpha<8>;

/// 4-byte market participant identifier.
pub type Mpid = Alpha<4>;

impl<const N: usize> Alpha<N> {
    /// Wrap raw wire bytes.
    #[inline]
    pub const fn from_bytes(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Build a padded field from text; input longer than `N` is truncated.
    pub fn new(text: &str) -> Self {
        let mut bytes = [b' '; N];
        let src = text.as_bytes();
        let len = src.len().min(N);
        bytes[..len].copy_from_slice(&src[..len]);
        Self(bytes)
    }

    /// Exact wire bytes including padding.
    #[inline]
    pub fn raw(&self) -> &[u8; N] {
        &self.0
    }

    /// Trimmed text, or `None` when the significant bytes are not UTF-8.
    ///
    /// Trailing spaces and NULs are both treated as padding.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.trimmed()).ok()
    }

    /// Trimmed text with invalid bytes replaced by U+FFFD.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.trimmed())
    }

    /// True if the field is entirely padding.
    pub fn is_blank(&self) -> bool {
        self.trimmed().is_empty()
    }

    fn trimmed(&self) -> &[u8] {
        let end = self
            .0
            .iter()
            .rposition(|&b| b != b' ' && b != 0)
            .map_or(0, |i| i + 1);
        &self.0[..end]
    }

    /// Text that rebuilds exactly these bytes through [`Alpha::new`].
    fn canonical_text(&self) -> Option<&str> {
        let text = self.as_str()?;
        (Self::new(text) == *self).then_some(text)
    }
}

impl<const N: usize> Default for Alpha<N> {
    fn default() -> Self {
        Self([b' '; N])
    }
}

impl<const N: usize> fmt::Debug for Alpha<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical_text() {
            Some(text) => write!(f, "{text:?}"),
            None => write!(f, "{:?}", self.0),
        }
    }
}

impl<const N: usize> fmt::Display for Alpha<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.to_string_lossy())
    }
}

impl<const N: usize> From<&str> for Alpha<N> {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Serialized as trimmed text when that text rebuilds the same bytes,
/// otherwise as the raw byte array (NUL padding, non-UTF-8 content).
impl<const N: usize> Serialize for Alpha<N> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.canonical_text() {
            Some(text) => serializer.serialize_str(text),
            None => serializer.serialize_bytes(&self.0),
        }
    }
}

impl<'de, const N: usize> Deserialize<'de> for Alpha<N> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(AlphaVisitor::<N>)
    }
}

struct AlphaVisitor<const N: usize>;

impl<'de, const N: usize> Visitor<'de> for AlphaVisitor<N> {
    type Value = Alpha<N>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a string or an array of {N} bytes")
    }

    fn visit_str<E: de::Error>(self, text: &str) -> std::result::Result<Self::Value, E> {
        Ok(Alpha::new(text))
    }

    fn visit_bytes<E: de::Error>(self, bytes: &[u8]) -> std::result::Result<Self::Value, E> {
        <[u8; N]>::try_from(bytes)
            .map(Alpha::from_bytes)
            .map_err(|_| E::invalid_length(bytes.len(), &self))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let mut bytes = [0u8; N];
        for (i, slot) in bytes.iter_mut().enumerate() {
            *slot = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        if seq.next_element::<u8>()?.is_some() {
            return Err(de::Error::invalid_length(N + 1, &self));
        }
        Ok(Alpha::from_bytes(bytes))
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Nanoseconds since local midnight, as carried by every ITCH message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Wrap nanoseconds since midnight.
    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Nanoseconds since midnight.
    #[inline]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Wall-clock time of day, for presentation.
    ///
    /// Returns `None` for values past 24h, which a valid feed never carries.
    pub fn to_time(self) -> Option<NaiveTime> {
        let secs = u32::try_from(self.0 / 1_000_000_000).ok()?;
        let nanos = (self.0 % 1_000_000_000) as u32;
        NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_time() {
            Some(time) => write!(f, "{}", time.format("%H:%M:%S%.9f")),
            None => write!(f, "{}ns", self.0),
        }
    }
}

// ============================================================================
// Engine-side order
// ============================================================================

/// Resting order stored in a book's reference index.
///
/// Minimal representation to save memory; price levels only keep aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_ref: u64,
    pub stock_locate: u16,
    pub side: Side,
    pub price: Price,
    pub shares: u32,
}

/// Book consistency status of the top of book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookConsistency {
    /// Book is valid: best_bid < best_ask
    Valid,
    /// Book is empty (no quotes on one or both sides)
    Empty,
    /// Book is locked: best_bid == best_ask (unusual but can occur)
    Locked,
    /// Book is crossed: best_bid > best_ask
    Crossed,
}

impl BookConsistency {
    /// Classify a top of book.
    pub fn classify(best_bid: Option<Price>, best_ask: Option<Price>) -> Self {
        match (best_bid, best_ask) {
            (Some(bid), Some(ask)) if bid < ask => BookConsistency::Valid,
            (Some(bid), Some(ask)) if bid == ask => BookConsistency::Locked,
            (Some(_), Some(_)) => BookConsistency::Crossed,
            _ => BookConsistency::Empty,
        }
    }

    /// Returns true if the book state is valid.
    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(self, BookConsistency::Valid)
    }

    /// Returns true if the book is crossed.
    #[inline]
    pub fn is_crossed(&self) -> bool {
        matches!(self, BookConsistency::Crossed)
    }

    /// Returns true if the book is locked (bid == ask).
    #[inline]
    pub fn is_locked(&self) -> bool {
        matches!(self, BookConsistency::Locked)
    }
}
