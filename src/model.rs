//! Core data model: series identifiers, timestamps, and samples
//!
//! A sample is one point of one series. Scans and merges produce float
//! samples; joins produce tuple samples with a presence bitmap; event
//! streams produce opaque blobs. The wire layout of an emitted sample is
//! defined in [`crate::wire`].

use bytes::Bytes;

/// Opaque 64-bit series identifier
pub type SeriesId = u64;

/// Monotonic 64-bit logical time
pub type Timestamp = u64;

/// Logical address of a tree root inside the block store
pub type LogicalAddr = u64;

/// Scan direction, implied by the order of a range's endpoints:
/// `begin < end` is forward, `begin > end` is backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Stream state reported alongside every batch read.
///
/// A read can deliver data *and* report a terminal state: the final batch of
/// a drained iterator comes back as `(n, Exhausted)`. `Unavailable` means the
/// upstream is momentarily unreachable; it ends the current batch without
/// failing the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// More data may follow on the next read
    HasMore,
    /// The stream is fully consumed
    Exhausted,
    /// Upstream momentarily unavailable; treat as end-of-batch, not fatal
    Unavailable,
}

impl StreamState {
    /// True for states that end the pump loop
    pub fn is_terminal(self) -> bool {
        !matches!(self, StreamState::HasMore)
    }
}

/// Sample payload variants
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single 64-bit float value
    Float(f64),
    /// A joined row: presence bitmap plus one value per set bit, packed in
    /// column declaration order
    Tuple { bitmap: u64, values: Vec<f64> },
    /// Opaque event bytes
    Event(Bytes),
}

/// One point of one series
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub series_id: SeriesId,
    pub timestamp: Timestamp,
    pub payload: Payload,
}

impl Sample {
    /// Shorthand for the common float-valued sample
    pub fn float(series_id: SeriesId, timestamp: Timestamp, value: f64) -> Self {
        Self {
            series_id,
            timestamp,
            payload: Payload::Float(value),
        }
    }

    /// The float value, if this is a float sample
    pub fn as_float(&self) -> Option<f64> {
        match self.payload {
            Payload::Float(v) => Some(v),
            _ => None,
        }
    }
}
