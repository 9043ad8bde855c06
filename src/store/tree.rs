//! Storage-layer contracts
//!
//! The engine treats per-series trees as opaque: it only relies on the
//! traits below. A tree delivers points strictly ordered by timestamp in the
//! direction implied by the range endpoints, timestamps are unique within a
//! series, and an aggregate operator yields at most one result covering the
//! requested range.

use bytes::Bytes;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{Direction, LogicalAddr, SeriesId, StreamState, Timestamp};

/// Outcome of appending one point to a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Point accepted
    Ok,
    /// Point accepted and the tree flushed a node; the caller should capture
    /// the tree's current roots as rescue points
    OkFlushNeeded,
    /// Point rejected: bad value or out-of-order timestamp
    FailBadValue,
    /// Point rejected: the series id is unknown
    FailBadId,
}

/// Whether a set of rescue points describes a cleanly closed tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStatus {
    Ok,
    Repair,
}

/// One aggregate over a time range
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateResult {
    pub cnt: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    /// Timestamp carrying the minimum value
    pub min_ts: Timestamp,
    /// Timestamp carrying the maximum value
    pub max_ts: Timestamp,
    /// End of the aggregated range; carrier timestamp for SUM and CNT
    pub range_end_ts: Timestamp,
}

/// Ordered stream of `(timestamp, value)` pairs over one series.
///
/// `read` fills both output slices in lockstep and returns the count written
/// together with the stream state after the call.
pub trait ScanOperator: Send {
    fn read(
        &mut self,
        ts_out: &mut [Timestamp],
        val_out: &mut [f64],
    ) -> Result<(usize, StreamState)>;

    fn direction(&self) -> Direction;
}

/// Aggregate stream over one series; yields at most one result per query
pub trait AggregateOperator: Send {
    fn read(
        &mut self,
        ts_out: &mut [Timestamp],
        out: &mut [AggregateResult],
    ) -> Result<(usize, StreamState)>;
}

/// Ordered stream of `(timestamp, blob)` events over one series
pub trait BinaryDataOperator: Send {
    fn read(
        &mut self,
        ts_out: &mut [Timestamp],
        out: &mut [Bytes],
    ) -> Result<(usize, StreamState)>;

    fn direction(&self) -> Direction;
}

/// Handle to one per-series tree of immutable extents.
///
/// Handles are shared (`Arc`) between the registry and write-session caches;
/// implementations synchronize internally.
pub trait SeriesTree: Send + Sync {
    /// Append one point. `OkFlushNeeded` asks the caller to persist the
    /// current roots as rescue points.
    fn append(&self, ts: Timestamp, value: f64) -> AppendOutcome;

    /// Current root addresses
    fn roots(&self) -> Vec<LogicalAddr>;

    /// Close the tree and return its final rescue points
    fn close(&self) -> Vec<LogicalAddr>;

    /// Finish initialization. Invoked once, outside the registry lock, after
    /// the handle is registered.
    fn force_init(&self);

    /// Bytes buffered in memory but not yet flushed to the block store
    fn uncommitted_size(&self) -> usize;

    /// Ordered scan over the range; direction from the endpoint order
    fn scan(&self, begin: Timestamp, end: Timestamp) -> Box<dyn ScanOperator>;

    /// Aggregate over the range
    fn aggregate(&self, begin: Timestamp, end: Timestamp) -> Box<dyn AggregateOperator>;
}

/// Factory for per-series trees on a shared block store
pub trait BlockStore: Send + Sync {
    /// Open (or restore, when rescue points are non-empty) one tree
    fn open_tree(
        &self,
        id: SeriesId,
        rescue_points: &[LogicalAddr],
    ) -> Result<Arc<dyn SeriesTree>>;

    /// Inspect rescue points for crash damage
    fn repair_status(&self, rescue_points: &[LogicalAddr]) -> RepairStatus;
}
