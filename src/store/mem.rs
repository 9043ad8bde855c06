//! In-memory storage backend
//!
//! This implementation keeps every series as a sorted point vector behind a
//! mutex and is suitable for development, testing, and embedding scenarios
//! that do not need persistence. Rescue points are synthesized so the
//! close/reopen lifecycle behaves like the real block store.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{Direction, LogicalAddr, SeriesId, StreamState, Timestamp};
use crate::store::tree::{
    AggregateOperator, AggregateResult, AppendOutcome, BlockStore, RepairStatus, ScanOperator,
    SeriesTree,
};

/// Rescue-point sentinel marking a tree that was not closed cleanly.
///
/// [`MemoryBlockStore::repair_status`] reports `Repair` when a rescue-point
/// list ends with this address.
pub const TORN_SHUTDOWN_ADDR: LogicalAddr = u64::MAX;

/// Block store keeping all trees in process memory
#[derive(Debug, Clone)]
pub struct MemoryBlockStore {
    flush_every: u64,
}

impl MemoryBlockStore {
    /// Create a store that signals `OkFlushNeeded` every 1000 appends
    pub fn new() -> Self {
        Self { flush_every: 1000 }
    }

    /// Create a store with a custom flush cadence; 0 disables flush signals
    pub fn with_flush_every(flush_every: u64) -> Self {
        Self { flush_every }
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for MemoryBlockStore {
    fn open_tree(
        &self,
        id: SeriesId,
        rescue_points: &[LogicalAddr],
    ) -> Result<Arc<dyn SeriesTree>> {
        Ok(Arc::new(MemoryTree::new(id, rescue_points, self.flush_every)))
    }

    fn repair_status(&self, rescue_points: &[LogicalAddr]) -> RepairStatus {
        match rescue_points.last() {
            Some(&TORN_SHUTDOWN_ADDR) => RepairStatus::Repair,
            _ => RepairStatus::Ok,
        }
    }
}

#[derive(Debug)]
struct TreeInner {
    points: Vec<(Timestamp, f64)>,
    rescue_points: Vec<LogicalAddr>,
    appended_since_flush: u64,
}

/// One in-memory series tree
#[derive(Debug)]
pub struct MemoryTree {
    id: SeriesId,
    flush_every: u64,
    inner: Mutex<TreeInner>,
}

impl MemoryTree {
    fn new(id: SeriesId, rescue_points: &[LogicalAddr], flush_every: u64) -> Self {
        Self {
            id,
            flush_every,
            inner: Mutex::new(TreeInner {
                points: Vec::new(),
                rescue_points: rescue_points.to_vec(),
                appended_since_flush: 0,
            }),
        }
    }

    fn current_roots(&self, inner: &TreeInner) -> Vec<LogicalAddr> {
        if inner.points.is_empty() {
            // Nothing new was written; the tree is still described by the
            // rescue points it was opened with.
            return inner.rescue_points.clone();
        }
        let (last_ts, _) = inner.points[inner.points.len() - 1];
        vec![self.id, inner.points.len() as LogicalAddr, last_ts]
    }
}

impl SeriesTree for MemoryTree {
    fn append(&self, ts: Timestamp, value: f64) -> AppendOutcome {
        if value.is_nan() {
            return AppendOutcome::FailBadValue;
        }
        let mut inner = self.inner.lock();
        if let Some(&(last_ts, _)) = inner.points.last() {
            // Timestamps are unique and strictly increasing within a series
            if ts <= last_ts {
                return AppendOutcome::FailBadValue;
            }
        }
        inner.points.push((ts, value));
        inner.appended_since_flush += 1;
        if self.flush_every > 0 && inner.appended_since_flush >= self.flush_every {
            inner.appended_since_flush = 0;
            return AppendOutcome::OkFlushNeeded;
        }
        AppendOutcome::Ok
    }

    fn roots(&self) -> Vec<LogicalAddr> {
        let inner = self.inner.lock();
        self.current_roots(&inner)
    }

    fn close(&self) -> Vec<LogicalAddr> {
        let inner = self.inner.lock();
        self.current_roots(&inner)
    }

    fn force_init(&self) {}

    fn uncommitted_size(&self) -> usize {
        let inner = self.inner.lock();
        inner.appended_since_flush as usize * std::mem::size_of::<(Timestamp, f64)>()
    }

    fn scan(&self, begin: Timestamp, end: Timestamp) -> Box<dyn ScanOperator> {
        let inner = self.inner.lock();
        let (direction, points): (Direction, Vec<(Timestamp, f64)>) = if begin <= end {
            let pts = inner
                .points
                .iter()
                .copied()
                .filter(|&(ts, _)| ts >= begin && ts < end)
                .collect();
            (Direction::Forward, pts)
        } else {
            let mut pts: Vec<(Timestamp, f64)> = inner
                .points
                .iter()
                .copied()
                .filter(|&(ts, _)| ts > end && ts <= begin)
                .collect();
            pts.reverse();
            (Direction::Backward, pts)
        };
        Box::new(MemoryScan {
            points,
            pos: 0,
            direction,
        })
    }

    fn aggregate(&self, begin: Timestamp, end: Timestamp) -> Box<dyn AggregateOperator> {
        let mut scan = self.scan(begin, end);
        let mut ts_buf = vec![0u64; 256];
        let mut val_buf = vec![0f64; 256];
        let mut agg: Option<AggregateResult> = None;
        loop {
            // The scan is a snapshot; reads cannot fail or stall here.
            let (n, state) = scan
                .read(&mut ts_buf, &mut val_buf)
                .expect("in-memory scan cannot fail");
            for i in 0..n {
                let (ts, val) = (ts_buf[i], val_buf[i]);
                let acc = agg.get_or_insert(AggregateResult {
                    cnt: 0,
                    sum: 0.0,
                    min: f64::INFINITY,
                    max: f64::NEG_INFINITY,
                    min_ts: ts,
                    max_ts: ts,
                    range_end_ts: ts,
                });
                acc.cnt += 1;
                acc.sum += val;
                if val < acc.min {
                    acc.min = val;
                    acc.min_ts = ts;
                }
                if val > acc.max {
                    acc.max = val;
                    acc.max_ts = ts;
                }
                // Carrier timestamp for SUM/CNT: the last point in scan order
                acc.range_end_ts = ts;
            }
            if state.is_terminal() {
                break;
            }
        }
        Box::new(MemoryAggregate { result: agg })
    }
}

struct MemoryScan {
    points: Vec<(Timestamp, f64)>,
    pos: usize,
    direction: Direction,
}

impl ScanOperator for MemoryScan {
    fn read(
        &mut self,
        ts_out: &mut [Timestamp],
        val_out: &mut [f64],
    ) -> Result<(usize, StreamState)> {
        let capacity = ts_out.len().min(val_out.len());
        let n = capacity.min(self.points.len() - self.pos);
        for i in 0..n {
            let (ts, val) = self.points[self.pos + i];
            ts_out[i] = ts;
            val_out[i] = val;
        }
        self.pos += n;
        let state = if self.pos == self.points.len() {
            StreamState::Exhausted
        } else {
            StreamState::HasMore
        };
        Ok((n, state))
    }

    fn direction(&self) -> Direction {
        self.direction
    }
}

struct MemoryAggregate {
    result: Option<AggregateResult>,
}

impl AggregateOperator for MemoryAggregate {
    fn read(
        &mut self,
        ts_out: &mut [Timestamp],
        out: &mut [AggregateResult],
    ) -> Result<(usize, StreamState)> {
        match self.result.take() {
            Some(result) if !out.is_empty() && !ts_out.is_empty() => {
                ts_out[0] = result.range_end_ts;
                out[0] = result;
                Ok((1, StreamState::Exhausted))
            }
            _ => Ok((0, StreamState::Exhausted)),
        }
    }
}
