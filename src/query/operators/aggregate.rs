//! Aggregate materialization
//!
//! Emits one float sample per series from per-series aggregate operators,
//! in request order. The carrier timestamp depends on the function: MIN and
//! MAX use the timestamp of the extreme value, SUM and CNT the timestamp of
//! the last point in the aggregated range.

use tracing::debug;

use crate::error::Result;
use crate::model::{Sample, SeriesId, StreamState};
use crate::query::operators::{Materializer, ReadBatch};
use crate::request::AggregateFn;
use crate::store::tree::{AggregateOperator, AggregateResult};
use crate::wire;

/// Materializes one aggregate sample per series
pub struct AggregateMaterializer {
    iters: Vec<Box<dyn AggregateOperator>>,
    ids: Vec<SeriesId>,
    func: AggregateFn,
    pos: usize,
}

impl AggregateMaterializer {
    /// Panics if `ids` and `iters` disagree in length
    pub fn new(
        ids: Vec<SeriesId>,
        iters: Vec<Box<dyn AggregateOperator>>,
        func: AggregateFn,
    ) -> Self {
        assert_eq!(ids.len(), iters.len(), "aggregate ids/iters length mismatch");
        Self {
            iters,
            ids,
            func,
            pos: 0,
        }
    }
}

impl Materializer for AggregateMaterializer {
    fn read(&mut self, dest: &mut [u8]) -> Result<ReadBatch> {
        let mut written = 0;
        while self.pos < self.iters.len() {
            if dest.len() - written < wire::HEADER_SIZE {
                return Ok(ReadBatch::new(written, StreamState::HasMore));
            }
            let mut ts = [0u64; 1];
            let mut out = [AggregateResult::default(); 1];
            let (n, state) = self.iters[self.pos].read(&mut ts, &mut out)?;
            let id = self.ids[self.pos];
            self.pos += 1;
            if n != 1 {
                // A series with no data in the range produces no output
                debug!(series_id = id, size = n, "unexpected aggregate result size, skipping series");
                if state == StreamState::Unavailable {
                    return Ok(ReadBatch::new(written, StreamState::Unavailable));
                }
                continue;
            }
            let result = out[0];
            let (timestamp, value) = match self.func {
                AggregateFn::Min => (result.min_ts, result.min),
                AggregateFn::Max => (result.max_ts, result.max),
                AggregateFn::Sum => (result.range_end_ts, result.sum),
                AggregateFn::Cnt => (result.range_end_ts, result.cnt as f64),
            };
            written += wire::encode(&Sample::float(id, timestamp, value), &mut dest[written..]);
            if state == StreamState::Unavailable {
                return Ok(ReadBatch::new(written, StreamState::Unavailable));
            }
        }
        Ok(ReadBatch::new(written, StreamState::Exhausted))
    }
}
