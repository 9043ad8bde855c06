//! K-way merge of per-series streams
//!
//! Each input owns a fixed-size range buffer with a read cursor; a binary
//! heap of `(key, value, input_index)` entries picks the next sample. The
//! total order is `(timestamp, series_id)` for time order and
//! `(series_id, timestamp)` for series order; backward queries complement
//! the key bits so a single min-heap serves both directions.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::Result;
use crate::model::{Direction, Sample, SeriesId, StreamState, Timestamp};
use crate::query::operators::{Materializer, ReadBatch};
use crate::request::OrderBy;
use crate::store::tree::ScanOperator;
use crate::wire;

/// Heap key covering {time, series} x {forward, backward} without a
/// comparator per combination.
fn sort_key(order: OrderBy, direction: Direction, ts: Timestamp, id: SeriesId) -> (u64, u64) {
    let (major, minor) = match order {
        OrderBy::Time => (ts, id),
        OrderBy::Series => (id, ts),
    };
    match direction {
        Direction::Forward => (major, minor),
        Direction::Backward => (!major, !minor),
    }
}

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    key: (u64, u64),
    ts: Timestamp,
    id: SeriesId,
    value: f64,
    input: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        (self.key, self.input) == (other.key, other.input)
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.key, self.input).cmp(&(other.key, other.input))
    }
}

struct Range {
    ts: Vec<Timestamp>,
    xs: Vec<f64>,
    id: SeriesId,
    len: usize,
    pos: usize,
}

impl Range {
    fn new(id: SeriesId, capacity: usize) -> Self {
        Self {
            ts: vec![0; capacity],
            xs: vec![0.0; capacity],
            id,
            len: 0,
            pos: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.len
    }

    fn top(&self) -> (Timestamp, f64) {
        (self.ts[self.pos], self.xs[self.pos])
    }
}

/// Merges per-series scans into one globally ordered stream
pub struct MergeMaterializer {
    iters: Vec<Box<dyn ScanOperator>>,
    ranges: Vec<Range>,
    primed: Vec<bool>,
    order: OrderBy,
    direction: Direction,
    done: bool,
}

impl MergeMaterializer {
    /// Panics if `ids` and `iters` disagree in length. The direction is
    /// inherited from the first iterator; the dispatcher guarantees it is
    /// uniform across inputs.
    pub fn new(
        ids: Vec<SeriesId>,
        iters: Vec<Box<dyn ScanOperator>>,
        order: OrderBy,
        range_len: usize,
    ) -> Self {
        assert_eq!(ids.len(), iters.len(), "merge ids/iters length mismatch");
        let direction = iters
            .first()
            .map(|it| it.direction())
            .unwrap_or(Direction::Forward);
        let ranges = ids
            .iter()
            .map(|&id| Range::new(id, range_len))
            .collect::<Vec<_>>();
        let primed = vec![false; iters.len()];
        Self {
            iters,
            ranges,
            primed,
            order,
            direction,
            done: false,
        }
    }

    fn entry(&self, input: usize) -> HeapEntry {
        let range = &self.ranges[input];
        let (ts, value) = range.top();
        HeapEntry {
            key: sort_key(self.order, self.direction, ts, range.id),
            ts,
            id: range.id,
            value,
            input: input as u32,
        }
    }

    fn fill_range(&mut self, input: usize) -> Result<StreamState> {
        let range = &mut self.ranges[input];
        let (n, state) = self.iters[input].read(&mut range.ts, &mut range.xs)?;
        range.len = n;
        range.pos = 0;
        Ok(state)
    }
}

impl Materializer for MergeMaterializer {
    fn read(&mut self, dest: &mut [u8]) -> Result<ReadBatch> {
        if self.done || self.iters.is_empty() {
            return Ok(ReadBatch::new(0, StreamState::Exhausted));
        }

        // Prime every range that has not produced its first batch yet. A
        // range that comes back empty and unavailable stays unprimed and is
        // retried on the next call.
        for input in 0..self.ranges.len() {
            if self.primed[input] {
                continue;
            }
            let state = self.fill_range(input)?;
            if state == StreamState::Unavailable && self.ranges[input].is_empty() {
                return Ok(ReadBatch::new(0, StreamState::Unavailable));
            }
            self.primed[input] = true;
        }

        let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::with_capacity(self.ranges.len());
        for input in 0..self.ranges.len() {
            if !self.ranges[input].is_empty() {
                heap.push(Reverse(self.entry(input)));
            }
        }

        let mut written = 0;
        while let Some(&Reverse(entry)) = heap.peek() {
            if dest.len() - written < wire::HEADER_SIZE {
                // Output buffer is fully consumed; the heap is rebuilt from
                // the range cursors on the next call
                return Ok(ReadBatch::new(written, StreamState::HasMore));
            }
            heap.pop();
            let sample = Sample::float(entry.id, entry.ts, entry.value);
            written += wire::encode(&sample, &mut dest[written..]);

            let input = entry.input as usize;
            self.ranges[input].pos += 1;
            if self.ranges[input].is_empty() {
                let state = self.fill_range(input)?;
                if self.ranges[input].is_empty() && state == StreamState::Unavailable {
                    self.primed[input] = false;
                    return Ok(ReadBatch::new(written, StreamState::Unavailable));
                }
            }
            if !self.ranges[input].is_empty() {
                heap.push(Reverse(self.entry(input)));
            }
        }

        // All iterators fully consumed
        self.done = true;
        self.iters.clear();
        self.ranges.clear();
        Ok(ReadBatch::new(written, StreamState::Exhausted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::operators::testing::{decode_floats, VecScan};

    fn merge(
        series: Vec<(SeriesId, Vec<(Timestamp, f64)>)>,
        order: OrderBy,
        range_len: usize,
    ) -> MergeMaterializer {
        let mut ids = Vec::new();
        let mut iters: Vec<Box<dyn ScanOperator>> = Vec::new();
        for (id, points) in series {
            ids.push(id);
            iters.push(Box::new(VecScan::forward(points)));
        }
        MergeMaterializer::new(ids, iters, order, range_len)
    }

    #[test]
    fn test_time_order_interleaves_series() {
        let mut mat = merge(
            vec![
                (1, vec![(1, 10.0), (3, 30.0)]),
                (2, vec![(2, 20.0), (4, 40.0)]),
            ],
            OrderBy::Time,
            1024,
        );
        let mut buf = vec![0u8; 1024];
        let batch = mat.read(&mut buf).unwrap();
        assert_eq!(batch.state, StreamState::Exhausted);
        assert_eq!(
            decode_floats(&buf, batch.written),
            vec![(1, 1, 10.0), (2, 2, 20.0), (1, 3, 30.0), (2, 4, 40.0)]
        );
    }

    #[test]
    fn test_series_order_keeps_series_contiguous() {
        let mut mat = merge(
            vec![
                (2, vec![(2, 20.0), (4, 40.0)]),
                (1, vec![(1, 10.0), (3, 30.0)]),
            ],
            OrderBy::Series,
            1024,
        );
        let mut buf = vec![0u8; 1024];
        let batch = mat.read(&mut buf).unwrap();
        assert_eq!(
            decode_floats(&buf, batch.written),
            vec![(1, 1, 10.0), (1, 3, 30.0), (2, 2, 20.0), (2, 4, 40.0)]
        );
    }

    #[test]
    fn test_time_order_ties_break_on_series_id() {
        let mut mat = merge(
            vec![(9, vec![(5, 90.0)]), (3, vec![(5, 30.0)])],
            OrderBy::Time,
            1024,
        );
        let mut buf = vec![0u8; 1024];
        let batch = mat.read(&mut buf).unwrap();
        assert_eq!(
            decode_floats(&buf, batch.written),
            vec![(3, 5, 30.0), (9, 5, 90.0)]
        );
    }

    #[test]
    fn test_backward_merge_descends() {
        let mut ids = Vec::new();
        let mut iters: Vec<Box<dyn ScanOperator>> = Vec::new();
        ids.push(1);
        iters.push(Box::new(VecScan::backward(vec![(1, 10.0), (3, 30.0)])));
        ids.push(2);
        iters.push(Box::new(VecScan::backward(vec![(2, 20.0), (4, 40.0)])));
        let mut mat = MergeMaterializer::new(ids, iters, OrderBy::Time, 1024);

        let mut buf = vec![0u8; 1024];
        let batch = mat.read(&mut buf).unwrap();
        assert_eq!(
            decode_floats(&buf, batch.written),
            vec![(2, 4, 40.0), (1, 3, 30.0), (2, 2, 20.0), (1, 1, 10.0)]
        );
    }

    #[test]
    fn test_merge_refills_small_ranges() {
        let a: Vec<(Timestamp, f64)> = (0..10).map(|i| (i * 2, i as f64)).collect();
        let b: Vec<(Timestamp, f64)> = (0..10).map(|i| (i * 2 + 1, i as f64)).collect();
        // range_len 3 forces several refills per input
        let mut mat = merge(vec![(1, a), (2, b)], OrderBy::Time, 3);
        let mut buf = vec![0u8; 4096];
        let batch = mat.read(&mut buf).unwrap();
        assert_eq!(batch.state, StreamState::Exhausted);
        let got = decode_floats(&buf, batch.written);
        assert_eq!(got.len(), 20);
        let times: Vec<Timestamp> = got.iter().map(|&(_, ts, _)| ts).collect();
        assert_eq!(times, (0..20).collect::<Vec<Timestamp>>());
    }

    #[test]
    fn test_merge_resumes_after_full_buffer() {
        let mut mat = merge(
            vec![
                (1, vec![(1, 10.0), (3, 30.0)]),
                (2, vec![(2, 20.0), (4, 40.0)]),
            ],
            OrderBy::Time,
            1024,
        );
        let mut buf = vec![0u8; wire::HEADER_SIZE * 3];
        let first = mat.read(&mut buf).unwrap();
        assert_eq!(first.state, StreamState::HasMore);
        assert_eq!(
            decode_floats(&buf, first.written),
            vec![(1, 1, 10.0), (2, 2, 20.0), (1, 3, 30.0)]
        );

        let second = mat.read(&mut buf).unwrap();
        assert_eq!(second.state, StreamState::Exhausted);
        assert_eq!(decode_floats(&buf, second.written), vec![(2, 4, 40.0)]);

        let third = mat.read(&mut buf).unwrap();
        assert_eq!(third, ReadBatch::new(0, StreamState::Exhausted));
    }

    #[test]
    fn test_merge_retries_unavailable_input() {
        let mut stalling = VecScan::forward(vec![(2, 20.0), (4, 40.0)]);
        stalling.stall_at = Some(0);
        let iters: Vec<Box<dyn ScanOperator>> = vec![
            Box::new(VecScan::forward(vec![(1, 10.0), (3, 30.0)])),
            Box::new(stalling),
        ];
        let mut mat = MergeMaterializer::new(vec![1, 2], iters, OrderBy::Time, 1024);

        let mut buf = vec![0u8; 1024];
        let first = mat.read(&mut buf).unwrap();
        assert_eq!(first, ReadBatch::new(0, StreamState::Unavailable));

        let second = mat.read(&mut buf).unwrap();
        assert_eq!(second.state, StreamState::Exhausted);
        assert_eq!(
            decode_floats(&buf, second.written),
            vec![(1, 1, 10.0), (2, 2, 20.0), (1, 3, 30.0), (2, 4, 40.0)]
        );
    }

    #[test]
    fn test_empty_merge_is_exhausted() {
        let mut mat = MergeMaterializer::new(Vec::new(), Vec::new(), OrderBy::Time, 1024);
        let mut buf = vec![0u8; 64];
        assert_eq!(
            mat.read(&mut buf).unwrap(),
            ReadBatch::new(0, StreamState::Exhausted)
        );
    }
}
