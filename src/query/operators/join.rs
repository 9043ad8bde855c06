//! Time-aligned column join
//!
//! Aligns N per-series scans by timestamp into tuple samples. Column 0 is
//! the driver: its timestamps dictate the output rows, and other columns
//! contribute a value only when they have a point at exactly the driver's
//! timestamp. Non-driver data at other timestamps is discarded.

use crate::error::Result;
use crate::model::{Payload, Sample, SeriesId, StreamState, Timestamp};
use crate::query::operators::{Materializer, ReadBatch};
use crate::store::tree::ScanOperator;
use crate::wire;

/// Upper bound on join width, set by the 64-bit presence bitmap
pub const MAX_JOIN_COLUMNS: usize = 64;

struct ColumnBuffer {
    ts: Vec<Timestamp>,
    xs: Vec<f64>,
    pos: usize,
    len: usize,
}

impl ColumnBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            ts: vec![0; capacity],
            xs: vec![0.0; capacity],
            pos: 0,
            len: 0,
        }
    }

    fn consumed(&self) -> bool {
        self.pos >= self.len
    }
}

/// Joins one row of series: one scan per column, aligned on the driver
pub struct JoinOperator {
    iters: Vec<Box<dyn ScanOperator>>,
    ids: Vec<SeriesId>,
    buffers: Vec<ColumnBuffer>,
    done: bool,
}

impl JoinOperator {
    /// Panics on fewer than two columns, more than [`MAX_JOIN_COLUMNS`], or
    /// an ids/iters length mismatch; the dispatcher validates the request
    /// shape before construction.
    pub fn new(
        ids: Vec<SeriesId>,
        iters: Vec<Box<dyn ScanOperator>>,
        buffer_len: usize,
    ) -> Self {
        assert_eq!(ids.len(), iters.len(), "join ids/iters length mismatch");
        assert!(
            (2..=MAX_JOIN_COLUMNS).contains(&ids.len()),
            "invalid join width {}",
            ids.len()
        );
        let buffers = (0..ids.len()).map(|_| ColumnBuffer::new(buffer_len)).collect();
        Self {
            iters,
            ids,
            buffers,
            done: false,
        }
    }

    /// Refill in one pass, never interleaving columns: each column advances
    /// its iterator at most once per round, which keeps per-column
    /// timestamps monotone between rounds. Columns that still hold
    /// unconsumed points are left untouched.
    fn fill_buffers(&mut self) -> Result<StreamState> {
        assert!(
            self.buffers[0].consumed(),
            "join driver buffer not consumed before refill"
        );
        let mut driver_state = StreamState::HasMore;
        for (i, buffer) in self.buffers.iter_mut().enumerate() {
            if !buffer.consumed() {
                continue;
            }
            let (n, state) = self.iters[i].read(&mut buffer.ts, &mut buffer.xs)?;
            buffer.len = n;
            buffer.pos = 0;
            if i == 0 {
                driver_state = state;
            }
        }
        Ok(driver_state)
    }
}

impl Materializer for JoinOperator {
    fn read(&mut self, dest: &mut [u8]) -> Result<ReadBatch> {
        if self.done {
            return Ok(ReadBatch::new(0, StreamState::Exhausted));
        }
        let ncolumns = self.iters.len();
        let worst_frame = wire::HEADER_SIZE + 8 * ncolumns;
        let mut written = 0;

        loop {
            if self.buffers[0].consumed() {
                if written > 0 {
                    // Mid-round driver exhaustion: deliver the batch and
                    // refill on the next call
                    break;
                }
                let state = self.fill_buffers()?;
                if self.buffers[0].len == 0 {
                    if state == StreamState::Unavailable {
                        return Ok(ReadBatch::new(0, StreamState::Unavailable));
                    }
                    self.done = true;
                    self.iters.clear();
                    self.buffers.clear();
                    return Ok(ReadBatch::new(0, StreamState::Exhausted));
                }
            }
            if dest.len() - written < worst_frame {
                break;
            }

            let driver = &mut self.buffers[0];
            let key = driver.ts[driver.pos];
            let seed = driver.xs[driver.pos];
            driver.pos += 1;

            let mut bitmap: u64 = 1;
            let mut values = Vec::with_capacity(ncolumns);
            values.push(seed);
            for i in 1..ncolumns {
                let buffer = &mut self.buffers[i];
                while buffer.pos < buffer.len && buffer.ts[buffer.pos] < key {
                    buffer.pos += 1;
                }
                // An exhausted buffer means this column has no point at
                // `key`; the slot stays absent for this tuple
                if buffer.pos < buffer.len && buffer.ts[buffer.pos] == key {
                    values.push(buffer.xs[buffer.pos]);
                    bitmap |= 1 << i;
                    // Timestamps are unique per series; the match cannot be
                    // used again
                    buffer.pos += 1;
                }
            }

            let sample = Sample {
                series_id: self.ids[0],
                timestamp: key,
                payload: Payload::Tuple { bitmap, values },
            };
            written += wire::encode(&sample, &mut dest[written..]);
        }
        Ok(ReadBatch::new(written, StreamState::HasMore))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::operators::testing::VecScan;

    fn join(
        columns: Vec<(SeriesId, Vec<(Timestamp, f64)>)>,
        buffer_len: usize,
    ) -> JoinOperator {
        let mut ids = Vec::new();
        let mut iters: Vec<Box<dyn ScanOperator>> = Vec::new();
        for (id, points) in columns {
            ids.push(id);
            iters.push(Box::new(VecScan::forward(points)));
        }
        JoinOperator::new(ids, iters, buffer_len)
    }

    fn drain_tuples(op: &mut JoinOperator) -> Vec<(Timestamp, u64, Vec<f64>)> {
        let mut buf = vec![0u8; 4096];
        let mut out = Vec::new();
        loop {
            let batch = op.read(&mut buf).unwrap();
            for frame in wire::FrameIter::new(&buf[..batch.written]) {
                let sample = frame.unwrap();
                match sample.payload {
                    Payload::Tuple { bitmap, values } => {
                        out.push((sample.timestamp, bitmap, values))
                    }
                    other => panic!("unexpected payload {other:?}"),
                }
            }
            if batch.state.is_terminal() {
                return out;
            }
        }
    }

    #[test]
    fn test_join_aligns_on_driver_timestamps() {
        let mut op = join(
            vec![
                (1, vec![(1, 1.0), (2, 2.0), (3, 3.0)]),
                (2, vec![(2, 20.0), (3, 30.0), (4, 40.0)]),
            ],
            4096,
        );
        assert_eq!(
            drain_tuples(&mut op),
            vec![
                (1, 0b01, vec![1.0]),
                (2, 0b11, vec![2.0, 20.0]),
                (3, 0b11, vec![3.0, 30.0]),
            ],
            "driver timestamps dictate rows; 4 is absent from the driver"
        );
    }

    #[test]
    fn test_join_handles_exhausted_non_driver_column() {
        let mut op = join(
            vec![
                (1, vec![(1, 1.0), (5, 5.0), (9, 9.0)]),
                (2, vec![(1, 10.0)]),
            ],
            4096,
        );
        assert_eq!(
            drain_tuples(&mut op),
            vec![
                (1, 0b11, vec![1.0, 10.0]),
                (5, 0b01, vec![5.0]),
                (9, 0b01, vec![9.0]),
            ],
            "a drained column contributes absent slots, not an infinite scan"
        );
    }

    #[test]
    fn test_join_three_columns_packs_present_values() {
        let mut op = join(
            vec![
                (1, vec![(1, 1.0), (2, 2.0)]),
                (2, vec![(2, 20.0)]),
                (3, vec![(1, 100.0), (2, 200.0)]),
            ],
            4096,
        );
        assert_eq!(
            drain_tuples(&mut op),
            vec![
                (1, 0b101, vec![1.0, 100.0]),
                (2, 0b111, vec![2.0, 20.0, 200.0]),
            ]
        );
    }

    #[test]
    fn test_join_zero_bytes_when_buffer_below_worst_case() {
        let mut op = join(
            vec![(1, vec![(1, 1.0)]), (2, vec![(1, 10.0)])],
            4096,
        );
        let mut buf = vec![0u8; wire::HEADER_SIZE + 8];
        let batch = op.read(&mut buf).unwrap();
        assert_eq!(
            batch,
            ReadBatch::new(0, StreamState::HasMore),
            "caller is expected to retry with a drained buffer"
        );
    }

    #[test]
    fn test_join_resumes_across_driver_refills() {
        let driver: Vec<(Timestamp, f64)> = (1..=10).map(|i| (i, i as f64)).collect();
        let other: Vec<(Timestamp, f64)> = (1..=10).map(|i| (i, (i * 10) as f64)).collect();
        // buffer_len 4 forces several lockstep refills
        let mut op = join(vec![(1, driver), (2, other)], 4);
        let tuples = drain_tuples(&mut op);
        assert_eq!(tuples.len(), 10);
        for (ts, bitmap, values) in tuples {
            assert_eq!(bitmap, 0b11, "t={ts}");
            assert_eq!(values, vec![ts as f64, (ts * 10) as f64]);
        }
    }

    #[test]
    fn test_join_sparse_non_driver_survives_refills() {
        // The sparse column stays buffered across driver refills because
        // only consumed buffers are refilled
        let driver: Vec<(Timestamp, f64)> = (1..=9).map(|i| (i, i as f64)).collect();
        let other = vec![(2, 20.0), (6, 60.0)];
        let mut op = join(vec![(1, driver), (2, other)], 3);
        let tuples = drain_tuples(&mut op);
        let present: Vec<Timestamp> = tuples
            .iter()
            .filter(|&&(_, bitmap, _)| bitmap == 0b11)
            .map(|&(ts, _, _)| ts)
            .collect();
        assert_eq!(tuples.len(), 9);
        assert_eq!(present, vec![2, 6]);
    }

    #[test]
    #[should_panic(expected = "invalid join width")]
    fn test_join_rejects_single_column() {
        let _ = join(vec![(1, vec![(1, 1.0)])], 16);
    }
}
