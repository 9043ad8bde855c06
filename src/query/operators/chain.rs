//! Series-major concatenation of per-series streams
//!
//! The chain draws each iterator to exhaustion before moving to the next, so
//! the output is ordered by series first, in request order, then by time
//! within each series. [`ChainMaterializer`] handles float scans,
//! [`EventChainMaterializer`] variable-length event streams.

use bytes::Bytes;

use crate::error::Result;
use crate::model::{Payload, Sample, SeriesId, StreamState, Timestamp};
use crate::query::operators::{Materializer, ReadBatch};
use crate::store::tree::{BinaryDataOperator, ScanOperator};
use crate::wire;

/// Concatenates per-series float scans end-to-end
pub struct ChainMaterializer {
    iters: Vec<Box<dyn ScanOperator>>,
    ids: Vec<SeriesId>,
    pos: usize,
}

impl ChainMaterializer {
    /// Panics if `ids` and `iters` disagree in length; the dispatcher builds
    /// them in lockstep.
    pub fn new(ids: Vec<SeriesId>, iters: Vec<Box<dyn ScanOperator>>) -> Self {
        assert_eq!(ids.len(), iters.len(), "chain ids/iters length mismatch");
        Self {
            iters,
            ids,
            pos: 0,
        }
    }
}

impl Materializer for ChainMaterializer {
    fn read(&mut self, dest: &mut [u8]) -> Result<ReadBatch> {
        let capacity = dest.len() / wire::HEADER_SIZE;
        let mut ts_buf = vec![0u64; capacity];
        let mut val_buf = vec![0f64; capacity];
        let mut written = 0;
        let mut produced = 0;
        while self.pos < self.iters.len() {
            let remaining = capacity - produced;
            if remaining == 0 {
                return Ok(ReadBatch::new(written, StreamState::HasMore));
            }
            let (n, state) = self.iters[self.pos]
                .read(&mut ts_buf[..remaining], &mut val_buf[..remaining])?;
            let id = self.ids[self.pos];
            for i in 0..n {
                let sample = Sample::float(id, ts_buf[i], val_buf[i]);
                written += wire::encode(&sample, &mut dest[written..]);
            }
            produced += n;
            match state {
                StreamState::HasMore => {}
                StreamState::Exhausted => self.pos += 1,
                StreamState::Unavailable => {
                    return Ok(ReadBatch::new(written, StreamState::Unavailable));
                }
            }
        }
        Ok(ReadBatch::new(written, StreamState::Exhausted))
    }
}

/// Concatenates per-series event streams end-to-end.
///
/// Events are variable-length; when the next event does not fit the output
/// buffer it is held across calls and delivered first on the next read.
pub struct EventChainMaterializer {
    iters: Vec<Box<dyn BinaryDataOperator>>,
    ids: Vec<SeriesId>,
    pos: usize,
    pending: Option<(Timestamp, Bytes)>,
}

impl EventChainMaterializer {
    pub fn new(ids: Vec<SeriesId>, iters: Vec<Box<dyn BinaryDataOperator>>) -> Self {
        assert_eq!(ids.len(), iters.len(), "chain ids/iters length mismatch");
        Self {
            iters,
            ids,
            pos: 0,
            pending: None,
        }
    }
}

impl Materializer for EventChainMaterializer {
    fn read(&mut self, dest: &mut [u8]) -> Result<ReadBatch> {
        let mut written = 0;
        while self.pos < self.iters.len() {
            if self.pending.is_none() {
                let mut ts = [0u64; 1];
                let mut blob = [Bytes::new()];
                let (n, state) = self.iters[self.pos].read(&mut ts, &mut blob)?;
                if n == 0 {
                    match state {
                        StreamState::Unavailable => {
                            return Ok(ReadBatch::new(written, StreamState::Unavailable));
                        }
                        _ => {
                            self.pos += 1;
                            continue;
                        }
                    }
                }
                self.pending = Some((ts[0], std::mem::take(&mut blob[0])));
            }
            let (ts, blob) = self.pending.as_ref().expect("pending event");
            if dest.len() - written < wire::HEADER_SIZE + blob.len() {
                // Does not fit; resume here on the next call
                return Ok(ReadBatch::new(written, StreamState::HasMore));
            }
            let (ts, blob) = (*ts, blob.clone());
            self.pending = None;
            let sample = Sample {
                series_id: self.ids[self.pos],
                timestamp: ts,
                payload: Payload::Event(blob),
            };
            written += wire::encode(&sample, &mut dest[written..]);
        }
        Ok(ReadBatch::new(written, StreamState::Exhausted))
    }
}
