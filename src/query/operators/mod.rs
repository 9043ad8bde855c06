//! Pull-based materialization operators
//!
//! Every operator consumes per-series iterators from the storage layer and
//! produces encoded sample frames through one shared batch contract. Chain,
//! merge, and aggregate emit fixed-size float frames; join and event-chain
//! emit variable-length frames. The dispatcher re-splits frames on the
//! declared payload size before handing samples downstream.

mod aggregate;
mod chain;
mod join;
mod merge;

pub use aggregate::AggregateMaterializer;
pub use chain::{ChainMaterializer, EventChainMaterializer};
pub use join::{JoinOperator, MAX_JOIN_COLUMNS};
pub use merge::MergeMaterializer;

use crate::error::Result;
use crate::model::StreamState;

/// One batch produced by a materializer: bytes written into the caller's
/// buffer plus the stream state after the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBatch {
    pub written: usize,
    pub state: StreamState,
}

impl ReadBatch {
    pub fn new(written: usize, state: StreamState) -> Self {
        Self { written, state }
    }
}

/// Batch pull contract shared by all materializers.
///
/// A call runs to completion on the caller's thread and never blocks beyond
/// its upstream iterators. Returning `written == 0` with
/// [`StreamState::HasMore`] means the buffer was too small for the next
/// frame; the caller retries, typically with the same buffer after draining
/// it.
pub trait Materializer {
    fn read(&mut self, dest: &mut [u8]) -> Result<ReadBatch>;
}
