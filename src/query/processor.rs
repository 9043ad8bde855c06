//! Downstream sample sink
//!
//! The stream processor is the engine's hand-off point to whatever consumes
//! query results. The dispatcher forwards decoded samples one at a time and
//! stops as soon as the processor refuses one.

use crate::error::Error;
use crate::model::Sample;

/// Consumer of materialized samples
pub trait StreamProcessor {
    /// Accept one sample. Returning `false` stops the query immediately.
    fn put(&mut self, sample: &Sample) -> bool;

    /// Report a query failure. No further samples follow.
    fn set_error(&mut self, error: Error);

    /// Signal clean end-of-stream.
    fn complete(&mut self);
}

/// Stream processor that collects everything into memory.
///
/// Useful for tests and embedders that want the whole result set at once;
/// an optional limit exercises the early-stop path.
#[derive(Debug, Default)]
pub struct SampleCollector {
    pub samples: Vec<Sample>,
    pub error: Option<Error>,
    pub completed: bool,
    limit: Option<usize>,
}

impl SampleCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse samples once `limit` have been collected
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

impl StreamProcessor for SampleCollector {
    fn put(&mut self, sample: &Sample) -> bool {
        if let Some(limit) = self.limit {
            if self.samples.len() >= limit {
                return false;
            }
        }
        self.samples.push(sample.clone());
        true
    }

    fn set_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    fn complete(&mut self) {
        self.completed = true;
    }
}
