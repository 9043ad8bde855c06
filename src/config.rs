//! Engine configuration

use serde::{Deserialize, Serialize};

/// Buffer sizing knobs for the materialization pipeline.
///
/// The defaults match the sizes the engine was tuned with; embedders only
/// need to touch these for very wide joins or very small heaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Per-input buffer length (points) in the k-way merge
    pub merge_range_len: usize,
    /// Per-column buffer length (points) in the join
    pub join_buffer_len: usize,
    /// Output batch buffer size in bytes used by the query pump
    pub output_buffer_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            merge_range_len: 1024,
            join_buffer_len: 4096,
            output_buffer_bytes: 4096,
        }
    }
}
