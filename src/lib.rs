//! # Colonnade
//!
//! The query-materialization core of a columnar time-series database.
//!
//! Each series is a chronologically ordered sequence of `(timestamp, value)`
//! points stored in a per-series tree of immutable extents on a shared block
//! store. Colonnade sits above that storage layer: it resolves a reshape
//! request into per-series iterators, composes them into chain, merge, join,
//! or aggregate pipelines, and pumps the materialized samples into a stream
//! processor in fixed-size batches.
//!
//! ## Architecture
//!
//! - **Registry** ([`store::ColumnStore`]): one tree handle per series id,
//!   serialized behind a single mutex; routes writes and queries
//! - **Operators** ([`query::operators`]): single-threaded cooperative pull
//!   iterators sharing one byte-batch contract
//! - **Dispatcher**: validates the request shape, wires the pipeline the
//!   request calls for, re-splits output frames, and feeds the consumer
//! - **Write sessions** ([`store::WriteSession`]): per-writer caches of
//!   shared tree handles in front of the registry
//!
//! The storage layer itself (block store, extent format, tree search) is
//! reached only through the traits in [`store::tree`]; an in-memory
//! implementation for development and testing lives in [`store::mem`].

pub mod config;
pub mod model;
pub mod query;
pub mod request;
pub mod store;
pub mod wire;

mod error;

pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::config::StoreConfig;
    pub use crate::model::{Payload, Sample, SeriesId, StreamState, Timestamp};
    pub use crate::query::{SampleCollector, StreamProcessor};
    pub use crate::request::{
        AggregateFn, Aggregation, Column, GroupBy, OrderBy, ReshapeRequest, TimeRange,
    };
    pub use crate::store::{ColumnStore, WriteSession};
}
