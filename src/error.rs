//! Error types for the column store

use crate::model::SeriesId;

/// Result type alias for column-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the column store.
///
/// End-of-data and momentary unavailability are not errors; they are stream
/// states carried by [`crate::model::StreamState`]. Everything in
/// this enum aborts the query that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The reshape request is malformed (wrong column count, empty select)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// A requested series id is unknown to the registry, or a group-by
    /// mapping lacks an id
    #[error("series {0} not found")]
    SeriesNotFound(SeriesId),
    /// The request combines features the engine does not support
    #[error("not permitted: {0}")]
    NotPermitted(&'static str),
    /// The storage layer failed while opening a tree or reading extents
    #[error("storage error: {0}")]
    Storage(String),
    /// A wire frame could not be decoded
    #[error("malformed sample frame: {0}")]
    MalformedFrame(String),
    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}
