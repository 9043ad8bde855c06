//! Reshape requests
//!
//! A reshape request is the query descriptor handed to the engine by the
//! query parser: a time range, one or more columns of series ids, the output
//! order, and optional grouping and aggregation. The engine validates the
//! request shape; parsing is an upstream concern.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::model::{Direction, SeriesId, Timestamp};

/// Half-open query range. `begin < end` scans forward over `[begin, end)`,
/// `begin > end` scans backward over `(end, begin]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub begin: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn new(begin: Timestamp, end: Timestamp) -> Self {
        Self { begin, end }
    }

    /// Scan direction implied by the endpoint order
    pub fn direction(&self) -> Direction {
        if self.begin <= self.end {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }
}

/// Output order of a materialized stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderBy {
    /// `(series_id, timestamp)`: each series contiguous, time order within
    Series,
    /// `(timestamp, series_id)`: one globally time-ordered stream
    Time,
}

/// One logical dimension of the select: a list of series ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub ids: Vec<SeriesId>,
}

/// Group-by clause: rewrites each selected series id through a transient map
/// before merging, so grouped series share an output id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBy {
    pub transient_map: HashMap<SeriesId, SeriesId>,
}

/// Aggregation functions over a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFn {
    Min,
    Max,
    Sum,
    Cnt,
}

/// Aggregation clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub func: AggregateFn,
}

/// The query descriptor consumed by [`crate::store::ColumnStore::query`] and
/// [`crate::store::ColumnStore::join_query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReshapeRequest {
    pub range: TimeRange,
    /// Non-empty. Scans carry exactly one column; joins at least two, all
    /// with the same number of ids.
    pub columns: Vec<Column>,
    pub order_by: OrderBy,
    pub group_by: Option<GroupBy>,
    pub aggregate: Option<Aggregation>,
}

impl ReshapeRequest {
    /// A plain one-column scan request
    pub fn scan(range: TimeRange, ids: Vec<SeriesId>, order_by: OrderBy) -> Self {
        Self {
            range,
            columns: vec![Column { ids }],
            order_by,
            group_by: None,
            aggregate: None,
        }
    }
}

impl fmt::Display for ReshapeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReshapeRequest(order-by: {}, group-by: {}, aggregate: {}, range: [{}, {}), columns: {})",
            match self.order_by {
                OrderBy::Series => "series",
                OrderBy::Time => "time",
            },
            if self.group_by.is_some() { "enabled" } else { "disabled" },
            if self.aggregate.is_some() { "enabled" } else { "disabled" },
            self.range.begin,
            self.range.end,
            self.columns.len(),
        )
    }
}
