//! Pipeline construction and the query pump
//!
//! One pipeline shape per request class:
//!
//! | aggregate | group_by | order_by | columns | pipeline            |
//! |-----------|----------|----------|---------|---------------------|
//! | on        | off      | series   | 1       | aggregate           |
//! | on        | off      | time     | 1       | rejected            |
//! | on        | on       | any      | 1       | rejected            |
//! | off       | off      | series   | 1       | chain               |
//! | off       | off      | time     | 1       | merge (time)        |
//! | off       | on       | any      | 1       | remap ids, merge    |
//! | any       | any      | any      | >=2     | join, one per row   |

use tracing::{debug, error};

use crate::error::Error;
use crate::model::StreamState;
use crate::query::operators::{
    AggregateMaterializer, ChainMaterializer, JoinOperator, Materializer, MergeMaterializer,
    ReadBatch, MAX_JOIN_COLUMNS,
};
use crate::query::StreamProcessor;
use crate::request::{OrderBy, ReshapeRequest};
use crate::store::ColumnStore;
use crate::wire::FrameIter;

/// Top of a single-column pipeline
enum Pipeline {
    Chain(ChainMaterializer),
    Merge(MergeMaterializer),
    Aggregate(AggregateMaterializer),
}

impl Materializer for Pipeline {
    fn read(&mut self, dest: &mut [u8]) -> crate::error::Result<ReadBatch> {
        match self {
            Pipeline::Chain(mat) => mat.read(dest),
            Pipeline::Merge(mat) => mat.read(dest),
            Pipeline::Aggregate(mat) => mat.read(dest),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PumpOutcome {
    /// The operator reached end-of-data (or went unavailable)
    Drained,
    /// The processor refused a sample or an error was reported
    Stopped,
}

/// Pull batches from `mat`, re-split them on the declared frame sizes, and
/// forward the samples downstream.
fn pump(
    mat: &mut dyn Materializer,
    processor: &mut dyn StreamProcessor,
    buffer_bytes: usize,
) -> PumpOutcome {
    let mut buf = vec![0u8; buffer_bytes];
    loop {
        let batch = match mat.read(&mut buf) {
            Ok(batch) => batch,
            Err(err) => {
                error!(error = %err, "query iteration error");
                processor.set_error(err);
                return PumpOutcome::Stopped;
            }
        };
        for frame in FrameIter::new(&buf[..batch.written]) {
            match frame {
                Ok(sample) => {
                    if !processor.put(&sample) {
                        return PumpOutcome::Stopped;
                    }
                }
                Err(err) => {
                    error!(error = %err, "query produced an unreadable frame");
                    processor.set_error(err);
                    return PumpOutcome::Stopped;
                }
            }
        }
        match batch.state {
            StreamState::HasMore => {
                if batch.written == 0 {
                    // A fixed buffer that cannot fit one frame will never
                    // make progress
                    processor.set_error(Error::Internal(format!(
                        "output buffer of {buffer_bytes} bytes too small for one sample"
                    )));
                    return PumpOutcome::Stopped;
                }
            }
            StreamState::Exhausted | StreamState::Unavailable => return PumpOutcome::Drained,
        }
    }
}

/// Single-column select: scan, merge, or aggregate per the dispatch table
pub(crate) fn select_query(
    store: &ColumnStore,
    req: &ReshapeRequest,
    processor: &mut dyn StreamProcessor,
) {
    debug!(request = %req, "column-store select query");
    if req.columns.is_empty() {
        error!("bad select request, no columns");
        processor.set_error(Error::InvalidRequest("no columns in select".to_string()));
        return;
    }
    if req.columns.len() > 1 {
        error!("bad select request, too many columns");
        processor.set_error(Error::InvalidRequest(
            "select carries more than one column; use a join query".to_string(),
        ));
        return;
    }

    let mut ids = req.columns[0].ids.clone();
    let config = store.config();
    let mut pipeline = if let Some(aggregate) = req.aggregate {
        if req.group_by.is_some() {
            error!("group-by in aggregate query is not supported");
            processor.set_error(Error::NotPermitted("group-by in aggregate query"));
            return;
        }
        if req.order_by == OrderBy::Time {
            error!("bad aggregate query, time order not supported");
            processor.set_error(Error::NotPermitted("time order in aggregate query"));
            return;
        }
        let mut iters = Vec::with_capacity(ids.len());
        for &id in &ids {
            match store.tree(id) {
                Some(tree) => iters.push(tree.aggregate(req.range.begin, req.range.end)),
                None => {
                    processor.set_error(Error::SeriesNotFound(id));
                    return;
                }
            }
        }
        Pipeline::Aggregate(AggregateMaterializer::new(ids, iters, aggregate.func))
    } else {
        let mut iters = Vec::with_capacity(ids.len());
        for &id in &ids {
            match store.tree(id) {
                Some(tree) => iters.push(tree.scan(req.range.begin, req.range.end)),
                None => {
                    processor.set_error(Error::SeriesNotFound(id));
                    return;
                }
            }
        }
        if let Some(group_by) = &req.group_by {
            // Rewrite each id through the transient map; grouped series then
            // collapse under one output id in the merge
            for id in ids.iter_mut() {
                match group_by.transient_map.get(id) {
                    Some(&mapped) => *id = mapped,
                    None => {
                        error!(series_id = *id, "no transient mapping for series");
                        processor.set_error(Error::SeriesNotFound(*id));
                        return;
                    }
                }
            }
            Pipeline::Merge(MergeMaterializer::new(
                ids,
                iters,
                req.order_by,
                config.merge_range_len,
            ))
        } else {
            match req.order_by {
                OrderBy::Series => Pipeline::Chain(ChainMaterializer::new(ids, iters)),
                OrderBy::Time => Pipeline::Merge(MergeMaterializer::new(
                    ids,
                    iters,
                    OrderBy::Time,
                    config.merge_range_len,
                )),
            }
        }
    };

    if pump(&mut pipeline, processor, config.output_buffer_bytes) == PumpOutcome::Drained {
        processor.complete();
    }
}

/// Multi-column join: one operator per row, drained in row order
pub(crate) fn join_query(
    store: &ColumnStore,
    req: &ReshapeRequest,
    processor: &mut dyn StreamProcessor,
) {
    debug!(request = %req, "column-store join query");
    if req.columns.len() < 2 {
        error!("bad join request, not enough columns");
        processor.set_error(Error::InvalidRequest(
            "join needs at least two columns".to_string(),
        ));
        return;
    }
    if req.columns.len() > MAX_JOIN_COLUMNS {
        error!("bad join request, too many columns");
        processor.set_error(Error::InvalidRequest(format!(
            "join is limited to {MAX_JOIN_COLUMNS} columns"
        )));
        return;
    }
    let rows = req.columns[0].ids.len();
    if req.columns.iter().any(|column| column.ids.len() != rows) {
        error!("bad join request, columns disagree on id count");
        processor.set_error(Error::InvalidRequest(
            "join columns must list the same number of series".to_string(),
        ));
        return;
    }

    let config = store.config();
    let mut operators = Vec::with_capacity(rows);
    for row in 0..rows {
        let mut ids = Vec::with_capacity(req.columns.len());
        let mut iters = Vec::with_capacity(req.columns.len());
        for column in &req.columns {
            let id = column.ids[row];
            match store.tree(id) {
                Some(tree) => {
                    ids.push(id);
                    iters.push(tree.scan(req.range.begin, req.range.end));
                }
                None => {
                    processor.set_error(Error::SeriesNotFound(id));
                    return;
                }
            }
        }
        operators.push(JoinOperator::new(ids, iters, config.join_buffer_len));
    }

    for mut operator in operators {
        if pump(&mut operator, processor, config.output_buffer_bytes) == PumpOutcome::Stopped {
            return;
        }
    }
    processor.complete();
}
