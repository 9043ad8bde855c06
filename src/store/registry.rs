//! Column registry
//!
//! The registry owns exactly one tree handle per series id. All map
//! mutation and lookup is serialized through a single mutex; tree handles
//! are reference-shared with write-session caches, so the registry must
//! outlive every session.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::model::{LogicalAddr, Payload, Sample, SeriesId};
use crate::query::StreamProcessor;
use crate::request::ReshapeRequest;
use crate::store::tree::{AppendOutcome, BlockStore, RepairStatus, SeriesTree};

/// The process-wide series registry and query entry point
pub struct ColumnStore {
    block_store: Arc<dyn BlockStore>,
    columns: Mutex<HashMap<SeriesId, Arc<dyn SeriesTree>>>,
    config: StoreConfig,
}

impl ColumnStore {
    pub fn new(block_store: Arc<dyn BlockStore>) -> Self {
        Self::with_config(block_store, StoreConfig::default())
    }

    pub fn with_config(block_store: Arc<dyn BlockStore>, config: StoreConfig) -> Self {
        Self {
            block_store,
            columns: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Reopen a set of series from their rescue points.
    ///
    /// Panics on an empty rescue-point list: the caller's catalog is
    /// corrupt and continuing would lose the series. Fails if any id is
    /// already registered.
    pub fn open_or_restore(
        &self,
        mapping: &HashMap<SeriesId, Vec<LogicalAddr>>,
    ) -> Result<()> {
        for (&id, rescue_points) in mapping {
            assert!(
                !rescue_points.is_empty(),
                "invalid rescue points state for series {id}"
            );
            if self.block_store.repair_status(rescue_points) == RepairStatus::Repair {
                warn!(series_id = id, "repair needed");
            }
            let tree = self.block_store.open_tree(id, rescue_points)?;
            {
                let mut columns = self.columns.lock();
                if columns.contains_key(&id) {
                    error!(series_id = id, "can't open or restore series, already exists");
                    return Err(Error::InvalidRequest(format!(
                        "series {id} is already registered"
                    )));
                }
                columns.insert(id, tree.clone());
            }
            tree.force_init();
        }
        Ok(())
    }

    /// Register a brand new series with no history
    pub fn create_new_column(&self, id: SeriesId) -> Result<()> {
        let tree = self.block_store.open_tree(id, &[])?;
        {
            let mut columns = self.columns.lock();
            if columns.contains_key(&id) {
                return Err(Error::InvalidRequest(format!(
                    "series {id} is already registered"
                )));
            }
            columns.insert(id, tree.clone());
        }
        tree.force_init();
        Ok(())
    }

    /// Close every tree, collecting rescue points per series
    pub fn close(&self) -> HashMap<SeriesId, Vec<LogicalAddr>> {
        let columns = self.columns.lock();
        info!("column-store close started");
        let result = columns
            .iter()
            .map(|(&id, tree)| (id, tree.close()))
            .collect();
        info!("column-store close completed");
        result
    }

    /// Append one float sample to its series.
    ///
    /// On `OkFlushNeeded` the tree's current roots are captured into
    /// `rescue_points`. When `cache` is given, the resolved handle is
    /// inserted there so the caller's next write can bypass the registry.
    pub fn write(
        &self,
        sample: &Sample,
        rescue_points: &mut Vec<LogicalAddr>,
        cache: Option<&mut HashMap<SeriesId, Arc<dyn SeriesTree>>>,
    ) -> AppendOutcome {
        let value = match sample.payload {
            Payload::Float(value) => value,
            _ => return AppendOutcome::FailBadValue,
        };
        let columns = self.columns.lock();
        match columns.get(&sample.series_id) {
            Some(tree) => {
                let outcome = tree.append(sample.timestamp, value);
                if outcome == AppendOutcome::OkFlushNeeded {
                    *rescue_points = tree.roots();
                }
                if let Some(cache) = cache {
                    cache.insert(sample.series_id, tree.clone());
                }
                outcome
            }
            None => AppendOutcome::FailBadId,
        }
    }

    /// Bytes buffered across all trees but not yet flushed
    pub fn uncommitted_memory(&self) -> usize {
        let columns = self.columns.lock();
        columns.values().map(|tree| tree.uncommitted_size()).sum()
    }

    /// Run a single-column select (scan, merge, or aggregate) and pump the
    /// output into `processor`
    pub fn query(&self, req: &ReshapeRequest, processor: &mut dyn StreamProcessor) {
        crate::query::select_query(self, req, processor);
    }

    /// Run a multi-column join and pump the output into `processor`
    pub fn join_query(&self, req: &ReshapeRequest, processor: &mut dyn StreamProcessor) {
        crate::query::join_query(self, req, processor);
    }

    pub(crate) fn tree(&self, id: SeriesId) -> Option<Arc<dyn SeriesTree>> {
        self.columns.lock().get(&id).cloned()
    }

    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }
}
