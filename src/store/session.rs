//! Per-writer session
//!
//! A session fronts the registry with a local, unsynchronized cache of tree
//! handles: the first write to a series goes through the registry lock and
//! populates the cache, later writes append directly to the shared handle.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{LogicalAddr, Payload, Sample, SeriesId};
use crate::query::StreamProcessor;
use crate::request::ReshapeRequest;
use crate::store::tree::{AppendOutcome, SeriesTree};
use crate::store::ColumnStore;

/// Write session bound to one registry
pub struct WriteSession {
    store: Arc<ColumnStore>,
    cache: HashMap<SeriesId, Arc<dyn SeriesTree>>,
}

impl WriteSession {
    pub fn new(store: Arc<ColumnStore>) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    /// Append one sample. Only float payloads are writable; anything else
    /// is rejected before touching the cache or the registry.
    pub fn write(
        &mut self,
        sample: &Sample,
        rescue_points: &mut Vec<LogicalAddr>,
    ) -> AppendOutcome {
        let value = match sample.payload {
            Payload::Float(value) => value,
            _ => return AppendOutcome::FailBadValue,
        };
        if let Some(tree) = self.cache.get(&sample.series_id) {
            let outcome = tree.append(sample.timestamp, value);
            if outcome == AppendOutcome::OkFlushNeeded {
                *rescue_points = tree.roots();
            }
            return outcome;
        }
        // Cache miss: the registry resolves the handle and populates the
        // cache for the next write
        self.store.write(sample, rescue_points, Some(&mut self.cache))
    }

    /// Forward a select query to the registry
    pub fn query(&self, req: &ReshapeRequest, processor: &mut dyn StreamProcessor) {
        self.store.query(req, processor);
    }

    #[cfg(test)]
    fn cached(&self, id: SeriesId) -> bool {
        self.cache.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Payload;
    use crate::store::mem::MemoryBlockStore;
    use bytes::Bytes;

    fn session() -> WriteSession {
        let store = Arc::new(ColumnStore::new(Arc::new(MemoryBlockStore::with_flush_every(0))));
        store.create_new_column(1).unwrap();
        WriteSession::new(store)
    }

    #[test]
    fn test_non_float_payload_rejected_before_registry() {
        let mut session = session();
        let mut rescue = Vec::new();
        let event = Sample {
            series_id: 1,
            timestamp: 5,
            payload: Payload::Event(Bytes::from_static(b"oops")),
        };
        assert_eq!(
            session.write(&event, &mut rescue),
            AppendOutcome::FailBadValue
        );
        assert!(!session.cached(1), "rejected write must not touch the cache");
    }

    #[test]
    fn test_cache_populated_on_miss_then_hit() {
        let mut session = session();
        let mut rescue = Vec::new();
        assert!(!session.cached(1));
        assert_eq!(
            session.write(&Sample::float(1, 1, 1.0), &mut rescue),
            AppendOutcome::Ok
        );
        assert!(session.cached(1), "miss path must populate the cache");
        assert_eq!(
            session.write(&Sample::float(1, 2, 2.0), &mut rescue),
            AppendOutcome::Ok
        );
    }

    #[test]
    fn test_cache_hit_captures_rescue_points_on_flush() {
        let store = Arc::new(ColumnStore::new(Arc::new(MemoryBlockStore::with_flush_every(3))));
        store.create_new_column(1).unwrap();
        let mut session = WriteSession::new(store);
        let mut rescue = Vec::new();
        session.write(&Sample::float(1, 1, 1.0), &mut rescue);
        session.write(&Sample::float(1, 2, 2.0), &mut rescue);
        assert!(rescue.is_empty());
        assert_eq!(
            session.write(&Sample::float(1, 3, 3.0), &mut rescue),
            AppendOutcome::OkFlushNeeded
        );
        assert!(!rescue.is_empty());
    }

    #[test]
    fn test_unknown_series_write_fails() {
        let mut session = session();
        let mut rescue = Vec::new();
        assert_eq!(
            session.write(&Sample::float(404, 1, 1.0), &mut rescue),
            AppendOutcome::FailBadId
        );
        assert!(!session.cached(404));
    }
}
