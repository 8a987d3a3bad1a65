//! The one `ListingIndexStore` implementation this crate ships: an in-process table guarded by
//! a single `RwLock`, analogous to the id-path caches `FsOcflStore` keeps in memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::layer::entry::RecordId;
use crate::layer::error::{LayerError, Result};
use crate::layer::index::{ListingIndexStore, ListingRecord};
use crate::layer::path::VirtualPath;

/// An in-memory `ListingIndexStore`. Suitable for tests and for deployments where the index
/// does not need to survive a process restart; a durable store would persist the same table
/// to disk or a database but is otherwise a drop-in replacement.
#[derive(Default)]
pub struct InMemoryListingIndexStore {
    next_id: AtomicU64,
    records: RwLock<HashMap<RecordId, ListingRecord>>,
}

impl InMemoryListingIndexStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl ListingIndexStore for InMemoryListingIndexStore {
    fn insert(&self, record: ListingRecord) -> Result<RecordId> {
        let mut records = self.records.write().unwrap();

        let duplicate = records
            .values()
            .any(|r| r.layer_id == record.layer_id && r.path == record.path);
        if duplicate {
            return Err(LayerError::Duplicate {
                layer: record.layer_id,
                path: record.path,
            });
        }

        let record_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        records.insert(
            record_id,
            ListingRecord {
                record_id,
                ..record
            },
        );
        Ok(record_id)
    }

    fn update(&self, record: ListingRecord) -> Result<()> {
        let mut records = self.records.write().unwrap();
        if !records.contains_key(&record.record_id) {
            return Err(LayerError::NotFound(format!(
                "No record with id {}",
                record.record_id
            )));
        }
        records.insert(record.record_id, record);
        Ok(())
    }

    fn remove(&self, record_id: RecordId) -> Result<()> {
        self.records.write().unwrap().remove(&record_id);
        Ok(())
    }

    fn all_for_path(&self, path: &VirtualPath) -> Result<Vec<ListingRecord>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|r| &r.path == path)
            .cloned()
            .collect())
    }

    fn all_under(&self, path: &VirtualPath) -> Result<Vec<ListingRecord>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|r| r.path.is_under(path))
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<ListingRecord>> {
        Ok(self.records.read().unwrap().values().cloned().collect())
    }
}
