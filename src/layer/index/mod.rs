//! Persistent index from `(layerId, path)` to entry type and optional inlined content.
//!
//! `ListingIndex` is the orchestrating component; `ListingIndexStore` is the persistence
//! medium it drives, analogous to how `ocfl::repo::OcflRepo` drives a concrete `OcflStore`
//! backend. The one reference store shipped here is `InMemoryListingIndexStore`.

mod memory_store;

pub use memory_store::InMemoryListingIndexStore;

use crate::layer::entry::{EntryType, LayerId, RecordId};
use crate::layer::error::{self, LayerError, Result};
use crate::layer::path::VirtualPath;

/// A single index entry binding `(layerId, path)` to a type and optional inlined bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRecord {
    pub record_id: RecordId,
    pub layer_id: LayerId,
    pub path: VirtualPath,
    pub entry_type: EntryType,
    pub content: Option<Vec<u8>>,
}

impl ListingRecord {
    /// Constructs a not-yet-inserted record. `record_id` is ignored by `ListingIndexStore::insert`,
    /// which assigns a fresh one; it is only meaningful once a record has round-tripped through
    /// a store.
    pub fn new(
        layer_id: LayerId,
        path: VirtualPath,
        entry_type: EntryType,
        content: Option<Vec<u8>>,
    ) -> Self {
        Self {
            record_id: 0,
            layer_id,
            path,
            entry_type,
            content,
        }
    }

    fn new_directory(layer_id: LayerId, path: VirtualPath) -> Self {
        Self::new(layer_id, path, EntryType::Directory, None)
    }

    fn new_file(layer_id: LayerId, path: VirtualPath, content: Option<Vec<u8>>) -> Self {
        Self::new(layer_id, path, EntryType::File, content)
    }
}

/// The persistence medium `ListingIndex` drives. Implementations need only guarantee that
/// `(layerId, path)` is unique and that records can be queried by path, by layer, and by
/// immediate-child/descendant relationships. The grouped-max ("newest layer wins") query that
/// answers visibility is performed by `ListingIndex` itself over whatever `all_for_path`/
/// `all_under` return, so a store does not need to implement that aggregation.
pub trait ListingIndexStore: Send + Sync {
    /// Inserts a new record, assigning it a fresh `RecordId`. Fails with `Duplicate` if
    /// `(layerId, path)` already has a record.
    fn insert(&self, record: ListingRecord) -> Result<RecordId>;

    /// Upserts an existing record by `recordId`, replacing its stored fields entirely.
    fn update(&self, record: ListingRecord) -> Result<()>;

    /// Removes a record by id. Not an error if absent.
    fn remove(&self, record_id: RecordId) -> Result<()>;

    /// All records whose path is exactly `path`, across all layers.
    fn all_for_path(&self, path: &VirtualPath) -> Result<Vec<ListingRecord>>;

    /// All records whose path is `path` or a proper descendant of it, across all layers.
    fn all_under(&self, path: &VirtualPath) -> Result<Vec<ListingRecord>>;

    /// Every record in the store. Intended for tests and diagnostics.
    fn all(&self) -> Result<Vec<ListingRecord>>;
}

/// Drives a `ListingIndexStore` to answer the overlay's visibility and occupancy queries.
pub struct ListingIndex<S: ListingIndexStore> {
    store: S,
}

impl<S: ListingIndexStore> ListingIndex<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Inserts a `File` record for `path` in `layerId`. Fails with `Conflict` if `path` is a
    /// `Directory` in any layer, `Duplicate` if `(layerId, path)` already has a record.
    pub fn add_file(&self, layer_id: LayerId, path: &VirtualPath) -> Result<ListingRecord> {
        self.add_file_with_content(layer_id, path, None)
    }

    /// As `add_file`, optionally inlining `content` into the record.
    pub fn add_file_with_content(
        &self,
        layer_id: LayerId,
        path: &VirtualPath,
        content: Option<Vec<u8>>,
    ) -> Result<ListingRecord> {
        self.check_no_directory_conflict(path)?;

        let record = ListingRecord::new_file(layer_id, path.clone(), content);
        let record_id = self.store.insert(record.clone())?;
        Ok(ListingRecord {
            record_id,
            ..record
        })
    }

    /// Ensures `Directory` records exist in `layerId` for `path` and every proper prefix of
    /// it. Returns only the records newly created by this call. Idempotent within a layer;
    /// fails with `Conflict` if any prefix is a `File` in any layer.
    pub fn add_directories(
        &self,
        layer_id: LayerId,
        path: &VirtualPath,
    ) -> Result<Vec<ListingRecord>> {
        if path.is_root() {
            return Ok(Vec::new());
        }

        let chain = ancestor_chain(path);
        for ancestor in &chain {
            self.check_no_file_conflict(ancestor)?;
        }

        let mut created = Vec::new();
        for ancestor in chain {
            let existing = self
                .store
                .all_for_path(&ancestor)?
                .into_iter()
                .any(|r| r.layer_id == layer_id && r.entry_type == EntryType::Directory);

            if !existing {
                let record = ListingRecord::new_directory(layer_id, ancestor.clone());
                let record_id = self.store.insert(record.clone())?;
                created.push(ListingRecord {
                    record_id,
                    ..record
                });
            }
        }

        Ok(created)
    }

    /// Bulk insert with the same invariant checks as `add_file`/`add_directories`.
    pub fn add_records(&self, records: Vec<ListingRecord>) -> Result<Vec<ListingRecord>> {
        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            match record.entry_type {
                EntryType::Directory => self.check_no_file_conflict(&record.path)?,
                _ => self.check_no_directory_conflict(&record.path)?,
            }
            let record_id = self.store.insert(record.clone())?;
            inserted.push(ListingRecord {
                record_id,
                ..record
            });
        }
        Ok(inserted)
    }

    /// Bulk upsert by `recordId`, used after a rename to rewrite affected records' paths.
    pub fn save_records(&self, records: &[ListingRecord]) -> Result<()> {
        for record in records {
            self.store.update(record.clone())?;
        }
        Ok(())
    }

    /// Removes the given records by id.
    pub fn delete_records(&self, records: &[ListingRecord]) -> Result<()> {
        for record in records {
            self.store.remove(record.record_id)?;
        }
        Ok(())
    }

    /// The highest-layer record for each immediate child path of `path` that has at least one
    /// record. Unordered.
    pub fn list_directory(&self, path: &VirtualPath) -> Result<Vec<ListingRecord>> {
        let all = self.store.all_under(path)?;
        let children = all
            .into_iter()
            .filter(|r| r.path.is_immediate_child_of(path));
        Ok(newest_per_path(children))
    }

    /// The highest-layer record for every proper descendant path of `path` that has at least
    /// one record.
    pub fn list_recursive(&self, path: &VirtualPath) -> Result<Vec<ListingRecord>> {
        let all = self.store.all_under(path)?;
        let descendants = all.into_iter().filter(|r| r.path.is_under(path));
        Ok(newest_per_path(descendants))
    }

    /// The sorted ascending sequence of layer ids in which `path` has a record.
    pub fn find_layers_containing(&self, path: &VirtualPath) -> Result<Vec<LayerId>> {
        let mut layers: Vec<LayerId> = self
            .store
            .all_for_path(path)?
            .into_iter()
            .map(|r| r.layer_id)
            .collect();
        layers.sort_unstable();
        layers.dedup();
        Ok(layers)
    }

    /// The visible record for `path`: the record with the greatest `layerId` among those
    /// whose path equals `path`, if any exists.
    pub fn visible_record(&self, path: &VirtualPath) -> Result<Option<ListingRecord>> {
        let records = self.store.all_for_path(path)?;
        Ok(records.into_iter().max_by_key(|r| r.layer_id))
    }

    /// True if the visible record for `path` carries inlined content.
    pub fn is_content_inlined(&self, path: &VirtualPath) -> Result<bool> {
        Ok(self
            .visible_record(path)?
            .map(|r| r.content.is_some())
            .unwrap_or(false))
    }

    /// The inlined bytes for `path`'s visible record, if present.
    pub fn read_inlined(&self, path: &VirtualPath) -> Result<Option<Vec<u8>>> {
        Ok(self.visible_record(path)?.and_then(|r| r.content))
    }

    /// Every record in the store, regardless of visibility. Used by tests and by
    /// facade-level diagnostics.
    pub fn list_all(&self) -> Result<Vec<ListingRecord>> {
        self.store.all()
    }

    fn check_no_directory_conflict(&self, path: &VirtualPath) -> Result<()> {
        let conflict = self
            .store
            .all_for_path(path)?
            .iter()
            .any(|r| r.entry_type == EntryType::Directory);

        if conflict {
            return Err(LayerError::Conflict(format!(
                "Cannot add file {} because it is already occupied by a directory.",
                path
            )));
        }
        Ok(())
    }

    fn check_no_file_conflict(&self, path: &VirtualPath) -> Result<()> {
        let conflict = self
            .store
            .all_for_path(path)?
            .iter()
            .any(|r| r.entry_type == EntryType::File);

        if conflict {
            return Err(error::directory_occupied_by_file(path));
        }
        Ok(())
    }
}

/// `path` and every proper prefix of it, shallowest first.
fn ancestor_chain(path: &VirtualPath) -> Vec<VirtualPath> {
    let mut chain = vec![path.clone()];
    let mut current = path.clone();
    while !current.parent().is_root() {
        current = current.parent();
        chain.push(current.clone());
    }
    chain.reverse();
    chain
}

/// Collapses a set of records to one per distinct path: the one with the greatest `layerId`.
fn newest_per_path(records: impl Iterator<Item = ListingRecord>) -> Vec<ListingRecord> {
    use std::collections::HashMap;

    let mut winners: HashMap<VirtualPath, ListingRecord> = HashMap::new();
    for record in records {
        winners
            .entry(record.path.clone())
            .and_modify(|existing| {
                if record.layer_id > existing.layer_id {
                    *existing = record.clone();
                }
            })
            .or_insert(record);
    }
    winners.into_values().collect()
}
