#![allow(dead_code)]

use std::path::Path;

use assert_fs::fixture::ChildPath;
use assert_fs::prelude::*;
use assert_fs::TempDir;

use layerfs::layer::{
    FsLayer, InMemoryListingIndexStore, LayerManager, LayeredStorage, ListingIndex, NeverInline,
    Result,
};

pub fn create_dirs(temp: &TempDir, path: &str) -> ChildPath {
    let child = resolve_child(temp, path);
    child.create_dir_all().unwrap();
    child
}

pub fn create_file(temp: &TempDir, path: &str, content: &str) -> ChildPath {
    let child = resolve_child(temp, path);
    child.write_str(content).unwrap();
    child
}

pub fn resolve_child(temp: &TempDir, path: &str) -> ChildPath {
    let mut child: Option<ChildPath> = None;
    for part in path.split('/') {
        child = match child {
            Some(child) => Some(child.child(part)),
            None => Some(temp.child(part)),
        };
    }
    child.unwrap()
}

/// Builds a `LayeredStorage` with one `FsLayer` per id in `layer_ids`, rooted under `root`,
/// never inlining content.
pub fn new_storage(
    root: &Path,
    layer_ids: &[u64],
) -> Result<LayeredStorage<FsLayer, InMemoryListingIndexStore, NeverInline>> {
    let layers = layer_ids
        .iter()
        .map(|id| FsLayer::new(*id, root.join(id.to_string())))
        .collect::<Result<Vec<_>>>()?;
    let manager = LayerManager::new(layers)?;
    let index = ListingIndex::new(InMemoryListingIndexStore::new());
    Ok(LayeredStorage::new(manager, index, NeverInline))
}
