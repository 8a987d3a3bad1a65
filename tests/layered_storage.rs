mod common;

use std::convert::TryFrom;

use layerfs::layer::{FsLayer, Layer, LayerError, LayerManager, VirtualPath};
use tempfile::TempDir;

use common::new_storage;

fn path(s: &str) -> VirtualPath {
    VirtualPath::try_from(s).unwrap()
}

#[test]
fn scenario_write_read_and_directory_listing() {
    let temp = TempDir::new().unwrap();
    let storage = new_storage(temp.path(), &[1]).unwrap();

    storage.create_directories(&path("data")).unwrap();
    storage.write(&path("data/a.txt"), b"one", None).unwrap();
    storage.write(&path("data/b.txt"), b"two", None).unwrap();

    let listing = storage.list_directory(&path("data")).unwrap();
    assert_eq!(2, listing.len());

    assert_eq!(b"one".to_vec(), storage.read(&path("data/a.txt")).unwrap());
    assert_eq!("two", storage.read_to_string(&path("data/b.txt")).unwrap());
}

#[test]
fn scenario_newer_layer_wins_and_layers_containing_is_sorted() {
    let temp = TempDir::new().unwrap();

    let layer2 = FsLayer::new(2, temp.path().join("2")).unwrap();
    layer2.write(&path("a/b/x"), b"alpha").unwrap();
    layer2.seal();

    let layer3 = FsLayer::new(3, temp.path().join("3")).unwrap();
    let manager = LayerManager::new(vec![layer2, layer3]).unwrap();
    let index = layerfs::layer::ListingIndex::new(layerfs::layer::InMemoryListingIndexStore::new());
    index.add_file(2, &path("a/b/x")).unwrap();
    let storage = layerfs::layer::LayeredStorage::new(manager, index, layerfs::layer::NeverInline);

    storage.write(&path("a/b/x"), b"beta", None).unwrap();

    assert_eq!(b"beta".to_vec(), storage.read(&path("a/b/x")).unwrap());

    let listing = storage.list_directory(&path("a/b")).unwrap();
    assert_eq!(1, listing.len());
    assert_eq!(3, listing[0].layer_id);
}

#[test]
fn deleting_a_file_removes_it_from_every_containing_layer() {
    let temp = TempDir::new().unwrap();
    let storage = new_storage(temp.path(), &[1]).unwrap();

    storage.write(&path("a.txt"), b"content", None).unwrap();
    storage.delete_file(&path("a.txt")).unwrap();

    assert!(!storage.file_exists(&path("a.txt")).unwrap());
    match storage.read(&path("a.txt")) {
        Err(LayerError::NotFound(_)) => (),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[test]
fn moving_a_directory_into_the_store_inlines_nothing_by_default() {
    let temp = TempDir::new().unwrap();
    let storage = new_storage(temp.path(), &[1]).unwrap();

    let external = TempDir::new().unwrap();
    std::fs::create_dir_all(external.path().join("nested")).unwrap();
    std::fs::write(external.path().join("nested/file.txt"), b"payload").unwrap();

    storage
        .move_directory_into(external.path(), &path("dropzone"))
        .unwrap();

    assert_eq!(
        b"payload".to_vec(),
        storage.read(&path("dropzone/nested/file.txt")).unwrap()
    );
    assert!(!storage
        .list_recursive(&path("dropzone"))
        .unwrap()
        .iter()
        .any(|r| r.content.is_some()));
}

#[test]
fn copy_directory_out_of_round_trips_bytes() {
    let temp = TempDir::new().unwrap();
    let storage = new_storage(temp.path(), &[1]).unwrap();

    storage.write(&path("src/a.txt"), b"one", None).unwrap();
    storage.write(&path("src/nested/b.txt"), b"two", None).unwrap();

    let dest = TempDir::new().unwrap();
    storage.copy_directory_out_of(&path("src"), dest.path()).unwrap();

    assert_eq!(b"one".to_vec(), std::fs::read(dest.path().join("a.txt")).unwrap());
    assert_eq!(
        b"two".to_vec(),
        std::fs::read(dest.path().join("nested/b.txt")).unwrap()
    );
}

#[test]
fn invariant_addresses_file_directory_type_collisions() {
    let temp = TempDir::new().unwrap();
    let storage = new_storage(temp.path(), &[1]).unwrap();

    storage.write(&path("a"), b"bytes", None).unwrap();

    match storage.create_directories(&path("a")) {
        Err(_) => (),
        Ok(_) => panic!("expected creating a directory over an existing file to fail"),
    }
}

#[test]
fn delete_empty_dirs_down_removes_only_empty_leaves() {
    let temp = TempDir::new().unwrap();
    let storage = new_storage(temp.path(), &[1]).unwrap();

    storage.create_directories(&path("a/empty")).unwrap();
    storage.create_directories(&path("a/occupied")).unwrap();
    storage.write(&path("a/occupied/file.txt"), b"x", None).unwrap();

    storage.delete_empty_dirs_down(&path("a")).unwrap();

    assert!(storage.directory_is_empty(&path("a")).unwrap() == false);
    assert!(storage
        .list_directory(&path("a"))
        .unwrap()
        .iter()
        .all(|r| r.path != path("a/empty")));
    assert!(storage
        .list_directory(&path("a"))
        .unwrap()
        .iter()
        .any(|r| r.path == path("a/occupied")));
}
