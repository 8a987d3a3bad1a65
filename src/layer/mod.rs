//! A layered, copy-on-write overlay filesystem: an ordered stack of append-mostly `Layer`s,
//! all but the newest sealed, fronted by a `ListingIndex` that resolves which layer's copy of
//! a path is currently visible.
//!
//! Build a `LayeredStorage` by choosing concrete implementations of its three collaborators —
//! a `Layer` (this crate ships `FsLayer`), a `ListingIndexStore` (this crate ships
//! `InMemoryListingIndexStore`), and an `InliningFilter` (`NeverInline` or
//! `SizeThresholdFilter`) — then handing the first two to a `LayeredStorageBuilder`:
//!
//! ```rust
//! use layerfs::layer::{FsLayer, InMemoryListingIndexStore, LayerManager, ListingIndex,
//!     LayeredStorageBuilder, VirtualPath};
//! use std::convert::TryFrom;
//!
//! # fn main() -> layerfs::layer::Result<()> {
//! let dir = tempfile::tempdir().unwrap();
//! let layer = FsLayer::new(1, dir.path().join("1"))?;
//! let manager = LayerManager::new(vec![layer])?;
//! let index = ListingIndex::new(InMemoryListingIndexStore::new());
//! let storage = LayeredStorageBuilder::new(manager, index).build();
//!
//! let path = VirtualPath::try_from("hello.txt")?;
//! storage.write(&path, b"hi", None)?;
//! assert_eq!(b"hi".to_vec(), storage.read(&path)?);
//! # Ok(())
//! # }
//! ```

pub use self::entry::{EntryType, LayerId, RecordId};
pub use self::error::{LayerError, Result};
pub use self::fs_layer::{FsLayer, Layer};
pub use self::index::{InMemoryListingIndexStore, ListingIndex, ListingIndexStore, ListingRecord};
pub use self::inline::{InliningFilter, NeverInline, SizeThresholdFilter};
pub use self::lock::WriteLock;
pub use self::manager::LayerManager;
pub use self::path::VirtualPath;
pub use self::storage::{LayeredStorage, LayeredStorageBuilder};

mod entry;
mod error;
mod fs_layer;
mod index;
mod inline;
mod lock;
mod manager;
mod path;
mod storage;
mod util;
