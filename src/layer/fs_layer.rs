//! A single on-disk filesystem subtree backing one entry in the layer stack.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::layer::error::{LayerError, Result};
use crate::layer::path::VirtualPath;
use crate::layer::util;

/// The method set a single layer exposes to the core. All operations are confined to the
/// layer's own root; a layer never reaches outside of it except to pull content in via
/// `move_directory_into`.
///
/// Sealed layers reject every mutating operation with `LayerError::ReadOnly`.
pub trait Layer {
    /// This layer's identifier. Larger ids are newer.
    fn id(&self) -> u64;

    /// True once the layer has been sealed by the external archival policy that owns the
    /// stack (spec.md §4.2 — sealing is never triggered by the core itself).
    fn is_sealed(&self) -> bool;

    /// Creates `path`, including any missing parent directories, and writes `content` to it.
    /// Overwriting an existing file is forbidden; callers must guarantee novelty via the
    /// index (spec.md §4.2).
    fn write(&self, path: &VirtualPath, content: &[u8]) -> Result<()>;

    /// `mkdir -p` within the layer root.
    fn create_directories(&self, path: &VirtualPath) -> Result<()>;

    /// Moves the external directory tree rooted at `source` into this layer at `dest`. Uses a
    /// rename when possible, falling back to copy-then-delete otherwise (e.g. across devices).
    fn move_directory_into(&self, source: &Path, dest: &VirtualPath) -> Result<()>;

    /// Moves the external directory tree rooted at `source` back out of this layer, undoing a
    /// prior `move_directory_into`. Used to compensate a physical move whose index update
    /// subsequently failed (spec.md §7).
    fn move_directory_out_of(&self, src: &VirtualPath, dest: &Path) -> Result<()>;

    /// Renames `src` to `dest`, both within this layer.
    fn move_directory_internal(&self, src: &VirtualPath, dest: &VirtualPath) -> Result<()>;

    /// Recursively deletes the directory at `path`.
    fn delete_directory(&self, path: &VirtualPath) -> Result<()>;

    /// Best-effort bulk file removal; missing files are not an error.
    fn delete_files(&self, paths: &[&VirtualPath]) -> Result<()>;

    /// Opens a byte stream over the file at `path`.
    fn read(&self, path: &VirtualPath) -> Result<Box<dyn Read>>;

    /// True if a file or directory exists on disk at `path`.
    fn file_exists(&self, path: &VirtualPath) -> bool;

    /// The absolute path to the layer's root directory.
    fn root(&self) -> &Path;
}

/// The one `Layer` implementation this crate ships: a plain local-filesystem subtree, one
/// directory per layer id beneath a shared storage root.
pub struct FsLayer {
    id: u64,
    root: PathBuf,
    sealed: AtomicBool,
}

impl FsLayer {
    /// Opens (creating if necessary) the layer rooted at `root`.
    pub fn new(id: u64, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            id,
            root,
            sealed: AtomicBool::new(false),
        })
    }

    /// Opens the layer rooted at `root`, sealed from the start. Used to reopen an archived
    /// layer after a restart.
    pub fn open_sealed(id: u64, root: impl AsRef<Path>) -> Result<Self> {
        let layer = Self::new(id, root)?;
        layer.seal();
        Ok(layer)
    }

    /// Seals the layer, permanently rejecting further mutations. This is invoked by the
    /// external policy that owns the layer stack, never by the core (spec.md §3 "Lifecycle").
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    fn resolve(&self, path: &VirtualPath) -> PathBuf {
        self.root.join(path.as_str())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.is_sealed() {
            Err(LayerError::ReadOnly(self.id))
        } else {
            Ok(())
        }
    }
}

impl Layer for FsLayer {
    fn id(&self) -> u64 {
        self.id
    }

    fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    fn write(&self, path: &VirtualPath, content: &[u8]) -> Result<()> {
        self.ensure_writable()?;

        let full_path = self.resolve(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)?;
        file.write_all(content)?;
        Ok(())
    }

    fn create_directories(&self, path: &VirtualPath) -> Result<()> {
        self.ensure_writable()?;
        fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }

    fn move_directory_into(&self, source: &Path, dest: &VirtualPath) -> Result<()> {
        self.ensure_writable()?;

        let full_dest = self.resolve(dest);
        if let Some(parent) = full_dest.parent() {
            fs::create_dir_all(parent)?;
        }

        move_tree(source, &full_dest)
    }

    fn move_directory_out_of(&self, src: &VirtualPath, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        move_tree(&self.resolve(src), dest)
    }

    fn move_directory_internal(&self, src: &VirtualPath, dest: &VirtualPath) -> Result<()> {
        self.ensure_writable()?;

        let full_dest = self.resolve(dest);
        if let Some(parent) = full_dest.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::rename(self.resolve(src), full_dest)?;
        Ok(())
    }

    fn delete_directory(&self, path: &VirtualPath) -> Result<()> {
        self.ensure_writable()?;
        let full_path = self.resolve(path);
        if full_path.exists() {
            fs::remove_dir_all(full_path)?;
        }
        Ok(())
    }

    fn delete_files(&self, paths: &[&VirtualPath]) -> Result<()> {
        self.ensure_writable()?;

        for path in paths {
            let full_path = self.resolve(path);
            if let Err(e) = util::remove_file_ignore_not_found(&full_path) {
                warn!(
                    "Failed to delete {} from layer {}: {}",
                    full_path.display(),
                    self.id,
                    e
                );
                return Err(e.into());
            }
        }

        Ok(())
    }

    fn read(&self, path: &VirtualPath) -> Result<Box<dyn Read>> {
        Ok(Box::new(File::open(self.resolve(path))?))
    }

    fn file_exists(&self, path: &VirtualPath) -> bool {
        self.resolve(path).exists()
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// Moves the tree at `source` to `dest`, preferring an atomic rename and falling back to a
/// recursive copy-then-delete when the rename fails (e.g. because the two paths are on
/// different devices). Atomicity is best-effort, as spec.md §7 documents.
fn move_tree(source: &Path, dest: &Path) -> Result<()> {
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(e) => {
            info!(
                "Rename from {} to {} failed ({}), falling back to copy-then-delete",
                source.display(),
                dest.display(),
                e
            );
            copy_tree(source, dest)?;
            fs::remove_dir_all(source)?;
            Ok(())
        }
    }
}

fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    if source.is_dir() {
        fs::create_dir_all(dest)?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else {
        fs::copy(source, dest)?;
    }
    Ok(())
}
