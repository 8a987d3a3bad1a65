use std::io::ErrorKind;
use std::path::Path;
use std::{fs, io};

/// Identical to `fs::remove_file()` except `NotFound` errors are ignored.
pub fn remove_file_ignore_not_found(path: impl AsRef<Path>) -> io::Result<()> {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            return Err(e);
        }
    }
    Ok(())
}
