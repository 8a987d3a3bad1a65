use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Monotonically increasing layer identifier. Larger is newer; the top layer's id is the
/// maximum in the stack.
pub type LayerId = u64;

/// Opaque identifier assigned to a `ListingRecord` by the `ListingIndexStore` on insert.
/// Never reused, even after the record it identified is deleted.
pub type RecordId = u64;

/// What kind of filesystem entity a `ListingRecord` describes.
#[derive(Deserialize, Serialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum EntryType {
    File,
    Directory,
    /// Anything that is not a regular file or directory, e.g. a symbolic link.
    Other,
}

impl Display for EntryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::File => write!(f, "file"),
            EntryType::Directory => write!(f, "directory"),
            EntryType::Other => write!(f, "other"),
        }
    }
}
