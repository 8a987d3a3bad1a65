use std::convert::TryFrom;
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::str::Split;

use serde::{Deserialize, Serialize};

use crate::layer::error::{LayerError, Result};

/// A forward-slash-separated, relative virtual path.
///
/// The empty segment and `..` are disallowed (spec.md §3). The empty path (`""`) is a valid
/// `VirtualPath`; it denotes the root of the virtual filesystem and is the parent of every
/// single-segment path. Paths compare as byte strings, case-sensitively.
#[derive(Deserialize, Serialize, Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Clone)]
#[serde(try_from = "String")]
#[serde(into = "String")]
pub struct VirtualPath(String);

impl VirtualPath {
    /// Returns the root path, the empty path that is every top-level segment's parent.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Returns an iterator over this path's `/`-separated segments. The root path yields a
    /// single empty segment, mirroring `"".split('/')`; callers checking for the root should
    /// prefer `is_root`.
    pub fn parts(&self) -> Split<'_, char> {
        self.0.split('/')
    }

    /// Returns true if this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the parent of this path. The parent of a single segment is the root path.
    pub fn parent(&self) -> Self {
        match self.0.rfind('/') {
            Some(last_slash) => Self(self.0[..last_slash].to_string()),
            None => Self::root(),
        }
    }

    /// Returns the final segment of the path, or the entire path if it has no `/`.
    pub fn filename(&self) -> &str {
        match self.0.rfind('/') {
            Some(last_slash) => &self.0[last_slash + 1..],
            None => &self.0,
        }
    }

    /// Joins this path with a child segment, producing a new path nested beneath it.
    pub fn join(&self, segment: &str) -> Self {
        if self.0.is_empty() {
            Self(segment.to_string())
        } else {
            Self(format!("{}/{}", self.0, segment))
        }
    }

    /// Returns true if `self` is `other`, or a proper descendant of `other`.
    pub fn is_or_is_under(&self, other: &Self) -> bool {
        self == other || self.is_under(other)
    }

    /// Returns true if `self` is a proper descendant of `other`.
    pub fn is_under(&self, other: &Self) -> bool {
        if other.is_root() {
            return !self.is_root();
        }
        self.0.len() > other.0.len()
            && self.0.starts_with(other.0.as_str())
            && self.0.as_bytes()[other.0.len()] == b'/'
    }

    /// Returns true if `self` is an immediate child of `other`.
    pub fn is_immediate_child_of(&self, other: &Self) -> bool {
        self.is_under(other) && self.parent() == *other
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&str> for VirtualPath {
    type Error = LayerError;

    fn try_from(value: &str) -> Result<Self> {
        let trimmed = value.trim_start_matches('/').trim_end_matches('/');

        if !trimmed.is_empty() {
            let has_illegal_part = trimmed.split('/').any(|part| part == ".." || part.is_empty());

            if has_illegal_part {
                return Err(LayerError::Conflict(format!(
                    "Paths may not contain '..' or empty parts. Found: {}",
                    value
                )));
            }
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for VirtualPath {
    type Error = LayerError;

    fn try_from(value: String) -> Result<Self> {
        value.as_str().try_into()
    }
}

impl From<VirtualPath> for String {
    fn from(path: VirtualPath) -> Self {
        path.0
    }
}

impl Display for VirtualPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> VirtualPath {
        VirtualPath::try_from(s).unwrap()
    }

    #[test]
    fn rejects_dotdot_and_empty_segments() {
        assert!(VirtualPath::try_from("a/../b").is_err());
        assert!(VirtualPath::try_from("a//b").is_err());
    }

    #[test]
    fn trims_leading_and_trailing_slashes() {
        assert_eq!(path("a/b"), path("/a/b/"));
    }

    #[test]
    fn parent_of_single_segment_is_root() {
        assert_eq!(VirtualPath::root(), path("a").parent());
        assert!(path("a").parent().is_root());
    }

    #[test]
    fn parent_of_nested_path() {
        assert_eq!(path("a/b"), path("a/b/c").parent());
    }

    #[test]
    fn is_under_and_immediate_child() {
        assert!(path("a/b/c").is_under(&path("a")));
        assert!(!path("a").is_under(&path("a")));
        assert!(path("a/b").is_immediate_child_of(&path("a")));
        assert!(!path("a/b/c").is_immediate_child_of(&path("a")));
        assert!(path("a").is_immediate_child_of(&VirtualPath::root()));
    }
}
