//! Policy for when a file's content is embedded directly in its `ListingRecord` instead of
//! being written to a layer on disk.

use crate::layer::path::VirtualPath;

/// Decides whether a file being written should have its content inlined into the index rather
/// than stored in a layer. Inlining is an optimization for small, frequently-read files (e.g.
/// manifests) that trades index size for one fewer disk round trip (spec.md §4.1).
pub trait InliningFilter: Send + Sync {
    /// Returns true if `content` for `path` should be inlined.
    fn should_inline(&self, path: &VirtualPath, content: &[u8]) -> bool;
}

/// The default policy: never inline. Every write lands on disk in the top layer.
pub struct NeverInline;

impl InliningFilter for NeverInline {
    fn should_inline(&self, _path: &VirtualPath, _content: &[u8]) -> bool {
        false
    }
}

/// Inlines content at or below a configured byte threshold.
pub struct SizeThresholdFilter {
    max_inline_bytes: usize,
}

impl SizeThresholdFilter {
    pub fn new(max_inline_bytes: usize) -> Self {
        Self { max_inline_bytes }
    }
}

impl InliningFilter for SizeThresholdFilter {
    fn should_inline(&self, _path: &VirtualPath, content: &[u8]) -> bool {
        content.len() <= self.max_inline_bytes
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use super::*;

    fn path(s: &str) -> VirtualPath {
        VirtualPath::try_from(s).unwrap()
    }

    #[test]
    fn never_inline_always_false() {
        let filter = NeverInline;
        assert!(!filter.should_inline(&path("a.txt"), b""));
        assert!(!filter.should_inline(&path("a.txt"), b"small"));
    }

    #[test]
    fn size_threshold_inlines_up_to_limit() {
        let filter = SizeThresholdFilter::new(4);
        assert!(filter.should_inline(&path("a.txt"), b"1234"));
        assert!(!filter.should_inline(&path("a.txt"), b"12345"));
    }
}
