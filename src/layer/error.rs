use core::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::{error, io};

use thiserror::Error;

use crate::layer::path::VirtualPath;

pub type Result<T, E = LayerError> = core::result::Result<T, E>;

/// Errors produced by the layered storage backend.
#[derive(Error)]
pub enum LayerError {
    #[error("{0}")]
    Io(io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("A record already exists for {path} in layer {layer}")]
    Duplicate { layer: u64, path: VirtualPath },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Layer {0} is sealed and cannot be mutated")]
    ReadOnly(u64),

    #[error("{path} does not contain valid UTF-8: {source}")]
    Encoding {
        path: VirtualPath,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("{0}")]
    Wrapped(Box<dyn error::Error + Send + Sync>),
}

impl Debug for LayerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<io::Error> for LayerError {
    fn from(e: io::Error) -> Self {
        LayerError::Io(e)
    }
}

impl From<walkdir::Error> for LayerError {
    fn from(e: walkdir::Error) -> Self {
        LayerError::Wrapped(Box::new(e))
    }
}

/// Constructs a `LayerError::NotFound` for a virtual path.
pub fn not_found(path: &VirtualPath) -> LayerError {
    LayerError::NotFound(path.as_str().to_string())
}

/// Constructs the conflict error `ListingIndex::add_directories` raises when a prefix of the
/// target path is already occupied by a file. The message is part of the observed contract
/// (spec scenario 4/5).
pub fn directory_occupied_by_file(path: &VirtualPath) -> LayerError {
    LayerError::Conflict(format!(
        "Cannot add directory {} because it is already occupied by a file.",
        path
    ))
}
