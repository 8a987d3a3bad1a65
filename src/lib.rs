//! A layered object-storage backend: an ordered stack of filesystem layers, all but the
//! newest sealed, presenting a single virtual filesystem via [`layer::LayeredStorage`].
//!
//! See [`layer`] for the full API.

pub mod layer;
