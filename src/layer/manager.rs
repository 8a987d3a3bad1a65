//! Owns the ordered stack of layers and designates the mutable top.

use crate::layer::error::{LayerError, Result};
use crate::layer::fs_layer::Layer;

/// Holds the ordered set of layers backing a `LayeredStorage`. The layer with the greatest id
/// is the top, the only one mutating operations may target. Creating and sealing layers is an
/// external policy decision (spec.md §4.3); `LayerManager` only ever consumes the stack it is
/// given.
pub struct LayerManager<L: Layer> {
    // Kept sorted ascending by id; the last element is always the top layer.
    layers: Vec<L>,
}

impl<L: Layer> LayerManager<L> {
    /// Creates a manager over `layers`, which must be non-empty and sorted ascending by id.
    pub fn new(layers: Vec<L>) -> Result<Self> {
        if layers.is_empty() {
            return Err(LayerError::InvariantViolation(
                "A layer stack must contain at least one layer".to_string(),
            ));
        }

        for window in layers.windows(2) {
            if window[0].id() >= window[1].id() {
                return Err(LayerError::InvariantViolation(
                    "Layers must be sorted ascending by id".to_string(),
                ));
            }
        }

        Ok(Self { layers })
    }

    /// Returns the top (mutable) layer.
    pub fn top_layer(&self) -> &L {
        self.layers.last().expect("layer stack is never empty")
    }

    /// Looks up a layer by id.
    pub fn layer(&self, id: u64) -> Option<&L> {
        self.layers.iter().find(|l| l.id() == id)
    }

    /// Iterates over the stack, oldest layer first.
    pub fn layers(&self) -> impl Iterator<Item = &L> {
        self.layers.iter()
    }

    /// Appends a newly sealed-off layer to the top of the stack. The caller (the external
    /// archival policy) is responsible for having already sealed the previous top.
    pub fn push_layer(&mut self, layer: L) -> Result<()> {
        if layer.id() <= self.top_layer().id() {
            return Err(LayerError::InvariantViolation(format!(
                "New layer id {} must be greater than the current top layer id {}",
                layer.id(),
                self.top_layer().id()
            )));
        }

        self.layers.push(layer);
        Ok(())
    }
}
