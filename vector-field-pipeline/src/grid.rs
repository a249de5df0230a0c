/// Grid geometry: node counts, layer ranges and outline synthesis
use crate::error::{Result, shape};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Node counts along x, y and z. Node index order is x fastest, then y, then z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub xc: usize,
    pub yc: usize,
    pub zc: usize,
}

impl GridShape {
    /// Create a grid shape, rejecting zero-sized axes.
    pub fn new(xc: usize, yc: usize, zc: usize) -> Result<Self> {
        if xc == 0 || yc == 0 || zc == 0 {
            return Err(shape(format!(
                "grid dimensions must be positive, got ({xc}, {yc}, {zc})"
            )));
        }
        Ok(Self { xc, yc, zc })
    }

    pub fn node_count(&self) -> usize {
        self.xc * self.yc * self.zc
    }

    /// Nodes in one z layer
    pub fn layer_len(&self) -> usize {
        self.xc * self.yc
    }

    /// Node index range covered by layer `layer`.
    pub fn layer_range(&self, layer: usize) -> Result<Range<usize>> {
        if layer >= self.zc {
            return Err(shape(format!(
                "layer {layer} out of range for grid depth {}",
                self.zc
            )));
        }
        let start = layer * self.layer_len();
        Ok(start..start + self.layer_len())
    }

    /// Same x/y extent with depth forced to one layer.
    pub fn single_layer(&self) -> Self {
        Self { zc: 1, ..*self }
    }

    /// Check that `nodes` matches `xc*yc*zc`.
    pub fn check_nodes(&self, nodes: usize) -> Result<()> {
        if nodes != self.node_count() {
            return Err(shape(format!(
                "grid ({}, {}, {}) holds {} nodes but input has {nodes}",
                self.xc,
                self.yc,
                self.zc,
                self.node_count()
            )));
        }
        Ok(())
    }
}

/// Layer geometry taken from a simulation output header.
/// Only the fields needed to place arrow start points are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridHeader {
    pub xnodes: usize,
    pub ynodes: usize,
    pub znodes: usize,
    #[serde(default)]
    pub xbase: f64,
    #[serde(default)]
    pub ybase: f64,
    #[serde(default)]
    pub zbase: f64,
    pub xstepsize: f64,
    pub ystepsize: f64,
    pub zstepsize: f64,
}

impl GridHeader {
    pub fn shape(&self) -> Result<GridShape> {
        GridShape::new(self.xnodes, self.ynodes, self.znodes)
    }

    /// World space extent of the node lattice
    pub fn dimensions(&self) -> (f64, f64, f64) {
        (
            self.xstepsize * self.xnodes as f64,
            self.ystepsize * self.ynodes as f64,
            self.zstepsize * self.znodes as f64,
        )
    }

    /// Node centre positions for every node of the grid, shape (nodes, 3).
    pub fn outline(&self) -> Result<Array2<f64>> {
        let grid = self.shape()?;
        Ok(self.positions(0..grid.node_count(), &grid))
    }

    /// Node centre positions for a single z layer, shape (xc*yc, 3).
    pub fn layer_outline(&self, layer: usize) -> Result<Array2<f64>> {
        let grid = self.shape()?;
        let range = grid.layer_range(layer)?;
        Ok(self.positions(range, &grid))
    }

    fn positions(&self, range: Range<usize>, grid: &GridShape) -> Array2<f64> {
        let start = range.start;
        Array2::from_shape_fn((range.len(), 3), |(row, axis)| {
            let index = start + row;
            let x = index % grid.xc;
            let y = (index / grid.xc) % grid.yc;
            let z = index / grid.layer_len();
            match axis {
                0 => self.xbase + (x as f64 + 0.5) * self.xstepsize,
                1 => self.ybase + (y as f64 + 0.5) * self.ystepsize,
                _ => self.zbase + (z as f64 + 0.5) * self.zstepsize,
            }
        })
    }
}
