//! Vector-field colour/geometry pipeline.
//!
//! Turns time series of magnetization vectors on a 3D grid into per-node
//! unit vectors, colour triples and render-ready interleaved buffers:
//! averaging, decimation, normalization, basis projection and layout, each
//! stage fanned out across iterations on a shared rayon pool.

pub mod color;
pub mod config;
pub mod convolution;
pub mod error;
pub mod executor;
pub mod grid;
pub mod kernel;
pub mod layout;
pub mod masking;
pub mod normalization;
pub mod pipeline;

pub use color::ReferenceSet;
pub use config::PipelineConfig;
pub use convolution::AveragingMode;
pub use error::{PipelineError, Result};
pub use grid::{GridHeader, GridShape};
pub use masking::DecimationSession;
pub use pipeline::{LayerSelection, PipelineOutput, RenderBuffers, VectorFieldPipeline};
