//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use ndarray::{Array2, Array3};
use vector_field_pipeline::{GridShape, PipelineConfig};

/// Axis-aligned unit vectors with every fourth node zero.
pub fn unit_axis_field(iterations: usize, nodes: usize) -> Array3<f64> {
    Array3::from_shape_fn((iterations, nodes, 3), |(i, n, c)| {
        if (n + i) % 4 == 0 {
            0.0
        } else if (n + 2 * i) % 3 == c {
            if n % 2 == 0 { 1.0 } else { -1.0 }
        } else {
            0.0
        }
    })
}

/// Arbitrary nonzero vectors of varying magnitude.
pub fn scaled_field(iterations: usize, nodes: usize) -> Array3<f64> {
    Array3::from_shape_fn((iterations, nodes, 3), |(i, n, c)| {
        let base = (n * 7 + c * 3 + i) % 11;
        (base as f64 - 5.0) * 10f64.powi((n % 5) as i32)
    })
}

/// Outline with distinct positions per node.
pub fn outline(nodes: usize) -> Array2<f64> {
    Array2::from_shape_fn((nodes, 3), |(n, c)| (n * 3 + c + 1) as f64)
}

pub fn seeded_config(grid: GridShape) -> PipelineConfig {
    PipelineConfig {
        seed: Some(1234),
        threads: Some(4),
        ..PipelineConfig::new(grid)
    }
}

pub fn norm(row: &[f64]) -> f64 {
    row.iter().map(|v| v * v).sum::<f64>().sqrt()
}
