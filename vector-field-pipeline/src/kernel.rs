/// Uniform mean-filter kernels
use crate::error::{PipelineError, Result, shape};

/// Square (2D), cubic (3D) or flattened (1D) averaging kernel.
/// Weights are stored row-major and always sum to one.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    size: usize,
    dim: usize,
    weights: Vec<f64>,
}

impl Kernel {
    /// Build a `size^dim` mean filter with weights `1/size^dim`.
    pub fn build(size: usize, dim: usize) -> Result<Self> {
        if dim != 2 && dim != 3 {
            return Err(PipelineError::UnsupportedDimension(dim));
        }
        Self::uniform(size, dim)
    }

    /// Build the 1D kernel used by row-wise averaging.
    pub fn flattened(size: usize) -> Result<Self> {
        Self::uniform(size, 1)
    }

    fn uniform(size: usize, dim: usize) -> Result<Self> {
        if size == 0 {
            return Err(shape("kernel size must be positive"));
        }
        let len = size.pow(dim as u32);
        Ok(Self {
            size,
            dim,
            weights: vec![1.0 / len as f64; len],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Weight at a 2D offset (row, col). Only meaningful for 2D kernels.
    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.weights[row * self.size + col]
    }

    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        for size in 1..8 {
            for dim in [2, 3] {
                let kernel = Kernel::build(size, dim).unwrap();
                assert_eq!(kernel.weights().len(), size.pow(dim as u32));
                assert!((kernel.sum() - 1.0).abs() < 1e-12);
            }
            let flat = Kernel::flattened(size).unwrap();
            assert!((flat.sum() - 1.0).abs() < 1e-12);
            assert!((flat.weights()[0] - 1.0 / size as f64).abs() < 1e-15);
        }
    }

    #[test]
    fn unsupported_dimension_is_rejected() {
        for dim in [0, 1, 4] {
            assert!(matches!(
                Kernel::build(3, dim),
                Err(PipelineError::UnsupportedDimension(d)) if d == dim
            ));
        }
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(matches!(
            Kernel::build(0, 2),
            Err(PipelineError::InvalidShape(_))
        ));
        assert!(Kernel::flattened(0).is_err());
    }
}
