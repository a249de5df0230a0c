/// Error taxonomy for the vector-field pipeline
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unsupported kernel dimension {0} (expected 2 or 3)")]
    UnsupportedDimension(usize),

    #[error("invalid input type: {0}")]
    InvalidInputType(String),

    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("task {index} exceeded its deadline ({elapsed:?} > {deadline:?})")]
    WorkerTimeout {
        index: usize,
        elapsed: Duration,
        deadline: Duration,
    },

    #[error("task {index} failed: {reason}")]
    WorkerFailure { index: usize, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub fn shape(message: impl Into<String>) -> PipelineError {
    PipelineError::InvalidShape(message.into())
}

pub fn input_type(message: impl Into<String>) -> PipelineError {
    PipelineError::InvalidInputType(message.into())
}

/// Fail with `InvalidShape` unless `actual` matches `expected`.
pub fn expect_shape(stage: &str, actual: &[usize], expected: &[usize]) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(shape(format!(
            "{stage}: expected {expected:?}, got {actual:?}"
        )))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Config(err.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Config(err.to_string())
    }
}
