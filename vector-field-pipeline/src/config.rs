/// Explicit pipeline configuration, loadable from JSON
use crate::color::ReferenceSet;
use crate::convolution::AveragingMode;
use crate::error::{PipelineError, Result, shape};
use crate::grid::GridShape;
use crate::pipeline::LayerSelection;
use constants::averaging::{
    DEFAULT_AVERAGING, DEFAULT_KERNEL_SIZE, NORMALIZATION_DEADLINE, STAGE_DEADLINE,
};
use constants::render_settings::VERTEX_PAD_FACTOR;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Every parameter a pipeline run depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Node counts of the simulation grid.
    pub grid: GridShape,
    /// Expected iteration count; checked against the field when set.
    #[serde(default)]
    pub iterations: Option<usize>,
    /// Decimation factor: Bernoulli keep probability is `1/averaging`,
    /// the index policy zeroes `floor(nodes/averaging)` nodes.
    #[serde(default = "default_averaging")]
    pub averaging: usize,
    /// Side length of the averaging kernel.
    #[serde(default = "default_kernel_size")]
    pub kernel_size: usize,
    #[serde(default)]
    pub averaging_mode: AveragingMode,
    #[serde(default)]
    pub layer: LayerSelection,
    #[serde(default)]
    pub reference_set: ReferenceSet,
    /// Vertices sharing one attribute in the vertex-buffer layout.
    #[serde(default = "default_pad_factor")]
    pub pad_factor: usize,
    /// Unit-normalize arrow start points in the interleaved layout.
    #[serde(default)]
    pub normalize_outline: bool,
    /// Seed for mask generation; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Worker count; hardware parallelism when absent.
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default = "default_stage_deadline_ms")]
    pub stage_deadline_ms: u64,
    #[serde(default = "default_normalization_deadline_ms")]
    pub normalization_deadline_ms: u64,
}

impl PipelineConfig {
    /// Configuration for `grid` with every other field at its default.
    pub fn new(grid: GridShape) -> Self {
        Self {
            grid,
            iterations: None,
            averaging: DEFAULT_AVERAGING,
            kernel_size: DEFAULT_KERNEL_SIZE,
            averaging_mode: AveragingMode::default(),
            layer: LayerSelection::default(),
            reference_set: ReferenceSet::default(),
            pad_factor: VERTEX_PAD_FACTOR,
            normalize_outline: false,
            seed: None,
            threads: None,
            stage_deadline_ms: default_stage_deadline_ms(),
            normalization_deadline_ms: default_normalization_deadline_ms(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject values no pipeline run can use.
    pub fn validate(&self) -> Result<()> {
        GridShape::new(self.grid.xc, self.grid.yc, self.grid.zc)?;
        if self.averaging == 0 {
            return Err(config_error("averaging must be at least 1"));
        }
        if self.kernel_size == 0 {
            return Err(config_error("kernel_size must be at least 1"));
        }
        if self.pad_factor == 0 {
            return Err(config_error("pad_factor must be at least 1"));
        }
        if self.iterations == Some(0) {
            return Err(config_error("iterations must be at least 1 when set"));
        }
        match self.layer {
            LayerSelection::Index(layer) => {
                self.grid.layer_range(layer)?;
                self.check_kernel_fit()?;
            }
            LayerSelection::All | LayerSelection::Volume if self.averaging_mode != AveragingMode::None => {
                return Err(PipelineError::Config(format!(
                    "averaging_mode {:?} only applies to a single layer, not {:?}",
                    self.averaging_mode, self.layer
                )));
            }
            LayerSelection::All | LayerSelection::Volume => {}
        }
        Ok(())
    }

    /// The averaging kernel must fit inside one layer.
    fn check_kernel_fit(&self) -> Result<()> {
        let k = self.kernel_size;
        match self.averaging_mode {
            AveragingMode::None => Ok(()),
            AveragingMode::RowWise if k > self.grid.layer_len() => Err(shape(format!(
                "kernel size {k} exceeds layer node count {}",
                self.grid.layer_len()
            ))),
            AveragingMode::Windowed if k > self.grid.xc || k > self.grid.yc => Err(shape(format!(
                "kernel {k}x{k} does not fit layer {}x{}",
                self.grid.yc, self.grid.xc
            ))),
            AveragingMode::RowWise | AveragingMode::Windowed => Ok(()),
        }
    }

    pub fn stage_deadline(&self) -> Duration {
        Duration::from_millis(self.stage_deadline_ms)
    }

    pub fn normalization_deadline(&self) -> Duration {
        Duration::from_millis(self.normalization_deadline_ms)
    }
}

fn config_error(message: &str) -> PipelineError {
    PipelineError::Config(message.to_string())
}

fn default_averaging() -> usize {
    DEFAULT_AVERAGING
}

fn default_kernel_size() -> usize {
    DEFAULT_KERNEL_SIZE
}

fn default_pad_factor() -> usize {
    VERTEX_PAD_FACTOR
}

fn default_stage_deadline_ms() -> u64 {
    STAGE_DEADLINE.as_millis() as u64
}

fn default_normalization_deadline_ms() -> u64 {
    NORMALIZATION_DEADLINE.as_millis() as u64
}
