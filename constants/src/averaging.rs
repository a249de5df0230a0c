use std::time::Duration;

/// Default side length of the mean-filter kernel
pub const DEFAULT_KERNEL_SIZE: usize = 3;

/// Default decimation factor (1 keeps every node)
pub const DEFAULT_AVERAGING: usize = 1;

/// Per-task deadline for convolution, colour and layout stages
pub const STAGE_DEADLINE: Duration = Duration::from_secs(20);

/// Per-task deadline for the normalization stage
pub const NORMALIZATION_DEADLINE: Duration = Duration::from_secs(12);
