/// Per-channel spatial averaging of vector data
use crate::error::{Result, input_type, shape};
use crate::kernel::Kernel;
use constants::render_settings::COMPONENTS;
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix2, Ix3};
use serde::{Deserialize, Serialize};

/// Averaging applied before masking in the single-layer procedure.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AveragingMode {
    /// No smoothing; node count is preserved.
    #[default]
    None,
    /// 1D "same" convolution along the node axis, then keep every Nth node.
    RowWise,
    /// Valid 2D correlation over the (y, x) plane of the layer.
    Windowed,
}

/// Row-wise smoothing plus decimation of one iteration (nodes x 3).
/// Each channel is convolved with the flattened kernel, then every `stride`th node is kept.
pub fn row_wise(iteration: ArrayView2<f64>, kernel: &Kernel, stride: usize) -> Result<Array2<f64>> {
    check_components(iteration.ncols())?;
    if kernel.dim() != 1 {
        return Err(shape(format!(
            "row-wise averaging needs a flattened kernel, got {}D",
            kernel.dim()
        )));
    }
    if stride == 0 {
        return Err(shape("row-wise stride must be positive"));
    }
    let nodes = iteration.nrows();
    if kernel.size() > nodes {
        return Err(shape(format!(
            "kernel size {} exceeds node count {nodes}",
            kernel.size()
        )));
    }

    let kept = nodes.div_ceil(stride);
    let mut result = Array2::zeros((kept, COMPONENTS));
    for channel in 0..COMPONENTS {
        let convolved = convolve_same(iteration.column(channel), kernel.weights());
        for row in 0..kept {
            result[[row, channel]] = convolved[row * stride];
        }
    }
    Ok(result)
}

/// Windowed 2D averaging of one layer (H x W x 3).
/// Valid correlation results fill the interior; border cells keep their input value.
pub fn windowed(layer: ArrayView3<f64>, kernel: &Kernel) -> Result<Array3<f64>> {
    let (height, width, components) = layer.dim();
    check_components(components)?;
    if kernel.dim() != 2 {
        return Err(shape(format!(
            "windowed averaging needs a 2D kernel, got {}D",
            kernel.dim()
        )));
    }
    let k = kernel.size();
    if k > height || k > width {
        return Err(shape(format!(
            "kernel {k}x{k} does not fit layer {height}x{width}"
        )));
    }

    let offset = k / 2;
    let mut result = layer.to_owned();
    for channel in 0..COMPONENTS {
        let plane = layer.index_axis(Axis(2), channel);
        for row in 0..=height - k {
            for col in 0..=width - k {
                let mut acc = 0.0;
                for a in 0..k {
                    for b in 0..k {
                        acc += plane[[row + a, col + b]] * kernel.at(a, b);
                    }
                }
                result[[row + offset, col + offset, channel]] = acc;
            }
        }
    }
    Ok(result)
}

/// Convolve a dynamically shaped vector tensor channel by channel.
/// Rank 2 (nodes x 3) takes a flattened kernel, rank 3 (H x W x 3) a 2D kernel.
pub fn convolve_channels(input: ArrayViewD<f64>, kernel: &Kernel) -> Result<ndarray::ArrayD<f64>> {
    match input.ndim() {
        2 => {
            let view = input
                .into_dimensionality::<Ix2>()
                .map_err(|e| input_type(e.to_string()))?;
            Ok(row_wise(view, kernel, 1)?.into_dyn())
        }
        3 => {
            let view = input
                .into_dimensionality::<Ix3>()
                .map_err(|e| input_type(e.to_string()))?;
            Ok(windowed(view, kernel)?.into_dyn())
        }
        rank => Err(input_type(format!(
            "convolution expects a rank 2 or 3 vector tensor, got rank {rank}"
        ))),
    }
}

/// Full-overlap convolution trimmed to the signal length, centred like numpy's "same" mode.
fn convolve_same(signal: ArrayView1<f64>, kernel: &[f64]) -> Array1<f64> {
    let n = signal.len();
    let m = kernel.len();
    let offset = (m - 1) / 2;

    Array1::from_shape_fn(n, |t| {
        let i = t + offset;
        let lo = i.saturating_sub(m - 1);
        let hi = i.min(n - 1);
        (lo..=hi).map(|j| signal[j] * kernel[i - j]).sum()
    })
}

fn check_components(components: usize) -> Result<()> {
    if components != COMPONENTS {
        return Err(input_type(format!(
            "expected {COMPONENTS} vector components on the trailing axis, got {components}"
        )));
    }
    Ok(())
}
