/// Zero-safe unit normalization of node vectors
use crate::error::{Result, input_type};
use constants::render_settings::COMPONENTS;
use ndarray::{Array, Array2, Array4, ArrayView, ArrayView1, ArrayView2, ArrayView4, Axis, Dimension};

/// Normalize a single vector to unit length.
/// The zero vector stays zero. Components are pre-scaled by their largest
/// magnitude so squaring can neither overflow nor underflow.
pub fn normalize_vector(v: [f64; 3]) -> [f64; 3] {
    if is_zero(&v) {
        return [0.0; 3];
    }
    let scale = v.iter().fold(0.0f64, |acc, c| acc.max(c.abs()));
    let scaled = [v[0] / scale, v[1] / scale, v[2] / scale];
    let norm = (scaled[0] * scaled[0] + scaled[1] * scaled[1] + scaled[2] * scaled[2]).sqrt();
    [scaled[0] / norm, scaled[1] / norm, scaled[2] / norm]
}

pub fn is_zero(v: &[f64; 3]) -> bool {
    v.iter().all(|c| *c == 0.0)
}

/// Normalize every node of one iteration (nodes x 3).
pub fn normalize_nodes(iteration: ArrayView2<f64>) -> Result<Array2<f64>> {
    check_components(iteration.ncols())?;
    Ok(normalize_lanes(iteration))
}

/// Normalize a layered iteration (zc x yc x xc x 3) layer by layer.
pub fn normalize_layers(layers: ArrayView4<f64>) -> Result<Array4<f64>> {
    check_components(layers.dim().3)?;
    let mut result = Array4::zeros(layers.raw_dim());
    for (layer, mut target) in layers.outer_iter().zip(result.outer_iter_mut()) {
        target.assign(&normalize_lanes(layer));
    }
    Ok(result)
}

fn normalize_lanes<D: Dimension>(input: ArrayView<f64, D>) -> Array<f64, D> {
    let mut output = input.to_owned();
    let last = Axis(output.ndim() - 1);
    for mut lane in output.lanes_mut(last) {
        let unit = normalize_vector([lane[0], lane[1], lane[2]]);
        lane.assign(&ArrayView1::from(&unit));
    }
    output
}

fn check_components(components: usize) -> Result<()> {
    if components != COMPONENTS {
        return Err(input_type(format!(
            "normalization expects {COMPONENTS} components per node, got {components}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn norm(v: [f64; 3]) -> f64 {
        (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
    }

    #[test]
    fn zero_vector_stays_zero() {
        assert_eq!(normalize_vector([0.0, 0.0, 0.0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn nonzero_vectors_have_unit_length() {
        let samples = [
            [1.0, 0.0, 0.0],
            [3.0, 4.0, 0.0],
            [-2.5, 7.1, 0.3],
            [1e-300, -1e-300, 2e-300],
            [f64::MIN_POSITIVE, 0.0, 0.0],
            [f64::MAX, f64::MAX, -f64::MAX],
            [1e200, 1.0, -1e-200],
        ];
        for v in samples {
            let unit = normalize_vector(v);
            assert!((norm(unit) - 1.0).abs() < 1e-6, "{v:?} -> {unit:?}");
        }
    }

    #[test]
    fn direction_is_preserved() {
        let unit = normalize_vector([3.0, 4.0, 0.0]);
        assert!((unit[0] - 0.6).abs() < 1e-12);
        assert!((unit[1] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn node_axis_is_normalized_row_by_row() {
        let iteration = array![[0.0, 0.0, 2.0], [0.0, 0.0, 0.0], [5.0, 0.0, 0.0]];
        let output = normalize_nodes(iteration.view()).unwrap();
        assert_eq!(output, array![[0.0, 0.0, 1.0], [0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
    }

    #[test]
    fn layered_input_keeps_layer_structure() {
        let mut layers = Array4::zeros((2, 2, 2, 3));
        layers[[0, 1, 1, 1]] = -4.0;
        layers[[1, 0, 0, 2]] = 0.5;
        let output = normalize_layers(layers.view()).unwrap();
        assert_eq!(output.dim(), (2, 2, 2, 3));
        assert_eq!(output[[0, 1, 1, 1]], -1.0);
        assert_eq!(output[[1, 0, 0, 2]], 1.0);
        assert_eq!(output[[1, 1, 1, 0]], 0.0);
    }

    #[test]
    fn wrong_component_count_is_rejected() {
        let iteration = Array2::<f64>::zeros((4, 2));
        assert!(normalize_nodes(iteration.view()).is_err());
    }
}
