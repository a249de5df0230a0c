/// Basis-projection colour encoding
use crate::error::{Result, input_type};
use crate::normalization::is_zero;
use constants::reference_sets::project;
use constants::render_settings::COMPONENTS;
use ndarray::{Array, Array2, Array4, ArrayView, ArrayView2, ArrayView4, Axis, Dimension};

pub use constants::reference_sets::ReferenceSet;

/// Colour triple for one vector: its dot product with each reference vector.
/// The zero vector maps straight to black.
pub fn dot_product_color(v: [f64; 3], set: ReferenceSet) -> [f64; 3] {
    if is_zero(&v) {
        return [0.0; 3];
    }
    project(v, set.vectors())
}

/// Colour every node of one iteration (nodes x 3).
pub fn color_nodes(iteration: ArrayView2<f64>, set: ReferenceSet) -> Result<Array2<f64>> {
    check_components(iteration.ncols())?;
    Ok(color_lanes(iteration, set))
}

/// Colour a layered iteration (zc x yc x xc x 3), one layer at a time in layer order.
pub fn color_layers(layers: ArrayView4<f64>, set: ReferenceSet) -> Result<Array4<f64>> {
    check_components(layers.dim().3)?;
    let mut result = Array4::zeros(layers.raw_dim());
    for (layer, mut target) in layers.outer_iter().zip(result.outer_iter_mut()) {
        target.assign(&color_lanes(layer, set));
    }
    Ok(result)
}

fn color_lanes<D: Dimension>(input: ArrayView<f64, D>, set: ReferenceSet) -> Array<f64, D> {
    let mut output = input.to_owned();
    let last = Axis(output.ndim() - 1);
    for mut lane in output.lanes_mut(last) {
        let color = dot_product_color([lane[0], lane[1], lane[2]], set);
        for (slot, value) in lane.iter_mut().zip(color) {
            *slot = value;
        }
    }
    output
}

fn check_components(components: usize) -> Result<()> {
    if components != COMPONENTS {
        return Err(input_type(format!(
            "colour projection expects {COMPONENTS} components per node, got {components}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn zero_vector_is_black() {
        for set in [ReferenceSet::Oblique, ReferenceSet::StandardBasis] {
            assert_eq!(dot_product_color([0.0; 3], set), [0.0; 3]);
        }
    }

    #[test]
    fn standard_basis_is_identity() {
        let v = [0.36, -0.48, 0.8];
        assert_eq!(dot_product_color(v, ReferenceSet::StandardBasis), v);
    }

    #[test]
    fn oblique_set_projects_each_row() {
        let color = dot_product_color([1.0, 0.0, 0.0], ReferenceSet::Oblique);
        assert_eq!(color, [1.0, -1.0, 0.0]);
        let color = dot_product_color([0.0, 0.6, 0.8], ReferenceSet::Oblique);
        assert!((color[0] - 0.6).abs() < 1e-12);
        assert!((color[1] - 0.8).abs() < 1e-12);
        assert!((color[2] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn node_colours_follow_node_order() {
        let iteration = array![[0.0, 1.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let colors = color_nodes(iteration.view(), ReferenceSet::Oblique).unwrap();
        assert_eq!(colors, array![[1.0, 0.0, 1.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    }

    #[test]
    fn layers_are_reassembled_in_order() {
        let mut layers = Array4::zeros((3, 1, 2, 3));
        for z in 0..3 {
            layers[[z, 0, 1, z]] = 1.0;
        }
        let colors = color_layers(layers.view(), ReferenceSet::StandardBasis).unwrap();
        assert_eq!(colors, layers);
    }
}
