//! Integration tests: fixed-count volume decimation.

mod common;

use common::*;
use vector_field_pipeline::{GridShape, LayerSelection, PipelineConfig, VectorFieldPipeline};

#[test]
fn half_of_ten_thousand_nodes_are_zeroed_in_every_iteration() {
    let grid = GridShape::new(100, 100, 1).unwrap();
    let pipeline = VectorFieldPipeline::new(PipelineConfig {
        layer: LayerSelection::Volume,
        averaging: 2,
        ..seeded_config(grid)
    })
    .unwrap();
    let field = ndarray::Array3::from_elem((3, 10_000, 3), 0.5);
    let output = pipeline.run(field.view(), outline(10_000).view()).unwrap();

    let zeroed = output.zeroed_indices.clone().unwrap();
    assert_eq!(zeroed.len(), 5000);

    for iteration in output.vectors.outer_iter() {
        let zero_nodes: Vec<usize> = (0..10_000)
            .filter(|n| iteration.row(*n).iter().all(|v| *v == 0.0))
            .collect();
        assert_eq!(zero_nodes, zeroed);
    }
    let zero_outline: Vec<usize> = (0..10_000)
        .filter(|n| output.outline.row(*n).iter().all(|v| *v == 0.0))
        .collect();
    assert_eq!(zero_outline, zeroed);
}

#[test]
fn volume_arrows_skip_zeroed_nodes() {
    let grid = GridShape::new(4, 4, 2).unwrap();
    let pipeline = VectorFieldPipeline::new(PipelineConfig {
        layer: LayerSelection::Volume,
        averaging: 4,
        ..seeded_config(grid)
    })
    .unwrap();
    let field = scaled_field(2, 32);
    let buffers = pipeline.render(field.view(), outline(32).view()).unwrap();
    let zeroed = buffers.output.zeroed_indices.clone().unwrap();
    assert_eq!(zeroed.len(), 8);

    for arrows in &buffers.arrows {
        for &node in &zeroed {
            let chunk = &arrows[node * 9..node * 9 + 9];
            assert!(chunk.iter().all(|v| *v == 0.0), "node {node}: {chunk:?}");
        }
    }
}
