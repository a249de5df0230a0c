/// Pipeline orchestrator composing masking, averaging, normalization, colour and layout stages.
use crate::color::{color_layers, color_nodes};
use crate::config::PipelineConfig;
use crate::convolution::{AveragingMode, convolve_channels, row_wise};
use crate::error::{PipelineError, Result, expect_shape, input_type, shape};
use crate::executor::ParallelExecutor;
use crate::grid::GridShape;
use crate::kernel::Kernel;
use crate::layout::{arrow_interleaved, vertex_padding};
use crate::masking::DecimationSession;
use crate::normalization::{normalize_layers, normalize_nodes};
use constants::render_settings::{ARROW_FLOATS_PER_NODE, COMPONENTS};
use ndarray::{Array, Array2, Array3, Array4, ArrayView2, ArrayView3, Dimension, s};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Which part of the grid a run processes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerSelection {
    /// Every layer: Bernoulli mask, normalize and colour layer by layer.
    #[default]
    All,
    /// One z layer: averaging, Bernoulli mask, normalize and colour.
    Index(usize),
    /// Whole volume: fixed-count index decimation, normalize and colour.
    Volume,
}

/// Raw per-node results of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Grid the nodes were taken from (depth 1 for a single layer). Row-wise
    /// averaging keeps only every `kernel_size`th node, so the node count can
    /// be smaller than the grid's; see [`PipelineOutput::lattice`].
    pub grid: GridShape,
    /// Unit vectors, shape (iterations, nodes, 3).
    pub vectors: Array3<f64>,
    /// Colour triples, shape (iterations, nodes, 3).
    pub colors: Array3<f64>,
    /// Decimated arrow start points, shape (nodes, 3).
    pub outline: Array2<f64>,
    /// Node indices zeroed by the fixed-count policy.
    pub zeroed_indices: Option<Vec<usize>>,
}

impl PipelineOutput {
    pub fn iterations(&self) -> usize {
        self.vectors.dim().0
    }

    pub fn node_count(&self) -> usize {
        self.vectors.dim().1
    }

    /// The grid when every one of its nodes is still present in the output,
    /// `None` once row-wise averaging has thinned the node axis.
    pub fn lattice(&self) -> Option<GridShape> {
        (self.grid.node_count() == self.node_count()).then_some(self.grid)
    }
}

/// Render-ready buffers plus the raw output they were built from.
#[derive(Debug, Clone)]
pub struct RenderBuffers {
    /// One arrow-interleaved buffer per iteration (9 floats per node).
    pub arrows: Vec<Vec<f32>>,
    /// One padded colour buffer per iteration (`3 * pad_factor` floats per node).
    pub vertex_colors: Vec<Vec<f32>>,
    pub output: PipelineOutput,
}

/// Vector-field colour/geometry pipeline.
/// Owns its configuration and one worker pool shared by every stage and every run.
pub struct VectorFieldPipeline {
    config: PipelineConfig,
    executor: ParallelExecutor,
}

impl VectorFieldPipeline {
    /// Validate the configuration and build the worker pool.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let executor = ParallelExecutor::new(config.threads)?;
        Ok(Self { config, executor })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn executor(&self) -> &ParallelExecutor {
        &self.executor
    }

    /// Fresh decimation session matching this pipeline's averaging and seed.
    pub fn session(&self) -> Result<DecimationSession> {
        DecimationSession::new(self.config.averaging, self.config.seed)
    }

    /// Run the configured procedure with a fresh decimation session.
    pub fn run(&self, field: ArrayView3<f64>, outline: ArrayView2<f64>) -> Result<PipelineOutput> {
        let mut session = self.session()?;
        self.run_with_session(field, outline, &mut session)
    }

    /// Run the configured procedure reusing the masks held by `session`.
    /// Lets an interactive caller keep the same decimation across runs on one grid.
    pub fn run_with_session(
        &self,
        field: ArrayView3<f64>,
        outline: ArrayView2<f64>,
        session: &mut DecimationSession,
    ) -> Result<PipelineOutput> {
        self.validate_inputs(&field, &outline)?;
        if session.averaging() != self.config.averaging {
            return Err(shape(format!(
                "session was built with averaging {}, pipeline uses {}",
                session.averaging(),
                self.config.averaging
            )));
        }

        let grid = self.config.grid;
        info!(
            "Processing {} iterations on {}x{}x{} grid ({:?})",
            field.dim().0,
            grid.xc,
            grid.yc,
            grid.zc,
            self.config.layer
        );

        let output = match self.config.layer {
            LayerSelection::All => self.full_pipeline(field, outline, session)?,
            LayerSelection::Index(layer) => {
                let range = grid.layer_range(layer)?;
                let layer_field = field.slice(s![.., range.clone(), ..]);
                let layer_outline = outline.slice(s![range, ..]);
                self.single_layer_pipeline(layer_field, layer_outline, grid.single_layer(), session)?
            }
            LayerSelection::Volume => self.volume_pipeline(field, outline, session)?,
        };

        info!(
            "Pipeline complete: {} iterations x {} nodes",
            output.iterations(),
            output.node_count()
        );
        Ok(output)
    }

    /// Run the configured procedure and lay the result out for rendering.
    pub fn render(&self, field: ArrayView3<f64>, outline: ArrayView2<f64>) -> Result<RenderBuffers> {
        let output = self.run(field, outline)?;
        let arrows = self.arrow_buffers(&output)?;
        let vertex_colors = self.vertex_buffers(&output, self.config.pad_factor)?;
        Ok(RenderBuffers {
            arrows,
            vertex_colors,
            output,
        })
    }

    /// Arrow-interleaved buffer for every iteration of `output`.
    pub fn arrow_buffers(&self, output: &PipelineOutput) -> Result<Vec<Vec<f32>>> {
        let outline = output.outline.clone();
        let normalize_begin = self.config.normalize_outline;

        let buffers = self.executor.map_independent(
            "arrow layout",
            owned_iterations(&output.vectors),
            self.config.stage_deadline(),
            move |_, tips: &Array2<f64>| arrow_interleaved(outline.view(), tips.view(), normalize_begin),
        )?;
        let expected = output.node_count() * ARROW_FLOATS_PER_NODE;
        for buffer in &buffers {
            expect_shape("arrow layout", &[buffer.len()], &[expected])?;
        }
        Ok(buffers)
    }

    /// Colour buffer for every iteration of `output`, each triple repeated `pad_factor` times.
    pub fn vertex_buffers(&self, output: &PipelineOutput, pad_factor: usize) -> Result<Vec<Vec<f32>>> {
        let buffers = self.executor.map_independent(
            "vertex padding",
            owned_iterations(&output.colors),
            self.config.stage_deadline(),
            move |_, colors: &Array2<f64>| vertex_padding(colors.view(), pad_factor),
        )?;
        let expected = output.node_count() * COMPONENTS * pad_factor;
        for buffer in &buffers {
            expect_shape("vertex padding", &[buffer.len()], &[expected])?;
        }
        Ok(buffers)
    }

    /// Shape and type checks run before any work is dispatched.
    fn validate_inputs(&self, field: &ArrayView3<f64>, outline: &ArrayView2<f64>) -> Result<()> {
        let (iterations, nodes, components) = field.dim();
        if components != COMPONENTS {
            return Err(input_type(format!(
                "field must have {COMPONENTS} components per node, got {components}"
            )));
        }
        if outline.ncols() != COMPONENTS {
            return Err(input_type(format!(
                "outline must have {COMPONENTS} components per node, got {}",
                outline.ncols()
            )));
        }
        self.config.grid.check_nodes(nodes)?;
        expect_shape("outline", outline.shape(), &[nodes, COMPONENTS])?;
        if let Some(expected) = self.config.iterations {
            if expected != iterations {
                return Err(shape(format!(
                    "expected {expected} iterations, field has {iterations}"
                )));
            }
        }
        Ok(())
    }

    /// All layers: reshape to (iterations, zc, yc, xc, 3), mask field and outline
    /// with one Bernoulli mask, normalize and colour per layer, then flatten back.
    fn full_pipeline(
        &self,
        field: ArrayView3<f64>,
        outline: ArrayView2<f64>,
        session: &mut DecimationSession,
    ) -> Result<PipelineOutput> {
        let grid = self.config.grid;
        let (iterations, nodes, _) = field.dim();
        let layer_shape = [grid.zc, grid.yc, grid.xc, COMPONENTS];

        let layered_field = field
            .to_shape((iterations, grid.zc, grid.yc, grid.xc, COMPONENTS))
            .map_err(|e| shape(format!("field reshape: {e}")))?;
        let layered_outline = outline
            .to_shape((grid.zc, grid.yc, grid.xc, COMPONENTS))
            .map_err(|e| shape(format!("outline reshape: {e}")))?;

        let mask = session.bernoulli(&[grid.zc, grid.yc, grid.xc])?.clone();
        let masked_outline = mask.apply(layered_outline.view())?;

        let items: Vec<Array4<f64>> = layered_field.outer_iter().map(|layers| layers.to_owned()).collect();
        let masked = self.executor.map_independent(
            "mask",
            items,
            self.config.stage_deadline(),
            move |_, layers: &Array4<f64>| mask.apply(layers.view()),
        )?;
        check_parts("mask", &masked, iterations, &layer_shape)?;

        let normalized = self.executor.map_independent(
            "normalize",
            masked,
            self.config.normalization_deadline(),
            |_, layers: &Array4<f64>| normalize_layers(layers.view()),
        )?;
        check_parts("normalize", &normalized, iterations, &layer_shape)?;

        let set = self.config.reference_set;
        let colored = self.executor.map_independent(
            "colour",
            normalized.clone(),
            self.config.stage_deadline(),
            move |_, layers: &Array4<f64>| color_layers(layers.view(), set),
        )?;
        check_parts("colour", &colored, iterations, &layer_shape)?;

        Ok(PipelineOutput {
            grid,
            vectors: gather(&normalized, nodes)?,
            colors: gather(&colored, nodes)?,
            outline: flatten_outline(&masked_outline, nodes)?,
            zeroed_indices: None,
        })
    }

    /// One layer: optional averaging, Bernoulli mask over the layer's nodes,
    /// normalize and colour.
    fn single_layer_pipeline(
        &self,
        field: ArrayView3<f64>,
        outline: ArrayView2<f64>,
        grid: GridShape,
        session: &mut DecimationSession,
    ) -> Result<PipelineOutput> {
        let (iterations, nodes, _) = field.dim();
        expect_shape("layer slice", &[nodes], &[grid.layer_len()])?;

        let items: Vec<Array2<f64>> = field.outer_iter().map(|view| view.to_owned()).collect();
        let (averaged, averaged_outline) = self.average_layer(items, outline, grid)?;
        let kept_nodes = averaged_outline.nrows();
        let node_shape = [kept_nodes, COMPONENTS];
        check_parts("averaging", &averaged, iterations, &node_shape)?;

        let mask = session.bernoulli(&[kept_nodes])?.clone();
        let masked_outline = mask.apply(averaged_outline.view())?;
        let masked = self.executor.map_independent(
            "mask",
            averaged,
            self.config.stage_deadline(),
            move |_, nodes: &Array2<f64>| mask.apply(nodes.view()),
        )?;
        check_parts("mask", &masked, iterations, &node_shape)?;

        let normalized = self.normalize_iterations(masked, iterations, &node_shape)?;
        let colored = self.color_iterations(normalized.clone(), iterations, &node_shape)?;

        Ok(PipelineOutput {
            grid,
            vectors: gather(&normalized, kept_nodes)?,
            colors: gather(&colored, kept_nodes)?,
            outline: masked_outline,
            zeroed_indices: None,
        })
    }

    /// Whole volume: zero a fixed count of shuffled nodes in every iteration
    /// and in the outline, then normalize and colour.
    fn volume_pipeline(
        &self,
        field: ArrayView3<f64>,
        outline: ArrayView2<f64>,
        session: &mut DecimationSession,
    ) -> Result<PipelineOutput> {
        let (iterations, nodes, _) = field.dim();
        let node_shape = [nodes, COMPONENTS];
        if self.config.averaging == 1 {
            warn!("Fixed-count decimation with averaging 1 zeroes every node");
        }

        let mask = session.unique_indices(nodes)?.clone();
        let masked_outline = mask.apply(outline)?;
        let zeroed = mask.indices().to_vec();
        let items: Vec<Array2<f64>> = field.outer_iter().map(|view| view.to_owned()).collect();
        let masked = self.executor.map_independent(
            "decimate",
            items,
            self.config.stage_deadline(),
            move |_, iteration: &Array2<f64>| mask.apply(iteration.view()),
        )?;
        check_parts("decimate", &masked, iterations, &node_shape)?;

        let normalized = self.normalize_iterations(masked, iterations, &node_shape)?;
        let colored = self.color_iterations(normalized.clone(), iterations, &node_shape)?;

        Ok(PipelineOutput {
            grid: self.config.grid,
            vectors: gather(&normalized, nodes)?,
            colors: gather(&colored, nodes)?,
            outline: masked_outline,
            zeroed_indices: Some(zeroed),
        })
    }

    /// Apply the configured averaging mode to every iteration of a layer.
    /// Row-wise averaging keeps every `kernel_size`th node of field and outline.
    fn average_layer(
        &self,
        items: Vec<Array2<f64>>,
        outline: ArrayView2<f64>,
        grid: GridShape,
    ) -> Result<(Vec<Array2<f64>>, Array2<f64>)> {
        let deadline = self.config.stage_deadline();
        let size = self.config.kernel_size;

        match self.config.averaging_mode {
            AveragingMode::None => Ok((items, outline.to_owned())),
            AveragingMode::RowWise => {
                let kernel = Kernel::flattened(size)?;
                debug!("Row-wise averaging with kernel {} and stride {}", size, size);
                let averaged = self.executor.map_independent(
                    "row-wise averaging",
                    items,
                    deadline,
                    move |_, iteration: &Array2<f64>| row_wise(iteration.view(), &kernel, size),
                )?;
                let decimated_outline = outline.slice(s![..;size, ..]).to_owned();
                Ok((averaged, decimated_outline))
            }
            AveragingMode::Windowed => {
                let kernel = Kernel::build(size, 2)?;
                debug!("Windowed averaging with {}x{} kernel", size, size);
                let averaged = self.executor.map_independent(
                    "windowed averaging",
                    items,
                    deadline,
                    move |_, iteration: &Array2<f64>| {
                        let plane = iteration
                            .to_shape((grid.yc, grid.xc, COMPONENTS))
                            .map_err(|e| shape(e.to_string()))?;
                        convolve_channels(plane.view().into_dyn(), &kernel)?
                            .into_shape_with_order((grid.layer_len(), COMPONENTS))
                            .map_err(|e| shape(e.to_string()))
                    },
                )?;
                Ok((averaged, outline.to_owned()))
            }
        }
    }

    fn normalize_iterations(
        &self,
        parts: Vec<Array2<f64>>,
        iterations: usize,
        node_shape: &[usize],
    ) -> Result<Vec<Array2<f64>>> {
        let normalized = self.executor.map_independent(
            "normalize",
            parts,
            self.config.normalization_deadline(),
            |_, nodes: &Array2<f64>| normalize_nodes(nodes.view()),
        )?;
        check_parts("normalize", &normalized, iterations, node_shape)?;
        Ok(normalized)
    }

    fn color_iterations(
        &self,
        parts: Vec<Array2<f64>>,
        iterations: usize,
        node_shape: &[usize],
    ) -> Result<Vec<Array2<f64>>> {
        let set = self.config.reference_set;
        let colored = self.executor.map_independent(
            "colour",
            parts,
            self.config.stage_deadline(),
            move |_, nodes: &Array2<f64>| color_nodes(nodes.view(), set),
        )?;
        check_parts("colour", &colored, iterations, node_shape)?;
        Ok(colored)
    }
}

/// One owned (nodes, 3) array per iteration, ready to move onto the pool.
fn owned_iterations(values: &Array3<f64>) -> Vec<Array2<f64>> {
    values.outer_iter().map(|iteration| iteration.to_owned()).collect()
}

/// Stage boundary check: one part per iteration, each of the expected shape.
fn check_parts<D: Dimension>(
    stage: &str,
    parts: &[Array<f64, D>],
    iterations: usize,
    expected: &[usize],
) -> Result<()> {
    expect_shape(stage, &[parts.len()], &[iterations])?;
    for part in parts {
        expect_shape(stage, part.shape(), expected)?;
    }
    Ok(())
}

/// Stack per-iteration parts into (iterations, nodes, 3) in row-major node order.
fn gather<D: Dimension>(parts: &[Array<f64, D>], nodes: usize) -> Result<Array3<f64>> {
    let mut result = Array3::zeros((parts.len(), nodes, COMPONENTS));
    for (part, mut target) in parts.iter().zip(result.outer_iter_mut()) {
        if part.len() != nodes * COMPONENTS {
            return Err(PipelineError::InvalidShape(format!(
                "cannot gather {} values into {nodes} nodes",
                part.len()
            )));
        }
        for (slot, value) in target.iter_mut().zip(part.iter()) {
            *slot = *value;
        }
    }
    Ok(result)
}

fn flatten_outline(layers: &Array4<f64>, nodes: usize) -> Result<Array2<f64>> {
    layers
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((nodes, COMPONENTS))
        .map_err(|e| shape(format!("outline flatten: {e}")))
}
