/// Stochastic decimation of vector fields.
///
/// Two policies live here and are kept apart:
/// - `BernoulliMask`: every spatial cell survives with probability `1/averaging`,
///   applied multiplicatively across the component axis.
/// - `UniqueIndexMask`: a fixed count of `floor(nodes/averaging)` shuffled node
///   indices is zeroed by assignment.
///
/// Both are owned by a `DecimationSession`, which builds each mask once and
/// hands the same instance to every iteration and to the outline.
use crate::error::{PipelineError, Result, input_type, shape};
use constants::render_settings::COMPONENTS;
use ndarray::{Array, ArrayView, Axis, Dimension, RemoveAxis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Binary keep/drop mask over a spatial shape, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct BernoulliMask {
    shape: Vec<usize>,
    keep: Vec<bool>,
}

impl BernoulliMask {
    /// Draw a mask where each cell is kept with probability `1/averaging`.
    pub fn compose<R: Rng + ?Sized>(spatial_shape: &[usize], averaging: usize, rng: &mut R) -> Result<Self> {
        check_averaging(averaging)?;
        let cells: usize = spatial_shape.iter().product();
        if spatial_shape.is_empty() || cells <= 1 {
            return Err(shape(format!(
                "cannot compose a mask over {spatial_shape:?}: at least two nodes are required"
            )));
        }

        let probability = 1.0 / averaging as f64;
        let keep = (0..cells).map(|_| rng.gen_bool(probability)).collect();
        Ok(Self {
            shape: spatial_shape.to_vec(),
            keep,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn kept(&self) -> usize {
        self.keep.iter().filter(|k| **k).count()
    }

    /// Multiply `data` by the mask. `data` is shaped (leading..., spatial..., 3);
    /// leading axes (iterations) are broadcast.
    pub fn apply<D: Dimension>(&self, data: ArrayView<f64, D>) -> Result<Array<f64, D>> {
        let rank = data.ndim();
        let spatial_rank = self.shape.len();
        if rank < spatial_rank + 1 || data.shape()[rank - 1] != COMPONENTS {
            return Err(input_type(format!(
                "mask over {:?} cannot be applied to tensor of shape {:?}",
                self.shape,
                data.shape()
            )));
        }
        let spatial = &data.shape()[rank - 1 - spatial_rank..rank - 1];
        if spatial != self.shape.as_slice() {
            return Err(shape(format!(
                "mask shape {:?} does not match spatial shape {spatial:?}",
                self.shape
            )));
        }

        let mut output = data.to_owned();
        let cells = self.keep.len();
        for (i, mut lane) in output.lanes_mut(Axis(rank - 1)).into_iter().enumerate() {
            if !self.keep[i % cells] {
                lane.fill(0.0);
            }
        }
        Ok(output)
    }
}

/// Fixed-count set of node indices to zero, sorted ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueIndexMask {
    node_count: usize,
    indices: Vec<usize>,
}

impl UniqueIndexMask {
    /// Shuffle `[0, node_count)` and keep the first `floor(node_count / averaging)` indices.
    pub fn select<R: Rng + ?Sized>(node_count: usize, averaging: usize, rng: &mut R) -> Result<Self> {
        check_averaging(averaging)?;
        let mut all: Vec<usize> = (0..node_count).collect();
        all.shuffle(rng);
        all.truncate(node_count / averaging);
        all.sort_unstable();
        Ok(Self {
            node_count,
            indices: all,
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Zeroed node indices, ascending
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Zero the selected nodes. `data` is shaped (leading..., nodes, 3).
    pub fn apply<D: RemoveAxis>(&self, data: ArrayView<f64, D>) -> Result<Array<f64, D>> {
        let rank = data.ndim();
        if rank < 2 || data.shape()[rank - 1] != COMPONENTS {
            return Err(input_type(format!(
                "index mask needs a (..., nodes, {COMPONENTS}) tensor, got {:?}",
                data.shape()
            )));
        }
        if data.shape()[rank - 2] != self.node_count {
            return Err(shape(format!(
                "index mask built for {} nodes, tensor has {}",
                self.node_count,
                data.shape()[rank - 2]
            )));
        }

        let mut output = data.to_owned();
        for &index in &self.indices {
            output.index_axis_mut(Axis(rank - 2), index).fill(0.0);
        }
        Ok(output)
    }
}

/// Per-run owner of the decimation masks.
/// Masks are drawn on first request and then reused unchanged; a request for
/// a different shape is rejected instead of silently redrawing.
pub struct DecimationSession {
    averaging: usize,
    rng: StdRng,
    bernoulli: Option<BernoulliMask>,
    unique: Option<UniqueIndexMask>,
}

impl DecimationSession {
    /// Create a session. A seed makes the drawn masks reproducible.
    pub fn new(averaging: usize, seed: Option<u64>) -> Result<Self> {
        check_averaging(averaging)?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            averaging,
            rng,
            bernoulli: None,
            unique: None,
        })
    }

    pub fn averaging(&self) -> usize {
        self.averaging
    }

    /// Bernoulli mask for `spatial_shape`, composed on first use.
    pub fn bernoulli(&mut self, spatial_shape: &[usize]) -> Result<&BernoulliMask> {
        match &self.bernoulli {
            Some(mask) if mask.shape() != spatial_shape => {
                return Err(shape(format!(
                    "session mask was built for {:?}, requested {spatial_shape:?}",
                    mask.shape()
                )));
            }
            Some(_) => {}
            None => {
                let mask = BernoulliMask::compose(spatial_shape, self.averaging, &mut self.rng)?;
                debug!(
                    "Composed bernoulli mask over {:?}: {}/{} cells kept",
                    spatial_shape,
                    mask.kept(),
                    mask.keep.len()
                );
                self.bernoulli = Some(mask);
            }
        }
        self.bernoulli
            .as_ref()
            .ok_or_else(|| shape("bernoulli mask missing after compose"))
    }

    /// Fixed-count index mask for `node_count` nodes, selected on first use.
    pub fn unique_indices(&mut self, node_count: usize) -> Result<&UniqueIndexMask> {
        match &self.unique {
            Some(mask) if mask.node_count() != node_count => {
                return Err(shape(format!(
                    "session index mask was built for {} nodes, requested {node_count}",
                    mask.node_count()
                )));
            }
            Some(_) => {}
            None => {
                let mask = UniqueIndexMask::select(node_count, self.averaging, &mut self.rng)?;
                debug!(
                    "Selected {} of {} nodes for zeroing",
                    mask.indices().len(),
                    node_count
                );
                self.unique = Some(mask);
            }
        }
        self.unique
            .as_ref()
            .ok_or_else(|| shape("index mask missing after select"))
    }
}

fn check_averaging(averaging: usize) -> Result<()> {
    if averaging == 0 {
        return Err(PipelineError::InvalidShape(
            "averaging factor must be at least 1".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, ArrayD, Ix3, IxDyn};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn field(iterations: usize, nodes: usize) -> Array3<f64> {
        Array3::from_shape_fn((iterations, nodes, 3), |(i, n, c)| (i + n + c + 1) as f64)
    }

    #[test]
    fn averaging_one_keeps_everything() {
        let mask = BernoulliMask::compose(&[4, 5], 1, &mut rng()).unwrap();
        assert_eq!(mask.kept(), 20);
    }

    #[test]
    fn keep_rate_tracks_averaging() {
        let mask = BernoulliMask::compose(&[100, 100], 4, &mut rng()).unwrap();
        let rate = mask.kept() as f64 / 10_000.0;
        assert!((rate - 0.25).abs() < 0.03, "rate {rate}");
    }

    #[test]
    fn bernoulli_mask_is_idempotent() {
        let data = field(3, 50).into_dyn();
        let mask = BernoulliMask::compose(&[50], 3, &mut rng()).unwrap();
        let once = mask.apply(data.view()).unwrap();
        let twice = mask.apply(once.view()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn bernoulli_mask_is_shared_across_iterations() {
        let data = field(4, 30).into_dyn();
        let mask = BernoulliMask::compose(&[30], 2, &mut rng()).unwrap();
        let masked = mask.apply(data.view()).unwrap().into_dimensionality::<Ix3>().unwrap();
        for node in 0..30 {
            let zeroed: Vec<bool> = (0..4).map(|i| masked[[i, node, 0]] == 0.0).collect();
            assert!(zeroed.iter().all(|z| *z == zeroed[0]), "node {node} differs");
        }
    }

    #[test]
    fn single_node_shape_is_rejected() {
        assert!(matches!(
            BernoulliMask::compose(&[1], 2, &mut rng()),
            Err(PipelineError::InvalidShape(_))
        ));
    }

    #[test]
    fn non_vector_tensor_is_rejected() {
        let mask = BernoulliMask::compose(&[4], 2, &mut rng()).unwrap();
        let scalars = ArrayD::<f64>::zeros(IxDyn(&[2, 4]));
        assert!(matches!(
            mask.apply(scalars.view()),
            Err(PipelineError::InvalidInputType(_))
        ));
        let index_mask = UniqueIndexMask::select(4, 2, &mut rng()).unwrap();
        assert!(matches!(
            index_mask.apply(scalars.view()),
            Err(PipelineError::InvalidInputType(_))
        ));
    }

    #[test]
    fn fixed_count_zeroes_exact_number_in_every_iteration() {
        let data = field(3, 10_000).into_dyn();
        let mask = UniqueIndexMask::select(10_000, 2, &mut rng()).unwrap();
        assert_eq!(mask.indices().len(), 5000);

        let masked = mask.apply(data.view()).unwrap().into_dimensionality::<Ix3>().unwrap();
        let zeroed = |iteration: usize| -> Vec<usize> {
            (0..10_000)
                .filter(|n| masked[[iteration, *n, 0]] == 0.0)
                .collect()
        };
        let first = zeroed(0);
        assert_eq!(first.len(), 5000);
        assert_eq!(first, mask.indices());
        assert_eq!(zeroed(1), first);
        assert_eq!(zeroed(2), first);
    }

    #[test]
    fn fixed_count_indices_are_unique() {
        let mask = UniqueIndexMask::select(101, 3, &mut rng()).unwrap();
        assert_eq!(mask.indices().len(), 33);
        let mut deduped = mask.indices().to_vec();
        deduped.dedup();
        assert_eq!(deduped.len(), 33);
    }

    #[test]
    fn session_reuses_mask_and_rejects_other_shapes() {
        let mut session = DecimationSession::new(2, Some(11)).unwrap();
        let first = session.bernoulli(&[6, 6]).unwrap().clone();
        let second = session.bernoulli(&[6, 6]).unwrap().clone();
        assert_eq!(first, second);
        assert!(session.bernoulli(&[6, 5]).is_err());
        assert_eq!(session.bernoulli(&[6, 6]).unwrap(), &first);
    }

    #[test]
    fn seeded_sessions_are_reproducible() {
        let mut a = DecimationSession::new(3, Some(42)).unwrap();
        let mut b = DecimationSession::new(3, Some(42)).unwrap();
        assert_eq!(
            a.unique_indices(64).unwrap().indices(),
            b.unique_indices(64).unwrap().indices()
        );
    }

    #[test]
    fn zero_averaging_is_rejected() {
        assert!(DecimationSession::new(0, None).is_err());
    }
}
