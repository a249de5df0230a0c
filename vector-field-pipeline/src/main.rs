/// Demo runner: synthesizes a rotating vortex field and lays it out for rendering
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array3;
use std::env;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vector_field_pipeline::layout::{as_bytes, to_half};
use vector_field_pipeline::{GridHeader, GridShape, PipelineConfig, VectorFieldPipeline};

const DEMO_ITERATIONS: usize = 16;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        eprintln!("Usage: {} [config.json]", args[0]);
        std::process::exit(1);
    }

    let header = GridHeader {
        xnodes: 32,
        ynodes: 32,
        znodes: 4,
        xbase: 0.0,
        ybase: 0.0,
        zbase: 0.0,
        xstepsize: 5e-9,
        ystepsize: 5e-9,
        zstepsize: 2e-9,
    };
    let grid = header.shape()?;

    let config = match args.get(1) {
        Some(path) => PipelineConfig::from_path(Path::new(path))?,
        None => PipelineConfig::new(grid),
    };
    if config.grid != grid {
        return Err(format!(
            "demo field is {}x{}x{}, config asks for {}x{}x{}",
            grid.xc, grid.yc, grid.zc, config.grid.xc, config.grid.yc, config.grid.zc
        )
        .into());
    }

    let field = vortex_field(&grid, DEMO_ITERATIONS);
    let outline = header.outline()?;

    let (width, height, depth) = header.dimensions();
    info!(
        "Demo grid spans {:.1e} x {:.1e} x {:.1e} m",
        width, height, depth
    );

    let pipeline = VectorFieldPipeline::new(config)?;
    info!(
        "Running {:?} with the {} reference set on {} threads",
        pipeline.config().layer,
        pipeline.config().reference_set.name(),
        pipeline.executor().threads()
    );
    let buffers = pipeline.render(field.view(), outline.view())?;

    let pb = ProgressBar::new(buffers.arrows.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.green/blue}] {pos}/{len} iterations ({percent}%) {msg}")?
            .progress_chars("▉▊▋▌▍▎▏ "),
    );
    pb.set_message("Summarizing buffers");

    let mut arrow_bytes = 0;
    let mut visible_arrows = 0;
    for arrows in &buffers.arrows {
        arrow_bytes += as_bytes(arrows).len();
        visible_arrows += arrows
            .chunks_exact(9)
            .filter(|node| node[3..6].iter().any(|v| *v != 0.0))
            .count();
        pb.inc(1);
    }
    pb.finish_with_message("Buffers summarized");

    let vertex_floats: usize = buffers.vertex_colors.iter().map(Vec::len).sum();
    let half_colour_bytes: usize = buffers
        .vertex_colors
        .iter()
        .map(|colors| std::mem::size_of_val(to_half(colors).as_slice()))
        .sum();
    info!(
        "{} iterations x {} nodes: {} visible arrows, {} arrow bytes, {} vertex colour floats ({} bytes as f16)",
        buffers.output.iterations(),
        buffers.output.node_count(),
        visible_arrows,
        arrow_bytes,
        vertex_floats,
        half_colour_bytes
    );

    Ok(())
}

/// Vortex centred in each layer, rotating a little every iteration.
/// The core node of every layer is left at zero.
fn vortex_field(grid: &GridShape, iterations: usize) -> Array3<f64> {
    let cx = (grid.xc / 2) as f64;
    let cy = (grid.yc / 2) as f64;

    Array3::from_shape_fn((iterations, grid.node_count(), 3), |(t, node, axis)| {
        let x = (node % grid.xc) as f64 - cx;
        let y = ((node / grid.xc) % grid.yc) as f64 - cy;
        let z = (node / grid.layer_len()) as f64;
        if x == 0.0 && y == 0.0 {
            return 0.0;
        }
        let angle = y.atan2(x) + t as f64 * 0.2;
        match axis {
            0 => -angle.sin(),
            1 => angle.cos(),
            _ => 0.1 * z,
        }
    })
}
