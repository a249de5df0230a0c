/// Render-ready buffer layouts for arrow glyphs
use crate::color::{ReferenceSet, dot_product_color};
use crate::error::{Result, input_type, shape};
use crate::normalization::{is_zero, normalize_vector};
use constants::render_settings::{ARROW_FLOATS_PER_NODE, COMPONENTS};
use half::f16;
use ndarray::ArrayView2;

/// Interleave arrow start, tip and colour per node: `[bx, by, bz, tx, ty, tz, r, g, b]`.
/// Nonzero tips are unit-normalized and coloured with the oblique set; zero
/// tips pass through with a black colour. When `normalize_begin` is set the
/// start point of every nonzero arrow is unit-normalized as well.
pub fn arrow_interleaved(
    outline: ArrayView2<f64>,
    tips: ArrayView2<f64>,
    normalize_begin: bool,
) -> Result<Vec<f32>> {
    check_components("outline", outline.ncols())?;
    check_components("tips", tips.ncols())?;
    if outline.nrows() != tips.nrows() {
        return Err(shape(format!(
            "outline has {} nodes but tips have {}",
            outline.nrows(),
            tips.nrows()
        )));
    }

    let mut interleaved = Vec::with_capacity(tips.nrows() * ARROW_FLOATS_PER_NODE);
    for (begin, tip) in outline.rows().into_iter().zip(tips.rows()) {
        let mut begin = [begin[0], begin[1], begin[2]];
        let mut tip = [tip[0], tip[1], tip[2]];
        let color = if is_zero(&tip) {
            [0.0; 3]
        } else {
            tip = normalize_vector(tip);
            if normalize_begin {
                begin = normalize_vector(begin);
            }
            dot_product_color(tip, ReferenceSet::Oblique)
        };
        interleaved.extend(begin.iter().chain(&tip).chain(&color).map(|v| *v as f32));
    }
    Ok(interleaved)
}

/// Repeat each node's triple `pad_factor` times and flatten.
/// One colour or position is shared by every vertex of the same glyph.
pub fn vertex_padding(triples: ArrayView2<f64>, pad_factor: usize) -> Result<Vec<f32>> {
    check_components("triples", triples.ncols())?;
    if pad_factor == 0 {
        return Err(shape("vertex pad factor must be positive"));
    }

    let mut padded = Vec::with_capacity(triples.nrows() * pad_factor * COMPONENTS);
    for row in triples.rows() {
        for _ in 0..pad_factor {
            padded.extend(row.iter().map(|v| *v as f32));
        }
    }
    Ok(padded)
}

/// Byte view of a float buffer for vertex-buffer upload.
pub fn as_bytes(buffer: &[f32]) -> &[u8] {
    bytemuck::cast_slice(buffer)
}

/// Half-precision copy of a float buffer for compact attribute upload.
pub fn to_half(buffer: &[f32]) -> Vec<f16> {
    buffer.iter().map(|v| f16::from_f32(*v)).collect()
}

fn check_components(name: &str, components: usize) -> Result<()> {
    if components != COMPONENTS {
        return Err(input_type(format!(
            "{name} must have {COMPONENTS} components per node, got {components}"
        )));
    }
    Ok(())
}
