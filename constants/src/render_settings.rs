/// Vertices sharing one colour/position in a rendered arrow glyph
pub const VERTEX_PAD_FACTOR: usize = 24;

/// Floats per node in the arrow-interleaved buffer (begin, tip, colour)
pub const ARROW_FLOATS_PER_NODE: usize = 9;

/// Components per vector, position or colour triple
pub const COMPONENTS: usize = 3;
