/// Reference vector sets used to project unit vectors onto colour triples
use serde::{Deserialize, Serialize};

/// Oblique set used for arrow colouring (rows are r1, r2, r3)
pub const OBLIQUE_REFERENCE_SET: [[f64; 3]; 3] = [
    [1.0, 1.0, 0.0],  // R = x + y
    [-1.0, 0.0, 1.0], // G = z - x
    [0.0, 1.0, 0.0],  // B = y
];

/// Standard basis used for axis-aligned colouring
pub const STANDARD_BASIS: [[f64; 3]; 3] = [
    [1.0, 0.0, 0.0], // R = x
    [0.0, 1.0, 0.0], // G = y
    [0.0, 0.0, 1.0], // B = z
];

/// Named reference set selectable from pipeline configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSet {
    #[default]
    Oblique,
    StandardBasis,
}

impl ReferenceSet {
    /// Rows of the reference matrix for this set.
    pub fn vectors(&self) -> &'static [[f64; 3]; 3] {
        match self {
            ReferenceSet::Oblique => &OBLIQUE_REFERENCE_SET,
            ReferenceSet::StandardBasis => &STANDARD_BASIS,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReferenceSet::Oblique => "oblique",
            ReferenceSet::StandardBasis => "standard basis",
        }
    }
}

/// Project a vector onto every row of a reference set.
pub fn project(vector: [f64; 3], set: &[[f64; 3]; 3]) -> [f64; 3] {
    let mut output = [0.0; 3];

    for i in 0..3 {
        for j in 0..3 {
            output[i] += set[i][j] * vector[j];
        }
    }

    output
}
