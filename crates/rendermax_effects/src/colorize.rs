//! Per-vertex color operations shared by the effects.
//!
//! Every operation touches the RGB of all six vertices of a tile and forces
//! alpha to fully opaque.

use rendermax_core::COLOR_COMPONENTS;

/// Fully opaque alpha.
pub const OPAQUE: f32 = 1.0;

/// Adds `rgb` to every vertex.
#[inline]
pub fn offset(color: &mut [f32], rgb: [f32; 3]) {
    for vertex in color.chunks_exact_mut(COLOR_COMPONENTS) {
        vertex[0] += rgb[0];
        vertex[1] += rgb[1];
        vertex[2] += rgb[2];
        vertex[3] = OPAQUE;
    }
}

/// Multiplies every vertex's RGB by `factor`.
#[inline]
pub fn scale(color: &mut [f32], factor: f32) {
    for vertex in color.chunks_exact_mut(COLOR_COMPONENTS) {
        vertex[0] *= factor;
        vertex[1] *= factor;
        vertex[2] *= factor;
        vertex[3] = OPAQUE;
    }
}

/// Whether every vertex has opaque alpha.
#[must_use]
pub fn is_opaque(color: &[f32]) -> bool {
    color
        .chunks_exact(COLOR_COMPONENTS)
        .all(|vertex| vertex[3] == OPAQUE)
}
