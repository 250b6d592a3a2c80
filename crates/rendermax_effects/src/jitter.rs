//! Color jitter - every redraw of a tile nudges its colors by a random offset
//!
//! The offset is sampled per call, not stored per tile: redrawing the same
//! tile twice gives two different results. Foreground and background get
//! independent offsets; all six vertices of a tile share them.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use rendermax_core::{
    GridSize, RenderResult, Renderer, SharedFrame, TileBufferView, ZoomCommand,
};

use crate::colorize;
use crate::forwarding::ForwardingRenderer;

/// Jitter effect parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    /// Width of the offset range; offsets fall in `[-amplitude/2, amplitude/2)`.
    pub amplitude: f32,
    /// RNG seed. `None` seeds from the clock.
    pub seed: Option<u64>,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            amplitude: 0.5,
            seed: None,
        }
    }
}

/// Decorator applying random per-call color offsets.
pub struct JitterRenderer {
    base: ForwardingRenderer,
    rng: ChaCha8Rng,
    amplitude: f32,
}

impl JitterRenderer {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Box<dyn Renderer>, config: &JitterConfig) -> Self {
        let seed = config.seed.unwrap_or_else(clock_seed);
        tracing::debug!(seed, amplitude = config.amplitude, "jitter effect created");
        Self {
            base: ForwardingRenderer::named("jitter", inner),
            rng: ChaCha8Rng::seed_from_u64(seed),
            amplitude: config.amplitude.max(0.0),
        }
    }

    /// Current amplitude.
    #[must_use]
    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0x9E37_79B9_7F4A_7C15, |d| d.as_nanos() as u64)
}

fn sample(rng: &mut ChaCha8Rng, amplitude: f32) -> [f32; 3] {
    let half = amplitude / 2.0;
    [
        rng.gen::<f32>() * amplitude - half,
        rng.gen::<f32>() * amplitude - half,
        rng.gen::<f32>() * amplitude - half,
    ]
}

fn jitter_tile(
    view: &mut TileBufferView<'_>,
    rng: &mut ChaCha8Rng,
    amplitude: f32,
    tile: usize,
) -> RenderResult<()> {
    let front = sample(rng, amplitude);
    let back = sample(rng, amplitude);
    let (fg, bg) = view.tile_colors(tile)?;
    colorize::offset(fg, front);
    colorize::offset(bg, back);
    Ok(())
}

impl Renderer for JitterRenderer {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn update_tile(&mut self, x: i32, y: i32) -> RenderResult<()> {
        self.base.update_tile(x, y)?;
        let Some(mut view) = self.base.tile_buffers() else {
            return Ok(());
        };
        let tile = view.tile_index(x, y)?;
        jitter_tile(&mut view, &mut self.rng, self.amplitude, tile)
    }

    fn update_all(&mut self) -> RenderResult<()> {
        self.base.update_all()?;
        let Some(mut view) = self.base.tile_buffers() else {
            tracing::trace!("backend exposes no tile buffers, jitter skipped");
            return Ok(());
        };
        for tile in 0..view.len() {
            jitter_tile(&mut view, &mut self.rng, self.amplitude, tile)?;
        }
        Ok(())
    }

    fn render(&mut self) -> RenderResult<()> {
        self.base.render()
    }

    fn set_fullscreen(&mut self) {
        self.base.set_fullscreen();
    }

    fn zoom(&mut self, command: ZoomCommand) {
        self.base.zoom(command);
    }

    fn resize(&mut self, width: i32, height: i32) -> RenderResult<()> {
        self.base.resize(width, height)
    }

    fn grid_resize(&mut self, width: i32, height: i32) -> RenderResult<()> {
        self.base.grid_resize(width, height)
    }

    fn mouse_coords(&self) -> Option<(i32, i32)> {
        self.base.mouse_coords()
    }

    fn uses_hardware_acceleration(&self) -> bool {
        self.base.uses_hardware_acceleration()
    }

    fn grid(&self) -> GridSize {
        self.base.grid()
    }

    fn frame(&self) -> SharedFrame {
        self.base.frame()
    }

    fn tile_buffers(&mut self) -> Option<TileBufferView<'_>> {
        self.base.tile_buffers()
    }

    fn inner(&self) -> Option<&dyn Renderer> {
        self.base.inner()
    }

    fn into_inner(self: Box<Self>) -> Result<Box<dyn Renderer>, Box<dyn Renderer>> {
        Ok(self.base.release())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendermax_core::{ScreenCell, SoftwareConfig, SoftwareRenderer};

    fn jitter(seed: u64, amplitude: f32) -> JitterRenderer {
        let backend = SoftwareRenderer::new(SoftwareConfig {
            grid: GridSize::new(4, 3),
            ..SoftwareConfig::default()
        })
        .unwrap();
        backend
            .frame()
            .write()
            .put_cell(1, 1, ScreenCell::new(b'#', 7, 8, false))
            .unwrap();
        JitterRenderer::new(
            Box::new(backend),
            &JitterConfig {
                amplitude,
                seed: Some(seed),
            },
        )
    }

    #[test]
    fn test_offsets_stay_in_range() {
        let mut r = jitter(7, 0.5);
        r.update_all().unwrap();

        let mut view = r.tile_buffers().unwrap();
        let tile = view.tile_index(1, 1).unwrap();
        let (fg, bg) = view.tile_colors(tile).unwrap();
        for v in fg.chunks_exact(4) {
            for c in v.iter().take(3) {
                assert!((c - 0.75).abs() <= 0.25 + 1e-6);
            }
        }
        for v in bg.chunks_exact(4) {
            for c in v.iter().take(3) {
                assert!((c - 0.5).abs() <= 0.25 + 1e-6);
            }
        }
    }

    #[test]
    fn test_same_offset_for_all_vertices() {
        let mut r = jitter(11, 0.5);
        r.update_tile(1, 1).unwrap();

        let mut view = r.tile_buffers().unwrap();
        let tile = view.tile_index(1, 1).unwrap();
        let fg = view.foreground(tile).unwrap();
        let first = [fg[0], fg[1], fg[2], fg[3]];
        for v in fg.chunks_exact(4) {
            assert_eq!(v, &first);
        }
    }

    #[test]
    fn test_alpha_opaque_after_jitter() {
        let mut r = jitter(3, 2.0);
        r.update_all().unwrap();
        let mut view = r.tile_buffers().unwrap();
        for tile in 0..view.len() {
            let (fg, bg) = view.tile_colors(tile).unwrap();
            assert!(colorize::is_opaque(fg));
            assert!(colorize::is_opaque(bg));
        }
    }

    #[test]
    fn test_offsets_resampled_per_call() {
        let mut r = jitter(5, 0.5);
        r.update_tile(1, 1).unwrap();
        let first = r.tile_buffers().unwrap().foreground(4).unwrap()[0];
        r.update_tile(1, 1).unwrap();
        let second = r.tile_buffers().unwrap().foreground(4).unwrap()[0];
        assert_ne!(first, second);
    }

    #[test]
    fn test_zero_amplitude_is_identity() {
        let mut r = jitter(1, 0.0);
        r.update_tile(1, 1).unwrap();
        let mut view = r.tile_buffers().unwrap();
        assert_eq!(&view.foreground(4).unwrap()[..4], &[0.75, 0.75, 0.75, 1.0]);
    }

    #[test]
    fn test_out_of_range_tile() {
        let mut r = jitter(1, 0.5);
        assert!(r.update_tile(4, 0).is_err());
    }
}
