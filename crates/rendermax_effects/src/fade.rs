//! # Opacity Fade
//!
//! Scales each tile's colors by a per-tile factor kept in an opacity map.
//!
//! ```text
//!   render thread                         any thread
//!   ─────────────                         ──────────
//!   FadeRenderer ──┐                  ┌── FadeHandle (clone)
//!                  ▼                  ▼
//!            Arc<Mutex<OpacityMap>>  (grid, one f32 per tile)
//! ```
//!
//! The map follows the renderer's grid: every resize rebuilds it, and a
//! colorize pass that finds the map out of step with the grid rebuilds it
//! under the same lock before reading. A pass never reads past the map.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use rendermax_core::{
    GridSize, RenderError, RenderResult, Renderer, SharedFrame, TileBufferView, ZoomCommand,
};

use crate::colorize;
use crate::forwarding::ForwardingRenderer;

/// What happens to existing factors when the map is rebuilt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizePolicy {
    /// Every factor goes back to the default.
    #[default]
    Reset,
    /// Tiles present in both grids keep their factor, by `(x, y)`.
    PreserveClip,
}

/// Fade effect parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FadeConfig {
    /// Factor given to new tiles.
    pub default_opacity: f32,
    /// Rebuild behavior.
    pub resize_policy: ResizePolicy,
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            default_opacity: 1.0,
            resize_policy: ResizePolicy::Reset,
        }
    }
}

/// Clamps a factor to `[0, 1]`; NaN becomes 0.
#[inline]
#[must_use]
pub fn clamp_factor(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Per-tile opacity factors, laid out like the tile buffers.
#[derive(Clone, Debug, PartialEq)]
pub struct OpacityMap {
    grid: GridSize,
    values: Vec<f32>,
    default: f32,
}

impl OpacityMap {
    /// Creates a map filled with `default`.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if the factors cannot be reserved.
    pub fn new(grid: GridSize, default: f32) -> RenderResult<Self> {
        let default = clamp_factor(default);
        Ok(Self {
            grid,
            values: factors(grid, default)?,
            default,
        })
    }

    /// A map sized for no grid at all. The next colorize pass rebuilds it.
    #[must_use]
    pub fn empty(default: f32) -> Self {
        Self {
            grid: GridSize::default(),
            values: Vec::new(),
            default: clamp_factor(default),
        }
    }

    /// Grid the map is sized for.
    #[inline]
    #[must_use]
    pub fn grid(&self) -> GridSize {
        self.grid
    }

    /// Number of factors.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the map holds no factors.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Factor given to new tiles.
    #[must_use]
    pub fn default_opacity(&self) -> f32 {
        self.default
    }

    /// All factors, tile order.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Rebuilds the map for `grid`.
    ///
    /// The old factors stay in place if the new storage cannot be reserved.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if the reservation fails.
    pub fn resize(&mut self, grid: GridSize, policy: ResizePolicy) -> RenderResult<()> {
        let mut values = factors(grid, self.default)?;

        if policy == ResizePolicy::PreserveClip {
            let keep_w = self.grid.width.min(grid.width);
            let keep_h = self.grid.height.min(grid.height);
            for x in 0..keep_w {
                let old = x * self.grid.height;
                let new = x * grid.height;
                values[new..new + keep_h].copy_from_slice(&self.values[old..old + keep_h]);
            }
        }

        self.grid = grid;
        self.values = values;
        Ok(())
    }

    /// Factor of tile `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` outside the grid.
    pub fn get(&self, x: i32, y: i32) -> RenderResult<f32> {
        Ok(self.values[self.grid.tile_index(x, y)?])
    }

    /// Sets the factor of tile `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` outside the grid.
    pub fn set(&mut self, x: i32, y: i32, value: f32) -> RenderResult<()> {
        let tile = self.grid.tile_index(x, y)?;
        self.values[tile] = clamp_factor(value);
        Ok(())
    }

    /// Factor by linear tile index.
    ///
    /// # Errors
    ///
    /// Returns `TileOutOfRange` past the end.
    pub fn factor(&self, tile: usize) -> RenderResult<f32> {
        self.values
            .get(tile)
            .copied()
            .ok_or(RenderError::TileOutOfRange {
                tile,
                len: self.values.len(),
            })
    }

    /// Sets a factor by linear tile index.
    ///
    /// # Errors
    ///
    /// Returns `TileOutOfRange` past the end.
    pub fn set_tile(&mut self, tile: usize, value: f32) -> RenderResult<()> {
        let len = self.values.len();
        let slot = self
            .values
            .get_mut(tile)
            .ok_or(RenderError::TileOutOfRange { tile, len })?;
        *slot = clamp_factor(value);
        Ok(())
    }

    /// Sets every factor.
    pub fn fill(&mut self, value: f32) {
        self.values.fill(clamp_factor(value));
    }

    /// Sets the factors of a rectangle, clipped to the grid. Returns how many
    /// tiles were written.
    pub fn fill_rect(&mut self, x: usize, y: usize, width: usize, height: usize, value: f32) -> usize {
        let value = clamp_factor(value);
        let x_end = x.saturating_add(width).min(self.grid.width);
        let y_end = y.saturating_add(height).min(self.grid.height);
        if x >= x_end || y >= y_end {
            return 0;
        }
        for column in x..x_end {
            let start = column * self.grid.height;
            self.values[start + y..start + y_end].fill(value);
        }
        (x_end - x) * (y_end - y)
    }

    /// Replaces all factors at once.
    ///
    /// # Errors
    ///
    /// Returns `TileOutOfRange` if `values` does not have one entry per tile.
    pub fn load(&mut self, values: &[f32]) -> RenderResult<()> {
        if values.len() != self.values.len() {
            return Err(RenderError::TileOutOfRange {
                tile: values.len(),
                len: self.values.len(),
            });
        }
        for (dst, src) in self.values.iter_mut().zip(values) {
            *dst = clamp_factor(*src);
        }
        Ok(())
    }
}

fn factors(grid: GridSize, value: f32) -> RenderResult<Vec<f32>> {
    let tiles = grid.buffer_len(1)?;
    let mut values = Vec::new();
    values
        .try_reserve_exact(tiles)
        .map_err(|_| RenderError::AllocationFailure { requested: tiles })?;
    values.resize(tiles, value);
    Ok(values)
}

/// Locks the map and brings it in step with `grid` if it drifted.
fn synced<'a>(
    map: &'a Mutex<OpacityMap>,
    grid: GridSize,
    policy: ResizePolicy,
) -> RenderResult<MutexGuard<'a, OpacityMap>> {
    let mut guard = map.lock();
    if guard.grid() != grid {
        tracing::warn!(
            map_width = guard.grid().width,
            map_height = guard.grid().height,
            width = grid.width,
            height = grid.height,
            "opacity map out of step with grid, rebuilding"
        );
        guard.resize(grid, policy)?;
    }
    Ok(guard)
}

fn fade_tile(view: &mut TileBufferView<'_>, map: &OpacityMap, tile: usize) -> RenderResult<()> {
    let factor = map.factor(tile)?;
    let (fg, bg) = view.tile_colors(tile)?;
    colorize::scale(fg, factor);
    colorize::scale(bg, factor);
    Ok(())
}

/// Cloneable access to a fade effect's opacity map from any thread.
#[derive(Clone, Debug)]
pub struct FadeHandle {
    map: Arc<Mutex<OpacityMap>>,
}

impl FadeHandle {
    /// Sets the factor of tile `(x, y)`, clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` outside the current grid.
    pub fn set(&self, x: i32, y: i32, value: f32) -> RenderResult<()> {
        self.map.lock().set(x, y, value)
    }

    /// Factor of tile `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` outside the current grid.
    pub fn get(&self, x: i32, y: i32) -> RenderResult<f32> {
        self.map.lock().get(x, y)
    }

    /// Sets a factor by linear tile index.
    ///
    /// # Errors
    ///
    /// Returns `TileOutOfRange` past the end.
    pub fn set_tile(&self, tile: usize, value: f32) -> RenderResult<()> {
        self.map.lock().set_tile(tile, value)
    }

    /// Sets every factor.
    pub fn fill(&self, value: f32) {
        self.map.lock().fill(value);
    }

    /// Sets a rectangle of factors, clipped to the grid.
    pub fn fill_rect(&self, x: usize, y: usize, width: usize, height: usize, value: f32) -> usize {
        self.map.lock().fill_rect(x, y, width, height, value)
    }

    /// Replaces all factors at once.
    ///
    /// # Errors
    ///
    /// Returns `TileOutOfRange` on a length mismatch.
    pub fn load(&self, values: &[f32]) -> RenderResult<()> {
        self.map.lock().load(values)
    }

    /// Re-initialises the map to `width x height`, all factors at the default.
    ///
    /// If this disagrees with the renderer's grid the next render pass
    /// rebuilds the map again.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimensions` or `AllocationFailure`.
    pub fn reinit(&self, width: i32, height: i32) -> RenderResult<()> {
        let grid = GridSize::from_signed(width, height)?;
        self.map.lock().resize(grid, ResizePolicy::Reset)
    }

    /// Grid the map is currently sized for.
    #[must_use]
    pub fn grid(&self) -> GridSize {
        self.map.lock().grid()
    }

    /// `(width, height)` of the map.
    #[must_use]
    pub fn dims(&self) -> (usize, usize) {
        let grid = self.grid();
        (grid.width, grid.height)
    }

    /// Number of factors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    /// Copy of the whole map.
    #[must_use]
    pub fn snapshot(&self) -> OpacityMap {
        self.map.lock().clone()
    }
}

/// Decorator scaling tile colors by per-tile opacity.
pub struct FadeRenderer {
    base: ForwardingRenderer,
    map: Arc<Mutex<OpacityMap>>,
    policy: ResizePolicy,
}

impl FadeRenderer {
    /// Wraps `inner` with a map sized to its grid.
    ///
    /// If the map cannot be allocated the effect starts with an empty map
    /// and the first colorize pass retries, returning `AllocationFailure` to
    /// the render loop if it fails again. The inner renderer is never lost.
    #[must_use]
    pub fn new(inner: Box<dyn Renderer>, config: &FadeConfig) -> Self {
        let map = OpacityMap::new(inner.grid(), config.default_opacity).unwrap_or_else(|err| {
            tracing::error!(error = %err, "opacity map allocation failed, deferring to first pass");
            OpacityMap::empty(config.default_opacity)
        });
        tracing::debug!(
            width = map.grid().width,
            height = map.grid().height,
            default = map.default_opacity(),
            "fade effect created"
        );
        Self {
            base: ForwardingRenderer::named("fade", inner),
            map: Arc::new(Mutex::new(map)),
            policy: config.resize_policy,
        }
    }

    /// A handle onto this effect's opacity map.
    #[must_use]
    pub fn handle(&self) -> FadeHandle {
        FadeHandle {
            map: Arc::clone(&self.map),
        }
    }

    /// Rebuild behavior.
    #[must_use]
    pub fn policy(&self) -> ResizePolicy {
        self.policy
    }

    fn reinit_map(&self) -> RenderResult<()> {
        let grid = self.base.grid();
        tracing::debug!(width = grid.width, height = grid.height, "opacity map reinitialised");
        self.map.lock().resize(grid, self.policy)
    }

    fn reinit_or_log(&self, cause: &str) {
        if let Err(err) = self.reinit_map() {
            tracing::error!(cause, error = %err, "opacity map rebuild failed");
        }
    }
}

impl Renderer for FadeRenderer {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn update_tile(&mut self, x: i32, y: i32) -> RenderResult<()> {
        self.base.update_tile(x, y)?;
        let Some(mut view) = self.base.tile_buffers() else {
            return Ok(());
        };
        let map = synced(&self.map, view.grid(), self.policy)?;
        let tile = view.tile_index(x, y)?;
        fade_tile(&mut view, &map, tile)
    }

    fn update_all(&mut self) -> RenderResult<()> {
        self.base.update_all()?;
        let Some(mut view) = self.base.tile_buffers() else {
            tracing::trace!("backend exposes no tile buffers, fade skipped");
            return Ok(());
        };
        let map = synced(&self.map, view.grid(), self.policy)?;
        for tile in 0..view.len() {
            fade_tile(&mut view, &map, tile)?;
        }
        Ok(())
    }

    fn render(&mut self) -> RenderResult<()> {
        self.base.render()
    }

    fn set_fullscreen(&mut self) {
        self.base.set_fullscreen();
        self.reinit_or_log("fullscreen");
    }

    fn zoom(&mut self, command: ZoomCommand) {
        self.base.zoom(command);
        self.reinit_or_log("zoom");
    }

    fn resize(&mut self, width: i32, height: i32) -> RenderResult<()> {
        self.base.resize(width, height)?;
        self.reinit_map()
    }

    fn grid_resize(&mut self, width: i32, height: i32) -> RenderResult<()> {
        self.base.grid_resize(width, height)?;
        self.reinit_map()
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

    fn backend(width: usize, height: usize) -> Box<dyn Renderer> {
        let backend = SoftwareRenderer::new(SoftwareConfig {
            grid: GridSize::new(width, height),
            ..SoftwareConfig::default()
        })
        .unwrap();
        {
            let frame = backend.frame();
            let mut state = frame.write();
            for x in 0..width as i32 {
                for y in 0..height as i32 {
                    state.put_cell(x, y, ScreenCell::new(b'@', 15, 8, false)).unwrap();
                }
            }
        }
        Box::new(backend)
    }

    fn rgb(view: &mut TileBufferView<'_>, tile: usize) -> ([f32; 4], [f32; 4]) {
        let (fg, bg) = view.tile_colors(tile).unwrap();
        (
            [fg[0], fg[1], fg[2], fg[3]],
            [bg[0], bg[1], bg[2], bg[3]],
        )
    }

    #[test]
    fn test_two_by_two_scenario() {
        let mut fade = FadeRenderer::new(backend(2, 2), &FadeConfig::default());
        fade.handle().load(&[1.0, 0.5, 0.0, 0.25]).unwrap();
        fade.update_all().unwrap();

        let mut view = fade.tile_buffers().unwrap();
        assert_eq!(rgb(&mut view, 0), ([1.0, 1.0, 1.0, 1.0], [0.5, 0.5, 0.5, 1.0]));
        assert_eq!(rgb(&mut view, 1), ([0.5, 0.5, 0.5, 1.0], [0.25, 0.25, 0.25, 1.0]));
        assert_eq!(rgb(&mut view, 2), ([0.0, 0.0, 0.0, 1.0], [0.0, 0.0, 0.0, 1.0]));
        assert_eq!(rgb(&mut view, 3), ([0.25, 0.25, 0.25, 1.0], [0.125, 0.125, 0.125, 1.0]));
    }

    #[test]
    fn test_all_vertices_faded() {
        let mut fade = FadeRenderer::new(backend(2, 2), &FadeConfig::default());
        fade.handle().set(1, 1, 0.5).unwrap();
        fade.update_tile(1, 1).unwrap();

        let mut view = fade.tile_buffers().unwrap();
        let (fg, bg) = view.tile_colors(3).unwrap();
        for v in fg.chunks_exact(4) {
            assert_eq!(v, &[0.5, 0.5, 0.5, 1.0]);
        }
        assert!(colorize::is_opaque(bg));
    }

    #[test]
    fn test_map_follows_grid_resize() {
        let mut fade = FadeRenderer::new(backend(2, 2), &FadeConfig::default());
        let handle = fade.handle();
        handle.fill(0.3);
        fade.grid_resize(5, 3).unwrap();
        assert_eq!(handle.len(), 15);
        assert_eq!(handle.dims(), (5, 3));
        assert!(handle.snapshot().values().iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_preserve_clip_keeps_overlap() {
        let config = FadeConfig {
            default_opacity: 0.9,
            resize_policy: ResizePolicy::PreserveClip,
        };
        let mut fade = FadeRenderer::new(backend(3, 3), &config);
        let handle = fade.handle();
        handle.set(1, 2, 0.2).unwrap();
        handle.set(2, 2, 0.4).unwrap();
        fade.grid_resize(2, 4).unwrap();

        assert_eq!(handle.get(1, 2).unwrap(), 0.2);
        assert_eq!(handle.get(1, 3).unwrap(), 0.9);
        assert!(handle.get(2, 2).is_err());
    }

    #[test]
    fn test_handle_reinit_is_healed() {
        let mut fade = FadeRenderer::new(backend(3, 2), &FadeConfig::default());
        let handle = fade.handle();
        handle.reinit(1, 1).unwrap();
        fade.update_all().unwrap();
        assert_eq!(handle.dims(), (3, 2));
    }

    #[test]
    fn test_zoom_reinitialises_to_new_grid() {
        let mut fade = FadeRenderer::new(backend(4, 4), &FadeConfig::default());
        fade.zoom(ZoomCommand::ZoomIn);
        let grid = fade.grid();
        assert_eq!(fade.handle().grid(), grid);
    }

    #[test]
    fn test_values_clamped() {
        let fade = FadeRenderer::new(backend(2, 2), &FadeConfig::default());
        let handle = fade.handle();
        handle.set(0, 0, 4.0).unwrap();
        handle.set(0, 1, -1.0).unwrap();
        handle.set(1, 0, f32::NAN).unwrap();
        assert_eq!(handle.snapshot().values(), &[1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut map = OpacityMap::new(GridSize::new(3, 3), 1.0).unwrap();
        assert_eq!(map.fill_rect(2, 1, 5, 5, 0.0), 2);
        assert_eq!(map.get(2, 1).unwrap(), 0.0);
        assert_eq!(map.get(2, 2).unwrap(), 0.0);
        assert_eq!(map.get(1, 1).unwrap(), 1.0);
        assert_eq!(map.fill_rect(3, 0, 1, 1, 0.0), 0);
    }

    #[test]
    fn test_load_length_mismatch() {
        let mut map = OpacityMap::new(GridSize::new(2, 2), 1.0).unwrap();
        assert!(matches!(
            map.load(&[0.5; 3]),
            Err(RenderError::TileOutOfRange { tile: 3, len: 4 })
        ));
    }

    #[test]
    fn test_failed_resize_keeps_map() {
        let mut fade = FadeRenderer::new(backend(2, 2), &FadeConfig::default());
        let handle = fade.handle();
        handle.fill(0.5);
        assert!(fade.grid_resize(-1, 2).is_err());
        assert_eq!(handle.dims(), (2, 2));
        assert!(handle.snapshot().values().iter().all(|v| *v == 0.5));
    }

    #[test]
    fn test_oversized_grid_resize_keeps_map() {
        let mut fade = FadeRenderer::new(backend(2, 2), &FadeConfig::default());
        let handle = fade.handle();
        handle.fill(0.5);
        assert!(matches!(
            fade.grid_resize(i32::MAX, i32::MAX),
            Err(RenderError::AllocationFailure { .. })
        ));
        assert_eq!(fade.grid(), GridSize::new(2, 2));
        assert_eq!(handle.dims(), (2, 2));
        assert!(handle.snapshot().values().iter().all(|v| *v == 0.5));
        fade.update_all().unwrap();
    }

    #[test]
    fn test_oversized_map_is_allocation_failure() {
        assert!(matches!(
            OpacityMap::new(GridSize::new(usize::MAX, 2), 1.0),
            Err(RenderError::AllocationFailure { .. })
        ));
        let mut map = OpacityMap::new(GridSize::new(2, 2), 0.5).unwrap();
        assert!(matches!(
            map.resize(GridSize::new(usize::MAX / 2, 2), ResizePolicy::Reset),
            Err(RenderError::AllocationFailure { .. })
        ));
        assert_eq!(map.len(), 4);
        assert!(matches!(
            FadeHandle { map: Arc::new(Mutex::new(map)) }.reinit(i32::MAX, i32::MAX),
            Err(RenderError::AllocationFailure { .. })
        ));
    }

    #[test]
    fn test_empty_map_is_built_on_first_pass() {
        let mut fade = FadeRenderer::new(backend(3, 2), &FadeConfig::default());
        let handle = fade.handle();
        *fade.map.lock() = OpacityMap::empty(0.5);
        assert!(handle.is_empty());
        fade.update_all().unwrap();
        assert_eq!(handle.dims(), (3, 2));
        assert!(handle.snapshot().values().iter().all(|v| *v == 0.5));
    }
}
