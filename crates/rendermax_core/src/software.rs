//! # Software Backend
//!
//! Headless backend that fills the per-tile vertex arrays on the CPU exactly
//! the way a GL backend would before upload, without ever touching a GPU.
//! It is the bottom link of every chain in tests and in the demo.
//!
//! ## Tile colors
//!
//! ```text
//! screen cell [glyph, fg, bg, bold]
//!     fg ──► palette[fg + 8 * bold] ──► 6 x RGBA in fg array
//!     bg ──► palette[bg]            ──► 6 x RGBA in bg array
//!     glyph / texpos ──► 16x16 atlas cell ──► 6 x UV in tex array
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{RenderError, RenderResult};
use crate::frame::{FrameState, SharedFrame, SCREEN_CELL_BYTES};
use crate::renderer::{Renderer, ZoomCommand};
use crate::tile::{GridSize, TileBufferView, TileBuffers, COLOR_COMPONENTS, TEXCOORD_COMPONENTS};

/// Glyphs per atlas row and column.
const ATLAS_SIDE: usize = 16;

/// Smallest cell edge the zoom can reach, in pixels.
const MIN_CELL_PX: i32 = 2;

/// Zoom steps allowed in either direction.
const MAX_ZOOM_STEPS: i32 = 16;

/// Classic 16-color console palette, RGB in `[0, 1]`.
pub const PALETTE: [[f32; 3]; 16] = [
    [0.0, 0.0, 0.0],
    [0.0, 0.0, 0.5],
    [0.0, 0.5, 0.0],
    [0.0, 0.5, 0.5],
    [0.5, 0.0, 0.0],
    [0.5, 0.0, 0.5],
    [0.5, 0.5, 0.0],
    [0.75, 0.75, 0.75],
    [0.5, 0.5, 0.5],
    [0.0, 0.0, 1.0],
    [0.0, 1.0, 0.0],
    [0.0, 1.0, 1.0],
    [1.0, 0.0, 0.0],
    [1.0, 0.0, 1.0],
    [1.0, 1.0, 0.0],
    [1.0, 1.0, 1.0],
];

/// Construction parameters for [`SoftwareRenderer`].
#[derive(Clone, Debug, PartialEq)]
pub struct SoftwareConfig {
    /// Initial tile grid.
    pub grid: GridSize,
    /// Natural cell width in pixels.
    pub cell_width: u32,
    /// Natural cell height in pixels.
    pub cell_height: u32,
    /// Display size used while fullscreen.
    pub fullscreen_size: (u32, u32),
    /// Value reported by `uses_hardware_acceleration`.
    pub hardware_accelerated: bool,
}

impl Default for SoftwareConfig {
    fn default() -> Self {
        Self {
            grid: GridSize::new(80, 25),
            cell_width: 8,
            cell_height: 12,
            fullscreen_size: (1920, 1080),
            hardware_accelerated: false,
        }
    }
}

impl SoftwareConfig {
    /// Display size that fits the grid exactly, or `None` if a side does not
    /// fit in a `u32`.
    #[must_use]
    pub fn display_size(&self) -> Option<(u32, u32)> {
        let side = |tiles: usize, cell: u32| u32::try_from(tiles).ok()?.checked_mul(cell);
        Some((
            side(self.grid.width, self.cell_width)?,
            side(self.grid.height, self.cell_height)?,
        ))
    }
}

#[derive(Debug, Default)]
struct Counters {
    tile_updates: AtomicU64,
    full_updates: AtomicU64,
    frames: AtomicU64,
    resizes: AtomicU64,
    grid_resizes: AtomicU64,
    zooms: AtomicU64,
    fullscreen_toggles: AtomicU64,
    last_dirty_tiles: AtomicU64,
}

/// Snapshot of backend call counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// `update_tile` calls.
    pub tile_updates: u64,
    /// `update_all` calls.
    pub full_updates: u64,
    /// Frames rendered.
    pub frames: u64,
    /// Display resizes.
    pub resizes: u64,
    /// Grid resizes requested by the host.
    pub grid_resizes: u64,
    /// Zoom commands.
    pub zooms: u64,
    /// Fullscreen toggles.
    pub fullscreen_toggles: u64,
    /// Tiles that differed from the shadow at the last `render`.
    pub last_dirty_tiles: u64,
}

/// Read-only access to a backend's counters after it was moved into a chain.
#[derive(Clone, Debug)]
pub struct StatsHandle {
    counters: Arc<Counters>,
}

impl StatsHandle {
    /// Current counter values.
    #[must_use]
    pub fn snapshot(&self) -> BackendStats {
        let c = &self.counters;
        BackendStats {
            tile_updates: c.tile_updates.load(Ordering::Relaxed),
            full_updates: c.full_updates.load(Ordering::Relaxed),
            frames: c.frames.load(Ordering::Relaxed),
            resizes: c.resizes.load(Ordering::Relaxed),
            grid_resizes: c.grid_resizes.load(Ordering::Relaxed),
            zooms: c.zooms.load(Ordering::Relaxed),
            fullscreen_toggles: c.fullscreen_toggles.load(Ordering::Relaxed),
            last_dirty_tiles: c.last_dirty_tiles.load(Ordering::Relaxed),
        }
    }
}

/// Headless CPU backend.
pub struct SoftwareRenderer {
    config: SoftwareConfig,
    frame: SharedFrame,
    buffers: TileBuffers,
    display: (u32, u32),
    windowed_display: (u32, u32),
    zoom_steps: i32,
    fullscreen: bool,
    mouse_px: Option<(i32, i32)>,
    counters: Arc<Counters>,
}

impl SoftwareRenderer {
    /// Creates a backend with the display sized to fit the grid exactly.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimensions` for an empty grid, a zero cell size or a
    /// display that overflows `u32`, and `AllocationFailure` if the buffers
    /// cannot be allocated.
    pub fn new(config: SoftwareConfig) -> RenderResult<Self> {
        let grid = config.grid;
        let invalid = || RenderError::InvalidDimensions {
            width: to_i32(grid.width),
            height: to_i32(grid.height),
        };
        if grid.tile_count() == 0 || config.cell_width == 0 || config.cell_height == 0 {
            return Err(invalid());
        }
        let display = config.display_size().ok_or_else(invalid)?;
        Ok(Self {
            frame: SharedFrame::new(FrameState::allocate(grid)?),
            buffers: TileBuffers::allocate(grid)?,
            display,
            windowed_display: display,
            zoom_steps: 0,
            fullscreen: false,
            mouse_px: None,
            counters: Arc::new(Counters::default()),
            config,
        })
    }

    /// Counter handle that stays valid after the backend is boxed.
    #[must_use]
    pub fn stats_handle(&self) -> StatsHandle {
        StatsHandle {
            counters: Arc::clone(&self.counters),
        }
    }

    /// Feeds the cursor position in display pixels (`None` = cursor left).
    pub fn set_mouse_position(&mut self, position: Option<(i32, i32)>) {
        self.mouse_px = position;
    }

    /// Display size in pixels.
    #[must_use]
    pub fn display_size(&self) -> (u32, u32) {
        self.display
    }

    /// Whether fullscreen is active.
    #[must_use]
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// Current zoom offset from the natural cell size.
    #[must_use]
    pub fn zoom_steps(&self) -> i32 {
        self.zoom_steps
    }

    /// Cell size in pixels at the current zoom.
    #[must_use]
    pub fn cell_size(&self) -> (u32, u32) {
        let scale = |natural: u32| {
            let px = i64::from(natural) + i64::from(self.zoom_steps);
            u32::try_from(px.max(i64::from(MIN_CELL_PX))).unwrap_or(u32::MAX)
        };
        (scale(self.config.cell_width), scale(self.config.cell_height))
    }

    fn reallocate(&mut self, grid: GridSize) -> RenderResult<()> {
        if grid == self.buffers.grid() {
            return Ok(());
        }
        let buffers = TileBuffers::allocate(grid)?;
        self.frame.reallocate(grid)?;
        self.buffers = buffers;
        tracing::debug!(width = grid.width, height = grid.height, "software backend reallocated");
        Ok(())
    }

    fn grid_for_display(&self, display: (u32, u32)) -> GridSize {
        let (cw, ch) = self.cell_size();
        GridSize::new(
            ((display.0 / cw) as usize).max(1),
            ((display.1 / ch) as usize).max(1),
        )
    }

    fn fit_grid_to_display(&mut self) -> RenderResult<()> {
        self.reallocate(self.grid_for_display(self.display))
    }

    fn refit_or_log(&mut self) {
        if let Err(err) = self.fit_grid_to_display() {
            tracing::error!(%err, "grid refit failed, keeping previous grid");
        }
    }

    fn draw_tile(&mut self, tile: usize) -> RenderResult<()> {
        let frame = self.frame.read();
        if frame.grid() != self.buffers.grid() {
            return Err(RenderError::StaleState {
                decorator: "software".to_owned(),
            });
        }

        let planes = &frame.current;
        let cell = &planes.screen[tile * SCREEN_CELL_BYTES..(tile + 1) * SCREEN_CELL_BYTES];
        let texpos = planes.texpos[tile];

        let (fg, bg) = if planes.texpos_grayscale[tile] != 0 {
            (
                PALETTE[usize::from(planes.texpos_cf[tile] & 15)],
                PALETTE[usize::from(planes.texpos_cbr[tile] & 15)],
            )
        } else if texpos > 0 && planes.texpos_addcolor[tile] == 0 {
            (PALETTE[15], PALETTE[0])
        } else {
            let bright = if cell[3] != 0 { 8 } else { 0 };
            (
                PALETTE[usize::from(cell[1].wrapping_add(bright) & 15)],
                PALETTE[usize::from(cell[2] & 15)],
            )
        };
        let glyph = if texpos > 0 {
            (texpos as usize) % (ATLAS_SIDE * ATLAS_SIDE)
        } else {
            usize::from(cell[0])
        };
        drop(frame);

        let mut view = self.buffers.view();
        let (fg_out, bg_out) = view.tile_colors(tile)?;
        write_color(fg_out, fg);
        write_color(bg_out, bg);
        write_texcoords(view.texcoord(tile)?, glyph);
        Ok(())
    }
}

fn write_color(out: &mut [f32], rgb: [f32; 3]) {
    for vertex in out.chunks_exact_mut(COLOR_COMPONENTS) {
        vertex[..3].copy_from_slice(&rgb);
        vertex[3] = 1.0;
    }
}

fn write_texcoords(out: &mut [f32], glyph: usize) {
    let step = 1.0 / ATLAS_SIDE as f32;
    let u0 = (glyph % ATLAS_SIDE) as f32 * step;
    let v0 = (glyph / ATLAS_SIDE) as f32 * step;
    let (u1, v1) = (u0 + step, v0 + step);
    let corners = [[u0, v0], [u1, v0], [u0, v1], [u1, v0], [u1, v1], [u0, v1]];
    for (vertex, corner) in out.chunks_exact_mut(TEXCOORD_COMPONENTS).zip(corners) {
        vertex.copy_from_slice(&corner);
    }
}

fn to_i32(v: usize) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

fn to_u32(v: usize) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

impl Renderer for SoftwareRenderer {
    fn name(&self) -> &str {
        "software"
    }

    fn update_tile(&mut self, x: i32, y: i32) -> RenderResult<()> {
        let tile = self.buffers.grid().tile_index(x, y)?;
        self.draw_tile(tile)?;
        self.counters.tile_updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn update_all(&mut self) -> RenderResult<()> {
        for tile in 0..self.buffers.grid().tile_count() {
            self.draw_tile(tile)?;
        }
        self.counters.full_updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn render(&mut self) -> RenderResult<()> {
        let mut frame = self.frame.write();
        let dirty = frame.dirty_tiles().len() as u64;
        frame.commit();
        drop(frame);

        self.counters.last_dirty_tiles.store(dirty, Ordering::Relaxed);
        let frames = self.counters.frames.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(frame = frames, dirty, "software frame presented");
        Ok(())
    }

    fn set_fullscreen(&mut self) {
        self.fullscreen = !self.fullscreen;
        if self.fullscreen {
            self.windowed_display = self.display;
            self.display = self.config.fullscreen_size;
        } else {
            self.display = self.windowed_display;
        }
        self.counters.fullscreen_toggles.fetch_add(1, Ordering::Relaxed);
        self.refit_or_log();
    }

    fn zoom(&mut self, command: ZoomCommand) {
        self.counters.zooms.fetch_add(1, Ordering::Relaxed);
        match command {
            ZoomCommand::ZoomIn => self.zoom_steps = (self.zoom_steps + 1).min(MAX_ZOOM_STEPS),
            ZoomCommand::ZoomOut => self.zoom_steps = (self.zoom_steps - 1).max(-MAX_ZOOM_STEPS),
            ZoomCommand::ZoomReset => self.zoom_steps = 0,
            ZoomCommand::ToggleFullscreen => {
                self.set_fullscreen();
                return;
            }
            ZoomCommand::ResetGrid => {}
        }
        self.refit_or_log();
    }

    fn resize(&mut self, width: i32, height: i32) -> RenderResult<()> {
        let size = GridSize::from_signed(width, height)?;
        let display = (to_u32(size.width), to_u32(size.height));
        self.counters.resizes.fetch_add(1, Ordering::Relaxed);
        self.reallocate(self.grid_for_display(display))?;
        self.display = display;
        if !self.fullscreen {
            self.windowed_display = display;
        }
        Ok(())
    }

    fn grid_resize(&mut self, width: i32, height: i32) -> RenderResult<()> {
        let grid = GridSize::from_signed(width, height)?;
        self.counters.grid_resizes.fetch_add(1, Ordering::Relaxed);
        self.reallocate(grid)
    }

    fn mouse_coords(&self) -> Option<(i32, i32)> {
        let (px, py) = self.mouse_px?;
        let (px, py) = (u32::try_from(px).ok()?, u32::try_from(py).ok()?);
        if px >= self.display.0 || py >= self.display.1 {
            return None;
        }
        let (cw, ch) = self.cell_size();
        let (tx, ty) = ((px / cw) as usize, (py / ch) as usize);
        let grid = self.buffers.grid();
        if tx >= grid.width || ty >= grid.height {
            return None;
        }
        Some((to_i32(tx), to_i32(ty)))
    }

    fn uses_hardware_acceleration(&self) -> bool {
        self.config.hardware_accelerated
    }

    fn grid(&self) -> GridSize {
        self.buffers.grid()
    }

    fn frame(&self) -> SharedFrame {
        self.frame.clone()
    }

    fn tile_buffers(&mut self) -> Option<TileBufferView<'_>> {
        Some(self.buffers.view())
    }

    fn into_inner(self: Box<Self>) -> Result<Box<dyn Renderer>, Box<dyn Renderer>> {
        Err(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ScreenCell;

    fn backend(w: usize, h: usize) -> SoftwareRenderer {
        SoftwareRenderer::new(SoftwareConfig {
            grid: GridSize::new(w, h),
            ..SoftwareConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_update_tile_writes_palette_colors() {
        let mut r = backend(2, 2);
        r.frame().write().put_cell(1, 0, ScreenCell::new(b'A', 4, 1, true)).unwrap();
        r.update_tile(1, 0).unwrap();

        let mut view = r.tile_buffers().unwrap();
        let tile = view.tile_index(1, 0).unwrap();
        let (fg, bg) = view.tile_colors(tile).unwrap();
        for v in fg.chunks_exact(4) {
            assert_eq!(v, &[1.0, 0.0, 0.0, 1.0]);
        }
        for v in bg.chunks_exact(4) {
            assert_eq!(v, &[0.0, 0.0, 0.5, 1.0]);
        }
    }

    #[test]
    fn test_update_tile_out_of_range() {
        let mut r = backend(2, 2);
        assert!(matches!(r.update_tile(2, 0), Err(RenderError::OutOfRange { .. })));
        assert_eq!(r.stats_handle().snapshot().tile_updates, 0);
    }

    #[test]
    fn test_texcoords_follow_glyph() {
        let mut r = backend(1, 1);
        r.frame().write().put_cell(0, 0, ScreenCell::new(17, 7, 0, false)).unwrap();
        r.update_all().unwrap();

        let mut view = r.tile_buffers().unwrap();
        let tex = view.texcoord(0).unwrap();
        let step = 1.0 / 16.0;
        assert_eq!(&tex[..2], &[step, step]);
        assert_eq!(&tex[8..10], &[2.0 * step, 2.0 * step]);
    }

    #[test]
    fn test_grid_resize_reallocates_shared_frame() {
        let mut r = backend(2, 2);
        let frame = r.frame();
        r.grid_resize(5, 3).unwrap();

        assert_eq!(r.grid(), GridSize::new(5, 3));
        assert_eq!(frame.read().grid(), GridSize::new(5, 3));
        assert_eq!(frame.generation(), 1);
        assert_eq!(r.tile_buffers().unwrap().len(), 15);
    }

    #[test]
    fn test_resize_fits_grid_to_display() {
        let mut r = backend(10, 10);
        r.resize(160, 120).unwrap();
        assert_eq!(r.grid(), GridSize::new(20, 10));
        assert!(r.resize(0, 10).is_err());
    }

    #[test]
    fn test_zoom_changes_grid() {
        let mut r = backend(10, 10);
        r.zoom(ZoomCommand::ZoomIn);
        assert_eq!(r.cell_size(), (9, 13));
        assert_eq!(r.grid(), GridSize::new(8, 9));
        r.zoom(ZoomCommand::ZoomReset);
        assert_eq!(r.grid(), GridSize::new(10, 10));
        assert_eq!(r.stats_handle().snapshot().zooms, 2);
    }

    #[test]
    fn test_oversized_grid_resize_keeps_grid() {
        let mut r = backend(2, 2);
        let frame = r.frame();
        assert!(matches!(
            r.grid_resize(i32::MAX, i32::MAX),
            Err(RenderError::AllocationFailure { .. })
        ));
        assert_eq!(r.grid(), GridSize::new(2, 2));
        assert_eq!(frame.read().grid(), GridSize::new(2, 2));
        assert_eq!(frame.generation(), 0);
        r.update_all().unwrap();
    }

    #[test]
    fn test_oversized_resize_keeps_display() {
        let mut r = backend(2, 2);
        assert!(matches!(
            r.resize(i32::MAX, i32::MAX),
            Err(RenderError::AllocationFailure { .. })
        ));
        assert_eq!(r.grid(), GridSize::new(2, 2));
        assert_eq!(r.display_size(), (16, 24));
    }

    #[test]
    fn test_display_overflow_is_invalid() {
        let config = SoftwareConfig {
            cell_width: u32::MAX,
            ..SoftwareConfig::default()
        };
        assert_eq!(config.display_size(), None);
        assert!(matches!(
            SoftwareRenderer::new(config),
            Err(RenderError::InvalidDimensions { width: 80, height: 25 })
        ));
        assert_eq!(SoftwareConfig::default().display_size(), Some((640, 300)));
    }

    #[test]
    fn test_fullscreen_round_trip() {
        let mut r = backend(10, 10);
        r.set_fullscreen();
        assert!(r.is_fullscreen());
        assert_eq!(r.display_size(), (1920, 1080));
        assert_eq!(r.grid(), GridSize::new(240, 90));

        r.zoom(ZoomCommand::ToggleFullscreen);
        assert!(!r.is_fullscreen());
        assert_eq!(r.grid(), GridSize::new(10, 10));
    }

    #[test]
    fn test_mouse_coords() {
        let mut r = backend(10, 10);
        assert_eq!(r.mouse_coords(), None);
        r.set_mouse_position(Some((17, 25)));
        assert_eq!(r.mouse_coords(), Some((2, 2)));
        r.set_mouse_position(Some((80, 0)));
        assert_eq!(r.mouse_coords(), None);
        r.set_mouse_position(Some((-1, 0)));
        assert_eq!(r.mouse_coords(), None);
    }

    #[test]
    fn test_render_commits_shadow() {
        let mut r = backend(2, 2);
        let stats = r.stats_handle();
        r.frame().write().put_cell(0, 1, ScreenCell::new(1, 1, 1, false)).unwrap();
        r.render().unwrap();
        assert_eq!(stats.snapshot().last_dirty_tiles, 1);
        r.render().unwrap();
        assert_eq!(stats.snapshot().last_dirty_tiles, 0);
        assert_eq!(stats.snapshot().frames, 2);
    }

    #[test]
    fn test_backend_cannot_be_unwrapped() {
        let r: Box<dyn Renderer> = Box::new(backend(1, 1));
        let back = r.into_inner().err().unwrap();
        assert_eq!(back.name(), "software");
    }
}
