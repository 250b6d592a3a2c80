//! Shared frame state for a renderer chain.
//!
//! The backend owns the drawable surfaces of the current frame. Every
//! decorator stacked on top of it holds a clone of the same [`SharedFrame`]
//! handle, so the host can write through the outermost decorator and the
//! backend reads the very same planes. Nothing is ever copied between
//! chain links.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{RenderError, RenderResult};
use crate::tile::GridSize;

/// Bytes per screen cell: glyph, foreground index, background index, bold.
pub const SCREEN_CELL_BYTES: usize = 4;

/// One screen cell as the host writes it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScreenCell {
    /// Glyph index into the 16x16 atlas.
    pub glyph: u8,
    /// Foreground palette index (0-15).
    pub fg: u8,
    /// Background palette index (0-15).
    pub bg: u8,
    /// Bright flag, selects the upper half of the palette for `fg`.
    pub bold: bool,
}

impl ScreenCell {
    /// Creates a cell.
    #[must_use]
    pub const fn new(glyph: u8, fg: u8, bg: u8, bold: bool) -> Self {
        Self { glyph, fg, bg, bold }
    }
}

/// One set of per-tile planes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScreenPlanes {
    /// Screen cells, `SCREEN_CELL_BYTES` per tile.
    pub screen: Vec<u8>,
    /// Graphic tile texture positions (0 = use the glyph).
    pub texpos: Vec<i32>,
    /// Add-color flags for graphic tiles.
    pub texpos_addcolor: Vec<u8>,
    /// Grayscale flags for graphic tiles.
    pub texpos_grayscale: Vec<u8>,
    /// Foreground color for grayscale graphic tiles.
    pub texpos_cf: Vec<u8>,
    /// Bright/background color for grayscale graphic tiles.
    pub texpos_cbr: Vec<u8>,
}

impl ScreenPlanes {
    /// Allocates cleared planes for `tiles` tiles.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if any plane cannot be reserved or its
    /// length overflows `usize`.
    pub fn allocate(tiles: usize) -> RenderResult<Self> {
        let screen = tiles
            .checked_mul(SCREEN_CELL_BYTES)
            .ok_or(RenderError::AllocationFailure { requested: usize::MAX })?;
        Ok(Self {
            screen: filled(screen, 0u8)?,
            texpos: filled(tiles, 0i32)?,
            texpos_addcolor: filled(tiles, 0u8)?,
            texpos_grayscale: filled(tiles, 0u8)?,
            texpos_cf: filled(tiles, 0u8)?,
            texpos_cbr: filled(tiles, 0u8)?,
        })
    }

    /// Number of tiles the planes cover.
    #[must_use]
    pub fn tiles(&self) -> usize {
        self.texpos.len()
    }
}

fn filled<T: Clone>(len: usize, value: T) -> RenderResult<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| RenderError::AllocationFailure { requested: len })?;
    buf.resize(len, value);
    Ok(buf)
}

/// Drawable state of the current frame plus the previous frame's shadows.
#[derive(Clone, Debug, Default)]
pub struct FrameState {
    grid: GridSize,
    /// Planes the host draws into.
    pub current: ScreenPlanes,
    /// Planes as of the last `render()`, used for diffing.
    pub previous: ScreenPlanes,
}

impl FrameState {
    /// Allocates frame state for `grid`.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if the planes cannot be reserved.
    pub fn allocate(grid: GridSize) -> RenderResult<Self> {
        let tiles = grid.buffer_len(1)?;
        Ok(Self {
            grid,
            current: ScreenPlanes::allocate(tiles)?,
            previous: ScreenPlanes::allocate(tiles)?,
        })
    }

    /// Grid the planes are laid out for.
    #[inline]
    #[must_use]
    pub fn grid(&self) -> GridSize {
        self.grid
    }

    /// Reads one cell of the current screen.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` when `(x, y)` is outside the grid.
    pub fn cell(&self, x: i32, y: i32) -> RenderResult<ScreenCell> {
        let tile = self.grid.tile_index(x, y)?;
        let s = &self.current.screen[tile * SCREEN_CELL_BYTES..(tile + 1) * SCREEN_CELL_BYTES];
        Ok(ScreenCell::new(s[0], s[1], s[2], s[3] != 0))
    }

    /// Writes one cell of the current screen.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` when `(x, y)` is outside the grid.
    pub fn put_cell(&mut self, x: i32, y: i32, cell: ScreenCell) -> RenderResult<()> {
        let tile = self.grid.tile_index(x, y)?;
        let s = &mut self.current.screen[tile * SCREEN_CELL_BYTES..(tile + 1) * SCREEN_CELL_BYTES];
        s[0] = cell.glyph;
        s[1] = cell.fg;
        s[2] = cell.bg;
        s[3] = u8::from(cell.bold);
        Ok(())
    }

    /// Writes every cell of the current screen, `make(x, y)` giving the
    /// value for each in-grid coordinate.
    pub fn fill_cells(&mut self, mut make: impl FnMut(usize, usize) -> ScreenCell) {
        let cells = self.current.screen.chunks_exact_mut(SCREEN_CELL_BYTES);
        for ((x, y), s) in self.grid.coords().zip(cells) {
            let cell = make(x, y);
            s[0] = cell.glyph;
            s[1] = cell.fg;
            s[2] = cell.bg;
            s[3] = u8::from(cell.bold);
        }
    }

    /// Tiles whose current cell or texture position differs from the shadow.
    #[must_use]
    pub fn dirty_tiles(&self) -> Vec<usize> {
        (0..self.grid.tile_count())
            .filter(|&tile| {
                let range = tile * SCREEN_CELL_BYTES..(tile + 1) * SCREEN_CELL_BYTES;
                self.current.screen[range.clone()] != self.previous.screen[range]
                    || self.current.texpos[tile] != self.previous.texpos[tile]
            })
            .collect()
    }

    /// Copies the current planes into the shadows.
    pub fn commit(&mut self) {
        self.previous.clone_from(&self.current);
    }
}

/// Handle to a frame state shared by every link of a renderer chain.
///
/// Cloning is cheap (refcount). Two handles are the "same" frame when
/// [`SharedFrame::same_as`] holds; the generation counter tells callers
/// whether the planes were reallocated since they last looked.
#[derive(Clone, Debug)]
pub struct SharedFrame {
    state: Arc<RwLock<FrameState>>,
    generation: Arc<AtomicU64>,
}

impl SharedFrame {
    /// Wraps freshly allocated frame state.
    #[must_use]
    pub fn new(state: FrameState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Read access to the planes.
    pub fn read(&self) -> RwLockReadGuard<'_, FrameState> {
        self.state.read()
    }

    /// Write access to the planes.
    pub fn write(&self) -> RwLockWriteGuard<'_, FrameState> {
        self.state.write()
    }

    /// Whether both handles reference the same frame state.
    #[inline]
    #[must_use]
    pub fn same_as(&self, other: &SharedFrame) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Reallocation generation, bumped by [`SharedFrame::reallocate`].
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Replaces the planes with fresh ones for `grid`.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if the new planes cannot be reserved.
    /// The old planes are left untouched in that case.
    pub fn reallocate(&self, grid: GridSize) -> RenderResult<()> {
        let fresh = FrameState::allocate(grid)?;
        *self.state.write() = fresh;
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
