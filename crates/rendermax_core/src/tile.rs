//! # Tile Buffers
//!
//! Per-tile vertex arrays as the backend uploads them.
//!
//! ```text
//! tile = x * grid_height + y
//!
//! fg  [ tile 0: 6 x RGBA ][ tile 1: 6 x RGBA ] ...   24 floats per tile
//! bg  [ tile 0: 6 x RGBA ][ tile 1: 6 x RGBA ] ...   24 floats per tile
//! tex [ tile 0: 6 x UV   ][ tile 1: 6 x UV   ] ...   12 floats per tile
//! ```
//!
//! Six vertices per tile are the two triangles of the tile quad. Callers must
//! keep these strides exactly.

use crate::error::{RenderError, RenderResult};

/// Vertices per tile quad (two triangles).
pub const VERTICES_PER_TILE: usize = 6;

/// Components per color vertex (RGBA).
pub const COLOR_COMPONENTS: usize = 4;

/// Components per texture coordinate vertex (UV).
pub const TEXCOORD_COMPONENTS: usize = 2;

/// Floats occupied by one tile in a color array.
pub const COLOR_STRIDE: usize = VERTICES_PER_TILE * COLOR_COMPONENTS;

/// Floats occupied by one tile in the texture coordinate array.
pub const TEXCOORD_STRIDE: usize = VERTICES_PER_TILE * TEXCOORD_COMPONENTS;

/// Dimensions of the tile grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GridSize {
    /// Columns.
    pub width: usize,
    /// Rows.
    pub height: usize,
}

impl GridSize {
    /// Creates a grid size.
    #[inline]
    #[must_use]
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Converts host-supplied signed dimensions.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimensions` if either side is zero or negative.
    pub fn from_signed(width: i32, height: i32) -> RenderResult<Self> {
        match (usize::try_from(width), usize::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok(Self::new(w, h)),
            _ => Err(RenderError::InvalidDimensions { width, height }),
        }
    }

    /// Number of tiles, saturating at `usize::MAX`.
    #[inline]
    #[must_use]
    pub const fn tile_count(&self) -> usize {
        self.width.saturating_mul(self.height)
    }

    /// Number of tiles, or `None` if it does not fit in a `usize`.
    #[inline]
    #[must_use]
    pub const fn checked_tile_count(&self) -> Option<usize> {
        self.width.checked_mul(self.height)
    }

    /// Elements a per-tile array needs at `stride` elements per tile.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if the length overflows `usize`.
    pub fn buffer_len(&self, stride: usize) -> RenderResult<usize> {
        self.checked_tile_count()
            .and_then(|tiles| tiles.checked_mul(stride))
            .ok_or(RenderError::AllocationFailure { requested: usize::MAX })
    }

    /// Linear tile index, column-major.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` when `(x, y)` is outside the grid.
    #[inline]
    pub fn tile_index(&self, x: i32, y: i32) -> RenderResult<usize> {
        match (usize::try_from(x), usize::try_from(y)) {
            (Ok(ux), Ok(uy)) if ux < self.width && uy < self.height => {
                Ok(ux * self.height + uy)
            }
            _ => Err(RenderError::OutOfRange {
                x,
                y,
                width: self.width,
                height: self.height,
            }),
        }
    }

    /// Iterates every `(x, y)` of the grid in tile index order.
    pub fn coords(&self) -> impl Iterator<Item = (usize, usize)> {
        let height = self.height;
        (0..self.width).flat_map(move |x| (0..height).map(move |y| (x, y)))
    }
}

/// Backing storage for the per-tile vertex arrays.
///
/// Owned by a backend. Effects only ever see it through a [`TileBufferView`].
#[derive(Debug, Default)]
pub struct TileBuffers {
    grid: GridSize,
    fg: Vec<f32>,
    bg: Vec<f32>,
    tex: Vec<f32>,
}

impl TileBuffers {
    /// Allocates zeroed buffers for `grid`.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if the arrays cannot be reserved.
    pub fn allocate(grid: GridSize) -> RenderResult<Self> {
        let colors = grid.buffer_len(COLOR_STRIDE)?;
        Ok(Self {
            grid,
            fg: zeroed(colors)?,
            bg: zeroed(colors)?,
            tex: zeroed(grid.buffer_len(TEXCOORD_STRIDE)?)?,
        })
    }

    /// Current grid.
    #[inline]
    #[must_use]
    pub fn grid(&self) -> GridSize {
        self.grid
    }

    /// Borrows the arrays as a view.
    #[must_use]
    pub fn view(&mut self) -> TileBufferView<'_> {
        TileBufferView {
            grid: self.grid,
            fg: &mut self.fg,
            bg: &mut self.bg,
            tex: &mut self.tex,
        }
    }
}

fn zeroed(len: usize) -> RenderResult<Vec<f32>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| RenderError::AllocationFailure { requested: len })?;
    buf.resize(len, 0.0);
    Ok(buf)
}

/// Non-owning view of the backend's per-tile arrays.
pub struct TileBufferView<'a> {
    grid: GridSize,
    fg: &'a mut [f32],
    bg: &'a mut [f32],
    tex: &'a mut [f32],
}

impl<'a> TileBufferView<'a> {
    /// Wraps raw arrays. Lengths must match `grid` and the strides.
    ///
    /// # Errors
    ///
    /// Returns `TileOutOfRange` if any array is shorter than the grid needs.
    pub fn new(
        grid: GridSize,
        fg: &'a mut [f32],
        bg: &'a mut [f32],
        tex: &'a mut [f32],
    ) -> RenderResult<Self> {
        let tiles = grid.tile_count();
        let held = (fg.len() / COLOR_STRIDE)
            .min(bg.len() / COLOR_STRIDE)
            .min(tex.len() / TEXCOORD_STRIDE);
        if held < tiles {
            return Err(RenderError::TileOutOfRange { tile: tiles, len: held });
        }
        Ok(Self { grid, fg, bg, tex })
    }

    /// Grid the arrays are laid out for.
    #[inline]
    #[must_use]
    pub fn grid(&self) -> GridSize {
        self.grid
    }

    /// Number of tiles.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.grid.tile_count()
    }

    /// Whether the view has no tiles.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// See [`GridSize::tile_index`].
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` when `(x, y)` is outside the grid.
    #[inline]
    pub fn tile_index(&self, x: i32, y: i32) -> RenderResult<usize> {
        self.grid.tile_index(x, y)
    }

    #[inline]
    fn check(&self, tile: usize) -> RenderResult<()> {
        if tile < self.len() {
            Ok(())
        } else {
            Err(RenderError::TileOutOfRange { tile, len: self.len() })
        }
    }

    /// Foreground RGBA of the tile's six vertices.
    ///
    /// # Errors
    ///
    /// Returns `TileOutOfRange` for an index past the grid.
    pub fn foreground(&mut self, tile: usize) -> RenderResult<&mut [f32]> {
        self.check(tile)?;
        let start = tile * COLOR_STRIDE;
        Ok(&mut self.fg[start..start + COLOR_STRIDE])
    }

    /// Background RGBA of the tile's six vertices.
    ///
    /// # Errors
    ///
    /// Returns `TileOutOfRange` for an index past the grid.
    pub fn background(&mut self, tile: usize) -> RenderResult<&mut [f32]> {
        self.check(tile)?;
        let start = tile * COLOR_STRIDE;
        Ok(&mut self.bg[start..start + COLOR_STRIDE])
    }

    /// Texture coordinates of the tile's six vertices.
    ///
    /// # Errors
    ///
    /// Returns `TileOutOfRange` for an index past the grid.
    pub fn texcoord(&mut self, tile: usize) -> RenderResult<&mut [f32]> {
        self.check(tile)?;
        let start = tile * TEXCOORD_STRIDE;
        Ok(&mut self.tex[start..start + TEXCOORD_STRIDE])
    }

    /// Foreground and background of one tile, borrowed together.
    ///
    /// # Errors
    ///
    /// Returns `TileOutOfRange` for an index past the grid.
    pub fn tile_colors(&mut self, tile: usize) -> RenderResult<(&mut [f32], &mut [f32])> {
        self.check(tile)?;
        let start = tile * COLOR_STRIDE;
        Ok((
            &mut self.fg[start..start + COLOR_STRIDE],
            &mut self.bg[start..start + COLOR_STRIDE],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_index_column_major() {
        let grid = GridSize::new(3, 4);
        for x in 0..3 {
            for y in 0..4 {
                assert_eq!(grid.tile_index(x, y).unwrap(), (x * 4 + y) as usize);
            }
        }
    }

    #[test]
    fn test_tile_index_out_of_range() {
        let grid = GridSize::new(3, 4);
        assert!(matches!(grid.tile_index(3, 0), Err(RenderError::OutOfRange { x: 3, .. })));
        assert!(matches!(grid.tile_index(0, 4), Err(RenderError::OutOfRange { .. })));
        assert!(matches!(grid.tile_index(-1, 0), Err(RenderError::OutOfRange { .. })));
    }

    #[test]
    fn test_from_signed_rejects_empty() {
        assert!(GridSize::from_signed(0, 5).is_err());
        assert!(GridSize::from_signed(5, -1).is_err());
        assert_eq!(GridSize::from_signed(2, 3).unwrap(), GridSize::new(2, 3));
    }

    #[test]
    fn test_oversized_grid_is_allocation_failure() {
        let huge = GridSize::new(usize::MAX, 3);
        assert_eq!(huge.checked_tile_count(), None);
        assert_eq!(huge.tile_count(), usize::MAX);
        assert!(matches!(
            huge.buffer_len(1),
            Err(RenderError::AllocationFailure { .. })
        ));
        assert!(matches!(
            GridSize::new(usize::MAX / 2, 1).buffer_len(COLOR_STRIDE),
            Err(RenderError::AllocationFailure { .. })
        ));
        assert!(matches!(
            TileBuffers::allocate(GridSize::new(i32::MAX as usize, i32::MAX as usize)),
            Err(RenderError::AllocationFailure { .. })
        ));
        assert_eq!(GridSize::new(3, 4).buffer_len(COLOR_STRIDE).unwrap(), 12 * COLOR_STRIDE);
    }

    #[test]
    fn test_coords_follow_tile_order() {
        let grid = GridSize::new(2, 3);
        for (i, (x, y)) in grid.coords().enumerate() {
            assert_eq!(grid.tile_index(x as i32, y as i32).unwrap(), i);
        }
        assert_eq!(grid.coords().count(), 6);
    }

    #[test]
    fn test_slices_do_not_overlap() {
        let mut buffers = TileBuffers::allocate(GridSize::new(2, 2)).unwrap();
        let mut view = buffers.view();

        for tile in 0..view.len() {
            for v in view.foreground(tile).unwrap().iter_mut() {
                *v = tile as f32;
            }
            for v in view.texcoord(tile).unwrap().iter_mut() {
                *v = tile as f32;
            }
        }

        for tile in 0..view.len() {
            assert!(view.foreground(tile).unwrap().iter().all(|&v| v == tile as f32));
            assert!(view.texcoord(tile).unwrap().iter().all(|&v| v == tile as f32));
            assert!(view.background(tile).unwrap().iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_strides() {
        let mut buffers = TileBuffers::allocate(GridSize::new(1, 1)).unwrap();
        let mut view = buffers.view();
        assert_eq!(view.foreground(0).unwrap().len(), 24);
        assert_eq!(view.background(0).unwrap().len(), 24);
        assert_eq!(view.texcoord(0).unwrap().len(), 12);
        assert!(matches!(
            view.foreground(1),
            Err(RenderError::TileOutOfRange { tile: 1, len: 1 })
        ));
    }

    #[test]
    fn test_view_rejects_short_arrays() {
        let mut fg = vec![0.0; COLOR_STRIDE];
        let mut bg = vec![0.0; COLOR_STRIDE * 2];
        let mut tex = vec![0.0; TEXCOORD_STRIDE * 2];
        let view = TileBufferView::new(GridSize::new(1, 2), &mut fg, &mut bg, &mut tex);
        assert!(view.is_err());
    }
}
