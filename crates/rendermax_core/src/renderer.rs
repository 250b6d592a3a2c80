//! # Renderer Interface
//!
//! The capability set shared by the backend and every decorator.
//!
//! ```text
//! host ──► [outermost decorator] ──► [decorator] ──► [backend]
//!                 │                        │              │
//!                 └──────── SharedFrame ───┴──────────────┘
//! ```
//!
//! A decorated chain is indistinguishable from the bare backend: the host
//! only ever talks to `dyn Renderer`.

use crate::error::RenderResult;
use crate::frame::SharedFrame;
use crate::tile::{GridSize, TileBufferView};

/// Zoom and display-mode transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ZoomCommand {
    /// One step closer: bigger cells, fewer tiles.
    ZoomIn,
    /// One step away: smaller cells, more tiles.
    ZoomOut,
    /// Back to the natural cell size.
    ZoomReset,
    /// Same as `set_fullscreen`, routed through the zoom channel.
    ToggleFullscreen,
    /// Recompute the grid from the display without changing the zoom.
    ResetGrid,
}

/// A renderer or renderer decorator.
///
/// Every call is synchronous and driven from the render thread.
pub trait Renderer: Send {
    /// Human readable name, used in logs and chain inspection.
    fn name(&self) -> &str;

    /// Redraws a single tile from the current frame.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for coordinates outside the grid.
    fn update_tile(&mut self, x: i32, y: i32) -> RenderResult<()>;

    /// Redraws every tile of the current grid.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn update_all(&mut self) -> RenderResult<()>;

    /// Flushes the frame to the display.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn render(&mut self) -> RenderResult<()>;

    /// Toggles fullscreen.
    fn set_fullscreen(&mut self);

    /// Applies a zoom transition.
    fn zoom(&mut self, command: ZoomCommand);

    /// Changes the display size in pixels.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimensions` or `AllocationFailure`.
    fn resize(&mut self, width: i32, height: i32) -> RenderResult<()>;

    /// Changes the tile grid, reallocating the backing arrays.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimensions` or `AllocationFailure`.
    fn grid_resize(&mut self, width: i32, height: i32) -> RenderResult<()>;

    /// Tile under the cursor, `None` when the cursor is off the surface.
    fn mouse_coords(&self) -> Option<(i32, i32)>;

    /// Static capability query.
    fn uses_hardware_acceleration(&self) -> bool;

    /// Current tile grid.
    fn grid(&self) -> GridSize;

    /// Handle to the frame state shared by the whole chain.
    fn frame(&self) -> SharedFrame;

    /// The backend's per-tile vertex arrays, if it exposes them.
    fn tile_buffers(&mut self) -> Option<TileBufferView<'_>>;

    /// The wrapped renderer, `None` for a backend.
    fn inner(&self) -> Option<&dyn Renderer> {
        None
    }

    /// Unwraps one decorator level, giving the inner renderer back.
    ///
    /// # Errors
    ///
    /// A backend has nothing to unwrap and returns itself.
    fn into_inner(self: Box<Self>) -> Result<Box<dyn Renderer>, Box<dyn Renderer>>;
}

/// Names of every link from `renderer` down to the backend, outermost first.
#[must_use]
pub fn chain_names(renderer: &dyn Renderer) -> Vec<String> {
    let mut names = vec![renderer.name().to_owned()];
    let mut link = renderer.inner();
    while let Some(inner) = link {
        names.push(inner.name().to_owned());
        link = inner.inner();
    }
    names
}

/// Name of the backend at the bottom of the chain.
#[must_use]
pub fn backend_name(renderer: &dyn Renderer) -> &str {
    let mut link = renderer;
    while let Some(inner) = link.inner() {
        link = inner;
    }
    link.name()
}
