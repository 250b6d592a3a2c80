//! Forwarding Decorator - the base link every effect is built on
//!
//! Wraps an inner renderer and forwards every call to it. The decorator holds
//! the inner's `SharedFrame` handle so reads through the outer object are valid
//! right after construction, and keeps that handle honest:
//!
//! ```text
//! update_tile / update_all / render      resize / grid_resize / zoom / fullscreen
//! ─────────────────────────────────      ─────────────────────────────────────────
//! 1. check handle == inner.frame()       1. delegate (may reallocate)
//! 2. delegate                            2. refresh handle from inner
//! ```
//!
//! A handle that diverges outside step 2 means someone reallocated the inner
//! behind the decorator's back; that is reported as `StaleState` instead of
//! drawing from freed planes.

use rendermax_core::{
    GridSize, RenderError, RenderResult, Renderer, SharedFrame, TileBufferView, ZoomCommand,
};

/// Plain decorator: forwards everything, adds nothing.
pub struct ForwardingRenderer {
    name: String,
    inner: Box<dyn Renderer>,
    frame: SharedFrame,
}

impl ForwardingRenderer {
    /// Wraps `inner`, capturing its frame handle.
    #[must_use]
    pub fn new(inner: Box<dyn Renderer>) -> Self {
        Self::named("forwarding", inner)
    }

    /// Wraps `inner` under a custom name (used by effects built on top).
    #[must_use]
    pub fn named(name: impl Into<String>, inner: Box<dyn Renderer>) -> Self {
        let frame = inner.frame();
        Self {
            name: name.into(),
            inner,
            frame,
        }
    }

    /// Gives the wrapped renderer back.
    #[must_use]
    pub fn release(self) -> Box<dyn Renderer> {
        self.inner
    }

    /// Fails with `StaleState` if the cached handle no longer points at the
    /// inner renderer's frame.
    ///
    /// # Errors
    ///
    /// Returns `StaleState` on divergence.
    pub fn check_mirror(&self) -> RenderResult<()> {
        if self.frame.same_as(&self.inner.frame()) {
            Ok(())
        } else {
            tracing::warn!(decorator = %self.name, "frame handle diverged from inner renderer");
            Err(RenderError::StaleState {
                decorator: self.name.clone(),
            })
        }
    }

    fn refresh(&mut self) {
        self.frame = self.inner.frame();
    }
}

impl Renderer for ForwardingRenderer {
    fn name(&self) -> &str {
        &self.name
    }

    fn update_tile(&mut self, x: i32, y: i32) -> RenderResult<()> {
        self.check_mirror()?;
        self.inner.update_tile(x, y)
    }

    fn update_all(&mut self) -> RenderResult<()> {
        self.check_mirror()?;
        self.inner.update_all()
    }

    fn render(&mut self) -> RenderResult<()> {
        self.check_mirror()?;
        self.inner.render()
    }

    fn set_fullscreen(&mut self) {
        self.inner.set_fullscreen();
        self.refresh();
    }

    fn zoom(&mut self, command: ZoomCommand) {
        self.inner.zoom(command);
        self.refresh();
    }

    fn resize(&mut self, width: i32, height: i32) -> RenderResult<()> {
        let result = self.inner.resize(width, height);
        self.refresh();
        result
    }

    fn grid_resize(&mut self, width: i32, height: i32) -> RenderResult<()> {
        let result = self.inner.grid_resize(width, height);
        self.refresh();
        result
    }

    fn mouse_coords(&self) -> Option<(i32, i32)> {
        self.inner.mouse_coords()
    }

    fn uses_hardware_acceleration(&self) -> bool {
        self.inner.uses_hardware_acceleration()
    }

    fn grid(&self) -> GridSize {
        self.inner.grid()
    }

    fn frame(&self) -> SharedFrame {
        self.frame.clone()
    }

    fn tile_buffers(&mut self) -> Option<TileBufferView<'_>> {
        self.inner.tile_buffers()
    }

    fn inner(&self) -> Option<&dyn Renderer> {
        Some(self.inner.as_ref())
    }

    fn into_inner(self: Box<Self>) -> Result<Box<dyn Renderer>, Box<dyn Renderer>> {
        Ok(self.release())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendermax_core::{ScreenCell, SoftwareConfig, SoftwareRenderer};

    fn backend() -> SoftwareRenderer {
        SoftwareRenderer::new(SoftwareConfig {
            grid: GridSize::new(3, 2),
            ..SoftwareConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_frame_shared_immediately() {
        let inner = backend();
        let inner_frame = inner.frame();
        let outer = ForwardingRenderer::new(Box::new(inner));
        assert!(outer.frame().same_as(&inner_frame));
    }

    #[test]
    fn test_host_writes_reach_backend() {
        let mut outer = ForwardingRenderer::new(Box::new(backend()));
        outer
            .frame()
            .write()
            .put_cell(2, 1, ScreenCell::new(b'x', 15, 0, false))
            .unwrap();
        outer.update_tile(2, 1).unwrap();

        let mut view = outer.tile_buffers().unwrap();
        let tile = view.tile_index(2, 1).unwrap();
        assert_eq!(&view.foreground(tile).unwrap()[..4], &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_grid_resize_refreshes() {
        let mut outer = ForwardingRenderer::new(Box::new(backend()));
        outer.grid_resize(7, 5).unwrap();
        assert_eq!(outer.grid(), GridSize::new(7, 5));
        assert_eq!(outer.frame().read().grid(), GridSize::new(7, 5));
        assert!(outer.check_mirror().is_ok());
        outer.update_tile(6, 4).unwrap();
    }

    #[test]
    fn test_failed_resize_propagates() {
        let mut outer = ForwardingRenderer::new(Box::new(backend()));
        assert!(matches!(
            outer.grid_resize(0, 4),
            Err(RenderError::InvalidDimensions { .. })
        ));
        assert_eq!(outer.grid(), GridSize::new(3, 2));
    }

    #[test]
    fn test_pure_delegations() {
        let mut inner = backend();
        inner.set_mouse_position(Some((9, 13)));
        let outer = ForwardingRenderer::new(Box::new(inner));
        assert_eq!(outer.mouse_coords(), Some((1, 1)));
        assert!(!outer.uses_hardware_acceleration());
    }

    #[test]
    fn test_into_inner_returns_backend() {
        let outer: Box<dyn Renderer> = Box::new(ForwardingRenderer::new(Box::new(backend())));
        assert_eq!(outer.inner().map(|r| r.name()), Some("software"));
        let inner = outer.into_inner().ok().unwrap();
        assert_eq!(inner.name(), "software");
    }
}
