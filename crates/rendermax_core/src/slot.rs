//! # Renderer Slot
//!
//! The host's "active renderer". Exactly one chain is reachable from a slot
//! at any time; decorators are stacked and removed only through the slot.
//!
//! ```text
//! install_backend(B)        slot: B
//! install(|b| Fade(b))      slot: Fade ─► B
//! install(|f| Jitter(f))    slot: Jitter ─► Fade ─► B
//! replace(|f| Fade2(f))     slot: Fade2 ─► Fade ─► B     (Jitter discarded)
//! uninstall()               slot: Fade ─► B
//! reset_to_backend()        slot: B
//! ```
//!
//! Swapping is serialized by the slot's own lock. Long-running work on the
//! active chain should go through [`RendererSlot::with_active`] so nobody can
//! swap the chain mid-call.

use parking_lot::{const_mutex, Mutex};

use crate::error::{RenderError, RenderResult};
use crate::renderer::{chain_names, Renderer};

static GLOBAL_SLOT: RendererSlot = RendererSlot::new();

/// Holder for the active renderer chain.
pub struct RendererSlot {
    active: Mutex<Option<Box<dyn Renderer>>>,
}

impl RendererSlot {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: const_mutex(None),
        }
    }

    /// The process-wide slot. Empty until the host installs a backend.
    #[must_use]
    pub fn global() -> &'static RendererSlot {
        &GLOBAL_SLOT
    }

    /// Whether no renderer is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.lock().is_none()
    }

    /// Installs the bare backend, returning whatever chain was active before.
    pub fn install_backend(&self, backend: Box<dyn Renderer>) -> Option<Box<dyn Renderer>> {
        tracing::debug!(backend = backend.name(), "backend installed");
        self.active.lock().replace(backend)
    }

    /// Wraps the active chain in a new decorator.
    ///
    /// # Errors
    ///
    /// Returns `SlotEmpty` if no backend was installed.
    pub fn install<F>(&self, wrap: F) -> RenderResult<()>
    where
        F: FnOnce(Box<dyn Renderer>) -> Box<dyn Renderer>,
    {
        let mut active = self.active.lock();
        let current = active.take().ok_or(RenderError::SlotEmpty)?;
        let decorated = wrap(current);
        tracing::debug!(decorator = decorated.name(), "decorator installed");
        *active = Some(decorated);
        Ok(())
    }

    /// Replaces the outermost decorator with a new one wrapping the same
    /// inner renderer. The superseded decorator is discarded without touching
    /// its inner. With a bare backend active this behaves like [`install`].
    ///
    /// [`install`]: RendererSlot::install
    ///
    /// # Errors
    ///
    /// Returns `SlotEmpty` if no backend was installed.
    pub fn replace<F>(&self, wrap: F) -> RenderResult<()>
    where
        F: FnOnce(Box<dyn Renderer>) -> Box<dyn Renderer>,
    {
        let mut active = self.active.lock();
        let current = active.take().ok_or(RenderError::SlotEmpty)?;
        let superseded = current.name().to_owned();
        let inner = current.into_inner().unwrap_or_else(|backend| backend);
        let decorated = wrap(inner);
        tracing::debug!(decorator = decorated.name(), superseded = %superseded, "decorator replaced");
        *active = Some(decorated);
        Ok(())
    }

    /// Removes the outermost decorator, restoring the slot to its inner
    /// renderer. Returns the removed decorator's name.
    ///
    /// # Errors
    ///
    /// Returns `SlotEmpty` if nothing is installed and `NotDecorated` if the
    /// active renderer is the bare backend (which stays installed).
    pub fn uninstall(&self) -> RenderResult<String> {
        let mut active = self.active.lock();
        let current = active.take().ok_or(RenderError::SlotEmpty)?;
        let name = current.name().to_owned();
        match current.into_inner() {
            Ok(inner) => {
                tracing::debug!(decorator = %name, restored = inner.name(), "decorator uninstalled");
                *active = Some(inner);
                Ok(name)
            }
            Err(backend) => {
                *active = Some(backend);
                Err(RenderError::NotDecorated(name))
            }
        }
    }

    /// Removes every decorator, leaving the bare backend active. Returns how
    /// many decorators were removed.
    ///
    /// # Errors
    ///
    /// Returns `SlotEmpty` if nothing is installed.
    pub fn reset_to_backend(&self) -> RenderResult<usize> {
        let mut removed = 0;
        loop {
            match self.uninstall() {
                Ok(_) => removed += 1,
                Err(RenderError::NotDecorated(_)) => return Ok(removed),
                Err(err) => return Err(err),
            }
        }
    }

    /// Takes the whole chain out of the slot (host teardown).
    pub fn take(&self) -> Option<Box<dyn Renderer>> {
        self.active.lock().take()
    }

    /// Runs `f` against the active chain while holding the slot lock.
    ///
    /// # Errors
    ///
    /// Returns `SlotEmpty` if nothing is installed.
    pub fn with_active<R, F>(&self, f: F) -> RenderResult<R>
    where
        F: FnOnce(&mut dyn Renderer) -> R,
    {
        let mut active = self.active.lock();
        let renderer = active.as_mut().ok_or(RenderError::SlotEmpty)?;
        Ok(f(renderer.as_mut()))
    }

    /// Names of the active chain, outermost first.
    #[must_use]
    pub fn chain(&self) -> Vec<String> {
        self.active
            .lock()
            .as_deref()
            .map(|renderer| chain_names(renderer))
            .unwrap_or_default()
    }

    /// Number of links in the active chain (0 when empty).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.chain().len()
    }
}

impl Default for RendererSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::{SoftwareConfig, SoftwareRenderer};
    use crate::tile::GridSize;

    fn backend() -> Box<dyn Renderer> {
        Box::new(
            SoftwareRenderer::new(SoftwareConfig {
                grid: GridSize::new(4, 3),
                ..SoftwareConfig::default()
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_empty_slot() {
        let slot = RendererSlot::new();
        assert!(slot.is_empty());
        assert_eq!(slot.depth(), 0);
        assert!(matches!(slot.uninstall(), Err(RenderError::SlotEmpty)));
        assert!(matches!(slot.with_active(|r| r.grid()), Err(RenderError::SlotEmpty)));
    }

    #[test]
    fn test_uninstall_backend_keeps_it() {
        let slot = RendererSlot::new();
        assert!(slot.install_backend(backend()).is_none());
        assert!(matches!(slot.uninstall(), Err(RenderError::NotDecorated(_))));
        assert_eq!(slot.chain(), vec!["software".to_owned()]);
    }

    #[test]
    fn test_with_active_reaches_backend() {
        let slot = RendererSlot::new();
        slot.install_backend(backend());
        let grid = slot.with_active(|r| r.grid()).unwrap();
        assert_eq!(grid, GridSize::new(4, 3));
    }

    #[test]
    fn test_global_slot_is_shared() {
        assert!(std::ptr::eq(RendererSlot::global(), RendererSlot::global()));
    }
}
