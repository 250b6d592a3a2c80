//! # Effect Installation
//!
//! Builds decorators from configuration and stacks them onto a slot.
//!
//! ```text
//! stack = ["fade", "jitter"]
//!
//! install_backend(software)   slot: software
//! install_effect(fade)        slot: fade ─► software
//! install_effect(jitter)      slot: jitter ─► fade ─► software
//! ```

use serde::{Deserialize, Serialize};

use rendermax_core::{RenderResult, Renderer, RendererSlot, SoftwareRenderer};
use rendermax_effects::{FadeHandle, FadeRenderer, ForwardingRenderer, JitterRenderer};

use crate::config::RendermaxConfig;

/// Decorators the host knows how to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Pass-through decorator.
    Forwarding,
    /// Random per-call color offsets.
    Jitter,
    /// Per-tile opacity scaling.
    Fade,
}

impl EffectKind {
    /// Name the built decorator reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Forwarding => "forwarding",
            Self::Jitter => "jitter",
            Self::Fade => "fade",
        }
    }
}

/// Wraps the slot's active chain in one decorator of `kind`.
///
/// Returns the opacity handle when `kind` is [`EffectKind::Fade`].
///
/// # Errors
///
/// Returns `SlotEmpty` if no backend is installed.
pub fn install_effect(
    slot: &RendererSlot,
    kind: EffectKind,
    config: &RendermaxConfig,
) -> RenderResult<Option<FadeHandle>> {
    let mut fade_handle = None;
    slot.install(|inner| -> Box<dyn Renderer> {
        match kind {
            EffectKind::Forwarding => Box::new(ForwardingRenderer::new(inner)),
            EffectKind::Jitter => Box::new(JitterRenderer::new(inner, &config.jitter)),
            EffectKind::Fade => {
                let fade = FadeRenderer::new(inner, &config.fade);
                fade_handle = Some(fade.handle());
                Box::new(fade)
            }
        }
    })?;
    tracing::debug!(effect = kind.name(), depth = slot.depth(), "effect installed");
    Ok(fade_handle)
}

/// Installs the configured stack, innermost first. Returns the handles of
/// every fade installed, in stack order.
///
/// # Errors
///
/// Returns `SlotEmpty` if no backend is installed.
pub fn install_stack(slot: &RendererSlot, config: &RendermaxConfig) -> RenderResult<Vec<FadeHandle>> {
    let mut handles = Vec::new();
    for &kind in &config.effects.stack {
        if let Some(handle) = install_effect(slot, kind, config)? {
            handles.push(handle);
        }
    }
    tracing::info!(chain = ?slot.chain(), "effect stack installed");
    Ok(handles)
}

/// Builds the software backend, installs it into `slot` and stacks the
/// configured effects on top. Any previously active chain is dropped.
///
/// # Errors
///
/// Returns `InvalidDimensions` or `AllocationFailure` from the backend.
pub fn build_chain(slot: &RendererSlot, config: &RendermaxConfig) -> RenderResult<Vec<FadeHandle>> {
    let backend = SoftwareRenderer::new(config.backend.software_config())?;
    if let Some(previous) = slot.install_backend(Box::new(backend)) {
        tracing::debug!(previous = previous.name(), "previous chain dropped");
    }
    install_stack(slot, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendermax_core::RenderError;

    #[test]
    fn test_install_requires_backend() {
        let slot = RendererSlot::new();
        assert!(matches!(
            install_effect(&slot, EffectKind::Jitter, &RendermaxConfig::default()),
            Err(RenderError::SlotEmpty)
        ));
    }

    #[test]
    fn test_build_default_chain() {
        let slot = RendererSlot::new();
        let handles = build_chain(&slot, &RendermaxConfig::default()).unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(slot.chain(), vec!["jitter", "fade", "software"]);
        assert_eq!(handles[0].dims(), (80, 25));
    }

    #[test]
    fn test_overflowing_backend_is_rejected() {
        let slot = RendererSlot::new();
        let mut config = RendermaxConfig::default();
        config.backend.cell_width = u32::MAX;
        assert!(matches!(
            build_chain(&slot, &config),
            Err(RenderError::InvalidDimensions { .. })
        ));
        assert!(slot.is_empty());
    }

    #[test]
    fn test_names_match_decorators() {
        let slot = RendererSlot::new();
        let mut config = RendermaxConfig::default();
        config.effects.stack = vec![EffectKind::Forwarding];
        build_chain(&slot, &config).unwrap();
        assert_eq!(slot.chain()[0], EffectKind::Forwarding.name());
    }
}
