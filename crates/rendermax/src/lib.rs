//! # RENDERMAX
//!
//! The host side of a decorated renderer chain.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  rendermax.toml ──► RendermaxConfig                              │
//! │                          │                                       │
//! │                          ▼                                       │
//! │  build_chain ──► RendererSlot: jitter ─► fade ─► software        │
//! │                          ▲                 ▲                     │
//! │  RenderLoop ─────────────┘                 │                     │
//! │  (update_all + render)              FadeHandle (other threads)   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: TOML configuration with defaults and validation
//! - `effects`: effect installation from configuration
//! - `render_loop`: frame driver and statistics
//! - `error`: host setup errors

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod effects;
pub mod error;
pub mod render_loop;

// Re-export the layers below
pub use rendermax_core as core;
pub use rendermax_effects as fx;

pub use config::{BackendSection, EffectsSection, RendermaxConfig};
pub use effects::{build_chain, install_effect, install_stack, EffectKind};
pub use error::{ConfigError, ConfigResult};
pub use render_loop::{FrameStats, RenderLoop, RenderLoopConfig, RenderLoopStats, MAX_FRAME_TIME};
