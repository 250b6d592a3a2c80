//! # RENDERMAX Core
//!
//! The renderer interface and the data every link of a renderer chain shares:
//! - `Renderer` trait, implemented by backends and decorators alike
//! - Tile buffer views over the backend's per-tile vertex arrays
//! - Shared frame state (screen planes and their previous-frame shadows)
//! - `RendererSlot`, the host's active-renderer holder
//! - `SoftwareRenderer`, a headless backend
//!
//! ## Architecture Rules
//!
//! 1. **One frame state per chain** - decorators reference the backend's
//!    `SharedFrame`, they never copy it
//! 2. **Checked tile addressing** - out-of-range coordinates are errors, not
//!    undefined behavior
//! 3. **Fallible reallocation** - resizes reserve first and fail with
//!    `AllocationFailure` instead of aborting
//!
//! ## Example
//!
//! ```rust,ignore
//! use rendermax_core::{RendererSlot, SoftwareConfig, SoftwareRenderer};
//!
//! let slot = RendererSlot::global();
//! slot.install_backend(Box::new(SoftwareRenderer::new(SoftwareConfig::default())?));
//! slot.with_active(|r| r.update_all())??;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod frame;
pub mod renderer;
pub mod slot;
pub mod software;
pub mod tile;

pub use error::{RenderError, RenderResult};
pub use frame::{FrameState, ScreenCell, ScreenPlanes, SharedFrame, SCREEN_CELL_BYTES};
pub use renderer::{backend_name, chain_names, Renderer, ZoomCommand};
pub use slot::RendererSlot;
pub use software::{BackendStats, SoftwareConfig, SoftwareRenderer, StatsHandle, PALETTE};
pub use tile::{
    GridSize, TileBufferView, TileBuffers, COLOR_COMPONENTS, COLOR_STRIDE, TEXCOORD_COMPONENTS,
    TEXCOORD_STRIDE, VERTICES_PER_TILE,
};
