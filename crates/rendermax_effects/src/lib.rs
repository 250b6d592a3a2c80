//! # RENDERMAX Effects
//!
//! Renderer decorators. Each one wraps a `Box<dyn Renderer>`, forwards every
//! call, and post-processes the tile buffers after the inner renderer has
//! filled them.
//!
//! ## Chain
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────────┐
//! │ JitterRender │ ─► │ FadeRenderer │ ─► │ SoftwareRenderer │
//! └──────────────┘    └──────────────┘    └──────────────────┘
//!        │                   │                     │
//!        └───────────────────┴──── SharedFrame ────┘
//! ```
//!
//! ## Rules
//!
//! - Decorators hold the backend's frame handle, never a copy of its planes
//! - Effects add no failure modes of their own; errors come from the chain
//! - Alpha is forced to 1.0 on every vertex an effect touches

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod colorize;
pub mod fade;
pub mod forwarding;
pub mod jitter;

pub use fade::{clamp_factor, FadeConfig, FadeHandle, FadeRenderer, OpacityMap, ResizePolicy};
pub use forwarding::ForwardingRenderer;
pub use jitter::{JitterConfig, JitterRenderer};
