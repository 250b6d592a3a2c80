//! # Renderer Error Types
//!
//! All errors that can surface from a renderer chain.

use thiserror::Error;

/// Errors that can occur while driving a renderer or one of its decorators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Tile coordinates outside the current grid.
    #[error("tile ({x}, {y}) outside {width}x{height} grid")]
    OutOfRange {
        /// Requested column.
        x: i32,
        /// Requested row.
        y: i32,
        /// Current grid width.
        width: usize,
        /// Current grid height.
        height: usize,
    },

    /// Linear tile index outside the tile buffers.
    #[error("tile index {tile} outside buffer of {len} tiles")]
    TileOutOfRange {
        /// Requested tile index.
        tile: usize,
        /// Number of tiles in the buffer.
        len: usize,
    },

    /// A buffer reallocation could not be satisfied.
    #[error("allocation of {requested} elements failed")]
    AllocationFailure {
        /// Number of elements that were requested.
        requested: usize,
    },

    /// A decorator's frame handle diverged from its inner renderer's
    /// outside of a resize.
    #[error("stale frame state in decorator '{decorator}'")]
    StaleState {
        /// Name of the decorator that detected the divergence.
        decorator: String,
    },

    /// Zero or negative dimensions.
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: i32,
        /// Requested height.
        height: i32,
    },

    /// The renderer slot holds no renderer.
    #[error("no renderer installed")]
    SlotEmpty,

    /// The active renderer is the bare backend, there is nothing to uninstall.
    #[error("active renderer '{0}' is not a decorator")]
    NotDecorated(String),
}

impl RenderError {
    /// Returns true for errors that must abort the frame rather than drop a tile.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AllocationFailure { .. } | Self::StaleState { .. } | Self::SlotEmpty
        )
    }
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;
