//! # Host Error Types
//!
//! Errors from loading configuration and bringing up a renderer chain.

use thiserror::Error;

use rendermax_core::RenderError;

/// Errors that can occur while configuring or starting the host.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The TOML could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The renderer chain could not be built.
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Result type for host setup.
pub type ConfigResult<T> = Result<T, ConfigError>;
