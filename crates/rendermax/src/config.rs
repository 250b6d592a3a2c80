//! # Configuration
//!
//! One TOML file describes the whole host:
//!
//! ```toml
//! [backend]
//! grid_width = 80
//! grid_height = 25
//!
//! [effects]
//! stack = ["fade", "jitter"]   # bottom first
//!
//! [jitter]
//! amplitude = 0.5
//! seed = 7
//!
//! [fade]
//! default_opacity = 1.0
//! resize_policy = "preserve_clip"
//!
//! [render_loop]
//! frames = 120
//! target_fps = 60
//! resize_every = 30
//! ```
//!
//! Every field has a default; an empty file is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use rendermax_core::{GridSize, SoftwareConfig};
use rendermax_effects::{FadeConfig, JitterConfig};

use crate::effects::EffectKind;
use crate::error::{ConfigError, ConfigResult};
use crate::render_loop::RenderLoopConfig;

/// `[backend]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    /// Initial grid columns.
    pub grid_width: usize,
    /// Initial grid rows.
    pub grid_height: usize,
    /// Natural cell width in pixels.
    pub cell_width: u32,
    /// Natural cell height in pixels.
    pub cell_height: u32,
    /// Reported by `uses_hardware_acceleration`.
    pub hardware_accelerated: bool,
}

impl Default for BackendSection {
    fn default() -> Self {
        let software = SoftwareConfig::default();
        Self {
            grid_width: software.grid.width,
            grid_height: software.grid.height,
            cell_width: software.cell_width,
            cell_height: software.cell_height,
            hardware_accelerated: software.hardware_accelerated,
        }
    }
}

impl BackendSection {
    /// Software backend parameters for this section.
    #[must_use]
    pub fn software_config(&self) -> SoftwareConfig {
        SoftwareConfig {
            grid: GridSize::new(self.grid_width, self.grid_height),
            cell_width: self.cell_width,
            cell_height: self.cell_height,
            hardware_accelerated: self.hardware_accelerated,
            ..SoftwareConfig::default()
        }
    }
}

/// `[effects]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsSection {
    /// Effects to install, innermost first.
    pub stack: Vec<EffectKind>,
}

impl Default for EffectsSection {
    fn default() -> Self {
        Self {
            stack: vec![EffectKind::Fade, EffectKind::Jitter],
        }
    }
}

/// Complete host configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendermaxConfig {
    /// Backend parameters.
    pub backend: BackendSection,
    /// Effect stack.
    pub effects: EffectsSection,
    /// Jitter parameters.
    pub jitter: JitterConfig,
    /// Fade parameters.
    pub fade: FadeConfig,
    /// Loop parameters.
    pub render_loop: RenderLoopConfig,
}

impl RendermaxConfig {
    /// Parses and validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns `Parse` for malformed TOML and `InvalidConfig` for values
    /// that fail [`RendermaxConfig::validate`].
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, otherwise as
    /// [`RendermaxConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        let backend = &self.backend;
        if backend.grid_width == 0 || backend.grid_height == 0 {
            return Err(invalid(format!(
                "backend grid must be non-empty, got {}x{}",
                backend.grid_width, backend.grid_height
            )));
        }
        if i32::try_from(backend.grid_width).is_err() || i32::try_from(backend.grid_height).is_err()
        {
            return Err(invalid("backend grid too large".to_owned()));
        }
        if backend.cell_width == 0 || backend.cell_height == 0 {
            return Err(invalid(format!(
                "backend cell size must be non-zero, got {}x{}",
                backend.cell_width, backend.cell_height
            )));
        }
        if backend.software_config().display_size().is_none() {
            return Err(invalid(format!(
                "backend display of {}x{} cells at {}x{} px overflows u32",
                backend.grid_width, backend.grid_height, backend.cell_width, backend.cell_height
            )));
        }
        if !(self.jitter.amplitude >= 0.0 && self.jitter.amplitude.is_finite()) {
            return Err(invalid(format!(
                "jitter amplitude must be finite and >= 0, got {}",
                self.jitter.amplitude
            )));
        }
        if !(0.0..=1.0).contains(&self.fade.default_opacity) {
            return Err(invalid(format!(
                "fade default_opacity must be in [0, 1], got {}",
                self.fade.default_opacity
            )));
        }
        if self
            .render_loop
            .resize_cycle
            .iter()
            .any(|[w, h]| *w <= 0 || *h <= 0)
        {
            return Err(invalid(
                "render_loop resize_cycle entries must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::InvalidConfig(message)
}
