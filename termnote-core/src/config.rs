use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub viewer: ViewerConfig,
    pub overlay: OverlayConfig,
    pub renderer: RendererConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub default_scale: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub zoom_step: f32,
    pub scale_presets: Vec<f32>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_scale: 1.0,
            min_scale: 0.5,
            max_scale: 3.0,
            zoom_step: 0.1,
            scale_presets: vec![0.5, 0.75, 1.0, 1.25, 1.5, 2.0],
        }
    }
}

/// Placement and limits for newly created text boxes, in overlay pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub default_text: String,
    pub default_x: f32,
    pub default_y: f32,
    pub default_width: f32,
    pub default_height: f32,
    pub min_width: f32,
    pub min_height: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            default_text: "Edit text".to_string(),
            default_x: 50.0,
            default_y: 50.0,
            default_width: 150.0,
            default_height: 40.0,
            min_width: 20.0,
            min_height: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RendererConfig {
    /// Explicit pdfium shared library to bind before falling back to the
    /// working directory and the system library.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_path: Option<PathBuf>,
}

impl Config {
    pub fn default_path(dirs: &ProjectDirs) -> PathBuf {
        dirs.config_dir().join(CONFIG_FILE_NAME)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &raw)
    }

    /// Loads `path` when it exists; a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(?path, "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    fn parse(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let viewer = &self.viewer;
        let scales = [
            viewer.default_scale,
            viewer.min_scale,
            viewer.max_scale,
            viewer.zoom_step,
        ];
        if !scales
            .iter()
            .chain(&viewer.scale_presets)
            .all(|value| value.is_finite())
        {
            return Err(ConfigError::Invalid(
                "viewer scales, zoom step and presets must be finite".into(),
            ));
        }

        let overlay = &self.overlay;
        let geometry = [
            overlay.default_x,
            overlay.default_y,
            overlay.default_width,
            overlay.default_height,
            overlay.min_width,
            overlay.min_height,
        ];
        if !geometry.iter().all(|value| value.is_finite()) {
            return Err(ConfigError::Invalid(
                "annotation placement and sizes must be finite".into(),
            ));
        }

        if !(viewer.min_scale > 0.0 && viewer.min_scale <= viewer.max_scale) {
            return Err(ConfigError::Invalid(format!(
                "scale range [{}, {}] is empty or not positive",
                viewer.min_scale, viewer.max_scale
            )));
        }
        if viewer.default_scale < viewer.min_scale || viewer.default_scale > viewer.max_scale {
            return Err(ConfigError::Invalid(format!(
                "default scale {} outside [{}, {}]",
                viewer.default_scale, viewer.min_scale, viewer.max_scale
            )));
        }
        if viewer.zoom_step <= 0.0 {
            return Err(ConfigError::Invalid("zoom step must be positive".into()));
        }

        if overlay.min_width <= 0.0 || overlay.min_height <= 0.0 {
            return Err(ConfigError::Invalid(
                "minimum annotation size must be positive".into(),
            ));
        }
        if overlay.default_width < overlay.min_width || overlay.default_height < overlay.min_height
        {
            return Err(ConfigError::Invalid(
                "default annotation size is below the minimum".into(),
            ));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
