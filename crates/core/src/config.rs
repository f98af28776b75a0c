//! TOML configuration for the harness.
//!
//! Every section and field is optional; missing values fall back to
//! [`Default`]. A typical file:
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [render]
//! scene = "mesh"
//! depth = true
//! msaa_samples = 4
//!
//! [assets]
//! model = "assets/models/monkey.glb"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "harness.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub window: WindowConfig,
    pub validation: ValidationConfig,
    pub render: RenderConfig,
    pub assets: AssetConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Vulkan Harness".to_string(),
        }
    }
}

/// Validation layer settings.
///
/// When `enabled` is set the Khronos validation layer becomes a hard
/// requirement: instance creation fails if it is not installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub enabled: bool,
    pub best_practices: bool,
    pub gpu_assisted: bool,
    pub synchronization: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: cfg!(debug_assertions),
            best_practices: true,
            gpu_assisted: true,
            synchronization: true,
        }
    }
}

/// What the frame loop draws.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneKind {
    /// Clear the swapchain image, no geometry.
    Clear,
    /// Indexed, textured quad.
    #[default]
    Quad,
    /// A single glTF mesh.
    Mesh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub frames_in_flight: usize,
    pub scene: SceneKind,
    pub depth: bool,
    pub msaa_samples: u32,
    pub animate_clear: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            scene: SceneKind::Quad,
            depth: false,
            msaa_samples: 1,
            animate_clear: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub shader_dir: PathBuf,
    /// Texture for the quad scene. A generated checkerboard is used when unset.
    pub texture: Option<PathBuf>,
    pub model: Option<PathBuf>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders"),
            texture: None,
            model: None,
        }
    }
}

impl HarnessConfig {
    /// Parses a configuration from TOML text and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if given, else [`DEFAULT_CONFIG_FILE`] if it exists, else
    /// the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            Self::load(default_path)
        } else {
            debug!("No {DEFAULT_CONFIG_FILE} found, using defaults");
            Ok(Self::default())
        }
    }

    /// Rejects values the renderer cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.render.frames_in_flight == 0 {
            return Err(Error::Config(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        let samples = self.render.msaa_samples;
        if samples == 0 || samples > 64 || !samples.is_power_of_two() {
            return Err(Error::Config(format!(
                "msaa_samples must be a power of two between 1 and 64, got {samples}"
            )));
        }
        if self.render.scene == SceneKind::Mesh && self.assets.model.is_none() {
            return Err(Error::Config(
                "scene \"mesh\" requires assets.model".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.render.frames_in_flight, 2);
        assert_eq!(config.render.scene, SceneKind::Quad);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = HarnessConfig::from_toml_str("").unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = HarnessConfig::from_toml_str(
            r#"
            [window]
            width = 1280

            [render]
            scene = "clear"
            msaa_samples = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.render.scene, SceneKind::Clear);
        assert_eq!(config.render.msaa_samples, 4);
        assert!(config.render.animate_clear);
    }

    #[test]
    fn test_mesh_scene_requires_model() {
        let err = HarnessConfig::from_toml_str("[render]\nscene = \"mesh\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let ok = HarnessConfig::from_toml_str(
            "[render]\nscene = \"mesh\"\n[assets]\nmodel = \"box.glb\"\n",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_rejects_bad_sample_count() {
        for samples in [0, 3, 128] {
            let text = format!("[render]\nmsaa_samples = {samples}\n");
            assert!(HarnessConfig::from_toml_str(&text).is_err(), "{samples}");
        }
    }

    #[test]
    fn test_rejects_zero_sizes() {
        assert!(HarnessConfig::from_toml_str("[window]\nheight = 0\n").is_err());
        assert!(HarnessConfig::from_toml_str("[render]\nframes_in_flight = 0\n").is_err());
    }

    #[test]
    fn test_unknown_scene_is_parse_error() {
        let err = HarnessConfig::from_toml_str("[render]\nscene = \"voxels\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = HarnessConfig::load(Path::new("definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
