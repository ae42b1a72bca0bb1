//! Application configuration, loaded from `vkframe.toml`.
//!
//! Every section falls back to its defaults when omitted, so an empty file
//! (or no file at all) yields the stock 800x600 window rendering the demo
//! triangle with the bundled shaders.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV_VAR: &str = "VKFRAME_CONFIG";

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "vkframe.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub shaders: ShaderConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Initial inner width in physical pixels
    #[serde(default = "default_width")]
    pub width: u32,
    /// Initial inner height in physical pixels
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_true")]
    pub resizable: bool,
}

/// Paths to the compiled SPIR-V shader stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderConfig {
    #[serde(default = "default_vertex_shader")]
    pub vertex: PathBuf,
    #[serde(default = "default_fragment_shader")]
    pub fragment: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Enable the Khronos validation layer (None = only in debug builds)
    #[serde(default)]
    pub validation: Option<bool>,
    /// Force FIFO presentation instead of preferring MAILBOX
    #[serde(default)]
    pub vsync: bool,
    /// Clear color applied at the start of every render pass
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub mesh: DemoMesh,
}

/// Geometry uploaded at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemoMesh {
    /// Three vertices, drawn without an index buffer
    #[default]
    Triangle,
    /// Four vertices, drawn through an index buffer
    Quad,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            resizable: true,
        }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: default_vertex_shader(),
            fragment: default_fragment_shader(),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: None,
            vsync: false,
            clear_color: default_clear_color(),
            mesh: DemoMesh::default(),
        }
    }
}

impl RendererConfig {
    /// Whether validation layers should be requested.
    pub fn validation_enabled(&self) -> bool {
        self.validation.unwrap_or(cfg!(debug_assertions))
    }
}

impl AppConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads configuration from file if it exists, otherwise returns defaults.
    ///
    /// A file that exists but fails to parse or validate is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Checks values that would otherwise fail deep inside Vulkan calls.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if self.shaders.vertex.as_os_str().is_empty() || self.shaders.fragment.as_os_str().is_empty()
        {
            return Err(Error::Config("shader paths must not be empty".to_string()));
        }

        if let Some(component) = self
            .renderer
            .clear_color
            .iter()
            .find(|c| !(0.0..=1.0).contains(*c))
        {
            return Err(Error::Config(format!(
                "clear color components must be within [0, 1], got {}",
                component
            )));
        }

        Ok(())
    }
}

/// Returns the configuration path: `$VKFRAME_CONFIG` if set, else `./vkframe.toml`.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    600
}

fn default_title() -> String {
    "Hello Vulkan!".to_string()
}

fn default_true() -> bool {
    true
}

fn default_vertex_shader() -> PathBuf {
    PathBuf::from("shaders/simple_shader.vert.spv")
}

fn default_fragment_shader() -> PathBuf {
    PathBuf::from("shaders/simple_shader.frag.spv")
}

fn default_clear_color() -> [f32; 4] {
    [0.1, 0.1, 0.15, 1.0]
}
