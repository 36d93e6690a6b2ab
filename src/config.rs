// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section and field is optional. A missing file means defaults; a
// malformed one is reported and also falls back to defaults.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub instance: InstanceConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Triangle".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Instance layer settings
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct InstanceConfig {
    /// Layers to enable if the loader reports them
    pub layers: Vec<String>,
    /// Adds the Khronos validation layer and a debug messenger
    pub validation: bool,
}

/// SPIR-V binaries for the triangle pipeline
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/triangle.vert.spv"),
            fragment: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    /// Read the vertex buffer back after upload and compare bytes
    pub verify_uploads: bool,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "vulkan_debug.log".to_string(),
            verify_uploads: cfg!(debug_assertions),
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Preferred present mode; FIFO is the fallback because it is always supported
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            other => {
                log::warn!("Unknown present mode '{}', defaulting to FIFO", other);
                vk::PresentModeKHR::FIFO
            }
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            eprintln!("Unknown log level '{}', using info", self.debug.log_level);
            log::LevelFilter::Info
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 480);
        assert!(config.instance.layers.is_empty());
        assert_eq!(config.shaders.vertex, PathBuf::from("shaders/triangle.vert.spv"));
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml_str(
            r#"
            [window]
            title = "bring-up"

            [instance]
            layers = ["VK_LAYER_LUNARG_api_dump"]
            validation = true
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "bring-up");
        assert_eq!(config.window.width, 640);
        assert_eq!(config.instance.layers, vec!["VK_LAYER_LUNARG_api_dump"]);
        assert!(config.instance.validation);
    }

    #[test]
    fn present_mode_names_are_case_insensitive() {
        let config = Config::from_toml_str("[graphics]\npresent_mode = \"Mailbox\"").unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);

        let config = Config::from_toml_str("[graphics]\npresent_mode = \"vsync\"").unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn log_level_parses_names() {
        let config = Config::from_toml_str("[debug]\nlog_level = \"trace\"").unwrap();
        assert_eq!(config.log_level(), log::LevelFilter::Trace);

        let config = Config::from_toml_str("[debug]\nlog_level = \"loud\"").unwrap();
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(Config::from_toml_str("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let config = Config::load_from_path("definitely/not/here/config.toml").unwrap();
        assert_eq!(config.window.title, "Vulkan Triangle");
    }
}
