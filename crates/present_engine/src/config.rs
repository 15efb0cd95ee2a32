//! Renderer configuration
//!
//! Applications configure the engine through [`RendererConfig`] instead of
//! compile-time constants: validation layers, the frames-in-flight depth,
//! the present-mode preference, and window defaults are all plain data
//! passed in at construction. Configurations serialize to TOML so demos can
//! keep their settings in a file next to the binary.

use ash::vk;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Preferred presentation policy, consulted before the built-in fallback
/// order (mailbox, then immediate, then FIFO). A preference is only a hint:
/// if the surface does not support it the fallback order applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    /// Lowest-latency non-tearing mode
    Mailbox,
    /// Tearing allowed, no queueing
    Immediate,
    /// Always-available queued mode
    Fifo,
}

impl PresentModePreference {
    /// Map the preference onto the Vulkan present mode it names
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
            Self::Fifo => vk::PresentModeKHR::FIFO,
        }
    }
}

impl Default for PresentModePreference {
    fn default() -> Self {
        Self::Mailbox
    }
}

/// Configuration for the renderer and its window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the Vulkan instance
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Window title
    pub window_title: String,
    /// Initial window width in pixels
    pub window_width: u32,
    /// Initial window height in pixels
    pub window_height: u32,
    /// Number of frames the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Whether to enable validation layers (None = debug builds only)
    pub enable_validation: Option<bool>,
    /// Present mode to try first when negotiating the swapchain
    pub preferred_present_mode: PresentModePreference,
    /// Background clear color [R, G, B, A] in the 0.0-1.0 range
    pub clear_color: [f32; 4],
}

impl RendererConfig {
    /// Create a configuration with sensible defaults for the given app name
    pub fn new(app_name: impl Into<String>) -> Self {
        let application_name = app_name.into();
        Self {
            window_title: application_name.clone(),
            application_name,
            application_version: (1, 0, 0),
            window_width: 800,
            window_height: 600,
            max_frames_in_flight: 2,
            enable_validation: None,
            preferred_present_mode: PresentModePreference::default(),
            clear_color: [0.005, 0.005, 0.005, 1.0],
        }
    }

    /// Set the application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set the window title and initial size
    pub fn with_window(mut self, title: impl Into<String>, width: u32, height: u32) -> Self {
        self.window_title = title.into();
        self.window_width = width;
        self.window_height = height;
        self
    }

    /// Set the frames-in-flight depth, clamped to a reasonable range
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames.clamp(1, 8);
        self
    }

    /// Enable or disable validation layers explicitly
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the preferred present mode
    pub fn with_present_mode(mut self, preference: PresentModePreference) -> Self {
        self.preferred_present_mode = preference;
        self
    }

    /// Set the background clear color
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Whether validation layers should be attached for this run
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Frames-in-flight depth with the clamp applied, for configurations
    /// that were deserialized rather than built through the setters
    pub fn frames_in_flight(&self) -> usize {
        self.max_frames_in_flight.clamp(1, 8)
    }

    /// Load a configuration from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save the configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Present Engine Application")
    }
}

/// Configuration file errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = RendererConfig::default();
        assert_eq!(config.max_frames_in_flight, 2);
        assert_eq!(config.window_width, 800);
        assert_eq!(config.window_height, 600);
        assert_eq!(config.enable_validation, None);
        assert_eq!(config.preferred_present_mode, PresentModePreference::Mailbox);
    }

    #[test]
    fn frames_in_flight_is_clamped() {
        let config = RendererConfig::new("test").with_max_frames_in_flight(0);
        assert_eq!(config.max_frames_in_flight, 1);

        let config = RendererConfig::new("test").with_max_frames_in_flight(64);
        assert_eq!(config.max_frames_in_flight, 8);

        // Deserialized configs bypass the setter; the accessor still clamps
        let mut config = RendererConfig::default();
        config.max_frames_in_flight = 0;
        assert_eq!(config.frames_in_flight(), 1);
    }

    #[test]
    fn present_preference_maps_to_vk() {
        assert_eq!(
            PresentModePreference::Mailbox.to_vk(),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            PresentModePreference::Immediate.to_vk(),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(PresentModePreference::Fifo.to_vk(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn parses_partial_toml() {
        let config: RendererConfig = toml::from_str(
            r#"
            application_name = "demo"
            max_frames_in_flight = 3
            preferred_present_mode = "fifo"
            "#,
        )
        .unwrap();
        assert_eq!(config.application_name, "demo");
        assert_eq!(config.max_frames_in_flight, 3);
        assert_eq!(config.preferred_present_mode, PresentModePreference::Fifo);
        // Unspecified fields fall back to defaults
        assert_eq!(config.window_width, 800);
    }
}
