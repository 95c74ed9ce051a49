//! Lab configuration
//!
//! Every lab binary shares the same small configuration surface: window
//! geometry, validation settings, and swapchain tuning. Defaults match the
//! lab programs; an optional TOML file overrides them.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{VulkanError, VulkanResult};

/// Debug messenger severity threshold
///
/// Messages below the threshold are filtered out at messenger creation,
/// not in the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSeverity {
    /// Everything the validation layers emit
    Verbose,
    /// Informational and worse
    Info,
    /// Warnings and errors
    Warning,
    /// Errors only
    Error,
}

/// Window creation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window width in screen coordinates
    pub width: u32,
    /// Window height in screen coordinates
    pub height: u32,
    /// Window title
    pub title: String,
    /// Whether the window can be resized by the user
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            title: "vklab".to_string(),
            resizable: true,
        }
    }
}

/// Renderer and swapchain tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Whether to request the Khronos validation layer
    pub enable_validation: bool,
    /// Severity threshold for validation messages
    pub debug_severity: MessageSeverity,
    /// Number of frame slots cycled by the frame pipeline
    pub frames_in_flight: usize,
    /// Requested swapchain image count, clamped to surface capabilities
    pub requested_image_count: u32,
    /// Allow the presentation engine to discard obscured pixels
    pub clip_obscured_pixels: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            debug_severity: MessageSeverity::Warning,
            frames_in_flight: 3,
            requested_image_count: 3,
            clip_obscured_pixels: true,
        }
    }
}

/// Top-level configuration for a lab binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Window parameters
    pub window: WindowConfig,
    /// Renderer parameters
    pub renderer: RendererConfig,
}

impl LabConfig {
    /// Load from a TOML file, falling back to defaults when the file is absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| VulkanError::InitializationFailed(format!("read {}: {e}", path.display())))?;
        toml::from_str(&text)
            .map_err(|e| VulkanError::InitializationFailed(format!("parse {}: {e}", path.display())))
    }

    /// Override the window title, keeping everything else
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.window.title = title.into();
        self
    }

    /// Reject configurations the frame pipeline cannot run with
    pub fn validate(&self) -> VulkanResult<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(VulkanError::InitializationFailed(
                "window dimensions must be non-zero".to_string(),
            ));
        }
        if self.renderer.frames_in_flight == 0 {
            return Err(VulkanError::InitializationFailed(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.renderer.requested_image_count == 0 {
            return Err(VulkanError::InitializationFailed(
                "requested_image_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_lab_window() {
        let config = LabConfig::default();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 480);
        assert!(config.window.resizable);
        assert_eq!(config.renderer.frames_in_flight, 3);
    }

    #[test]
    fn defaults_validate() {
        assert!(LabConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let mut config = LabConfig::default();
        config.renderer.frames_in_flight = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: LabConfig = toml::from_str(
            r#"
            [window]
            title = "custom"
            "#,
        )
        .unwrap();
        assert_eq!(config.window.title, "custom");
        // Fields omitted in the file keep their defaults
        assert_eq!(config.window.width, 640);
        assert_eq!(config.renderer.requested_image_count, 3);
    }

    #[test]
    fn severity_parses_lowercase() {
        let config: LabConfig = toml::from_str(
            r#"
            [renderer]
            debug_severity = "verbose"
            "#,
        )
        .unwrap();
        assert_eq!(config.renderer.debug_severity, MessageSeverity::Verbose);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = LabConfig::load_or_default("definitely-not-here.toml").unwrap();
        assert_eq!(config.window.title, "vklab");
    }
}
