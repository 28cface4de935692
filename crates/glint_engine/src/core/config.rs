//! # Engine Configuration
//!
//! Configuration structures for the renderer and the ambient services around
//! it. Every type here implements [`Config`], so a whole [`EngineConfig`] can
//! be stored as `engine.toml` or `engine.ron`.
//!
//! ## Example
//!
//! ```toml
//! [renderer]
//! width = 1280
//! height = 720
//! binding_point_capacity = 16
//! gbuffer_precision = "half"
//!
//! [logging]
//! filter = "glint_engine=debug"
//! ```

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};
use crate::foundation::logging::LoggingConfig;

/// Floating point precision of deferred G-buffer color attachments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GBufferPrecision {
    /// 16-bit float channels
    #[default]
    Half,
    /// 32-bit float channels
    Full,
}

/// Renderer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Caps each binding-point pool below its hardware limit when set
    pub binding_point_capacity: Option<u32>,
    /// Initial render target width in pixels
    pub width: u32,
    /// Initial render target height in pixels
    pub height: u32,
    /// Clear color of intermediate framebuffers
    pub clear_color: [f32; 4],
    /// G-buffer precision for the deferred preset
    pub gbuffer_precision: GBufferPrecision,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            binding_point_capacity: None,
            width: 800,
            height: 600,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            gbuffer_precision: GBufferPrecision::default(),
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Reject values the renderer cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid {
                field: "renderer.width/height",
                reason: format!("target size {}x{} is empty", self.width, self.height),
            });
        }
        if self.binding_point_capacity == Some(0) {
            return Err(ConfigError::Invalid {
                field: "renderer.binding_point_capacity",
                reason: "capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Renderer settings
    pub renderer: RendererConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.renderer.validate()
    }
}
