//! # Unified Configuration System
//!
//! Configuration for the display core and the engine around it. Every struct
//! is serde-serializable so it can be loaded from TOML or RON through the
//! [`Config`] trait, and every field has a default so partial files work.
//!
//! ## Configuration Categories
//!
//! - **Display Config**: pooling policy, texture unit limits, picking resolution
//! - **Engine Config**: logging and debug behaviour
//! - **Application Config**: the two combined, as loaded by host applications

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Whether released display objects are put back on the free list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolingPolicy {
    /// Released objects are recycled by later acquisitions
    #[default]
    Recycle,
    /// Released objects are dropped; every acquisition allocates
    Disabled,
}

/// # Display Configuration
///
/// Settings for a [`Display`](crate::render::display::Display) and the
/// shared registries it draws from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Clear to transparent black instead of the ambient light colour
    pub transparent_background: bool,
    /// Override for the number of texture units chunks may cycle through
    pub max_texture_units: Option<u32>,
    /// Object pool behaviour
    pub pooling: PoolingPolicy,
    /// Factor applied to canvas coordinates before pick read-back
    pub resolution_scaling: f32,
    /// Number of object slots reserved up front
    pub initial_object_capacity: usize,
    /// Clear colour used until a lights core provides an ambient light
    pub ambient_default: [f32; 3],
}

impl DisplayConfig {
    /// Create a display configuration with defaults
    pub fn new() -> Self {
        Self {
            transparent_background: false,
            max_texture_units: None,
            pooling: PoolingPolicy::Recycle,
            resolution_scaling: 1.0,
            initial_object_capacity: 256,
            ambient_default: [0.0, 0.0, 0.0],
        }
    }

    /// Clear to a transparent background
    pub fn with_transparent_background(mut self, transparent: bool) -> Self {
        self.transparent_background = transparent;
        self
    }

    /// Cap the number of texture units used per pass
    pub fn with_max_texture_units(mut self, units: u32) -> Self {
        self.max_texture_units = Some(units);
        self
    }

    /// Set the object pooling policy
    pub fn with_pooling(mut self, pooling: PoolingPolicy) -> Self {
        self.pooling = pooling;
        self
    }

    /// Set the canvas-to-drawing-buffer scale used by picking
    pub fn with_resolution_scaling(mut self, scaling: f32) -> Self {
        self.resolution_scaling = scaling;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_texture_units == Some(0) {
            return Err("max_texture_units must be at least 1".to_string());
        }

        if !(self.resolution_scaling.is_finite() && self.resolution_scaling > 0.0) {
            return Err(format!(
                "resolution_scaling must be positive, got {}",
                self.resolution_scaling
            ));
        }

        if self.ambient_default.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err("ambient_default components must lie in [0, 1]".to_string());
        }

        Ok(())
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Engine Configuration
///
/// Logging and debug behaviour shared by everything built on the display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level for the engine
    pub log_level: String,
    /// Whether to enable debug features
    pub debug_mode: bool,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            debug_mode: cfg!(debug_assertions),
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable debug mode
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    /// Log level to initialise logging with
    ///
    /// Debug mode raises `error`, `warn` and `info` to `debug`; quieter
    /// `off` and louder `debug`/`trace` levels are kept.
    pub fn effective_log_level(&self) -> &str {
        let quiet = ["error", "warn", "info"]
            .iter()
            .any(|level| self.log_level.eq_ignore_ascii_case(level));
        if self.debug_mode && quiet {
            "debug"
        } else {
            &self.log_level
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration that host applications load at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Display configuration
    pub display: DisplayConfig,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), String> {
        const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];
        if !LEVELS.contains(&self.engine.log_level.to_ascii_lowercase().as_str()) {
            return Err(format!("Unknown log level: {}", self.engine.log_level));
        }
        self.display.validate()
    }

    /// Load and validate in one step
    pub fn load_validated(path: &str) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

impl Config for ApplicationConfig {}
