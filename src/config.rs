//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/sensor_hal.toml` (or an explicit path)
//! 2. Environment variables prefixed with `SENSOR_HAL_`, using `__` to
//!    separate nested keys (`SENSOR_HAL_CAPTURE__BUFFER_SIZE=64`)
//!
//! Every field has a default, so a missing file yields a usable configuration.
//!
//! # Example
//! ```no_run
//! use sensor_hal::config::HalConfig;
//!
//! let config = HalConfig::load()?;
//! config.validate()?;
//! println!("buffer size: {}", config.capture.buffer_size);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{HalError, HalResult};
use crate::hardware::capabilities::DeviceCategory;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/sensor_hal.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SENSOR_HAL_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Capture buffer defaults for streaming drivers
    pub capture: CaptureConfig,
    /// Simulation backend settings
    pub simulation: SimulationConfig,
    /// Extra aliases registered at startup
    pub aliases: Vec<AliasDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "sensor-hal".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Defaults for drivers that buffer frames on a capture thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Frames buffered between the acquisition thread and `capture`
    pub buffer_size: usize,
    /// Restart finite sources when exhausted
    pub loop_playback: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_size: 35,
            loop_playback: false,
        }
    }
}

/// Simulation mode settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Redirect every `create` to the simulated driver for its category.
    /// The `SIM` environment variable enables this as well.
    pub enabled: bool,
    /// Command (program followed by arguments) that starts the simulator.
    /// When absent the simulator is assumed to be managed externally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

/// An alias registered in one category's registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasDefinition {
    /// Registry the alias belongs to
    pub category: DeviceCategory,
    /// Alias scheme
    pub name: String,
    /// Target URI prefix the alias expands to
    pub target: String,
}

impl HalConfig {
    /// Load configuration from `config/sensor_hal.toml` and the environment
    ///
    /// Environment variables override the file, e.g.
    /// `SENSOR_HAL_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    /// Returns [`HalError::Configuration`] describing the first problem found.
    pub fn validate(&self) -> HalResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(HalError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.capture.buffer_size == 0 {
            return Err(HalError::Configuration(
                "capture.buffer_size must be at least 1".to_string(),
            ));
        }

        if let Some(command) = &self.simulation.command {
            if command.first().map_or(true, |program| program.trim().is_empty()) {
                return Err(HalError::Configuration(
                    "simulation.command must name a program".to_string(),
                ));
            }
        }

        let mut seen = HashSet::new();
        for alias in &self.aliases {
            if alias.name.is_empty() || alias.target.is_empty() {
                return Err(HalError::Configuration(format!(
                    "Alias in '{}' registry needs both a name and a target",
                    alias.category
                )));
            }
            if alias.name.contains(':') {
                return Err(HalError::Configuration(format!(
                    "Alias name '{}' must be a bare scheme",
                    alias.name
                )));
            }
            if !seen.insert((alias.category, alias.name.as_str())) {
                return Err(HalError::Configuration(format!(
                    "Duplicate alias '{}' in '{}' registry",
                    alias.name, alias.category
                )));
            }
        }

        Ok(())
    }

    /// Aliases configured for one registry.
    pub fn aliases_for(&self, category: DeviceCategory) -> impl Iterator<Item = &AliasDefinition> {
        self.aliases.iter().filter(move |a| a.category == category)
    }
}
