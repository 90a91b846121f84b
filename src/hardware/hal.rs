//! Per-process device context.
//!
//! `Hal` owns one [`DeviceRegistry`] per device category, all sharing a single
//! [`Simulation`] handle. It is constructed once at startup and passed to
//! whatever needs to create devices; tests build a fresh one each.

use super::capabilities::{
    CameraDriver, DeviceCategory, EncoderDriver, ImuDriver, LidarDriver, PosysDriver,
};
use super::factory::FactoryInfo;
use super::registry::DeviceRegistry;
use super::simulation::Simulation;
use crate::config::HalConfig;
use crate::drivers;
use crate::error::HalResult;
use std::collections::BTreeMap;
use tracing::info;

/// Registries for every device category.
#[derive(Debug)]
pub struct Hal {
    simulation: Simulation,
    cameras: DeviceRegistry<dyn CameraDriver>,
    imus: DeviceRegistry<dyn ImuDriver>,
    lidars: DeviceRegistry<dyn LidarDriver>,
    encoders: DeviceRegistry<dyn EncoderDriver>,
    posys: DeviceRegistry<dyn PosysDriver>,
}

impl Hal {
    /// Empty registries (default aliases only) sharing `simulation`.
    pub fn new(simulation: Simulation) -> Self {
        Self {
            cameras: DeviceRegistry::new(simulation.clone()),
            imus: DeviceRegistry::new(simulation.clone()),
            lidars: DeviceRegistry::new(simulation.clone()),
            encoders: DeviceRegistry::new(simulation.clone()),
            posys: DeviceRegistry::new(simulation.clone()),
            simulation,
        }
    }

    /// Validate `config`, then build registries holding the built-in drivers
    /// and the configured aliases.
    ///
    /// # Errors
    /// Returns [`crate::error::HalError::Configuration`] if validation fails.
    pub fn from_config(config: &HalConfig) -> HalResult<Self> {
        config.validate()?;

        let hal = Self::new(Simulation::from_config(&config.simulation));
        drivers::register_builtin(&hal, config);

        for alias in &config.aliases {
            hal.register_alias(alias.category, &alias.name, &alias.target);
        }

        info!(
            simulation = hal.simulation.is_enabled(),
            aliases = config.aliases.len(),
            "Device registries ready"
        );
        Ok(hal)
    }

    /// The shared simulation handle.
    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Camera registry.
    pub fn cameras(&self) -> &DeviceRegistry<dyn CameraDriver> {
        &self.cameras
    }

    /// IMU registry.
    pub fn imus(&self) -> &DeviceRegistry<dyn ImuDriver> {
        &self.imus
    }

    /// LIDAR registry.
    pub fn lidars(&self) -> &DeviceRegistry<dyn LidarDriver> {
        &self.lidars
    }

    /// Encoder registry.
    pub fn encoders(&self) -> &DeviceRegistry<dyn EncoderDriver> {
        &self.encoders
    }

    /// Position system registry.
    pub fn posys(&self) -> &DeviceRegistry<dyn PosysDriver> {
        &self.posys
    }

    /// Register an alias in the registry for `category`.
    pub fn register_alias(&self, category: DeviceCategory, name: &str, target: &str) {
        match category {
            DeviceCategory::Camera => self.cameras.register_alias(name, target),
            DeviceCategory::Imu => self.imus.register_alias(name, target),
            DeviceCategory::Lidar => self.lidars.register_alias(name, target),
            DeviceCategory::Encoder => self.encoders.register_alias(name, target),
            DeviceCategory::Posys => self.posys.register_alias(name, target),
        };
    }

    /// Factory schemes registered for `category`.
    pub fn schemes(&self, category: DeviceCategory) -> Vec<String> {
        match category {
            DeviceCategory::Camera => self.cameras.schemes(),
            DeviceCategory::Imu => self.imus.schemes(),
            DeviceCategory::Lidar => self.lidars.schemes(),
            DeviceCategory::Encoder => self.encoders.schemes(),
            DeviceCategory::Posys => self.posys.schemes(),
        }
    }

    /// Name and parameters of every factory registered for `category`.
    pub fn factories(&self, category: DeviceCategory) -> Vec<FactoryInfo> {
        let lookup = |scheme: &String| match category {
            DeviceCategory::Camera => self.cameras.factory_params(scheme),
            DeviceCategory::Imu => self.imus.factory_params(scheme),
            DeviceCategory::Lidar => self.lidars.factory_params(scheme),
            DeviceCategory::Encoder => self.encoders.factory_params(scheme),
            DeviceCategory::Posys => self.posys.factory_params(scheme),
        };
        self.schemes(category).iter().filter_map(lookup).collect()
    }

    /// Aliases registered for `category`.
    pub fn aliases(&self, category: DeviceCategory) -> BTreeMap<String, String> {
        match category {
            DeviceCategory::Camera => self.cameras.aliases(),
            DeviceCategory::Imu => self.imus.aliases(),
            DeviceCategory::Lidar => self.lidars.aliases(),
            DeviceCategory::Encoder => self.encoders.aliases(),
            DeviceCategory::Posys => self.posys.aliases(),
        }
    }
}

impl Default for Hal {
    fn default() -> Self {
        Self::new(Simulation::disabled())
    }
}
