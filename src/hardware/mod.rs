//! Device discovery and construction.
//!
//! - [`capabilities`]: driver traits, one per device category
//! - [`factory`]: the per-scheme factory contract
//! - [`registry`]: scheme/alias tables and URI resolution
//! - [`simulation`]: simulation mode and the simulator launcher
//! - [`hal`]: the set of registries handed to the rest of the program

pub mod capabilities;
pub mod factory;
pub mod hal;
pub mod registry;
pub mod simulation;

pub use capabilities::{
    CameraDriver, DeviceCategory, DeviceInterface, EncoderDriver, ImuDriver, LidarDriver,
    PosysDriver,
};
pub use factory::{DeviceFactory, FactoryInfo, FnFactory, ParamSpec};
pub use hal::Hal;
pub use registry::DeviceRegistry;
pub use simulation::{Simulation, SimLauncher};
