//! # Sensor HAL
//!
//! A hardware abstraction layer for robotics sensors. Client code asks for a
//! device by URI (`file:///data/left_*.pgm`, `convert:[fmt=MONO8]//test://`,
//! `log://session.jsonl`) and receives a shared handle implementing the
//! category's driver trait, without knowing which driver produced it.
//!
//! ## Crate Structure
//!
//! - **`uri`**: Parsing of `scheme:[params]//resource?query` device URIs.
//! - **`hardware`**: Driver traits per category, the factory trait, the
//!   per-category [`DeviceRegistry`] (aliases, simulation routing) and the
//!   [`Hal`] context that owns one registry per category.
//! - **`data`**: The bounded [`CaptureBuffer`] and the background
//!   [`CaptureThread`] that fills it from a driver's frame source.
//! - **`drivers`**: Built-in drivers (file and log playback, format
//!   conversion, test pattern, synthetic IMU).
//! - **`messages`**: Serializable sensor messages returned by `capture`.
//! - **`config`**: TOML + environment configuration via `figment`.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: The [`HalError`] enum used across the crate.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sensor_hal::{config::HalConfig, Hal};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hal = Hal::from_config(&HalConfig::default())?;
//! let camera = hal.cameras().create("test://?width=320&height=240", None)?;
//! let frame = camera.capture()?;
//! println!("{} images", frame.images.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod drivers;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod messages;
pub mod uri;

pub use data::{CaptureBuffer, CaptureThread};
pub use error::{HalError, HalResult};
pub use hardware::{
    CameraDriver, DeviceCategory, DeviceFactory, DeviceRegistry, EncoderDriver, Hal, ImuDriver,
    LidarDriver, PosysDriver, Simulation,
};
pub use uri::Uri;
