//! Driver interfaces, one per device category.
//!
//! Every concrete driver implements exactly one of these traits and is handed
//! to callers as `Arc<dyn Trait>`. A registry is parameterised by the trait
//! object type (`DeviceRegistry<dyn CameraDriver>`), and [`DeviceInterface`]
//! ties each trait object type to its [`DeviceCategory`].
//!
//! # Design Philosophy
//!
//! Each driver trait:
//! - Is synchronous; streaming drivers run their own acquisition thread
//! - Is thread-safe (requires Send + Sync) and takes `&self`
//! - Uses `HalResult` for errors
//!
//! # Example
//!
//! ```rust,ignore
//! struct Checkerboard { frame: AtomicU64 }
//!
//! impl CameraDriver for Checkerboard {
//!     fn capture(&self) -> HalResult<CameraMsg> { /* fill one image */ }
//!     fn num_channels(&self) -> usize { 1 }
//!     fn width(&self, _channel: usize) -> u32 { 64 }
//!     fn height(&self, _channel: usize) -> u32 { 64 }
//! }
//!
//! let camera: Arc<dyn CameraDriver> = Arc::new(Checkerboard::default());
//! ```

use crate::error::HalResult;
use crate::messages::{CameraMsg, EncoderMsg, ImuMsg, LidarMsg, PosysMsg};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Well-known property names understood by `device_property`.
pub mod properties {
    /// Human-readable driver name
    pub const DEVICE_NAME: &str = "DeviceName";
    /// Number of frames in a finite source
    pub const NUM_IMAGES: &str = "NumImages";
    /// Directory a file-backed source reads from
    pub const BASE_DIR: &str = "BaseDir";
    /// Source file of a log-backed device
    pub const LOG_FILE: &str = "LogFile";
}

/// Device categories, each with its own registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    /// Image sensors
    Camera,
    /// Inertial measurement units
    Imu,
    /// Laser range scanners
    Lidar,
    /// Wheel/joint encoders
    Encoder,
    /// Position systems (motion capture, GPS)
    Posys,
}

impl DeviceCategory {
    /// All categories in registry order.
    pub const ALL: [DeviceCategory; 5] = [
        DeviceCategory::Camera,
        DeviceCategory::Imu,
        DeviceCategory::Lidar,
        DeviceCategory::Encoder,
        DeviceCategory::Posys,
    ];

    /// Lowercase identifier used in configuration and the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceCategory::Camera => "camera",
            DeviceCategory::Imu => "imu",
            DeviceCategory::Lidar => "lidar",
            DeviceCategory::Encoder => "encoder",
            DeviceCategory::Posys => "posys",
        }
    }

    /// Device-type hint naming this category's simulation driver
    /// (`"Node" + hint` is the simulated scheme).
    pub fn simulation_hint(self) -> &'static str {
        match self {
            DeviceCategory::Camera => "Camera",
            DeviceCategory::Imu => "IMU",
            DeviceCategory::Lidar => "LIDAR",
            DeviceCategory::Encoder => "Encoder",
            DeviceCategory::Posys => "Posys",
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "unknown device category '{s}', expected one of: camera, imu, lidar, encoder, posys"
                )
            })
    }
}

/// Links a driver trait object type to its category.
pub trait DeviceInterface: Send + Sync + 'static {
    /// The category this interface belongs to.
    const CATEGORY: DeviceCategory;
}

/// Image sensor driver.
pub trait CameraDriver: Send + Sync {
    /// Block until the next multi-channel capture is available.
    fn capture(&self) -> HalResult<CameraMsg>;

    /// Number of image channels per capture.
    fn num_channels(&self) -> usize;

    /// Width of `channel` in pixels, 0 for an unknown channel.
    fn width(&self, channel: usize) -> u32;

    /// Height of `channel` in pixels, 0 for an unknown channel.
    fn height(&self, channel: usize) -> u32;

    /// Driver-specific property lookup.
    fn device_property(&self, _name: &str) -> Option<String> {
        None
    }

    /// The wrapped device, for drivers that post-process another camera.
    fn input_device(&self) -> Option<Arc<dyn CameraDriver>> {
        None
    }
}

/// Inertial measurement unit driver.
pub trait ImuDriver: Send + Sync {
    /// Block until the next measurement is available.
    fn capture(&self) -> HalResult<ImuMsg>;

    /// Driver-specific property lookup.
    fn device_property(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Laser range scanner driver.
pub trait LidarDriver: Send + Sync {
    /// Block until the next packet is available.
    fn capture(&self) -> HalResult<LidarMsg>;

    /// Driver-specific property lookup.
    fn device_property(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Encoder driver.
pub trait EncoderDriver: Send + Sync {
    /// Block until the next reading is available.
    fn capture(&self) -> HalResult<EncoderMsg>;

    /// Driver-specific property lookup.
    fn device_property(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Position system driver.
pub trait PosysDriver: Send + Sync {
    /// Block until the next pose is available.
    fn capture(&self) -> HalResult<PosysMsg>;

    /// Driver-specific property lookup.
    fn device_property(&self, _name: &str) -> Option<String> {
        None
    }
}

impl DeviceInterface for dyn CameraDriver {
    const CATEGORY: DeviceCategory = DeviceCategory::Camera;
}

impl DeviceInterface for dyn ImuDriver {
    const CATEGORY: DeviceCategory = DeviceCategory::Imu;
}

impl DeviceInterface for dyn LidarDriver {
    const CATEGORY: DeviceCategory = DeviceCategory::Lidar;
}

impl DeviceInterface for dyn EncoderDriver {
    const CATEGORY: DeviceCategory = DeviceCategory::Encoder;
}

impl DeviceInterface for dyn PosysDriver {
    const CATEGORY: DeviceCategory = DeviceCategory::Posys;
}
