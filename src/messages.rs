//! Payload types produced by drivers.
//!
//! These are the versioned message shapes handed from drivers to consumers:
//! one message type per device category. The core treats them as opaque
//! payloads; only drivers and format-conversion stages look inside.
//!
//! All types derive `Serialize`/`Deserialize` so recorded sessions can be
//! replayed by the `log` driver family.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall-clock time in seconds since the Unix epoch.
pub fn hal_time() -> f64 {
    Utc::now().timestamp_micros() as f64 * 1e-6
}

/// Storage type of a single pixel component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelType {
    /// Signed 8-bit
    Byte,
    /// Unsigned 8-bit
    UnsignedByte,
    /// Signed 16-bit
    Short,
    /// Unsigned 16-bit
    UnsignedShort,
    /// 32-bit float
    Float,
}

impl PixelType {
    /// Size of one component in bytes.
    pub fn bytes(self) -> usize {
        match self {
            PixelType::Byte | PixelType::UnsignedByte => 1,
            PixelType::Short | PixelType::UnsignedShort => 2,
            PixelType::Float => 4,
        }
    }
}

/// Component layout of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Single intensity channel
    Luminance,
    /// Red, green, blue
    Rgb,
    /// Blue, green, red
    Bgr,
    /// Red, green, blue, alpha
    Rgba,
    /// Undecoded sensor data
    Raw,
}

impl PixelFormat {
    /// Number of components per pixel (`Raw` counts as one).
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Luminance | PixelFormat::Raw => 1,
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// Resolve a format name such as `MONO8` or `RGB8` into type and layout.
///
/// Returns `None` for unknown names.
pub fn parse_image_format(name: &str) -> Option<(PixelType, PixelFormat)> {
    let parsed = match name.to_ascii_uppercase().as_str() {
        "MONO8" | "GRAY8" => (PixelType::UnsignedByte, PixelFormat::Luminance),
        "MONO16" | "GRAY16" => (PixelType::UnsignedShort, PixelFormat::Luminance),
        "RGB8" => (PixelType::UnsignedByte, PixelFormat::Rgb),
        "BGR8" => (PixelType::UnsignedByte, PixelFormat::Bgr),
        "RGBA8" => (PixelType::UnsignedByte, PixelFormat::Rgba),
        "RAW" | "RAW8" => (PixelType::UnsignedByte, PixelFormat::Raw),
        _ => return None,
    };
    Some(parsed)
}

/// One image of a camera capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMsg {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Component storage type
    pub pixel_type: PixelType,
    /// Component layout
    pub format: PixelFormat,
    /// Raw pixel bytes, row-major
    pub data: Vec<u8>,
    /// Capture time in seconds
    pub timestamp: f64,
    /// Per-image sequence number assigned by the driver
    pub serial_number: u64,
}

impl ImageMsg {
    /// Byte length a tightly packed image of this shape should have, or
    /// `None` if that length does not fit in memory.
    pub fn expected_len(&self) -> Option<usize> {
        usize::try_from(self.width)
            .ok()?
            .checked_mul(usize::try_from(self.height).ok()?)?
            .checked_mul(self.format.channels())?
            .checked_mul(self.pixel_type.bytes())
    }
}

/// A multi-channel camera capture (one image per channel).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraMsg {
    /// Device clock at capture, in seconds
    pub device_time: f64,
    /// Host clock at capture, in seconds
    pub system_time: f64,
    /// One image per channel
    pub images: Vec<ImageMsg>,
}

/// Inertial measurement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuMsg {
    /// Device clock in seconds
    pub device_time: f64,
    /// Host clock in seconds
    pub system_time: f64,
    /// Linear acceleration (m/s^2)
    #[serde(default)]
    pub accel: Option<[f64; 3]>,
    /// Angular rate (rad/s)
    #[serde(default)]
    pub gyro: Option<[f64; 3]>,
    /// Magnetic field (gauss)
    #[serde(default)]
    pub mag: Option<[f64; 3]>,
}

/// One LIDAR firing/rotation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LidarMsg {
    /// Device clock in seconds
    pub device_time: f64,
    /// Host clock in seconds
    pub system_time: f64,
    /// Head angle at the start of the packet (degrees)
    #[serde(default)]
    pub rotational_position: f64,
    /// Range returns in metres
    pub distances: Vec<f32>,
    /// Return intensities, same length as `distances` when present
    #[serde(default)]
    pub intensities: Vec<f32>,
}

/// Encoder tick counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncoderMsg {
    /// Device clock in seconds
    pub device_time: f64,
    /// Host clock in seconds
    pub system_time: f64,
    /// Encoder names
    pub label: Vec<String>,
    /// Tick counts, parallel to `label`
    pub data: Vec<i64>,
}

/// Pose from a position system (motion capture, GPS, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PosysMsg {
    /// Device clock in seconds
    pub device_time: f64,
    /// Host clock in seconds
    pub system_time: f64,
    /// Tracked body identifier
    pub id: u32,
    /// x, y, z, qx, qy, qz, qw
    pub pose: [f64; 7],
}
