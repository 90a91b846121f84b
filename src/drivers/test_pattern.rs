//! Synthetic camera producing a diagnostic test pattern.

use crate::data::acquisition::period_for_rate;
use crate::error::{HalError, HalResult};
use crate::hardware::capabilities::{properties, CameraDriver};
use crate::hardware::factory::{DeviceFactory, ParamSpec};
use crate::hardware::registry::DeviceRegistry;
use crate::messages::{hal_time, CameraMsg, ImageMsg, PixelFormat, PixelType};
use crate::uri::Uri;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Simple pseudo-random number generator (LCG) for reproducible noise.
#[inline]
fn prng(seed: u64) -> u64 {
    seed.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fffffff
}

/// Generates an 8-bit diagnostic pattern.
///
/// The pattern includes:
/// - Checkerboard background with per-frame noise
/// - Gradient bars at top (dark to bright) and bottom (bright to dark)
/// - Bright triangle in the top-left corner marking the origin
/// - Frame number encoded in the low 8 bits as squares along the left edge
///
/// `channel` offsets the checkerboard so channels are distinguishable.
pub fn generate_test_pattern(width: u32, height: u32, frame_num: u64, channel: usize) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let mut buffer = vec![0u8; w * h];
    if w == 0 || h == 0 {
        return buffer;
    }

    let checker = (w.min(h) / 16).max(1);
    let gradient_height = (h / 10).max(1);
    let corner = (w.min(h) / 8).max(1);
    let bit_size = (h / 16).max(1);
    let frame_seed = frame_num.wrapping_mul(2654435761);

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;

            let noise = (prng(frame_seed ^ idx as u64) & 0x0f) as i32 - 8;
            let base: i32 = if (x / checker + y / checker + channel) % 2 == 0 {
                64
            } else {
                96
            };
            let mut value = (base + noise).clamp(0, 255) as u8;

            if y < gradient_height {
                value = (x * 255 / w) as u8;
            } else if y >= h - gradient_height {
                value = ((w - 1 - x) * 255 / w) as u8;
            }

            if x + y < corner {
                value = 255;
            }

            let bit = (y.saturating_sub(gradient_height)) / bit_size;
            if y >= gradient_height && bit < 8 && x < bit_size {
                value = if (frame_num >> bit) & 1 == 1 { 255 } else { 0 };
            }

            buffer[idx] = value;
        }
    }

    buffer
}

/// Configuration for the test pattern camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestPatternConfig {
    /// Frame width in pixels (default: 640)
    pub width: u32,
    /// Frame height in pixels (default: 480)
    pub height: u32,
    /// Images per capture (default: 1)
    pub channels: usize,
    /// Frame rate; 0 delivers frames as fast as they are requested
    pub fps: f64,
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            channels: 1,
            fps: 0.0,
        }
    }
}

impl TestPatternConfig {
    fn from_uri(uri: &Uri) -> HalResult<Self> {
        let defaults = Self::default();
        let config = Self {
            width: uri.param_or("width", defaults.width)?,
            height: uri.param_or("height", defaults.height)?,
            channels: uri.param_or("channels", defaults.channels)?,
            fps: uri.param_or("fps", defaults.fps)?,
        };
        if config.width == 0 || config.height == 0 || config.channels == 0 {
            return Err(HalError::construction(
                uri,
                "width, height and channels must be non-zero",
            ));
        }
        Ok(config)
    }
}

/// Camera generating [`generate_test_pattern`] frames on demand.
pub struct TestPatternDriver {
    config: TestPatternConfig,
    frame: AtomicU64,
    period: Option<Duration>,
    next_due: Mutex<Option<Instant>>,
}

impl TestPatternDriver {
    /// Create a generator with the given configuration.
    ///
    /// # Errors
    /// [`HalError::Configuration`] when `fps` is neither 0 nor a usable rate.
    pub fn new(config: TestPatternConfig) -> HalResult<Self> {
        let period = if config.fps == 0.0 {
            None
        } else {
            Some(period_for_rate("fps", config.fps)?)
        };
        Ok(Self {
            config,
            frame: AtomicU64::new(0),
            period,
            next_due: Mutex::new(None),
        })
    }

    /// Pacing runs on the caller's thread; there is no producer to stop.
    fn pace(&self) {
        let Some(period) = self.period else {
            return;
        };
        let mut next_due = self.next_due.lock();
        let now = Instant::now();
        if let Some(due) = *next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        *next_due = Some(next_due.map_or(now, |due| due.max(now)) + period);
    }
}

impl CameraDriver for TestPatternDriver {
    fn capture(&self) -> HalResult<CameraMsg> {
        self.pace();
        let frame = self.frame.fetch_add(1, Ordering::Relaxed);
        let now = hal_time();

        let images = (0..self.config.channels)
            .map(|channel| ImageMsg {
                width: self.config.width,
                height: self.config.height,
                pixel_type: PixelType::UnsignedByte,
                format: PixelFormat::Luminance,
                data: generate_test_pattern(self.config.width, self.config.height, frame, channel),
                timestamp: now,
                serial_number: frame,
            })
            .collect();

        Ok(CameraMsg {
            device_time: now,
            system_time: now,
            images,
        })
    }

    fn num_channels(&self) -> usize {
        self.config.channels
    }

    fn width(&self, channel: usize) -> u32 {
        if channel < self.config.channels {
            self.config.width
        } else {
            0
        }
    }

    fn height(&self, channel: usize) -> u32 {
        if channel < self.config.channels {
            self.config.height
        } else {
            0
        }
    }

    fn device_property(&self, name: &str) -> Option<String> {
        match name {
            properties::DEVICE_NAME => Some("TestPattern".to_string()),
            _ => None,
        }
    }
}

/// Factory for the camera `test://` scheme.
pub struct TestPatternFactory;

impl DeviceFactory<dyn CameraDriver> for TestPatternFactory {
    fn name(&self) -> &str {
        "Test pattern camera"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("width", "640", "Image width in pixels"),
            ParamSpec::new("height", "480", "Image height in pixels"),
            ParamSpec::new("channels", "1", "Images per capture"),
            ParamSpec::new("fps", "0", "Frame rate, 0 for unpaced"),
        ]
    }

    fn get_device(
        &self,
        uri: &Uri,
        _registry: &DeviceRegistry<dyn CameraDriver>,
    ) -> HalResult<Arc<dyn CameraDriver>> {
        let driver = TestPatternDriver::new(TestPatternConfig::from_uri(uri)?).map_err(|e| match e {
            HalError::Configuration(message) => HalError::construction(uri, message),
            other => other,
        })?;
        Ok(Arc::new(driver))
    }
}
