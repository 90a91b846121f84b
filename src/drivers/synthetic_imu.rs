//! Synthetic IMU for bench testing without hardware.
//!
//! Produces a stationary sensor reading (gravity on +Z, no rotation, a fixed
//! magnetic field) with zero-mean noise, paced at `rate` Hz on a capture thread.

use crate::data::acquisition::{CaptureOptions, CaptureThread, FrameSource, Pacer, StopSignal};
use crate::error::{HalError, HalResult};
use crate::hardware::capabilities::{properties, ImuDriver};
use crate::hardware::factory::{DeviceFactory, ParamSpec};
use crate::hardware::registry::DeviceRegistry;
use crate::messages::{hal_time, ImuMsg};
use crate::uri::Uri;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Instant;

const GRAVITY: f64 = 9.80665;
const MAG_FIELD: [f64; 3] = [0.22, 0.0, -0.42];

/// Configuration for the synthetic IMU
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticImuConfig {
    /// Samples per second (default: 100)
    pub rate: f64,
    /// Noise amplitude added to each axis (default: 0.01)
    pub noise: f64,
    /// Samples buffered ahead of `capture`
    pub buffer_size: usize,
}

impl Default for SyntheticImuConfig {
    fn default() -> Self {
        Self {
            rate: 100.0,
            noise: 0.01,
            buffer_size: 35,
        }
    }
}

struct ImuSource {
    rng: StdRng,
    noise: f64,
    pacer: Pacer,
    started: Instant,
}

impl ImuSource {
    /// Sum of two uniforms: zero mean, bounded by `noise`, peaked at zero.
    fn jitter(&mut self) -> f64 {
        if self.noise == 0.0 {
            return 0.0;
        }
        let half = self.noise / 2.0;
        self.rng.gen_range(-half..=half) + self.rng.gen_range(-half..=half)
    }

    fn axis(&mut self, base: [f64; 3]) -> [f64; 3] {
        [
            base[0] + self.jitter(),
            base[1] + self.jitter(),
            base[2] + self.jitter(),
        ]
    }
}

impl FrameSource for ImuSource {
    type Frame = ImuMsg;

    fn next_frame(&mut self, stop: &StopSignal) -> HalResult<Option<ImuMsg>> {
        if !self.pacer.wait(stop) {
            return Ok(None);
        }

        Ok(Some(ImuMsg {
            device_time: self.started.elapsed().as_secs_f64(),
            system_time: hal_time(),
            accel: Some(self.axis([0.0, 0.0, GRAVITY])),
            gyro: Some(self.axis([0.0; 3])),
            mag: Some(self.axis(MAG_FIELD)),
        }))
    }
}

/// IMU producing noisy stationary readings.
pub struct SyntheticImuDriver {
    capture: CaptureThread<ImuMsg>,
}

impl SyntheticImuDriver {
    /// Start sampling.
    ///
    /// # Errors
    /// [`HalError::Configuration`] for a rate that is not positive or is too
    /// low to schedule, negative noise or zero buffer size.
    pub fn new(config: SyntheticImuConfig) -> HalResult<Self> {
        let pacer = Pacer::from_rate("IMU rate", config.rate)?;
        if !config.noise.is_finite() || config.noise < 0.0 {
            return Err(HalError::Configuration(format!(
                "IMU noise must be non-negative, got {}",
                config.noise
            )));
        }

        let source = ImuSource {
            rng: StdRng::from_entropy(),
            noise: config.noise,
            pacer,
            started: Instant::now(),
        };
        let capture = CaptureThread::spawn(
            source,
            CaptureOptions::new("synthetic-imu").with_buffer_size(config.buffer_size),
        )?;
        Ok(Self { capture })
    }
}

impl ImuDriver for SyntheticImuDriver {
    fn capture(&self) -> HalResult<ImuMsg> {
        self.capture.capture()
    }

    fn device_property(&self, name: &str) -> Option<String> {
        match name {
            properties::DEVICE_NAME => Some("SyntheticImu".to_string()),
            _ => None,
        }
    }
}

/// Factory for the IMU `test://` scheme.
pub struct SyntheticImuFactory {
    buffer_size: usize,
}

impl SyntheticImuFactory {
    /// Factory buffering `buffer_size` samples per device.
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }
}

impl DeviceFactory<dyn ImuDriver> for SyntheticImuFactory {
    fn name(&self) -> &str {
        "Synthetic IMU"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("rate", "100", "Samples per second"),
            ParamSpec::new("noise", "0.01", "Noise amplitude per axis"),
        ]
    }

    fn get_device(
        &self,
        uri: &Uri,
        _registry: &DeviceRegistry<dyn ImuDriver>,
    ) -> HalResult<Arc<dyn ImuDriver>> {
        let defaults = SyntheticImuConfig::default();
        let config = SyntheticImuConfig {
            rate: uri.param_or("rate", defaults.rate)?,
            noise: uri.param_or("noise", defaults.noise)?,
            buffer_size: uri.param_or("buffersize", self.buffer_size)?,
        };
        let driver = SyntheticImuDriver::new(config).map_err(|e| match e {
            HalError::Configuration(message) => HalError::construction(uri, message),
            other => other,
        })?;
        Ok(Arc::new(driver))
    }
}
