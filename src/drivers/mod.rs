//! Built-in drivers.
//!
//! | Category | Scheme | Driver |
//! |----------|--------|--------|
//! | camera | `file` | [`file_reader::FileReaderDriver`] |
//! | camera | `convert` | [`convert::ConvertDriver`] |
//! | camera | `test` | [`test_pattern::TestPatternDriver`] |
//! | imu | `test` | [`synthetic_imu::SyntheticImuDriver`] |
//! | all | `log`, `proto` | [`log_reader::LogReader`] |

pub mod convert;
pub mod file_reader;
pub mod log_reader;
pub mod synthetic_imu;
pub mod test_pattern;

use crate::config::HalConfig;
use crate::hardware::capabilities::{
    CameraDriver, EncoderDriver, ImuDriver, LidarDriver, PosysDriver,
};
use crate::hardware::factory::DeviceFactory;
use crate::hardware::hal::Hal;
use std::sync::Arc;

/// Schemes the log reader is registered under in every category.
pub const LOG_SCHEMES: [&str; 2] = ["log", "proto"];

/// Register every built-in factory with `hal`.
///
/// Capture defaults (`buffer_size`, `loop_playback`) come from `config`.
pub fn register_builtin(hal: &Hal, config: &HalConfig) {
    let capture = &config.capture;

    let cameras = hal.cameras();
    cameras.register_factory("file", file_reader::FileReaderFactory::new(capture.clone()));
    cameras.register_factory("convert", convert::ConvertFactory);
    cameras.register_factory("test", test_pattern::TestPatternFactory);

    hal.imus()
        .register_factory("test", synthetic_imu::SyntheticImuFactory::new(capture.buffer_size));

    let log = Arc::new(log_reader::LogReaderFactory::new(capture.clone()));
    for scheme in LOG_SCHEMES {
        let camera: Arc<dyn DeviceFactory<dyn CameraDriver>> = log.clone();
        let imu: Arc<dyn DeviceFactory<dyn ImuDriver>> = log.clone();
        let lidar: Arc<dyn DeviceFactory<dyn LidarDriver>> = log.clone();
        let encoder: Arc<dyn DeviceFactory<dyn EncoderDriver>> = log.clone();
        let posys: Arc<dyn DeviceFactory<dyn PosysDriver>> = log.clone();
        hal.cameras().register_shared_factory(scheme, camera);
        hal.imus().register_shared_factory(scheme, imu);
        hal.lidars().register_shared_factory(scheme, lidar);
        hal.encoders().register_shared_factory(scheme, encoder);
        hal.posys().register_shared_factory(scheme, posys);
    }
}
