//! Playback of recorded sessions.
//!
//! `log://<path>` (also registered as `proto://`) replays a JSON-lines file in
//! which every line is one serialized message of the registry's category.
//! The same factory serves all five categories.
//!
//! Lines that fail to parse are skipped with a warning. Playback runs on a
//! [`CaptureThread`]; with `loop` set it restarts at the top of the file.

use crate::config::CaptureConfig;
use crate::data::acquisition::{CaptureOptions, CaptureThread, FrameSource, StopSignal};
use crate::error::{HalError, HalResult};
use crate::hardware::capabilities::{
    properties, CameraDriver, EncoderDriver, ImuDriver, LidarDriver, PosysDriver,
};
use crate::hardware::factory::{DeviceFactory, ParamSpec};
use crate::hardware::registry::DeviceRegistry;
use crate::messages::{CameraMsg, EncoderMsg, ImuMsg, LidarMsg, PosysMsg};
use crate::uri::Uri;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A message type that can be replayed from a log.
pub trait LogMessage: DeserializeOwned + Send + 'static {
    /// Per-channel `(width, height)`, for camera logs.
    fn channel_dims(&self) -> Vec<(u32, u32)> {
        Vec::new()
    }
}

impl LogMessage for CameraMsg {
    fn channel_dims(&self) -> Vec<(u32, u32)> {
        self.images.iter().map(|img| (img.width, img.height)).collect()
    }
}

impl LogMessage for ImuMsg {}
impl LogMessage for LidarMsg {}
impl LogMessage for EncoderMsg {}
impl LogMessage for PosysMsg {}

/// Streams parsed messages out of a JSON-lines file.
struct LogSource<M> {
    reader: BufReader<File>,
    path: PathBuf,
    line: String,
    line_no: usize,
    _message: PhantomData<fn() -> M>,
}

impl<M: LogMessage> LogSource<M> {
    fn open(path: &Path) -> HalResult<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
            path: path.to_path_buf(),
            line: String::new(),
            line_no: 0,
            _message: PhantomData,
        })
    }
}

impl<M: LogMessage> FrameSource for LogSource<M> {
    type Frame = M;

    fn next_frame(&mut self, _stop: &StopSignal) -> HalResult<Option<M>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }
            match serde_json::from_str(text) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => warn!(
                    file = %self.path.display(),
                    line = self.line_no,
                    error = %e,
                    "Skipping malformed log line"
                ),
            }
        }
    }

    fn rewind(&mut self) -> HalResult<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.line_no = 0;
        Ok(())
    }
}

/// Settings parsed from a `log://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReaderConfig {
    /// Log file
    pub path: PathBuf,
    /// Restart at the top of the file after the last message
    pub looping: bool,
    /// Messages read ahead of `capture`
    pub buffer_size: usize,
}

impl LogReaderConfig {
    /// Parse the URI, falling back to `defaults` for `loop` and `buffersize`.
    ///
    /// # Errors
    /// Returns [`HalError::Construction`] for an empty path or malformed parameters.
    pub fn from_uri(uri: &Uri, defaults: &CaptureConfig) -> HalResult<Self> {
        let path = uri.resource();
        if path.is_empty() {
            return Err(HalError::construction(uri, "log file path is empty"));
        }
        Ok(Self {
            path: PathBuf::from(path),
            looping: uri.flag_or("loop", defaults.loop_playback)?,
            buffer_size: uri.param_or("buffersize", defaults.buffer_size)?,
        })
    }
}

/// Driver replaying messages of type `M`.
pub struct LogReader<M: LogMessage> {
    capture: CaptureThread<M>,
    path: PathBuf,
    dims: Vec<(u32, u32)>,
}

impl<M: LogMessage> LogReader<M> {
    /// Open the log and start the playback thread.
    ///
    /// # Errors
    /// [`HalError::Io`] if the file cannot be opened, plus capture thread
    /// start-up failures.
    pub fn open(config: &LogReaderConfig) -> HalResult<Self> {
        // Camera logs report their shape before the first capture.
        let dims = LogSource::<M>::open(&config.path)?
            .next_frame(&StopSignal::new())?
            .map(|first| first.channel_dims())
            .unwrap_or_default();

        let capture = CaptureThread::spawn(
            LogSource::<M>::open(&config.path)?,
            CaptureOptions::new("log-reader")
                .with_buffer_size(config.buffer_size)
                .with_looping(config.looping),
        )?;

        info!(
            file = %config.path.display(),
            looping = config.looping,
            "Opened log for playback"
        );

        Ok(Self {
            capture,
            path: config.path.clone(),
            dims,
        })
    }

    /// Next message in file order.
    ///
    /// # Errors
    /// [`HalError::EndOfStream`] after the last message unless looping.
    pub fn next_message(&self) -> HalResult<M> {
        self.capture.capture()
    }

    fn property(&self, name: &str) -> Option<String> {
        match name {
            properties::DEVICE_NAME => Some("LogReader".to_string()),
            properties::LOG_FILE => Some(self.path.display().to_string()),
            _ => None,
        }
    }
}

impl CameraDriver for LogReader<CameraMsg> {
    fn capture(&self) -> HalResult<CameraMsg> {
        self.next_message()
    }

    fn num_channels(&self) -> usize {
        self.dims.len()
    }

    fn width(&self, channel: usize) -> u32 {
        self.dims.get(channel).map_or(0, |&(w, _)| w)
    }

    fn height(&self, channel: usize) -> u32 {
        self.dims.get(channel).map_or(0, |&(_, h)| h)
    }

    fn device_property(&self, name: &str) -> Option<String> {
        self.property(name)
    }
}

macro_rules! log_driver {
    ($driver:ident, $msg:ty) => {
        impl $driver for LogReader<$msg> {
            fn capture(&self) -> HalResult<$msg> {
                self.next_message()
            }

            fn device_property(&self, name: &str) -> Option<String> {
                self.property(name)
            }
        }
    };
}

log_driver!(ImuDriver, ImuMsg);
log_driver!(LidarDriver, LidarMsg);
log_driver!(EncoderDriver, EncoderMsg);
log_driver!(PosysDriver, PosysMsg);

/// Factory for `log://` and `proto://` in every category.
pub struct LogReaderFactory {
    defaults: CaptureConfig,
}

impl LogReaderFactory {
    /// Factory using `defaults` for `loop` and `buffersize`.
    pub fn new(defaults: CaptureConfig) -> Self {
        Self { defaults }
    }

    fn open<M: LogMessage>(&self, uri: &Uri) -> HalResult<LogReader<M>> {
        let config = LogReaderConfig::from_uri(uri, &self.defaults)?;
        LogReader::open(&config).map_err(|e| match e {
            HalError::Io(io) => HalError::construction(uri, format!("{}: {io}", config.path.display())),
            other => other,
        })
    }

    fn describe(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("loop", self.defaults.loop_playback.to_string(), "Restart after the last message"),
            ParamSpec::new("buffersize", self.defaults.buffer_size.to_string(), "Messages read ahead"),
        ]
    }
}

macro_rules! log_factory {
    ($driver:ident, $msg:ty) => {
        impl DeviceFactory<dyn $driver> for LogReaderFactory {
            fn name(&self) -> &str {
                "Log playback"
            }

            fn params(&self) -> Vec<ParamSpec> {
                self.describe()
            }

            fn get_device(
                &self,
                uri: &Uri,
                _registry: &DeviceRegistry<dyn $driver>,
            ) -> HalResult<Arc<dyn $driver>> {
                Ok(Arc::new(self.open::<$msg>(uri)?))
            }
        }
    };
}

log_factory!(CameraDriver, CameraMsg);
log_factory!(ImuDriver, ImuMsg);
log_factory!(LidarDriver, LidarMsg);
log_factory!(EncoderDriver, EncoderMsg);
log_factory!(PosysDriver, PosysMsg);

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_log(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    fn reader<M: LogMessage>(file: &tempfile::NamedTempFile, looping: bool) -> LogReader<M> {
        LogReader::open(&LogReaderConfig {
            path: file.path().to_path_buf(),
            looping,
            buffer_size: 4,
        })
        .unwrap()
    }

    #[test]
    fn skips_malformed_lines() {
        let file = write_log(&[
            r#"{"device_time":1.0,"system_time":1.0,"id":1,"pose":[0,0,0,0,0,0,1]}"#,
            "not json",
            "",
            r#"{"device_time":2.0,"system_time":2.0,"id":1,"pose":[1,0,0,0,0,0,1]}"#,
        ]);
        let log = reader::<PosysMsg>(&file, false);
        assert_eq!(log.capture().unwrap().device_time, 1.0);
        assert_eq!(log.capture().unwrap().pose[0], 1.0);
        assert!(matches!(log.capture(), Err(HalError::EndOfStream)));
    }

    #[test]
    fn loops_from_the_top() {
        let file = write_log(&[
            r#"{"device_time":1.0,"system_time":0.0,"label":["l"],"data":[1]}"#,
            r#"{"device_time":2.0,"system_time":0.0,"label":["l"],"data":[2]}"#,
        ]);
        let log = reader::<EncoderMsg>(&file, true);
        let ticks: Vec<i64> = (0..5).map(|_| log.capture().unwrap().data[0]).collect();
        assert_eq!(ticks, vec![1, 2, 1, 2, 1]);
    }

    #[test]
    fn camera_log_reports_shape() {
        let file = write_log(&[
            r#"{"device_time":0.0,"system_time":0.0,"images":[{"width":2,"height":1,"pixel_type":"unsigned_byte","format":"luminance","data":[1,2],"timestamp":0.0,"serial_number":0}]}"#,
        ]);
        let log = reader::<CameraMsg>(&file, false);
        assert_eq!(log.num_channels(), 1);
        assert_eq!((log.width(0), log.height(0)), (2, 1));
        assert_eq!(CameraDriver::capture(&log).unwrap().images[0].data, vec![1, 2]);
    }

    #[test]
    fn factory_serves_every_category() {
        let file = write_log(&[r#"{"device_time":3.0,"system_time":0.0,"accel":[0,0,9.81]}"#]);
        let registry = DeviceRegistry::<dyn ImuDriver>::default();
        registry.register_factory("log", LogReaderFactory::new(CaptureConfig::default()));
        let imu = registry
            .create(&format!("log://{}", file.path().display()), None)
            .unwrap();
        assert_eq!(imu.capture().unwrap().accel, Some([0.0, 0.0, 9.81]));
        assert!(imu.device_property(properties::LOG_FILE).is_some());

        assert!(matches!(
            registry.create("log:///does/not/exist.jsonl", None),
            Err(HalError::Construction { .. })
        ));
    }
}
