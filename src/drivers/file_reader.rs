//! Camera that plays back image files from disk.
//!
//! ```text
//! file://<dir>/<pattern>
//! file://<dir>/[<pattern ch0>,<pattern ch1>,...]?startframe=10&loop=1
//! ```
//!
//! Each pattern selects one channel's files inside `<dir>`; `*` matches any
//! run of characters and `?` a single one. Files are played in lexicographic
//! order and every channel must match the same number of files.
//!
//! Binary PGM/PPM files (`P5`/`P6`) carry their own shape. Any other file is
//! treated as raw pixels and needs `width`, `height` and `format` parameters.
//!
//! Files are read on a [`CaptureThread`] so disk latency never stalls
//! `capture`; with `loop` set playback restarts at `startframe`.
//!
//! Playback runs as fast as the buffer drains unless paced. `frequency`
//! paces it at a fixed rate. `timestamps` names a text file holding one
//! recorded capture time in seconds per image, in file order; playback then
//! reproduces the recorded spacing and frames carry the recorded time as
//! their device time.

use crate::config::CaptureConfig;
use crate::data::acquisition::{
    period_for_rate, CaptureOptions, CaptureThread, FrameSource, Pacer, StopSignal,
};
use crate::error::{HalError, HalResult};
use crate::hardware::capabilities::{properties, CameraDriver};
use crate::hardware::factory::{DeviceFactory, ParamSpec};
use crate::hardware::registry::DeviceRegistry;
use crate::messages::{hal_time, parse_image_format, CameraMsg, ImageMsg, PixelFormat, PixelType};
use crate::uri::Uri;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Shape of headerless image files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawShape {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Component type
    pub pixel_type: PixelType,
    /// Component layout
    pub format: PixelFormat,
}

/// Settings parsed from a `file://` URI.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReaderConfig {
    /// Directory holding the files
    pub base_dir: PathBuf,
    /// One file-name pattern per channel
    pub patterns: Vec<String>,
    /// Index of the first frame played
    pub start_frame: usize,
    /// Restart at `start_frame` after the last file
    pub looping: bool,
    /// Frames read ahead of `capture`
    pub buffer_size: usize,
    /// Playback rate in Hz; 0 reads as fast as the buffer drains
    pub frequency: f64,
    /// Recorded capture times, one line per image
    pub timestamps: Option<PathBuf>,
    /// Shape for files without a header
    pub raw: Option<RawShape>,
}

impl FileReaderConfig {
    /// Parse the URI, falling back to `defaults` for `loop` and `buffersize`.
    ///
    /// # Errors
    /// Returns [`HalError::Construction`] for malformed parameters.
    pub fn from_uri(uri: &Uri, defaults: &CaptureConfig) -> HalResult<Self> {
        let (base_dir, patterns) = split_channel_spec(uri.resource())
            .ok_or_else(|| HalError::construction(uri, "expected <dir>/<pattern> or <dir>/[p0,p1,...]"))?;

        let frequency: f64 = uri.param_or("frequency", 0.0)?;
        if frequency != 0.0 {
            period_for_rate("frequency", frequency)
                .map_err(|e| HalError::construction(uri, e.to_string()))?;
        }
        let timestamps = uri.param("timestamps").map(PathBuf::from);
        if frequency != 0.0 && timestamps.is_some() {
            return Err(HalError::construction(uri, "frequency and timestamps cannot be combined"));
        }

        let raw = match (uri.param("width"), uri.param("height")) {
            (None, None) => None,
            (Some(_), Some(_)) => {
                let format_name = uri.param("format").unwrap_or("MONO8");
                let (pixel_type, format) = parse_image_format(format_name).ok_or_else(|| {
                    HalError::construction(uri, format!("unknown image format '{format_name}'"))
                })?;
                Some(RawShape {
                    width: uri.param_or("width", 0)?,
                    height: uri.param_or("height", 0)?,
                    pixel_type,
                    format,
                })
            }
            _ => return Err(HalError::construction(uri, "width and height must be given together")),
        };

        Ok(Self {
            base_dir,
            patterns,
            start_frame: uri.param_or("startframe", 0)?,
            looping: uri.flag_or("loop", defaults.loop_playback)?,
            buffer_size: uri.param_or("buffersize", defaults.buffer_size)?,
            frequency,
            timestamps,
            raw,
        })
    }
}

/// Split `dir/pattern` or `dir/[p0,p1]` into directory and channel patterns.
fn split_channel_spec(resource: &str) -> Option<(PathBuf, Vec<String>)> {
    let (dir, listed) = if let Some(open) = resource.find('[') {
        let close = resource.rfind(']')?;
        if close < open {
            return None;
        }
        let dir = resource[..open].trim_end_matches('/');
        let patterns: Vec<String> = resource[open + 1..close]
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        (dir, patterns)
    } else {
        match resource.rsplit_once('/') {
            Some((dir, pattern)) => (dir, vec![pattern.to_string()]),
            None => ("", vec![resource.to_string()]),
        }
    };

    if listed.is_empty() || listed.iter().any(String::is_empty) {
        return None;
    }
    let dir = if dir.is_empty() { "." } else { dir };
    Some((PathBuf::from(dir), listed))
}

/// Compile a `*`/`?` wildcard into an anchored regex.
fn wildcard_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

/// Files in `dir` whose names match `pattern`, sorted by name.
///
/// # Errors
/// I/O errors reading the directory, or an invalid pattern.
pub fn find_files(dir: &Path, pattern: &str) -> HalResult<Vec<PathBuf>> {
    let matcher = wildcard_regex(pattern)
        .map_err(|e| HalError::Configuration(format!("invalid file pattern '{pattern}': {e}")))?;

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter(|entry| matcher.is_match(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    files.sort();
    Ok(files)
}

/// Decode one image file.
///
/// # Errors
/// I/O failures, malformed PGM/PPM headers, headerless files without a
/// [`RawShape`], or raw files whose size does not match the shape.
pub fn load_image(path: &Path, raw: Option<RawShape>) -> HalResult<ImageMsg> {
    let bytes = fs::read(path)?;
    let invalid = |reason: &str| {
        HalError::Configuration(format!("{}: {reason}", path.display()))
    };

    let (shape, data) = if bytes.starts_with(b"P5") || bytes.starts_with(b"P6") {
        parse_netpbm(&bytes).ok_or_else(|| invalid("malformed PGM/PPM header"))?
    } else {
        let shape = raw.ok_or_else(|| invalid("not a PGM/PPM file; set width, height and format"))?;
        (shape, bytes)
    };

    let image = ImageMsg {
        width: shape.width,
        height: shape.height,
        pixel_type: shape.pixel_type,
        format: shape.format,
        data,
        timestamp: 0.0,
        serial_number: 0,
    };
    let expected = image
        .expected_len()
        .ok_or_else(|| invalid(&format!("{}x{} image is too large", image.width, image.height)))?;
    if image.data.len() != expected {
        return Err(invalid(&format!(
            "expected {expected} bytes of pixel data, found {}",
            image.data.len()
        )));
    }
    Ok(image)
}

/// Read recorded capture times, one per non-empty line.
///
/// Only the first whitespace-separated field of a line is used; lines
/// starting with `#` are skipped.
///
/// # Errors
/// I/O failures, unparsable or non-finite values, or times that go
/// backwards.
pub fn load_timestamps(path: &Path) -> HalResult<Vec<f64>> {
    let text = fs::read_to_string(path)?;
    let mut times: Vec<f64> = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let Some(field) = line.split_whitespace().next() else {
            continue;
        };
        if field.starts_with('#') {
            continue;
        }
        let invalid = |reason: &str| {
            HalError::Configuration(format!("{}:{}: {reason}", path.display(), line_no + 1))
        };
        let time: f64 = field
            .parse()
            .map_err(|_| invalid(&format!("'{field}' is not a time in seconds")))?;
        if !time.is_finite() {
            return Err(invalid("time must be finite"));
        }
        if times.last().is_some_and(|&last| time < last) {
            return Err(invalid("times must not go backwards"));
        }
        times.push(time);
    }
    Ok(times)
}

/// Parse a binary PGM/PPM. 16-bit samples are converted to little-endian.
fn parse_netpbm(bytes: &[u8]) -> Option<(RawShape, Vec<u8>)> {
    let mut pos = 2;
    let mut fields = [0u32; 3];
    for field in &mut fields {
        loop {
            match *bytes.get(pos)? {
                b'#' => {
                    while *bytes.get(pos)? != b'\n' {
                        pos += 1;
                    }
                }
                c if c.is_ascii_whitespace() => pos += 1,
                _ => break,
            }
        }
        let start = pos;
        while bytes.get(pos)?.is_ascii_digit() {
            pos += 1;
        }
        *field = std::str::from_utf8(&bytes[start..pos]).ok()?.parse().ok()?;
    }
    // Exactly one whitespace byte separates the header from the pixels.
    if !bytes.get(pos)?.is_ascii_whitespace() {
        return None;
    }
    pos += 1;

    let [width, height, maxval] = fields;
    if maxval == 0 || maxval > 65535 {
        return None;
    }
    let format = if bytes.starts_with(b"P5") {
        PixelFormat::Luminance
    } else {
        PixelFormat::Rgb
    };

    let payload = &bytes[pos..];
    let (pixel_type, data) = if maxval < 256 {
        (PixelType::UnsignedByte, payload.to_vec())
    } else {
        let swapped = payload
            .chunks_exact(2)
            .flat_map(|c| [c[1], c[0]])
            .collect();
        (PixelType::UnsignedShort, swapped)
    };

    Some((
        RawShape {
            width,
            height,
            pixel_type,
            format,
        },
        data,
    ))
}

/// When the next file is read.
enum Playback {
    /// As fast as the buffer drains
    Unpaced,
    Fixed(Pacer),
    /// Replays recorded capture times; the anchor pairs the wall clock with
    /// the recorded time of the first frame of the current pass.
    Recorded {
        times: Vec<f64>,
        anchor: Option<(Instant, f64)>,
    },
}

impl Playback {
    /// Wait until frame `index` is due. Returns false if `stop` was raised.
    fn wait(&mut self, index: usize, stop: &StopSignal) -> HalResult<bool> {
        match self {
            Self::Unpaced => Ok(true),
            Self::Fixed(pacer) => Ok(pacer.wait(stop)),
            Self::Recorded { times, anchor } => {
                let time = times.get(index).copied().unwrap_or_default();
                let Some((origin, origin_time)) = *anchor else {
                    *anchor = Some((Instant::now(), time));
                    return Ok(true);
                };
                let due = Duration::try_from_secs_f64(time - origin_time)
                    .ok()
                    .and_then(|offset| origin.checked_add(offset))
                    .ok_or_else(|| {
                        HalError::Configuration(format!("recorded time {time} cannot be scheduled"))
                    })?;
                Ok(!stop.wait_until(due))
            }
        }
    }

    fn recorded_time(&self, index: usize) -> Option<f64> {
        match self {
            Self::Recorded { times, .. } => times.get(index).copied(),
            _ => None,
        }
    }

    fn restart(&mut self) {
        if let Self::Recorded { anchor, .. } = self {
            *anchor = None;
        }
    }
}

/// Reads one multi-channel capture per frame index.
struct FileSource {
    channels: Vec<Vec<PathBuf>>,
    raw: Option<RawShape>,
    start_frame: usize,
    index: usize,
    serial: u64,
    playback: Playback,
}

impl FrameSource for FileSource {
    type Frame = CameraMsg;

    fn next_frame(&mut self, stop: &StopSignal) -> HalResult<Option<CameraMsg>> {
        let available = self.channels.first().map_or(0, Vec::len);
        if self.index >= available {
            return Ok(None);
        }

        if !self.playback.wait(self.index, stop)? {
            return Ok(None);
        }
        let now = hal_time();
        let device_time = self.playback.recorded_time(self.index).unwrap_or(now);
        let mut images = Vec::with_capacity(self.channels.len());
        for files in &self.channels {
            let mut image = load_image(&files[self.index], self.raw)?;
            image.timestamp = device_time;
            image.serial_number = self.serial;
            images.push(image);
        }

        self.index += 1;
        self.serial += 1;
        Ok(Some(CameraMsg {
            device_time,
            system_time: now,
            images,
        }))
    }

    fn rewind(&mut self) -> HalResult<()> {
        self.index = self.start_frame;
        self.playback.restart();
        Ok(())
    }
}

/// Image-file playback camera.
pub struct FileReaderDriver {
    capture: CaptureThread<CameraMsg>,
    dims: Vec<(u32, u32)>,
    base_dir: PathBuf,
    num_images: usize,
}

impl FileReaderDriver {
    /// Enumerate the channel files and start the reader thread.
    ///
    /// # Errors
    /// [`HalError::Configuration`] when a channel matches no files, channels
    /// hold different file counts, `start_frame` is past the end, the
    /// first frame cannot be decoded, the rate is unusable, or the
    /// timestamp file lists fewer times than there are images.
    pub fn new(config: FileReaderConfig) -> HalResult<Self> {
        let mut channels = Vec::with_capacity(config.patterns.len());
        for pattern in &config.patterns {
            let files = find_files(&config.base_dir, pattern)?;
            if files.is_empty() {
                return Err(HalError::Configuration(format!(
                    "no files in '{}' match '{pattern}'",
                    config.base_dir.display()
                )));
            }
            debug!(pattern = %pattern, files = files.len(), "Matched channel files");
            channels.push(files);
        }

        let num_images = channels.first().map_or(0, Vec::len);
        if channels.iter().any(|files| files.len() != num_images) {
            let counts: Vec<usize> = channels.iter().map(Vec::len).collect();
            return Err(HalError::Configuration(format!(
                "uneven number of files per channel: {counts:?}"
            )));
        }
        if config.start_frame >= num_images {
            return Err(HalError::Configuration(format!(
                "start frame {} is past the last of {num_images} images",
                config.start_frame
            )));
        }

        let dims = channels
            .iter()
            .map(|files| load_image(&files[config.start_frame], config.raw).map(|img| (img.width, img.height)))
            .collect::<HalResult<Vec<_>>>()?;

        info!(
            dir = %config.base_dir.display(),
            channels = channels.len(),
            images = num_images,
            start_frame = config.start_frame,
            looping = config.looping,
            "Opened file reader"
        );

        let playback = match &config.timestamps {
            Some(path) => {
                let times = load_timestamps(path)?;
                if times.len() < num_images {
                    return Err(HalError::Configuration(format!(
                        "{} lists {} times for {num_images} images",
                        path.display(),
                        times.len()
                    )));
                }
                Playback::Recorded { times, anchor: None }
            }
            None if config.frequency > 0.0 => Playback::Fixed(Pacer::from_rate("frequency", config.frequency)?),
            None => Playback::Unpaced,
        };

        let source = FileSource {
            channels,
            raw: config.raw,
            start_frame: config.start_frame,
            index: config.start_frame,
            serial: 0,
            playback,
        };
        let capture = CaptureThread::spawn(
            source,
            CaptureOptions::new("file-reader")
                .with_buffer_size(config.buffer_size)
                .with_looping(config.looping),
        )?;

        Ok(Self {
            capture,
            dims,
            base_dir: config.base_dir,
            num_images,
        })
    }

    /// Stop the reader thread. Later captures fail with `StreamClosed`.
    pub fn stop(&self) {
        self.capture.stop();
    }
}

impl CameraDriver for FileReaderDriver {
    fn capture(&self) -> HalResult<CameraMsg> {
        self.capture.capture()
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
        match name {
            properties::DEVICE_NAME => Some("FileReader".to_string()),
            properties::NUM_IMAGES => Some(self.num_images.to_string()),
            properties::BASE_DIR => Some(self.base_dir.display().to_string()),
            _ => None,
        }
    }
}

/// Factory for `file://`.
pub struct FileReaderFactory {
    defaults: CaptureConfig,
}

impl FileReaderFactory {
    /// Factory using `defaults` for `loop` and `buffersize`.
    pub fn new(defaults: CaptureConfig) -> Self {
        Self { defaults }
    }
}

impl DeviceFactory<dyn CameraDriver> for FileReaderFactory {
    fn name(&self) -> &str {
        "Image file reader"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("startframe", "0", "Index of the first frame"),
            ParamSpec::new("loop", self.defaults.loop_playback.to_string(), "Restart after the last frame"),
            ParamSpec::new("buffersize", self.defaults.buffer_size.to_string(), "Frames read ahead"),
            ParamSpec::new("frequency", "0", "Playback rate in Hz, 0 for unpaced"),
            ParamSpec::new("timestamps", "", "File of recorded capture times, one per image"),
            ParamSpec::new("width", "", "Width of headerless files"),
            ParamSpec::new("height", "", "Height of headerless files"),
            ParamSpec::new("format", "MONO8", "Layout of headerless files: MONO8, MONO16, RGB8, BGR8, RAW"),
        ]
    }

    fn get_device(
        &self,
        uri: &Uri,
        _registry: &DeviceRegistry<dyn CameraDriver>,
    ) -> HalResult<Arc<dyn CameraDriver>> {
        let config = FileReaderConfig::from_uri(uri, &self.defaults)?;
        let driver = FileReaderDriver::new(config).map_err(|e| match e {
            HalError::Configuration(message) => HalError::construction(uri, message),
            HalError::Io(io) => HalError::construction(uri, io.to_string()),
            other => other,
        })?;
        Ok(Arc::new(driver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_pgm(dir: &Path, name: &str, width: u32, height: u32, value: u8) {
        let mut bytes = format!("P5\n# test\n{width} {height}\n255\n").into_bytes();
        bytes.extend(std::iter::repeat(value).take((width * height) as usize));
        fs::write(dir.join(name), bytes).unwrap();
    }

    #[test]
    fn channel_spec_forms() {
        let (dir, patterns) = split_channel_spec("data/run1/[left*.pgm, right*.pgm]").unwrap();
        assert_eq!(dir, PathBuf::from("data/run1"));
        assert_eq!(patterns, vec!["left*.pgm", "right*.pgm"]);

        let (dir, patterns) = split_channel_spec("frames/*.raw").unwrap();
        assert_eq!(dir, PathBuf::from("frames"));
        assert_eq!(patterns, vec!["*.raw"]);

        let (dir, _) = split_channel_spec("*.pgm").unwrap();
        assert_eq!(dir, PathBuf::from("."));

        assert!(split_channel_spec("dir/[]").is_none());
        assert!(split_channel_spec("dir/").is_none());
    }

    #[test]
    fn wildcard_matching() {
        let re = wildcard_regex("left_??.pgm").unwrap();
        assert!(re.is_match("left_01.pgm"));
        assert!(!re.is_match("left_001.pgm"));
        assert!(!re.is_match("left_01xpgm"));
    }

    #[test]
    fn netpbm_header_parsing() {
        let mut bytes = b"P6 2 1 65535\n".to_vec();
        bytes.extend_from_slice(&[0x01, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff]);
        let (shape, data) = parse_netpbm(&bytes).unwrap();
        assert_eq!((shape.width, shape.height), (2, 1));
        assert_eq!(shape.format, PixelFormat::Rgb);
        assert_eq!(shape.pixel_type, PixelType::UnsignedShort);
        assert_eq!(&data[..2], &[0x02, 0x01]);

        assert!(parse_netpbm(b"P5 2 x 255\n").is_none());
    }

    #[test]
    fn raw_files_need_a_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.raw");
        fs::write(&path, [1u8, 2, 3, 4]).unwrap();
        assert!(load_image(&path, None).is_err());

        let shape = RawShape {
            width: 2,
            height: 2,
            pixel_type: PixelType::UnsignedByte,
            format: PixelFormat::Luminance,
        };
        assert_eq!(load_image(&path, Some(shape)).unwrap().data, vec![1, 2, 3, 4]);

        let wrong = RawShape { width: 3, ..shape };
        assert!(load_image(&path, Some(wrong)).is_err());
    }

    #[test]
    fn plays_files_in_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        for (i, value) in [10u8, 20, 30].iter().enumerate() {
            write_pgm(dir.path(), &format!("img_{i}.pgm"), 4, 2, *value);
        }
        let uri = Uri::parse(&format!("file://{}/img_*.pgm?startframe=1", dir.path().display())).unwrap();
        let config = FileReaderConfig::from_uri(&uri, &CaptureConfig::default()).unwrap();
        let camera = FileReaderDriver::new(config).unwrap();

        assert_eq!(camera.num_channels(), 1);
        assert_eq!((camera.width(0), camera.height(0)), (4, 2));
        assert_eq!(camera.device_property(properties::NUM_IMAGES).as_deref(), Some("3"));

        assert_eq!(camera.capture().unwrap().images[0].data[0], 20);
        assert_eq!(camera.capture().unwrap().images[0].data[0], 30);
        assert!(matches!(camera.capture(), Err(HalError::EndOfStream)));
    }

    #[test]
    fn uneven_channels_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_pgm(dir.path(), "a0.pgm", 2, 2, 1);
        write_pgm(dir.path(), "a1.pgm", 2, 2, 1);
        write_pgm(dir.path(), "b0.pgm", 2, 2, 1);
        let uri = Uri::parse(&format!("file://{}/[a*.pgm,b*.pgm]", dir.path().display())).unwrap();
        let config = FileReaderConfig::from_uri(&uri, &CaptureConfig::default()).unwrap();
        let err = FileReaderDriver::new(config).err().unwrap();
        assert!(err.to_string().contains("uneven"));
    }

    #[test]
    fn width_without_height_rejected() {
        let uri = Uri::parse("file://frames/*.raw?width=4").unwrap();
        assert!(FileReaderConfig::from_uri(&uri, &CaptureConfig::default()).is_err());
    }

    fn open(dir: &Path, query: &str) -> HalResult<FileReaderDriver> {
        let uri = Uri::parse(&format!("file://{}/*.pgm{query}", dir.display())).unwrap();
        FileReaderDriver::new(FileReaderConfig::from_uri(&uri, &CaptureConfig::default())?)
    }

    #[test]
    fn oversized_header_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.ppm");
        fs::write(&path, b"P6\n4294967295 4294967295\n255\n\x00\x00\x00").unwrap();
        let err = load_image(&path, None).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn corrupt_later_frame_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        write_pgm(dir.path(), "a.pgm", 2, 2, 9);
        fs::write(dir.path().join("b.pgm"), b"P6\n4294967295 4294967295\n255\n\x00").unwrap();

        let camera = open(dir.path(), "").unwrap();
        assert_eq!(camera.capture().unwrap().images[0].data, vec![9; 4]);
        assert!(matches!(camera.capture(), Err(HalError::EndOfStream)));
    }

    #[test]
    fn unusable_frequency_rejected() {
        for query in ["?frequency=1e-300", "?frequency=-1", "?frequency=nan"] {
            let uri = Uri::parse(&format!("file://frames/*.pgm{query}")).unwrap();
            assert!(
                matches!(
                    FileReaderConfig::from_uri(&uri, &CaptureConfig::default()),
                    Err(HalError::Construction { .. })
                ),
                "{query} accepted"
            );
        }
    }

    #[test]
    fn dropping_slow_playback_returns_promptly() {
        let dir = tempfile::tempdir().unwrap();
        write_pgm(dir.path(), "a.pgm", 2, 2, 1);
        write_pgm(dir.path(), "b.pgm", 2, 2, 2);
        let camera = open(dir.path(), "?frequency=0.25").unwrap();
        camera.capture().unwrap();

        // The reader is now waiting four seconds for the second file.
        std::thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        drop(camera);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn recorded_timestamps_drive_playback() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3u8 {
            write_pgm(dir.path(), &format!("img_{i}.pgm"), 2, 2, i);
        }
        let times = dir.path().join("times.txt");
        fs::write(&times, "# seconds\n100.0\n100.05 extra\n\n100.1\n").unwrap();

        let camera = open(dir.path(), &format!("?timestamps={}", times.display())).unwrap();
        let start = Instant::now();
        let device_times: Vec<f64> = (0..3).map(|_| camera.capture().unwrap().device_time).collect();
        assert!(start.elapsed() >= Duration::from_millis(80));
        assert_eq!(device_times, vec![100.0, 100.05, 100.1]);
    }

    #[test]
    fn timestamp_file_must_cover_every_image() {
        let dir = tempfile::tempdir().unwrap();
        write_pgm(dir.path(), "a.pgm", 2, 2, 1);
        write_pgm(dir.path(), "b.pgm", 2, 2, 2);
        let times = dir.path().join("times.txt");
        fs::write(&times, "1.0\n").unwrap();
        let err = open(dir.path(), &format!("?timestamps={}", times.display())).err().unwrap();
        assert!(err.to_string().contains("1 times for 2 images"));

        fs::write(&times, "2.0\n1.0\n").unwrap();
        assert!(load_timestamps(&times).is_err());
    }
}
