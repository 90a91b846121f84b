//! Pixel format conversion stage.
//!
//! `convert:[fmt=RGB8,range=4096]//<camera uri>` wraps another camera and
//! converts every image it delivers to an 8-bit target layout. Multi-byte
//! components (little-endian 16-bit or 32-bit float) are scaled by
//! `255 / range`. Signed components below zero become 0. Images whose layout cannot be interpreted (`Raw`, `Rgba`)
//! pass through untouched.

use crate::error::{HalError, HalResult};
use crate::hardware::capabilities::CameraDriver;
use crate::hardware::factory::{DeviceFactory, ParamSpec};
use crate::hardware::registry::DeviceRegistry;
use crate::messages::{CameraMsg, ImageMsg, PixelFormat, PixelType};
use crate::uri::Uri;
use std::sync::Arc;
use tracing::debug;

/// 8-bit output layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    /// Single 8-bit luminance channel
    Mono8,
    /// Interleaved 8-bit red, green, blue
    Rgb8,
    /// Interleaved 8-bit blue, green, red
    Bgr8,
}

impl TargetFormat {
    /// Parse `MONO8`, `RGB8` or `BGR8` (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "MONO8" => Some(TargetFormat::Mono8),
            "RGB8" => Some(TargetFormat::Rgb8),
            "BGR8" => Some(TargetFormat::Bgr8),
            _ => None,
        }
    }

    fn pixel_format(self) -> PixelFormat {
        match self {
            TargetFormat::Mono8 => PixelFormat::Luminance,
            TargetFormat::Rgb8 => PixelFormat::Rgb,
            TargetFormat::Bgr8 => PixelFormat::Bgr,
        }
    }
}

/// Camera that converts the images of its input device.
pub struct ConvertDriver {
    input: Arc<dyn CameraDriver>,
    target: TargetFormat,
    range: f64,
}

impl ConvertDriver {
    /// Wrap `input`.
    ///
    /// # Errors
    /// Returns [`HalError::Configuration`] for a non-positive `range`.
    pub fn new(input: Arc<dyn CameraDriver>, target: TargetFormat, range: f64) -> HalResult<Self> {
        if !(range > 0.0) {
            return Err(HalError::Configuration(format!(
                "conversion range must be positive, got {range}"
            )));
        }
        Ok(Self {
            input,
            target,
            range,
        })
    }

    fn convert(&self, image: ImageMsg) -> ImageMsg {
        let Some(pixels) = Pixels::decode(&image, self.range) else {
            return image;
        };

        let data = match self.target {
            TargetFormat::Mono8 => pixels.to_mono(),
            TargetFormat::Rgb8 => pixels.to_color(false),
            TargetFormat::Bgr8 => pixels.to_color(true),
        };

        ImageMsg {
            pixel_type: PixelType::UnsignedByte,
            format: self.target.pixel_format(),
            data,
            ..image
        }
    }
}

impl CameraDriver for ConvertDriver {
    fn capture(&self) -> HalResult<CameraMsg> {
        let msg = self.input.capture()?;
        Ok(CameraMsg {
            images: msg.images.into_iter().map(|img| self.convert(img)).collect(),
            ..msg
        })
    }

    fn num_channels(&self) -> usize {
        self.input.num_channels()
    }

    fn width(&self, channel: usize) -> u32 {
        self.input.width(channel)
    }

    fn height(&self, channel: usize) -> u32 {
        self.input.height(channel)
    }

    fn device_property(&self, name: &str) -> Option<String> {
        self.input.device_property(name)
    }

    fn input_device(&self) -> Option<Arc<dyn CameraDriver>> {
        Some(Arc::clone(&self.input))
    }
}

/// Decoded 8-bit components of one image.
struct Pixels {
    components: Vec<u8>,
    /// `None` for luminance, otherwise whether the source is BGR ordered
    bgr: Option<bool>,
}

impl Pixels {
    fn decode(image: &ImageMsg, range: f64) -> Option<Self> {
        let bgr = match image.format {
            PixelFormat::Luminance => None,
            PixelFormat::Rgb => Some(false),
            PixelFormat::Bgr => Some(true),
            PixelFormat::Rgba | PixelFormat::Raw => return None,
        };

        let scale = 255.0 / range;
        let components = match image.pixel_type {
            PixelType::UnsignedByte => image.data.clone(),
            PixelType::Byte => image
                .data
                .iter()
                .map(|&b| i8::from_le_bytes([b]).max(0).unsigned_abs())
                .collect(),
            PixelType::UnsignedShort => image
                .data
                .chunks_exact(2)
                .map(|c| saturate(f64::from(u16::from_le_bytes([c[0], c[1]])) * scale))
                .collect(),
            PixelType::Short => image
                .data
                .chunks_exact(2)
                .map(|c| saturate(f64::from(i16::from_le_bytes([c[0], c[1]])) * scale))
                .collect(),
            PixelType::Float => image
                .data
                .chunks_exact(4)
                .map(|c| saturate(f64::from(f32::from_le_bytes([c[0], c[1], c[2], c[3]])) * scale))
                .collect(),
        };

        Some(Self { components, bgr })
    }

    fn to_mono(&self) -> Vec<u8> {
        match self.bgr {
            None => self.components.clone(),
            Some(bgr) => self
                .components
                .chunks_exact(3)
                .map(|px| {
                    let (r, g, b) = if bgr { (px[2], px[1], px[0]) } else { (px[0], px[1], px[2]) };
                    luminance(r, g, b)
                })
                .collect(),
        }
    }

    fn to_color(&self, want_bgr: bool) -> Vec<u8> {
        match self.bgr {
            None => self.components.iter().flat_map(|&v| [v, v, v]).collect(),
            Some(bgr) if bgr == want_bgr => self.components.clone(),
            Some(_) => self
                .components
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        }
    }
}

fn saturate(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn luminance(r: u8, g: u8, b: u8) -> u8 {
    saturate(0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b))
}

/// Factory for `convert://`.
pub struct ConvertFactory;

impl DeviceFactory<dyn CameraDriver> for ConvertFactory {
    fn name(&self) -> &str {
        "Format conversion"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("fmt", "MONO8", "Output format: MONO8, RGB8 or BGR8"),
            ParamSpec::new("range", "65535", "Input value mapped to 255 for 16-bit and float images"),
        ]
    }

    fn get_device(
        &self,
        uri: &Uri,
        registry: &DeviceRegistry<dyn CameraDriver>,
    ) -> HalResult<Arc<dyn CameraDriver>> {
        let fmt = uri.param("fmt").unwrap_or("MONO8");
        let target = TargetFormat::parse(fmt)
            .ok_or_else(|| HalError::construction(uri, format!("unknown target format '{fmt}'")))?;
        let range: f64 = uri.param_or("range", 65535.0)?;

        let input = registry.create(&uri.url, None)?;
        debug!(input = %uri.url, ?target, range, "Wrapping camera in converter");

        let driver = ConvertDriver::new(input, target, range)
            .map_err(|e| HalError::construction(uri, e.to_string()))?;
        Ok(Arc::new(driver))
    }
}
