//! Capture mode data model and resolution negotiation.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Video codec a capture mode delivers its samples in.
///
/// The variant order doubles as the decode-cost order (raw cheapest),
/// which is what mode ordering falls back to after resolution and rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Codec {
    Uncompressed,
    Jpeg,
    H264,
    Hevc,
    Unknown,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Uncompressed => "Uncompressed",
            Codec::Jpeg => "JPEG",
            Codec::H264 => "H264",
            Codec::Hevc => "HEVC",
            Codec::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel layout of the samples a device hands us, before conversion to
/// the output channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Argb32,
    Bgra32,
    Yuv420p,
    Nv12,
    Yuy2,
    Uyvy,
    I420,
    Yv12,
    Unknown,
}

impl PixelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Bgr24 => "BGR24",
            PixelFormat::Argb32 => "ARGB32",
            PixelFormat::Bgra32 => "BGRA32",
            PixelFormat::Yuv420p => "YUV420P",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Yuy2 => "YUY2",
            PixelFormat::Uyvy => "UYVY",
            PixelFormat::I420 => "I420",
            PixelFormat::Yv12 => "YV12",
            PixelFormat::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frames per second as an exact rational, the way drivers report it
/// (29.97 fps arrives as 30000/1001, never as a rounded float).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Self {
        Self {
            num,
            den: den.max(1),
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl PartialEq for FrameRate {
    fn eq(&self, other: &Self) -> bool {
        // Cross-multiplied so 30/1 == 60/2.
        self.num as u64 * other.den as u64 == other.num as u64 * self.den as u64
    }
}

impl Eq for FrameRate {}

impl PartialOrd for FrameRate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrameRate {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.num as u64 * other.den as u64).cmp(&(other.num as u64 * self.den as u64))
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.as_f64();
        if fps.fract() == 0.0 {
            write!(f, "{:.0}", fps)
        } else {
            write!(f, "{:.2}", fps)
        }
    }
}

/// One concrete capture configuration a device can produce.
///
/// Immutable value type. `platform_data` is an opaque backend-specific
/// blob (a caps string for GStreamer, a fourcc for V4L2) carried from
/// enumeration back into backend construction so the exact enumerated
/// format can be requested again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mode {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub codec: Codec,
    pub pixel_format: PixelFormat,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_data: Option<String>,
}

impl Mode {
    pub fn new(
        width: u32,
        height: u32,
        frame_rate: FrameRate,
        codec: Codec,
        pixel_format: PixelFormat,
    ) -> Self {
        Self {
            width,
            height,
            frame_rate,
            codec,
            pixel_format,
            description: String::new(),
            platform_data: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_platform_data(mut self, data: impl Into<String>) -> Self {
        self.platform_data = Some(data.into());
        self
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_compressed(&self) -> bool {
        self.codec != Codec::Uncompressed
    }

    fn order_key(&self) -> (u64, FrameRate, Codec, PixelFormat) {
        (self.pixel_count(), self.frame_rate, self.codec, self.pixel_format)
    }
}

impl PartialEq for Mode {
    fn eq(&self, other: &Self) -> bool {
        self.order_key() == other.order_key()
    }
}

impl Eq for Mode {}

impl PartialOrd for Mode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Mode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} @{}fps {} {}",
            self.width, self.height, self.frame_rate, self.codec, self.pixel_format
        )
    }
}

/// Select the mode whose pixel count is nearest the requested size.
///
/// Ties resolve to the first such mode in the list's original order, so
/// selection is deterministic for a given enumeration. Returns `None`
/// only for an empty list; callers then fall back to requesting the raw
/// width/height from the driver.
pub fn best_mode_for(modes: &[Mode], width: u32, height: u32) -> Option<&Mode> {
    let target = width as i64 * height as i64;
    let mut best: Option<(&Mode, i64)> = None;

    for mode in modes {
        let diff = (mode.pixel_count() as i64 - target).abs();
        match best {
            Some((_, best_diff)) if diff >= best_diff => {}
            _ => best = Some((mode, diff)),
        }
    }

    best.map(|(mode, _)| mode)
}
