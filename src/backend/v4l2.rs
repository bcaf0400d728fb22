//! V4L2 capture backend, the Linux default.
//!
//! Enumeration scans `/dev/video*` nodes and probes each one for its
//! formats, frame sizes, and frame intervals. Backend construction
//! negotiates a mode and applies it with `VIDIOC_S_FMT` (accepting
//! whatever the driver actually grants), so the reported size is final
//! before `start()` runs the memory-mapped buffer queue on a dedicated
//! thread. Uncompressed frames are converted to RGB24 at publish time;
//! MJPEG frames are decoded with the `image` crate.

use crate::backend::worker::{CaptureLoop, LoopAction};
use crate::backend::CaptureBackend;
use crate::convert::convert_to_rgb;
use crate::device::{CaptureDevice, DeviceRef};
use crate::errors::CaptureError;
use crate::slot::FrameSlot;
use crate::surface::{ChannelOrder, Surface, SurfaceCache};
use crate::types::{best_mode_for, Codec, FrameRate, Mode, PixelFormat};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

const MMAP_BUFFERS: u32 = 4;

/// Classify a V4L2 fourcc into the codec/pixel-format pair it carries.
fn classify_fourcc(fourcc: FourCC) -> (Codec, PixelFormat) {
    match &fourcc.repr {
        b"YUYV" => (Codec::Uncompressed, PixelFormat::Yuy2),
        b"UYVY" => (Codec::Uncompressed, PixelFormat::Uyvy),
        b"NV12" => (Codec::Uncompressed, PixelFormat::Nv12),
        b"YU12" => (Codec::Uncompressed, PixelFormat::I420),
        b"YV12" => (Codec::Uncompressed, PixelFormat::Yv12),
        b"RGB3" => (Codec::Uncompressed, PixelFormat::Rgb24),
        b"BGR3" => (Codec::Uncompressed, PixelFormat::Bgr24),
        b"MJPG" | b"JPEG" => (Codec::Jpeg, PixelFormat::Unknown),
        b"H264" => (Codec::H264, PixelFormat::Unknown),
        b"HEVC" | b"HVC1" => (Codec::Hevc, PixelFormat::Unknown),
        _ => (Codec::Unknown, PixelFormat::Unknown),
    }
}

/// The fourcc to request for a negotiated mode. Prefers the exact
/// enumerated fourcc carried in `platform_data`.
fn fourcc_for(mode: &Mode) -> FourCC {
    if let Some(data) = &mode.platform_data {
        if let Ok(repr) = <[u8; 4]>::try_from(data.as_bytes()) {
            return FourCC::new(&repr);
        }
    }
    match (mode.codec, mode.pixel_format) {
        (Codec::Jpeg, _) => FourCC::new(b"MJPG"),
        (_, PixelFormat::Uyvy) => FourCC::new(b"UYVY"),
        (_, PixelFormat::Nv12) => FourCC::new(b"NV12"),
        (_, PixelFormat::I420) | (_, PixelFormat::Yuv420p) => FourCC::new(b"YU12"),
        (_, PixelFormat::Yv12) => FourCC::new(b"YV12"),
        (_, PixelFormat::Rgb24) => FourCC::new(b"RGB3"),
        (_, PixelFormat::Bgr24) => FourCC::new(b"BGR3"),
        _ => FourCC::new(b"YUYV"),
    }
}

/// Modes this backend can actually deliver: anything uncompressed with a
/// known layout, plus MJPEG. H.264/HEVC modes need the pipeline backend.
fn deliverable(mode: &Mode) -> bool {
    match mode.codec {
        Codec::Uncompressed => mode.pixel_format != PixelFormat::Unknown,
        Codec::Jpeg => true,
        _ => false,
    }
}

/// One `/dev/video*` capture node.
pub struct V4l2Device {
    name: String,
    path: PathBuf,
    unique_id: String,
    modes: Vec<Mode>,
}

impl V4l2Device {
    fn probe(path: PathBuf) -> Result<Self, CaptureError> {
        let device = Device::with_path(&path)
            .map_err(|e| CaptureError::DeviceFailure(format!("{}: {}", path.display(), e)))?;
        let caps = device
            .query_caps()
            .map_err(|e| CaptureError::DeviceFailure(format!("{}: {}", path.display(), e)))?;

        let modes = probe_modes(&device);
        let unique_id = path.display().to_string();
        Ok(Self {
            name: caps.card,
            path,
            unique_id,
            modes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureDevice for V4l2Device {
    fn name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn check_available(&self) -> bool {
        Device::with_path(&self.path).is_ok()
    }

    fn is_connected(&self) -> bool {
        self.path.exists()
    }

    fn modes(&self) -> Vec<Mode> {
        self.modes.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Walk the format/size/interval tables of one open device.
fn probe_modes(device: &Device) -> Vec<Mode> {
    let mut modes = Vec::new();

    let formats = match device.enum_formats() {
        Ok(formats) => formats,
        Err(err) => {
            log::warn!("format enumeration failed: {}", err);
            return modes;
        }
    };

    for desc in formats {
        let (codec, pixel_format) = classify_fourcc(desc.fourcc);
        let sizes = match device.enum_framesizes(desc.fourcc) {
            Ok(sizes) => sizes,
            Err(_) => continue,
        };

        for framesize in sizes {
            match framesize.size {
                v4l::framesize::FrameSizeEnum::Discrete(size) => {
                    push_modes_for_size(
                        device,
                        &mut modes,
                        desc.fourcc,
                        size.width,
                        size.height,
                        codec,
                        pixel_format,
                        &desc.description,
                    );
                }
                v4l::framesize::FrameSizeEnum::Stepwise(step) => {
                    // Drivers with stepwise ranges accept anything in
                    // range; expose the common sizes that fit.
                    for &(w, h) in &[(640u32, 480u32), (1280, 720), (1920, 1080)] {
                        if (step.min_width..=step.max_width).contains(&w)
                            && (step.min_height..=step.max_height).contains(&h)
                        {
                            push_modes_for_size(
                                device,
                                &mut modes,
                                desc.fourcc,
                                w,
                                h,
                                codec,
                                pixel_format,
                                &desc.description,
                            );
                        }
                    }
                }
            }
        }
    }

    modes
}

#[allow(clippy::too_many_arguments)]
fn push_modes_for_size(
    device: &Device,
    modes: &mut Vec<Mode>,
    fourcc: FourCC,
    width: u32,
    height: u32,
    codec: Codec,
    pixel_format: PixelFormat,
    description: &str,
) {
    let mut rates = Vec::new();
    if let Ok(intervals) = device.enum_frameintervals(fourcc, width, height) {
        for interval in intervals {
            // Intervals are frame durations; fps is the reciprocal.
            if let v4l::frameinterval::FrameIntervalEnum::Discrete(frac) = interval.interval {
                rates.push(FrameRate::new(frac.denominator, frac.numerator));
            }
        }
    }
    if rates.is_empty() {
        rates.push(FrameRate::new(30, 1));
    }

    for rate in rates {
        modes.push(
            Mode::new(width, height, rate, codec, pixel_format)
                .with_description(description)
                .with_platform_data(fourcc.to_string()),
        );
    }
}

/// Scan `/dev/video0` through `/dev/video9`, probing each node that
/// exists. Nodes that fail to open or report no capture modes are
/// logged and skipped.
pub fn enumerate() -> Vec<DeviceRef> {
    let mut devices: Vec<DeviceRef> = Vec::new();

    for i in 0..10 {
        let path = PathBuf::from(format!("/dev/video{}", i));
        if !path.exists() {
            continue;
        }
        match V4l2Device::probe(path) {
            Ok(device) => {
                if device.modes.is_empty() {
                    // Metadata nodes and loopback sinks land here.
                    log::debug!("{}: no capture modes, skipping", device.unique_id);
                    continue;
                }
                log::info!(
                    "found '{}' at {} ({} modes)",
                    device.name,
                    device.unique_id,
                    device.modes.len()
                );
                devices.push(Arc::new(device));
            }
            Err(err) => log::warn!("device probe failed: {}", err),
        }
    }

    devices
}

pub struct V4l2Backend {
    path: PathBuf,
    width: u32,
    height: u32,
    fourcc: FourCC,
    fps: u32,
    codec: Codec,
    pixel_format: PixelFormat,
    pool_surfaces: usize,
    // Opened and format-negotiated at construction; start() moves it
    // into the capture thread. None after a stop() until the restart
    // reopens it.
    device: Option<Device>,
    slot: Arc<FrameSlot>,
    capturing: Arc<AtomicBool>,
    worker: Option<CaptureLoop>,
}

impl V4l2Backend {
    pub fn new(
        device: DeviceRef,
        width: u32,
        height: u32,
        pool_surfaces: usize,
    ) -> Result<Self, CaptureError> {
        let modes = device.modes();
        let candidates: Vec<Mode> = modes.into_iter().filter(deliverable).collect();
        let negotiated = best_mode_for(&candidates, width, height).cloned().unwrap_or_else(|| {
            // Nothing enumerated; ask the driver for the raw size and
            // take whatever it grants.
            Mode::new(width, height, FrameRate::new(30, 1), Codec::Uncompressed, PixelFormat::Yuy2)
        });
        Self::with_mode(device, &negotiated, pool_surfaces)
    }

    pub fn with_mode(
        device: DeviceRef,
        mode: &Mode,
        pool_surfaces: usize,
    ) -> Result<Self, CaptureError> {
        let v4l2 = device
            .as_any()
            .downcast_ref::<V4l2Device>()
            .ok_or_else(|| {
                CaptureError::InitFailed(format!("'{}' is not a V4L2 device", device.name()))
            })?;
        if !deliverable(mode) {
            return Err(CaptureError::InitFailed(format!(
                "mode {} needs a decode pipeline this backend does not have",
                mode
            )));
        }

        let mut backend = Self {
            path: v4l2.path.clone(),
            width: mode.width,
            height: mode.height,
            fourcc: fourcc_for(mode),
            fps: mode.frame_rate.as_f64().round().max(1.0) as u32,
            codec: mode.codec,
            pixel_format: mode.pixel_format,
            pool_surfaces,
            device: None,
            slot: Arc::new(FrameSlot::new()),
            capturing: Arc::new(AtomicBool::new(false)),
            worker: None,
        };

        // Negotiate with the driver now: a vanished node or a refused
        // format fails construction, and the granted size is final
        // before anyone reads width()/height().
        let configured = backend.open_and_configure()?;
        backend.device = Some(configured);

        log::info!("v4l2 backend on {} using mode {}", v4l2.unique_id, mode);
        Ok(backend)
    }

    fn open_and_configure(&mut self) -> Result<Device, CaptureError> {
        let device = Device::with_path(&self.path).map_err(|e| {
            CaptureError::InitFailed(format!("{}: {}", self.path.display(), e))
        })?;

        let requested = Format::new(self.width, self.height, self.fourcc);
        let actual = Capture::set_format(&device, &requested).map_err(|e| {
            CaptureError::InitFailed(format!("set_format on {}: {}", self.path.display(), e))
        })?;

        let (codec, pixel_format) = classify_fourcc(actual.fourcc);
        if codec == Codec::Unknown || (codec == Codec::Uncompressed && pixel_format == PixelFormat::Unknown) {
            return Err(CaptureError::InitFailed(format!(
                "driver granted unsupported format {}",
                actual.fourcc
            )));
        }
        if codec != Codec::Uncompressed && codec != Codec::Jpeg {
            return Err(CaptureError::InitFailed(format!(
                "driver granted compressed format {}",
                actual.fourcc
            )));
        }

        // The driver may grant a different size than requested; the
        // granted one is authoritative.
        if (actual.width, actual.height) != (self.width, self.height) {
            log::info!(
                "driver adjusted {}x{} to {}x{}",
                self.width,
                self.height,
                actual.width,
                actual.height
            );
            self.width = actual.width;
            self.height = actual.height;
        }
        self.fourcc = actual.fourcc;
        self.codec = codec;
        self.pixel_format = pixel_format;

        let params = v4l::video::capture::Parameters::with_fps(self.fps);
        if let Err(err) = Capture::set_params(&device, &params) {
            log::warn!("set_params failed, keeping driver default rate: {}", err);
        }

        Ok(device)
    }
}

impl CaptureBackend for V4l2Backend {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.capturing.load(Ordering::Acquire) {
            return Ok(());
        }

        // The device configured at construction feeds the first start;
        // a restart after stop() reopens and reapplies the format.
        let device = match self.device.take() {
            Some(device) => device,
            None => self.open_and_configure()?,
        };
        let (codec, pixel_format) = (self.codec, self.pixel_format);

        self.slot.reset();
        let cache = SurfaceCache::new(self.width, self.height, ChannelOrder::Rgb, self.pool_surfaces);
        let slot = Arc::clone(&self.slot);
        let capturing = Arc::clone(&self.capturing);

        // The stream clones the device's file handle internally, so it
        // may outlive the `Device` value it was created from.
        let worker = CaptureLoop::spawn(
            "framegrab-v4l2",
            move || -> Result<MmapStream<'static>, String> {
                MmapStream::with_buffers(&device, Type::VideoCapture, MMAP_BUFFERS)
                    .map_err(|e| format!("mmap stream: {}", e))
            },
            move |stream: &mut MmapStream<'static>| {
                let (buf, _meta) = match stream.next() {
                    Ok(pair) => pair,
                    Err(err) => {
                        log::warn!("dequeue failed, stopping capture: {}", err);
                        capturing.store(false, Ordering::Release);
                        return LoopAction::Stop;
                    }
                };

                let mut surface = cache.get_new_surface();
                let converted = match codec {
                    Codec::Jpeg => decode_jpeg(buf, &mut surface),
                    _ => convert_to_rgb(buf, pixel_format, &mut surface),
                };
                match converted {
                    Ok(()) => slot.publish(Arc::new(surface)),
                    // A torn MJPEG frame is routine on USB cameras;
                    // drop it and keep going.
                    Err(err) => log::debug!("dropping undecodable frame: {}", err),
                }
                LoopAction::Continue
            },
        )
        .map_err(|e| CaptureError::InitFailed(format!("failed to spawn capture thread: {}", e)))?;

        self.worker = Some(worker);
        self.capturing.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        self.capturing.store(false, Ordering::Release);
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
            && self.worker.as_ref().map_or(false, |w| w.is_running())
    }

    fn check_new_frame(&self) -> bool {
        self.slot.check_new_frame()
    }

    fn surface(&self) -> Option<crate::surface::SurfaceRef> {
        self.slot.surface()
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

impl Drop for V4l2Backend {
    fn drop(&mut self) {
        self.stop();
    }
}

fn decode_jpeg(src: &[u8], dst: &mut Surface) -> Result<(), CaptureError> {
    let decoded = image::load_from_memory_with_format(src, image::ImageFormat::Jpeg)
        .map_err(|e| CaptureError::DeviceFailure(format!("JPEG decode: {}", e)))?;
    let rgb = decoded.to_rgb8();
    dst.copy_rows(rgb.as_raw(), rgb.width() as usize * 3);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_classification() {
        assert_eq!(
            classify_fourcc(FourCC::new(b"YUYV")),
            (Codec::Uncompressed, PixelFormat::Yuy2)
        );
        assert_eq!(classify_fourcc(FourCC::new(b"MJPG")).0, Codec::Jpeg);
        assert_eq!(classify_fourcc(FourCC::new(b"H264")).0, Codec::H264);
        assert_eq!(classify_fourcc(FourCC::new(b"XXXX")).0, Codec::Unknown);
    }

    #[test]
    fn fourcc_roundtrips_through_platform_data() {
        let mode = Mode::new(
            640,
            480,
            FrameRate::new(30, 1),
            Codec::Uncompressed,
            PixelFormat::Yuy2,
        )
        .with_platform_data("UYVY");
        assert_eq!(fourcc_for(&mode), FourCC::new(b"UYVY"));
    }

    #[test]
    fn fourcc_falls_back_to_pixel_format() {
        let mode = Mode::new(
            640,
            480,
            FrameRate::new(30, 1),
            Codec::Uncompressed,
            PixelFormat::Nv12,
        );
        assert_eq!(fourcc_for(&mode), FourCC::new(b"NV12"));

        let jpeg = Mode::new(640, 480, FrameRate::new(30, 1), Codec::Jpeg, PixelFormat::Unknown);
        assert_eq!(fourcc_for(&jpeg), FourCC::new(b"MJPG"));
    }

    #[test]
    fn compressed_video_modes_are_not_deliverable() {
        let h264 = Mode::new(
            1920,
            1080,
            FrameRate::new(30, 1),
            Codec::H264,
            PixelFormat::Unknown,
        );
        assert!(!deliverable(&h264));

        let jpeg = Mode::new(640, 480, FrameRate::new(30, 1), Codec::Jpeg, PixelFormat::Unknown);
        assert!(deliverable(&jpeg));

        let raw_unknown = Mode::new(
            640,
            480,
            FrameRate::new(30, 1),
            Codec::Uncompressed,
            PixelFormat::Unknown,
        );
        assert!(!deliverable(&raw_unknown));
    }

    #[test]
    fn granted_size_is_final_at_construction() {
        // Needs a physical node; hosts without one skip the body.
        let Some(device) = enumerate().into_iter().next() else {
            return;
        };
        let mut backend =
            V4l2Backend::new(device, 640, 480, crate::surface::DEFAULT_POOL_SURFACES).unwrap();
        let granted = (backend.width(), backend.height());
        assert!(granted.0 > 0 && granted.1 > 0);

        // Starting must not renegotiate what construction reported.
        backend.start().unwrap();
        assert_eq!((backend.width(), backend.height()), granted);
        backend.stop();
    }
}
