//! GStreamer pipeline backend (Linux, `gstreamer` feature).
//!
//! Replaces direct V4L2 access with a decode-capable pipeline, which is
//! what makes H.264/HEVC camera modes usable. Devices come from a
//! `DeviceMonitor` probe; each capture session builds
//! `source ! [capsfilter] ! [decoder chain] ! videoconvert ! appsink`
//! with the chain picked from the negotiated mode's codec, falling back
//! to `decodebin` when the codec is unrecognized. A bus-watch thread
//! turns pipeline errors into a stopped, non-capturing backend.

use crate::backend::worker::{CaptureLoop, LoopAction};
use crate::backend::CaptureBackend;
use crate::device::{CaptureDevice, DeviceRef};
use crate::errors::CaptureError;
use crate::slot::FrameSlot;
use crate::surface::{ChannelOrder, SurfaceCache};
use crate::types::{best_mode_for, Codec, FrameRate, Mode, PixelFormat};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::any::Any;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A camera discovered through the GStreamer device monitor.
pub struct GStreamerDevice {
    device: gst::Device,
    name: String,
    unique_id: String,
    modes: Vec<Mode>,
}

impl CaptureDevice for GStreamerDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn check_available(&self) -> bool {
        self.device.create_element(None).is_ok()
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn modes(&self) -> Vec<Mode> {
        self.modes.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Probe video sources through a `DeviceMonitor`.
pub fn enumerate() -> Vec<DeviceRef> {
    if let Err(err) = gst::init() {
        log::warn!("gstreamer init failed: {}", err);
        return Vec::new();
    }

    let monitor = gst::DeviceMonitor::new();
    monitor.add_filter(Some("Video/Source"), None);
    if let Err(err) = monitor.start() {
        log::warn!("device monitor start failed: {}", err);
        return Vec::new();
    }
    let found = monitor.devices();
    monitor.stop();

    let mut devices: Vec<DeviceRef> = Vec::new();
    for (index, device) in found.into_iter().enumerate() {
        let name = device.display_name().to_string();
        let modes = device.caps().map(|caps| modes_from_caps(&caps)).unwrap_or_default();
        if modes.is_empty() {
            log::debug!("'{}' exposes no usable caps, skipping", name);
            continue;
        }
        log::info!("found '{}' ({} modes)", name, modes.len());
        devices.push(Arc::new(GStreamerDevice {
            device,
            unique_id: format!("gst:{}:{}", index, name),
            name,
            modes,
        }));
    }
    devices
}

/// Flatten a device's caps into the mode list. Each fixed structure
/// becomes one mode; the serialized structure rides along so capture can
/// request exactly what was enumerated.
fn modes_from_caps(caps: &gst::Caps) -> Vec<Mode> {
    let mut modes = Vec::new();

    for s in caps.iter() {
        let (codec, pixel_format) = match s.name().as_str() {
            "video/x-raw" => {
                let format = s.get::<&str>("format").unwrap_or("");
                (Codec::Uncompressed, raw_format(format))
            }
            "image/jpeg" => (Codec::Jpeg, PixelFormat::Unknown),
            "video/x-h264" => (Codec::H264, PixelFormat::Unknown),
            "video/x-h265" => (Codec::Hevc, PixelFormat::Unknown),
            _ => continue,
        };

        // Range-valued structures are not one concrete mode; skip them.
        let (width, height) = match (s.get::<i32>("width"), s.get::<i32>("height")) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w as u32, h as u32),
            _ => continue,
        };
        let frame_rate = s
            .get::<gst::Fraction>("framerate")
            .map(|f| FrameRate::new(f.numer().max(0) as u32, f.denom().max(1) as u32))
            .unwrap_or_else(|_| FrameRate::new(30, 1));

        modes.push(
            Mode::new(width, height, frame_rate, codec, pixel_format)
                .with_description(s.name().as_str())
                .with_platform_data(s.to_string()),
        );
    }

    modes
}

fn raw_format(format: &str) -> PixelFormat {
    match format {
        "RGB" => PixelFormat::Rgb24,
        "BGR" => PixelFormat::Bgr24,
        "ARGB" => PixelFormat::Argb32,
        "BGRA" => PixelFormat::Bgra32,
        "YUY2" => PixelFormat::Yuy2,
        "UYVY" => PixelFormat::Uyvy,
        "NV12" => PixelFormat::Nv12,
        "I420" => PixelFormat::I420,
        "YV12" => PixelFormat::Yv12,
        _ => PixelFormat::Unknown,
    }
}

/// Decoder elements between the source and `videoconvert` for each
/// codec. Empty means direct raw delivery; `None` means decodebin.
fn decoder_chain(codec: Codec) -> Option<&'static [&'static str]> {
    match codec {
        Codec::Uncompressed => Some(&[]),
        Codec::Jpeg => Some(&["jpegdec"]),
        Codec::H264 => Some(&["h264parse", "avdec_h264"]),
        Codec::Hevc => Some(&["h265parse", "avdec_h265"]),
        Codec::Unknown => None,
    }
}

pub struct GStreamerBackend {
    pipeline: gst::Pipeline,
    width: u32,
    height: u32,
    slot: Arc<FrameSlot>,
    capturing: Arc<AtomicBool>,
    bus_watch: Option<CaptureLoop>,
}

impl GStreamerBackend {
    pub fn new(
        device: DeviceRef,
        width: u32,
        height: u32,
        pool_surfaces: usize,
    ) -> Result<Self, CaptureError> {
        let modes = device.modes();
        let negotiated = best_mode_for(&modes, width, height).cloned().ok_or_else(|| {
            CaptureError::InitFailed(format!("'{}' has no capture modes", device.name()))
        })?;
        Self::with_mode(device, &negotiated, pool_surfaces)
    }

    pub fn with_mode(
        device: DeviceRef,
        mode: &Mode,
        pool_surfaces: usize,
    ) -> Result<Self, CaptureError> {
        let gst_device = device
            .as_any()
            .downcast_ref::<GStreamerDevice>()
            .ok_or_else(|| {
                CaptureError::InitFailed(format!("'{}' is not a GStreamer device", device.name()))
            })?;

        gst::init().map_err(|e| CaptureError::InitFailed(format!("gstreamer init: {}", e)))?;
        log::info!("pipeline backend on '{}' using mode {}", gst_device.name, mode);

        let slot = Arc::new(FrameSlot::new());
        let pipeline = build_pipeline(gst_device, mode, Arc::clone(&slot), pool_surfaces)?;

        Ok(Self {
            pipeline,
            width: mode.width,
            height: mode.height,
            slot,
            capturing: Arc::new(AtomicBool::new(false)),
            bus_watch: None,
        })
    }
}

fn make_element(name: &str) -> Result<gst::Element, CaptureError> {
    gst::ElementFactory::make(name)
        .build()
        .map_err(|e| CaptureError::InitFailed(format!("creating {}: {}", name, e)))
}

fn build_pipeline(
    device: &GStreamerDevice,
    mode: &Mode,
    slot: Arc<FrameSlot>,
    pool_surfaces: usize,
) -> Result<gst::Pipeline, CaptureError> {
    let pipeline = gst::Pipeline::new();

    let src = device
        .device
        .create_element(None)
        .map_err(|e| CaptureError::InitFailed(format!("source element: {}", e)))?;

    let convert = make_element("videoconvert")?;

    let out_caps = gst::Caps::builder("video/x-raw")
        .field("format", "RGB")
        .field("width", mode.width as i32)
        .field("height", mode.height as i32)
        .build();
    let appsink = gst_app::AppSink::builder()
        .name("sink")
        .caps(&out_caps)
        .max_buffers(2)
        .drop(true)
        .sync(false)
        .build();

    let cache = SurfaceCache::new(mode.width, mode.height, ChannelOrder::Rgb, pool_surfaces);
    let height = mode.height as usize;
    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

                let mut surface = cache.get_new_surface();
                // videoconvert may pad rows; derive the stride from the
                // mapped length and clip per row.
                let stride = map.len() / height.max(1);
                surface.copy_rows(map.as_slice(), stride);
                slot.publish(Arc::new(surface));
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );

    match decoder_chain(mode.codec) {
        Some(decoders) => {
            let mut chain: Vec<gst::Element> = vec![src];

            // Pin the source to the exact enumerated format when we
            // still have its caps structure.
            if let Some(data) = &mode.platform_data {
                if let Ok(caps) = gst::Caps::from_str(data) {
                    let filter = gst::ElementFactory::make("capsfilter")
                        .property("caps", caps)
                        .build()
                        .map_err(|e| CaptureError::InitFailed(format!("capsfilter: {}", e)))?;
                    chain.push(filter);
                }
            }

            for name in decoders {
                chain.push(make_element(name)?);
            }
            chain.push(convert);

            let mut elements: Vec<&gst::Element> = chain.iter().collect();
            elements.push(appsink.upcast_ref());
            pipeline
                .add_many(&elements)
                .map_err(|e| CaptureError::InitFailed(format!("assembling pipeline: {}", e)))?;
            gst::Element::link_many(&elements)
                .map_err(|e| CaptureError::InitFailed(format!("linking pipeline: {}", e)))?;
        }
        None => {
            // Unknown codec: let decodebin figure the chain out and hook
            // its dynamic pad up to videoconvert when it appears.
            let decode = make_element("decodebin")?;
            pipeline
                .add_many([&src, &decode, &convert, appsink.upcast_ref()])
                .map_err(|e| CaptureError::InitFailed(format!("assembling pipeline: {}", e)))?;
            src.link(&decode)
                .map_err(|e| CaptureError::InitFailed(format!("linking source: {}", e)))?;
            convert
                .link(appsink.upcast_ref::<gst::Element>())
                .map_err(|e| CaptureError::InitFailed(format!("linking sink: {}", e)))?;

            let convert_weak = convert.downgrade();
            decode.connect_pad_added(move |_, pad| {
                let Some(convert) = convert_weak.upgrade() else {
                    return;
                };
                let Some(sinkpad) = convert.static_pad("sink") else {
                    return;
                };
                if !sinkpad.is_linked() {
                    if let Err(err) = pad.link(&sinkpad) {
                        log::warn!("decodebin pad link failed: {}", err);
                    }
                }
            });
        }
    }

    Ok(pipeline)
}

impl CaptureBackend for GStreamerBackend {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.capturing.load(Ordering::Acquire) {
            return Ok(());
        }

        self.slot.reset();
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CaptureError::InitFailed(format!("pipeline start: {}", e)))?;

        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| CaptureError::InitFailed("pipeline has no bus".into()))?;
        let capturing = Arc::clone(&self.capturing);

        let watch = CaptureLoop::spawn(
            "framegrab-gst-bus",
            move || Ok(bus),
            move |bus: &mut gst::Bus| {
                use gst::MessageView;
                match bus.timed_pop(gst::ClockTime::from_mseconds(100)) {
                    Some(msg) => match msg.view() {
                        MessageView::Error(err) => {
                            log::error!(
                                "pipeline error from {:?}: {}",
                                err.src().map(|s| s.path_string()),
                                err.error()
                            );
                            capturing.store(false, Ordering::Release);
                            LoopAction::Stop
                        }
                        MessageView::Eos(_) => {
                            log::warn!("unexpected end of stream");
                            capturing.store(false, Ordering::Release);
                            LoopAction::Stop
                        }
                        _ => LoopAction::Continue,
                    },
                    None => LoopAction::Continue,
                }
            },
        )
        .map_err(|e| CaptureError::InitFailed(format!("failed to spawn bus watch: {}", e)))?;

        self.bus_watch = Some(watch);
        self.capturing.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) {
        if let Err(err) = self.pipeline.set_state(gst::State::Null) {
            log::warn!("pipeline teardown: {}", err);
        }
        if let Some(mut watch) = self.bus_watch.take() {
            watch.stop();
        }
        self.capturing.store(false, Ordering::Release);
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
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

impl Drop for GStreamerBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_chains_per_codec() {
        assert!(decoder_chain(Codec::Uncompressed).unwrap().is_empty());
        assert_eq!(decoder_chain(Codec::Jpeg), Some(&["jpegdec"][..]));
        assert_eq!(
            decoder_chain(Codec::H264),
            Some(&["h264parse", "avdec_h264"][..])
        );
        assert_eq!(
            decoder_chain(Codec::Hevc),
            Some(&["h265parse", "avdec_h265"][..])
        );
        assert_eq!(decoder_chain(Codec::Unknown), None);
    }

    #[test]
    fn caps_become_modes() {
        gst::init().unwrap();
        let caps = gst::Caps::from_str(
            "video/x-raw, format=YUY2, width=640, height=480, framerate=30/1; \
             image/jpeg, width=1920, height=1080, framerate=30/1",
        )
        .unwrap();

        let modes = modes_from_caps(&caps);
        assert_eq!(modes.len(), 2);
        assert_eq!(modes[0].pixel_format, PixelFormat::Yuy2);
        assert_eq!(modes[1].codec, Codec::Jpeg);
        assert!(modes[1].platform_data.is_some());
    }

    #[test]
    fn range_valued_caps_are_skipped() {
        gst::init().unwrap();
        let caps =
            gst::Caps::from_str("video/x-raw, format=YUY2, width=[ 320, 1920 ], height=480")
                .unwrap();
        assert!(modes_from_caps(&caps).is_empty());
    }
}
