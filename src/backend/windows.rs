//! Media Foundation capture via `nokhwa`.
//!
//! Same shape as the AVFoundation backend: a `CallbackCamera` delivers
//! frames on the framework's thread and the callback publishes decoded
//! RGB into the frame slot.

use crate::backend::CaptureBackend;
use crate::device::{CaptureDevice, DeviceRef};
use crate::errors::CaptureError;
use crate::slot::FrameSlot;
use crate::surface::{ChannelOrder, SurfaceCache};
use crate::types::{best_mode_for, Codec, FrameRate, Mode, PixelFormat};
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
    CallbackCamera,
};
use std::any::Any;
use std::sync::{Arc, Mutex};

/// A camera reported by Media Foundation.
pub struct WindowsDevice {
    index: u32,
    name: String,
    unique_id: String,
    description: String,
}

impl WindowsDevice {
    pub fn description(&self) -> &str {
        &self.description
    }
}

fn common_modes() -> Vec<Mode> {
    [(1920u32, 1080u32), (1280, 720), (640, 480)]
        .iter()
        .map(|&(w, h)| {
            Mode::new(w, h, FrameRate::new(30, 1), Codec::Jpeg, PixelFormat::Unknown)
                .with_description("MJPEG")
        })
        .collect()
}

impl CaptureDevice for WindowsDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn check_available(&self) -> bool {
        query(ApiBackend::MediaFoundation)
            .map(|cameras| {
                cameras
                    .iter()
                    .any(|c| c.index() == &CameraIndex::Index(self.index))
            })
            .unwrap_or(false)
    }

    fn is_connected(&self) -> bool {
        self.check_available()
    }

    fn modes(&self) -> Vec<Mode> {
        common_modes()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn enumerate() -> Vec<DeviceRef> {
    let cameras = match query(ApiBackend::MediaFoundation) {
        Ok(cameras) => cameras,
        Err(err) => {
            log::warn!("Media Foundation query failed: {}", err);
            return Vec::new();
        }
    };

    cameras
        .into_iter()
        .enumerate()
        .map(|(i, info)| {
            log::info!("found '{}'", info.human_name());
            Arc::new(WindowsDevice {
                index: i as u32,
                unique_id: format!("mf:{}", i),
                name: info.human_name(),
                description: info.description().to_string(),
            }) as DeviceRef
        })
        .collect()
}

pub struct WindowsBackend {
    camera: Mutex<CallbackCamera>,
    width: u32,
    height: u32,
    slot: Arc<FrameSlot>,
    capturing: bool,
}

impl WindowsBackend {
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
        let win = device.as_any().downcast_ref::<WindowsDevice>().ok_or_else(|| {
            CaptureError::InitFailed(format!(
                "'{}' is not a Media Foundation device",
                device.name()
            ))
        })?;

        log::info!("media foundation backend on '{}' using mode {}", win.name, mode);

        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Exact(
            nokhwa::utils::CameraFormat::new(
                nokhwa::utils::Resolution::new(mode.width, mode.height),
                nokhwa::utils::FrameFormat::MJPEG,
                mode.frame_rate.as_f64().round().max(1.0) as u32,
            ),
        ));
        let mut camera = CallbackCamera::new(CameraIndex::Index(win.index), requested, |_| {})
            .map_err(|e| CaptureError::InitFailed(format!("camera init: {}", e)))?;

        let slot = Arc::new(FrameSlot::new());
        let cache = SurfaceCache::new(mode.width, mode.height, ChannelOrder::Rgb, pool_surfaces);
        let publish = Arc::clone(&slot);
        camera
            .set_callback(move |buffer: nokhwa::Buffer| match buffer.decode_image::<RgbFormat>() {
                Ok(rgb) => {
                    let mut surface = cache.get_new_surface();
                    surface.copy_rows(rgb.as_raw(), rgb.width() as usize * 3);
                    publish.publish(Arc::new(surface));
                }
                Err(err) => log::debug!("dropping undecodable frame: {}", err),
            })
            .map_err(|e| CaptureError::InitFailed(format!("setting frame callback: {}", e)))?;

        Ok(Self {
            camera: Mutex::new(camera),
            width: mode.width,
            height: mode.height,
            slot,
            capturing: false,
        })
    }
}

impl CaptureBackend for WindowsBackend {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.capturing {
            return Ok(());
        }

        self.slot.reset();
        let mut camera = self
            .camera
            .lock()
            .map_err(|_| CaptureError::InitFailed("camera lock poisoned".into()))?;
        camera
            .open_stream()
            .map_err(|e| CaptureError::InitFailed(format!("opening stream: {}", e)))?;
        drop(camera);

        self.capturing = true;
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut camera) = self.camera.lock() {
            if let Err(err) = camera.stop_stream() {
                log::warn!("stopping stream: {}", err);
            }
        }
        self.capturing = false;
    }

    fn is_capturing(&self) -> bool {
        self.capturing
            && self
                .camera
                .lock()
                .map(|c| c.is_stream_open())
                .unwrap_or(false)
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

impl Drop for WindowsBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

unsafe impl Send for WindowsBackend {}
