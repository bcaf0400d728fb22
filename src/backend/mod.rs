//! Platform capture backends.
//!
//! Each backend owns one open device stream and publishes frames into a
//! [`FrameSlot`](crate::slot::FrameSlot). The session layer only ever
//! sees the [`CaptureBackend`] trait; which concrete backend runs is
//! decided here from the device's concrete type.
//!
//! Linux uses V4L2 directly by default; the `gstreamer` feature swaps in
//! pipeline-based capture with compressed-mode decode. macOS and Windows
//! go through the platform media frameworks via `nokhwa`.

use crate::device::DeviceRef;
use crate::errors::CaptureError;
use crate::surface::SurfaceRef;
use crate::types::Mode;

pub mod dummy;
pub mod worker;

#[cfg(target_os = "linux")]
pub mod v4l2;

#[cfg(all(target_os = "linux", feature = "gstreamer"))]
pub mod gst;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "windows")]
pub mod windows;

/// One live capture stream on one device.
///
/// Lifecycle: construct (negotiates the mode with the device, so the
/// reported size is final), `start()` (begins producing), poll
/// `check_new_frame()` / `surface()`, `stop()`. `start()` after `start()` is a no-op, as is
/// `stop()` after `stop()`. A backend that hits an unrecoverable device
/// error stops producing and reports `is_capturing() == false`.
pub trait CaptureBackend: Send {
    fn start(&mut self) -> Result<(), CaptureError>;

    fn stop(&mut self);

    fn is_capturing(&self) -> bool;

    /// Non-consuming check for a frame published since the last
    /// `surface()` call.
    fn check_new_frame(&self) -> bool;

    /// Latest published frame; `None` before the first frame arrives.
    /// Clears the new-frame flag.
    fn surface(&self) -> Option<SurfaceRef>;

    /// Negotiated output width.
    fn width(&self) -> u32;

    /// Negotiated output height.
    fn height(&self) -> u32;
}

/// Enumerate the platform's capture devices.
///
/// Per-device probe failures are logged and skipped; an empty list is a
/// valid result, not an error. Virtual test devices are never included
/// here; callers construct those explicitly.
pub fn enumerate_devices() -> Vec<DeviceRef> {
    #[cfg(all(target_os = "linux", feature = "gstreamer"))]
    {
        gst::enumerate()
    }
    #[cfg(all(target_os = "linux", not(feature = "gstreamer")))]
    {
        v4l2::enumerate()
    }
    #[cfg(target_os = "macos")]
    {
        macos::enumerate()
    }
    #[cfg(target_os = "windows")]
    {
        windows::enumerate()
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        log::warn!("no capture backend for this platform");
        Vec::new()
    }
}

/// Build the backend matching the device's concrete type, negotiating
/// the mode nearest `width` x `height`. `pool_surfaces` sets the depth
/// of the backend's frame buffer pool.
pub fn create_backend(
    device: DeviceRef,
    width: u32,
    height: u32,
    pool_surfaces: usize,
) -> Result<Box<dyn CaptureBackend>, CaptureError> {
    if device.as_any().is::<dummy::DummyDevice>() {
        return Ok(Box::new(dummy::DummyBackend::new(device, width, height, pool_surfaces)?));
    }

    #[cfg(all(target_os = "linux", feature = "gstreamer"))]
    if device.as_any().is::<gst::GStreamerDevice>() {
        return Ok(Box::new(gst::GStreamerBackend::new(device, width, height, pool_surfaces)?));
    }

    #[cfg(target_os = "linux")]
    if device.as_any().is::<v4l2::V4l2Device>() {
        return Ok(Box::new(v4l2::V4l2Backend::new(device, width, height, pool_surfaces)?));
    }

    #[cfg(target_os = "macos")]
    if device.as_any().is::<macos::MacosDevice>() {
        return Ok(Box::new(macos::MacosBackend::new(device, width, height, pool_surfaces)?));
    }

    #[cfg(target_os = "windows")]
    if device.as_any().is::<windows::WindowsDevice>() {
        return Ok(Box::new(windows::WindowsBackend::new(device, width, height, pool_surfaces)?));
    }

    Err(CaptureError::DeviceFailure(format!(
        "no backend for device '{}'",
        device.name()
    )))
}

/// Build the backend for one exact enumerated mode, skipping negotiation.
pub fn create_backend_with_mode(
    device: DeviceRef,
    mode: &Mode,
    pool_surfaces: usize,
) -> Result<Box<dyn CaptureBackend>, CaptureError> {
    if device.as_any().is::<dummy::DummyDevice>() {
        return Ok(Box::new(dummy::DummyBackend::with_mode(device, mode, pool_surfaces)?));
    }

    #[cfg(all(target_os = "linux", feature = "gstreamer"))]
    if device.as_any().is::<gst::GStreamerDevice>() {
        return Ok(Box::new(gst::GStreamerBackend::with_mode(device, mode, pool_surfaces)?));
    }

    #[cfg(target_os = "linux")]
    if device.as_any().is::<v4l2::V4l2Device>() {
        return Ok(Box::new(v4l2::V4l2Backend::with_mode(device, mode, pool_surfaces)?));
    }

    #[cfg(target_os = "macos")]
    if device.as_any().is::<macos::MacosDevice>() {
        return Ok(Box::new(macos::MacosBackend::with_mode(device, mode, pool_surfaces)?));
    }

    #[cfg(target_os = "windows")]
    if device.as_any().is::<windows::WindowsDevice>() {
        return Ok(Box::new(windows::WindowsBackend::with_mode(device, mode, pool_surfaces)?));
    }

    Err(CaptureError::DeviceFailure(format!(
        "no backend for device '{}'",
        device.name()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyDevice;
    use crate::surface::DEFAULT_POOL_SURFACES;
    use std::sync::Arc;

    #[test]
    fn factory_selects_dummy_backend() {
        let device: DeviceRef = Arc::new(DummyDevice::new("Virtual"));
        let backend = create_backend(device, 640, 480, DEFAULT_POOL_SURFACES).unwrap();
        assert_eq!((backend.width(), backend.height()), (640, 480));
        assert!(!backend.is_capturing());
    }

    #[test]
    fn factory_honors_exact_mode() {
        use crate::types::{Codec, FrameRate, Mode, PixelFormat};

        let device: DeviceRef = Arc::new(DummyDevice::new("Virtual"));
        let mode = Mode::new(
            1280,
            720,
            FrameRate::new(30, 1),
            Codec::Uncompressed,
            PixelFormat::Rgb24,
        );
        let backend = create_backend_with_mode(device, &mode, DEFAULT_POOL_SURFACES).unwrap();
        assert_eq!((backend.width(), backend.height()), (1280, 720));
    }
}
