//! The capture session façade.
//!
//! A [`CaptureSession`] ties one device to one backend and exposes the
//! polling surface consumers use: start, check for a new frame, read the
//! frame, stop. Construction negotiates the capture mode with the
//! device, so `width()`/`height()` are final before `start()` begins
//! producing frames.

use crate::backend::{self, CaptureBackend};
use crate::config::FramegrabConfig;
use crate::device::{pick_default_device, DeviceRef, DeviceRegistry};
use crate::errors::CaptureError;
use crate::surface::{SurfaceRef, DEFAULT_POOL_SURFACES};
use crate::types::Mode;
use std::sync::Arc;

pub struct CaptureSession {
    backend: Box<dyn CaptureBackend>,
    device: DeviceRef,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("device", &self.device.name())
            .finish_non_exhaustive()
    }
}

impl CaptureSession {
    /// Session on `device` (or the default device when `None`) at the
    /// mode nearest the requested size.
    ///
    /// Fails with `InitFailed` when no device is given and none can be
    /// found.
    pub fn new(width: u32, height: u32, device: Option<DeviceRef>) -> Result<Self, CaptureError> {
        let device = match device {
            Some(device) => device,
            None => {
                let devices = DeviceRegistry::global().devices(false);
                pick_default_device(&devices).ok_or_else(|| {
                    CaptureError::InitFailed("no capture devices found".to_string())
                })?
            }
        };

        let backend =
            backend::create_backend(Arc::clone(&device), width, height, DEFAULT_POOL_SURFACES)?;
        Ok(Self { backend, device })
    }

    /// Session locked to one exact enumerated mode.
    pub fn with_mode(device: DeviceRef, mode: &Mode) -> Result<Self, CaptureError> {
        let backend =
            backend::create_backend_with_mode(Arc::clone(&device), mode, DEFAULT_POOL_SURFACES)?;
        Ok(Self { backend, device })
    }

    /// Session from a configuration: preferred device by name fragment
    /// when set, the default device otherwise.
    pub fn from_config(config: &FramegrabConfig) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::InitFailed)?;

        let registry = DeviceRegistry::global();
        let devices = registry.devices(config.capture.force_refresh_on_start);

        let device = if config.capture.preferred_device.is_empty() {
            pick_default_device(&devices)
        } else {
            registry
                .find_by_name_contains(&config.capture.preferred_device)
                .or_else(|| {
                    log::warn!(
                        "preferred device '{}' not found, falling back to default",
                        config.capture.preferred_device
                    );
                    pick_default_device(&devices)
                })
        }
        .ok_or_else(|| CaptureError::InitFailed("no capture devices found".to_string()))?;

        let [width, height] = config.capture.default_resolution;
        let backend = backend::create_backend(
            Arc::clone(&device),
            width,
            height,
            config.pool.surfaces,
        )?;
        Ok(Self { backend, device })
    }

    /// Open the device and begin producing frames. Calling `start` on a
    /// running session is a no-op.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.backend.start()
    }

    /// Stop producing frames. Idempotent; the last frame stays readable.
    pub fn stop(&mut self) {
        self.backend.stop()
    }

    pub fn is_capturing(&self) -> bool {
        self.backend.is_capturing()
    }

    /// Has a frame arrived since the last `surface()` call? Pure read.
    pub fn check_new_frame(&self) -> bool {
        self.backend.check_new_frame()
    }

    /// Most recent frame, `None` before the first arrives. Clears the
    /// new-frame flag.
    pub fn surface(&self) -> Option<SurfaceRef> {
        self.backend.surface()
    }

    /// Negotiated output width.
    pub fn width(&self) -> u32 {
        self.backend.width()
    }

    /// Negotiated output height.
    pub fn height(&self) -> u32 {
        self.backend.height()
    }

    /// The device this session captures from.
    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    /// Devices known to the shared registry.
    pub fn devices(force_refresh: bool) -> Vec<DeviceRef> {
        DeviceRegistry::global().devices(force_refresh)
    }

    /// Exact-name device lookup against the shared registry.
    pub fn find_device_by_name(name: &str) -> Option<DeviceRef> {
        DeviceRegistry::global().find_by_name(name)
    }

    /// Substring device lookup against the shared registry.
    pub fn find_device_by_name_contains(fragment: &str) -> Option<DeviceRef> {
        DeviceRegistry::global().find_by_name_contains(fragment)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
