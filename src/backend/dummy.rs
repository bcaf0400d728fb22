//! Inert stand-in backend producing synthetic frames.
//!
//! Used on hosts without camera access and by the test suite: a
//! dedicated thread renders a moving gradient at the negotiated frame
//! rate, exercising the exact same pool/handoff path the hardware
//! backends use.

use crate::backend::worker::{CaptureLoop, LoopAction};
use crate::backend::CaptureBackend;
use crate::device::{CaptureDevice, DeviceRef};
use crate::errors::CaptureError;
use crate::slot::FrameSlot;
use crate::surface::{ChannelOrder, SurfaceCache};
use crate::types::{best_mode_for, Codec, FrameRate, Mode, PixelFormat};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A virtual camera with a fixed set of synthetic modes.
pub struct DummyDevice {
    name: String,
    unique_id: String,
    modes: Vec<Mode>,
    front_facing: bool,
}

impl DummyDevice {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let unique_id = format!("dummy:{}", name.to_lowercase().replace(' ', "-"));
        Self {
            name,
            unique_id,
            modes: Self::default_modes(),
            front_facing: false,
        }
    }

    pub fn front_facing(mut self, front: bool) -> Self {
        self.front_facing = front;
        self
    }

    pub fn with_modes(mut self, modes: Vec<Mode>) -> Self {
        self.modes = modes;
        self
    }

    fn default_modes() -> Vec<Mode> {
        [(640, 480, 30), (640, 480, 60), (1280, 720, 30), (1920, 1080, 30)]
            .iter()
            .map(|&(w, h, fps)| {
                Mode::new(w, h, FrameRate::new(fps, 1), Codec::Uncompressed, PixelFormat::Rgb24)
                    .with_description("synthetic")
            })
            .collect()
    }
}

impl CaptureDevice for DummyDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn check_available(&self) -> bool {
        true
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn modes(&self) -> Vec<Mode> {
        self.modes.clone()
    }

    fn is_front_facing(&self) -> bool {
        self.front_facing
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Render one synthetic frame: an RGB gradient that shifts every frame
/// so consecutive frames differ.
fn render_pattern(data: &mut [u8], width: u32, height: u32, frame: u64) {
    let base = (frame % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }
}

pub struct DummyBackend {
    width: u32,
    height: u32,
    frame_rate: FrameRate,
    cache: Arc<SurfaceCache>,
    slot: Arc<FrameSlot>,
    capturing: Arc<AtomicBool>,
    worker: Option<CaptureLoop>,
}

impl DummyBackend {
    pub fn new(
        device: DeviceRef,
        width: u32,
        height: u32,
        pool_surfaces: usize,
    ) -> Result<Self, CaptureError> {
        let modes = device.modes();
        let negotiated = best_mode_for(&modes, width, height)
            .cloned()
            // No enumerated modes: accept the raw request as-is.
            .unwrap_or_else(|| {
                Mode::new(width, height, FrameRate::new(30, 1), Codec::Uncompressed, PixelFormat::Rgb24)
            });
        Self::with_mode(device, &negotiated, pool_surfaces)
    }

    pub fn with_mode(
        device: DeviceRef,
        mode: &Mode,
        pool_surfaces: usize,
    ) -> Result<Self, CaptureError> {
        if mode.width == 0 || mode.height == 0 {
            return Err(CaptureError::InitFailed(format!(
                "degenerate mode {}x{} on device {}",
                mode.width,
                mode.height,
                device.name()
            )));
        }

        log::info!("dummy backend on '{}' using mode {}", device.name(), mode);
        Ok(Self {
            width: mode.width,
            height: mode.height,
            frame_rate: mode.frame_rate,
            cache: Arc::new(SurfaceCache::new(
                mode.width,
                mode.height,
                ChannelOrder::Rgb,
                pool_surfaces,
            )),
            slot: Arc::new(FrameSlot::new()),
            capturing: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }
}

impl CaptureBackend for DummyBackend {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.capturing.load(Ordering::Acquire) {
            return Ok(());
        }

        self.slot.reset();
        let cache = Arc::clone(&self.cache);
        let slot = Arc::clone(&self.slot);
        let (width, height) = (self.width, self.height);
        let interval = Duration::from_secs_f64(1.0 / self.frame_rate.as_f64().max(1.0));

        let worker = CaptureLoop::spawn(
            "framegrab-dummy",
            || Ok(0u64),
            move |frame: &mut u64| {
                let mut surface = cache.get_new_surface();
                render_pattern(surface.data_mut(), width, height, *frame);
                slot.publish(Arc::new(surface));
                *frame += 1;
                thread::sleep(interval);
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

impl Drop for DummyBackend {
    fn drop(&mut self) {
        self.stop();
    }
}
