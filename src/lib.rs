//! framegrab: cross-platform live video capture
//!
//! This crate turns platform camera APIs into one polling interface:
//! enumerate devices, open a [`CaptureSession`] at a requested size, and
//! read RGB frames as shared [`Surface`] buffers.
//!
//! # Backends
//! - Linux: V4L2 via memory-mapped streaming (default), or GStreamer
//!   pipelines with compressed-mode decode behind the `gstreamer`
//!   feature
//! - macOS: AVFoundation via `nokhwa`
//! - Windows: Media Foundation via `nokhwa`
//! - Any platform: a synthetic dummy backend for tests and hosts
//!   without cameras
//!
//! # Usage
//! ```rust,no_run
//! use framegrab::CaptureSession;
//!
//! let mut session = CaptureSession::new(640, 480, None)?;
//! session.start()?;
//! while !session.check_new_frame() {
//!     std::thread::sleep(std::time::Duration::from_millis(5));
//! }
//! if let Some(frame) = session.surface() {
//!     // frame.data() is tightly packed RGB24
//!     let _ = (frame.width(), frame.height(), frame.data());
//! }
//! session.stop();
//! # Ok::<(), framegrab::CaptureError>(())
//! ```

pub mod backend;
pub mod config;
pub mod convert;
pub mod device;
pub mod errors;
pub mod session;
pub mod slot;
pub mod surface;
pub mod types;

// Re-exports for convenience
pub use config::FramegrabConfig;
pub use device::{pick_default_device, CaptureDevice, DeviceRef, DeviceRegistry};
pub use errors::CaptureError;
pub use session::CaptureSession;
pub use surface::{ChannelOrder, Surface, SurfaceCache, SurfaceRef, DEFAULT_POOL_SURFACES};
pub use types::{best_mode_for, Codec, FrameRate, Mode, PixelFormat};

/// Initialize logging for the capture system
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "framegrab=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
