use thiserror::Error;

/// Errors surfaced by the capture subsystem.
///
/// Construction-time problems are fatal to that attempt and propagate as
/// `InitFailed`. Runtime device loss is absorbed by the backend (capture
/// simply stops publishing frames) and never escapes a poll call.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Device could not be opened, no devices exist, or the requested
    /// format has no usable fallback.
    #[error("capture initialization failed: {0}")]
    InitFailed(String),

    /// The negotiated pixel layout could not be mapped onto the expected
    /// output channel order.
    #[error("invalid channel order: {0}")]
    InvalidChannelOrder(String),

    /// Device vanished or errored mid-capture. Used internally by the
    /// producers; consumers observe it as `is_capturing()` turning false.
    #[error("device failure: {0}")]
    DeviceFailure(String),
}
