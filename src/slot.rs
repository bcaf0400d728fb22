//! Single-writer / single-reader frame handoff.

use crate::surface::SurfaceRef;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// The handoff point between one producer (capture thread or OS
/// callback) and one polling consumer.
///
/// The producer finishes writing pixel data before calling [`publish`],
/// which stores the frame and then sets the new-frame flag with release
/// semantics; the consumer's acquire load in [`check_new_frame`] /
/// [`surface`] therefore never observes a partially written frame.
///
/// Flag rule: `check_new_frame` is a pure read; `surface` clears the
/// flag. Reading after the flag is false still returns the last
/// published frame (None only before the first frame arrives).
///
/// [`publish`]: FrameSlot::publish
/// [`check_new_frame`]: FrameSlot::check_new_frame
/// [`surface`]: FrameSlot::surface
#[derive(Default)]
pub struct FrameSlot {
    current: Mutex<Option<SurfaceRef>>,
    new_frame: AtomicBool,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer side: replace the current frame and signal the consumer.
    pub fn publish(&self, surface: SurfaceRef) {
        {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            *current = Some(surface);
        }
        self.new_frame.store(true, Ordering::Release);
    }

    /// Consumer side: has a frame been published since the last
    /// `surface()` call? Never blocks, does not consume the frame.
    pub fn check_new_frame(&self) -> bool {
        self.new_frame.load(Ordering::Acquire)
    }

    /// Consumer side: the most recently published frame. Clears the
    /// new-frame flag. Clearing happens before the read so a publish
    /// racing with this call is never silently dropped.
    pub fn surface(&self) -> Option<SurfaceRef> {
        self.new_frame.store(false, Ordering::Release);
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Reset to the pre-first-frame state. Used by backends on start().
    pub fn reset(&self) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = None;
        self.new_frame.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{ChannelOrder, Surface};
    use std::sync::Arc;

    fn frame() -> SurfaceRef {
        Arc::new(Surface::new(2, 2, ChannelOrder::Rgb))
    }

    #[test]
    fn empty_slot_reports_nothing() {
        let slot = FrameSlot::new();
        assert!(!slot.check_new_frame());
        assert!(slot.surface().is_none());
    }

    #[test]
    fn check_does_not_consume_surface_does() {
        let slot = FrameSlot::new();
        slot.publish(frame());

        assert!(slot.check_new_frame());
        assert!(slot.check_new_frame(), "checking must not clear the flag");

        assert!(slot.surface().is_some());
        assert!(!slot.check_new_frame(), "reading the surface clears the flag");
    }

    #[test]
    fn stale_read_returns_last_frame() {
        let slot = FrameSlot::new();
        let f = frame();
        slot.publish(Arc::clone(&f));
        let first = slot.surface().unwrap();

        // Flag is now clear, but the frame is still readable.
        assert!(!slot.check_new_frame());
        let again = slot.surface().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn publish_replaces_previous_frame() {
        let slot = FrameSlot::new();
        let a = frame();
        let b = frame();
        slot.publish(Arc::clone(&a));
        slot.publish(Arc::clone(&b));
        let seen = slot.surface().unwrap();
        assert!(Arc::ptr_eq(&seen, &b));
    }

    #[test]
    fn reset_clears_frame_and_flag() {
        let slot = FrameSlot::new();
        slot.publish(frame());
        slot.reset();
        assert!(!slot.check_new_frame());
        assert!(slot.surface().is_none());
    }
}
