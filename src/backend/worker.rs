//! Dedicated capture-thread lifecycle.
//!
//! Backends that own their producer thread (v4l2, dummy) drive it
//! through a [`CaptureLoop`]: an atomic stop flag plus a join handle,
//! so `stop()` can synchronously quiesce the producer before returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// What the loop body wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    /// Leave the loop; used on device failure so the thread winds down
    /// without waiting for an external stop.
    Stop,
}

/// Controller for one producer thread.
pub struct CaptureLoop {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    name: &'static str,
}

impl CaptureLoop {
    /// Spawn the producer. `init` runs once on the new thread and builds
    /// the thread-owned state (device handle, mmap stream); if it fails
    /// the thread exits after logging. `body` runs one iteration per
    /// call until it returns [`LoopAction::Stop`] or [`stop`] is called.
    ///
    /// [`stop`]: CaptureLoop::stop
    pub fn spawn<S, I, F>(name: &'static str, init: I, mut body: F) -> std::io::Result<Self>
    where
        S: 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut state = match init() {
                    Ok(state) => state,
                    Err(err) => {
                        log::warn!("{}: capture thread init failed: {}", name, err);
                        return;
                    }
                };

                while !thread_stop.load(Ordering::Acquire) {
                    if body(&mut state) == LoopAction::Stop {
                        log::debug!("{}: capture loop stopped itself", name);
                        break;
                    }
                }
                // state (and any mmap it owns) drops here, after the
                // last iteration, never while a frame copy is in flight.
            })?;

        Ok(Self {
            handle: Some(handle),
            stop,
            name,
        })
    }

    /// Whether the producer thread is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Signal the loop and join the thread. Idempotent; must not be
    /// called from the producer thread itself.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("{}: capture thread panicked", self.name);
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn loop_runs_until_stopped() {
        let ticks = Arc::new(AtomicU32::new(0));
        let loop_ticks = Arc::clone(&ticks);

        let mut ctl = CaptureLoop::spawn(
            "test-loop",
            || Ok(()),
            move |_| {
                loop_ticks.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
                LoopAction::Continue
            },
        )
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        ctl.stop();
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen > 0);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(ticks.load(Ordering::SeqCst), seen, "no ticks after stop");
    }

    #[test]
    fn stop_twice_is_safe() {
        let mut ctl = CaptureLoop::spawn("idle", || Ok(()), |_| LoopAction::Continue).unwrap();
        ctl.stop();
        ctl.stop();
        assert!(!ctl.is_running());
    }

    #[test]
    fn body_can_stop_itself() {
        let mut ctl = CaptureLoop::spawn("one-shot", || Ok(()), |_| LoopAction::Stop).unwrap();
        while ctl.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        ctl.stop();
    }

    #[test]
    fn init_failure_skips_body() {
        let ran = Arc::new(AtomicBool::new(false));
        let body_ran = Arc::clone(&ran);

        let mut ctl = CaptureLoop::spawn(
            "bad-init",
            || Err::<(), _>("no device".into()),
            move |_| {
                body_ran.store(true, Ordering::SeqCst);
                LoopAction::Stop
            },
        )
        .unwrap();
        ctl.stop();
        assert!(!ran.load(Ordering::SeqCst));
    }
}
