use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, bounded, select};

use super::{detector::KeypointSource, video::VideoSource};
use crate::types::{Frame, Pose};

/// Detector shared between the activation record and its live loop.
pub type SharedDetector = Arc<Mutex<Box<dyn KeypointSource>>>;

/// Owning side of a cancellation token. Cancelling is permanent; a new
/// activation needs a new source.
#[derive(Debug)]
pub struct CancelSource {
    cancelled: Arc<AtomicBool>,
    wake_tx: Option<Sender<()>>,
    wake_rx: Receiver<()>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(0);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            wake_tx: Some(wake_tx),
            wake_rx,
        }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            cancelled: self.cancelled.clone(),
            wake_rx: self.wake_rx.clone(),
        }
    }

    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Disconnecting the channel wakes any loop parked on a tick.
        self.wake_tx.take();
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancelSource {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Clone, Debug)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    wake_rx: Receiver<()>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Display refresh signal. Ticks are not queued while a slow iteration runs,
/// so the loop never builds a backlog.
pub struct DisplayClock {
    ticks: Receiver<Instant>,
}

impl DisplayClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            ticks: crossbeam_channel::tick(interval.max(Duration::from_millis(1))),
        }
    }

    pub fn from_refresh_rate(hz: f32) -> Self {
        Self::new(Duration::from_secs_f32(1.0 / hz.max(1.0)))
    }

    /// Blocks until the next tick. Returns `false` once `token` is cancelled.
    pub fn wait_next(&self, token: &CancelToken) -> bool {
        if token.is_cancelled() {
            return false;
        }
        select! {
            recv(self.ticks) -> _ => !token.is_cancelled(),
            recv(token.wake_rx) -> _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub iterations: u64,
    pub delivered: u64,
    pub failures: u64,
}

/// Runs the estimate loop on the calling thread until `token` is cancelled.
///
/// Each iteration reads the current frame, estimates poses and hands them to
/// `on_frame_result`, then parks until the next display tick. Results that
/// finish after cancellation are dropped.
pub fn run<F>(
    video: &dyn VideoSource,
    detector: &SharedDetector,
    token: &CancelToken,
    clock: &DisplayClock,
    mut on_frame_result: F,
) -> LoopSummary
where
    F: FnMut(&Frame, Vec<Pose>),
{
    let mut summary = LoopSummary::default();

    loop {
        if token.is_cancelled() {
            break;
        }
        summary.iterations += 1;

        if let Some(frame) = video.current_frame() {
            let estimate = {
                let mut detector = detector.lock().unwrap_or_else(PoisonError::into_inner);
                detector.estimate(&frame)
            };
            match estimate {
                Ok(poses) if !token.is_cancelled() => {
                    on_frame_result(&frame, poses);
                    summary.delivered += 1;
                }
                Ok(_) => break,
                Err(err) => {
                    summary.failures += 1;
                    log::warn!("pose estimation failed: {err:?}");
                }
            }
        }

        if !clock.wait_next(token) {
            break;
        }
    }

    summary
}
