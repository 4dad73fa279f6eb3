use anyhow::{anyhow, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::CaptureConfig;
use crate::frame::{Frame, SharedFrameBuffer};
use crate::stats::FpsCounter;
use crate::worker::{join_with_timeout, DEFAULT_JOIN_TIMEOUT};

use super::{FrameSource, Grabber};

/// Pause after a failed grab.
const CAPTURE_BACKOFF: Duration = Duration::from_millis(100);
/// Pause when the grabber had nothing and no fps limit paces the loop.
const IDLE_POLL: Duration = Duration::from_millis(1);

enum WorkerState {
    Idle(Box<dyn Grabber>),
    Running {
        stop: Arc<AtomicBool>,
        handle: JoinHandle<Box<dyn Grabber>>,
    },
    /// The worker panicked or did not stop in time and kept the grabber.
    Lost,
}

/// Threaded capture stage over a `Grabber`.
pub struct ScreenCapture {
    buffer: SharedFrameBuffer,
    fps_bits: Arc<AtomicU64>,
    fps_limit: u32,
    join_timeout: Duration,
    state: Mutex<WorkerState>,
}

impl ScreenCapture {
    pub fn new<G: Grabber>(grabber: G, config: &CaptureConfig) -> Self {
        Self {
            buffer: SharedFrameBuffer::new(config.buffer_size),
            fps_bits: Arc::new(AtomicU64::new(0f64.to_bits())),
            fps_limit: config.fps_limit,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            state: Mutex::new(WorkerState::Idle(Box::new(grabber))),
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Number of frames currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FrameSource for ScreenCapture {
    fn start(&self) -> Result<()> {
        let mut state = self.lock_state();
        let grabber = match std::mem::replace(&mut *state, WorkerState::Lost) {
            WorkerState::Idle(grabber) => grabber,
            running @ WorkerState::Running { .. } => {
                *state = running;
                return Ok(());
            }
            WorkerState::Lost => {
                return Err(anyhow!(
                    "capture worker did not shut down cleanly; source cannot be restarted"
                ))
            }
        };

        let name = grabber.name();
        let stop = Arc::new(AtomicBool::new(false));
        let worker = CaptureWorker {
            grabber,
            buffer: self.buffer.clone(),
            fps_bits: self.fps_bits.clone(),
            stop: stop.clone(),
            min_interval: if self.fps_limit > 0 {
                Duration::from_secs_f64(1.0 / f64::from(self.fps_limit))
            } else {
                Duration::ZERO
            },
        };
        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || worker.run())
            .map_err(|e| anyhow!("failed to spawn capture thread: {}", e))?;

        *state = WorkerState::Running { stop, handle };
        log::info!("capture: started ({} grabber, fps limit {})", name, self.fps_limit);
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.lock_state();
        match std::mem::replace(&mut *state, WorkerState::Lost) {
            WorkerState::Running { stop, handle } => {
                stop.store(true, Ordering::SeqCst);
                match join_with_timeout(handle, self.join_timeout) {
                    Some(Ok(grabber)) => {
                        *state = WorkerState::Idle(grabber);
                        log::info!("capture: stopped");
                    }
                    Some(Err(_)) => log::error!("capture: worker panicked"),
                    None => log::warn!(
                        "capture: worker did not stop within {:?}; detaching",
                        self.join_timeout
                    ),
                }
            }
            other => *state = other,
        }
        self.buffer.clear();
        self.fps_bits.store(0f64.to_bits(), Ordering::Relaxed);
    }

    fn get_frame(&self) -> Option<Arc<Frame>> {
        self.buffer.get_latest()
    }

    fn fps(&self) -> f64 {
        f64::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }

    fn is_running(&self) -> bool {
        matches!(*self.lock_state(), WorkerState::Running { .. })
    }
}

impl Drop for ScreenCapture {
    fn drop(&mut self) {
        if let WorkerState::Running { stop, .. } = &*self.lock_state() {
            stop.store(true, Ordering::SeqCst);
        }
    }
}

struct CaptureWorker {
    grabber: Box<dyn Grabber>,
    buffer: SharedFrameBuffer,
    fps_bits: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    min_interval: Duration,
}

impl CaptureWorker {
    fn run(mut self) -> Box<dyn Grabber> {
        let mut counter = FpsCounter::default();
        let mut sequence = 0u64;

        while !self.stop.load(Ordering::SeqCst) {
            let started = Instant::now();
            let grabbed = match panic::catch_unwind(AssertUnwindSafe(|| self.grabber.grab())) {
                Ok(result) => result,
                Err(_) => {
                    log::error!("capture: {} grabber panicked", self.grabber.name());
                    thread::sleep(CAPTURE_BACKOFF);
                    continue;
                }
            };
            match grabbed {
                Ok(Some(image)) => {
                    sequence += 1;
                    self.buffer
                        .push(Arc::new(Frame::new(image).with_sequence(sequence)));
                    counter.tick();
                    self.fps_bits
                        .store(counter.fps().to_bits(), Ordering::Relaxed);
                }
                Ok(None) => {
                    if self.min_interval.is_zero() {
                        thread::sleep(IDLE_POLL);
                    }
                }
                Err(err) => {
                    log::warn!("capture: {} grab failed: {}", self.grabber.name(), err);
                    thread::sleep(CAPTURE_BACKOFF);
                    continue;
                }
            }

            let elapsed = started.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }
        self.grabber
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::FnGrabber;
    use image::RgbImage;

    fn config(fps_limit: u32) -> CaptureConfig {
        CaptureConfig {
            fps_limit,
            buffer_size: 3,
            ..CaptureConfig::default()
        }
    }

    fn wait_for_frame(source: &ScreenCapture) -> Option<Arc<Frame>> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(frame) = source.get_frame() {
                return Some(frame);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn produces_sequenced_frames_and_stops() {
        let source = ScreenCapture::new(
            FnGrabber::new(|| Ok(Some(RgbImage::new(8, 8))), None),
            &config(200),
        );
        assert!(source.get_frame().is_none());
        source.start().unwrap();
        assert!(source.is_running());

        let frame = wait_for_frame(&source).expect("frame");
        assert!(frame.sequence() >= 1);
        assert!(source.buffered() <= 3);

        source.stop();
        assert!(!source.is_running());
        assert!(source.get_frame().is_none());
        assert_eq!(source.fps(), 0.0);
    }

    #[test]
    fn grab_errors_are_retried() {
        let mut calls = 0;
        let grabber = FnGrabber::new(
            move || {
                calls += 1;
                if calls == 1 {
                    anyhow::bail!("display asleep")
                }
                Ok(Some(RgbImage::new(4, 4)))
            },
            None,
        );
        let source = ScreenCapture::new(grabber, &config(100));
        source.start().unwrap();
        assert!(wait_for_frame(&source).is_some());
        source.stop();
    }

    #[test]
    fn grabber_panic_does_not_end_capture() {
        let mut calls = 0;
        let grabber = FnGrabber::new(
            move || {
                calls += 1;
                if calls == 1 {
                    panic!("driver fault");
                }
                Ok(Some(RgbImage::new(4, 4)))
            },
            None,
        );
        let source = ScreenCapture::new(grabber, &config(100));
        source.start().unwrap();
        assert!(wait_for_frame(&source).is_some());
        assert!(source.is_running());
        source.stop();
        assert!(!source.is_running());
    }

    #[test]
    fn restart_after_stop() {
        let source = ScreenCapture::new(
            FnGrabber::new(|| Ok(Some(RgbImage::new(4, 4))), None),
            &config(100),
        );
        source.start().unwrap();
        source.start().unwrap();
        source.stop();
        source.start().unwrap();
        assert!(wait_for_frame(&source).is_some());
        source.stop();
    }
}
