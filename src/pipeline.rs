//! Capture → detect → render pipeline.
//!
//! The pipeline owns two workers: the frame source's capture thread and the
//! processing thread started here. The processing thread owns the detector,
//! the renderer and the statistics aggregator outright; the caller reaches
//! them only through control messages. Overlays and statistics leave through
//! bounded queues fed with `try_send`, so a slow consumer loses the newest
//! items instead of stalling processing.

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{ConfigError, TrackerConfig};
use crate::detect::{create_detector, DetectionObserver, Detector, StrategyKind};
use crate::ingest::FrameSource;
use crate::render::{OverlayFrame, OverlayRenderer, Renderer};
use crate::stats::{StatsSnapshot, TrackingStatistics};
use crate::worker::{join_with_timeout, DEFAULT_JOIN_TIMEOUT};

const NO_FRAME_SLEEP: Duration = Duration::from_millis(10);
const ERROR_BACKOFF: Duration = Duration::from_millis(100);
const STATS_INTERVAL: Duration = Duration::from_secs(1);

// ----------------------------------------------------------------------------
// Bounded drop-newest queue
// ----------------------------------------------------------------------------

/// Bounded queue whose producer never blocks: when full, the pushed item is
/// dropped.
pub struct DropQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> DropQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Returns false when the item was dropped.
    pub fn push(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn receiver(&self) -> Receiver<T> {
        self.rx.clone()
    }

    fn sender(&self) -> Sender<T> {
        self.tx.clone()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(usize::MAX)
    }
}

// ----------------------------------------------------------------------------
// Pipeline
// ----------------------------------------------------------------------------

enum Control {
    Rebuild(Box<TrackerConfig>),
    Attach(Arc<dyn DetectionObserver>),
}

struct Running {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    control: Sender<Control>,
}

pub struct Pipeline {
    config: TrackerConfig,
    source: Arc<dyn FrameSource>,
    overlays: DropQueue<OverlayFrame>,
    stats: DropQueue<StatsSnapshot>,
    observers: Vec<Arc<dyn DetectionObserver>>,
    join_timeout: Duration,
    running: Option<Running>,
}

impl Pipeline {
    pub fn new(config: TrackerConfig, source: Arc<dyn FrameSource>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            overlays: DropQueue::new(config.queues.overlay_capacity),
            stats: DropQueue::new(config.queues.stats_capacity),
            config,
            source,
            observers: Vec::new(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            running: None,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Annotated frames, newest last.
    pub fn overlay_queue(&self) -> Receiver<OverlayFrame> {
        self.overlays.receiver()
    }

    /// Statistics snapshots, about one per second.
    pub fn stats_queue(&self) -> Receiver<StatsSnapshot> {
        self.stats.receiver()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }
        self.source.start()?;

        let stop = Arc::new(AtomicBool::new(false));
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let worker = ProcessingLoop {
            source: self.source.clone(),
            detector: build_detector(&self.config, &self.observers),
            renderer: OverlayRenderer::new(self.config.display.clone()),
            stats: TrackingStatistics::new(),
            observers: self.observers.clone(),
            interval: self.config.update_interval(),
            overlays: self.overlays.sender(),
            snapshots: self.stats.sender(),
            control: control_rx,
            stop: stop.clone(),
            last_sequence: None,
            last_publish: Instant::now(),
        };

        let handle = match thread::Builder::new()
            .name("tracking".to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                self.source.stop();
                return Err(anyhow!("failed to spawn processing thread: {}", e));
            }
        };

        self.running = Some(Running {
            stop,
            handle,
            control: control_tx,
        });
        log::info!("pipeline: started with {} strategy", self.config.strategy);
        Ok(())
    }

    /// Stop both workers, waiting a bounded time for each.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.stop.store(true, Ordering::SeqCst);
        self.source.stop();
        match join_with_timeout(running.handle, self.join_timeout) {
            Some(Ok(())) => log::info!("pipeline: stopped"),
            Some(Err(_)) => log::error!("pipeline: processing thread panicked"),
            None => log::warn!(
                "pipeline: processing thread did not stop within {:?}; detaching",
                self.join_timeout
            ),
        }
    }

    /// Replace the active strategy without restarting the workers.
    pub fn switch_strategy(&mut self, kind: StrategyKind) -> Result<(), ConfigError> {
        let config = TrackerConfig {
            strategy: kind,
            ..self.config.clone()
        };
        self.update_config(config)?;
        log::info!("pipeline: switched to {} strategy", kind);
        Ok(())
    }

    /// Validate and apply a new configuration. On rejection the previous
    /// configuration and detector stay active.
    pub fn update_config(&mut self, config: TrackerConfig) -> Result<(), ConfigError> {
        if let Err(err) = config.validate() {
            log::warn!("pipeline: rejected config update: {}", err);
            return Err(err);
        }
        if config.queues != self.config.queues {
            log::warn!("pipeline: queue capacities only take effect for a new pipeline");
        }
        self.config = config;
        self.send(Control::Rebuild(Box::new(self.config.clone())));
        Ok(())
    }

    /// Register an observer on the current and every future detector.
    pub fn attach_observer(&mut self, observer: Arc<dyn DetectionObserver>) {
        self.observers.push(observer.clone());
        self.send(Control::Attach(observer));
    }

    fn send(&self, message: Control) {
        if let Some(running) = &self.running {
            if running.control.send(message).is_err() {
                log::warn!("pipeline: processing thread is gone; control message dropped");
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_detector(config: &TrackerConfig, observers: &[Arc<dyn DetectionObserver>]) -> Detector {
    let mut detector = create_detector(config);
    for observer in observers {
        detector.attach(observer.clone());
    }
    detector
}

// ----------------------------------------------------------------------------
// Processing thread
// ----------------------------------------------------------------------------

struct ProcessingLoop {
    source: Arc<dyn FrameSource>,
    detector: Detector,
    renderer: OverlayRenderer,
    stats: TrackingStatistics,
    observers: Vec<Arc<dyn DetectionObserver>>,
    interval: Duration,
    overlays: Sender<OverlayFrame>,
    snapshots: Sender<StatsSnapshot>,
    control: Receiver<Control>,
    stop: Arc<AtomicBool>,
    last_sequence: Option<u64>,
    last_publish: Instant,
}

impl ProcessingLoop {
    fn run(mut self) {
        while !self.stop.load(Ordering::SeqCst) {
            self.apply_control();
            if let Err(err) = self.tick() {
                log::error!("pipeline: processing error: {}", err);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    fn apply_control(&mut self) {
        while let Ok(message) = self.control.try_recv() {
            match message {
                Control::Rebuild(config) => {
                    self.detector = build_detector(&config, &self.observers);
                    self.renderer = OverlayRenderer::new(config.display.clone());
                    self.interval = config.update_interval();
                    self.last_sequence = None;
                    log::info!("pipeline: detector rebuilt ({})", self.detector.strategy_name());
                }
                Control::Attach(observer) => {
                    self.detector.attach(observer.clone());
                    self.observers.push(observer);
                }
            }
        }
    }

    fn tick(&mut self) -> Result<()> {
        let frame = match self.source.get_frame() {
            Some(frame) if Some(frame.sequence()) != self.last_sequence => frame,
            _ => {
                thread::sleep(NO_FRAME_SLEEP);
                return Ok(());
            }
        };
        self.last_sequence = Some(frame.sequence());

        let detections = self.detector.process(Some(&frame));
        let overlay = self
            .renderer
            .render_with_trails(&frame, &detections, self.detector.trails());
        if let Err(TrySendError::Disconnected(_)) = self.overlays.try_send(overlay) {
            return Err(anyhow!("overlay queue disconnected"));
        }

        let snapshot = self.stats.update(&detections, self.source.fps());
        if self.last_publish.elapsed() >= STATS_INTERVAL {
            self.last_publish = Instant::now();
            if let Err(TrySendError::Disconnected(_)) = self.snapshots.try_send(snapshot) {
                return Err(anyhow!("stats queue disconnected"));
            }
        }

        if !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_queue_never_blocks_or_overflows() {
        let queue = DropQueue::new(2);
        let started = Instant::now();
        let accepted = (0..100).filter(|i| queue.push(*i)).count();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(accepted, 2);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.capacity(), 2);

        let rx = queue.receiver();
        assert_eq!(rx.try_recv().ok(), Some(0));
        assert!(queue.push(100));
        assert_eq!(queue.len(), 2);
    }
}
