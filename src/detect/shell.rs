//! Detector shell: wraps one strategy with identity assignment, the tracking
//! table and observer fan-out.
//!
//! `process` never fails. A strategy error or panic is logged and the tick
//! yields an empty result; the table is reconciled against that result like
//! any other.

use anyhow::Result;
use crossbeam_channel::{Sender, TrySendError};
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::detect::result::Detection;
use crate::detect::strategies::{Strategy, Trail};
use crate::detect::strategy::DetectionStrategy;
use crate::frame::Frame;

pub const DETECTION_EVENT: &str = "objects_detected";

/// Receives every processed batch.
pub trait DetectionObserver: Send + Sync {
    fn notify(&self, event: &str, detections: &[Detection]) -> Result<()>;
}

impl<F> DetectionObserver for F
where
    F: Fn(&str, &[Detection]) -> Result<()> + Send + Sync,
{
    fn notify(&self, event: &str, detections: &[Detection]) -> Result<()> {
        self(event, detections)
    }
}

/// Channel sink. A full or disconnected channel is reported as an error and
/// the batch is dropped; the detector never blocks on an observer.
pub struct ChannelObserver(pub Sender<Vec<Detection>>);

impl DetectionObserver for ChannelObserver {
    fn notify(&self, _event: &str, detections: &[Detection]) -> Result<()> {
        match self.0.try_send(detections.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(anyhow::anyhow!("observer channel full")),
            Err(TrySendError::Disconnected(_)) => {
                Err(anyhow::anyhow!("observer channel disconnected"))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub struct Detector {
    strategy: Strategy,
    tracked: HashMap<u64, Detection>,
    next_id: u64,
    observers: Vec<(ObserverId, Arc<dyn DetectionObserver>)>,
    next_observer: u64,
}

impl Detector {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            tracked: HashMap::new(),
            next_id: 0,
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn trails(&self) -> Option<&BTreeMap<u64, Trail>> {
        self.strategy.trails()
    }

    /// Objects present in the most recent batch, keyed by id.
    pub fn tracked(&self) -> &HashMap<u64, Detection> {
        &self.tracked
    }

    pub fn attach(&mut self, observer: Arc<dyn DetectionObserver>) -> ObserverId {
        self.next_observer += 1;
        let id = ObserverId(self.next_observer);
        self.observers.push((id, observer));
        id
    }

    pub fn detach(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Run the strategy on `frame`, assign ids, reconcile the tracking table
    /// and notify observers.
    pub fn process(&mut self, frame: Option<&Frame>) -> Vec<Detection> {
        let Some(frame) = frame else {
            return Vec::new();
        };
        if frame.is_empty() {
            log::debug!("detector: skipping empty frame");
            return Vec::new();
        }

        let mut detections = self.run_strategy(frame);
        for detection in detections.iter_mut() {
            if detection.id == 0 {
                self.next_id += 1;
                detection.id = self.next_id;
            }
        }

        self.tracked.clear();
        for detection in &detections {
            self.tracked.insert(detection.id, detection.clone());
        }

        for (id, observer) in &self.observers {
            if let Err(err) = observer.notify(DETECTION_EVENT, &detections) {
                log::error!("detector: observer {:?} failed: {}", id, err);
            }
        }
        detections
    }

    fn run_strategy(&mut self, frame: &Frame) -> Vec<Detection> {
        let strategy = &mut self.strategy;
        match panic::catch_unwind(AssertUnwindSafe(|| strategy.detect(frame))) {
            Ok(Ok(detections)) => detections,
            Ok(Err(err)) => {
                log::error!("detector: {} strategy failed: {}", self.strategy.name(), err);
                Vec::new()
            }
            Err(_) => {
                log::error!("detector: {} strategy panicked", self.strategy.name());
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContourConfig, MotionConfig};
    use crate::detect::strategies::{ContourStrategy, MotionStrategy};
    use crate::imaging::test_support::{fill, square};
    use image::{Rgb, RgbImage};
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn contour_detector() -> Detector {
        Detector::new(Strategy::Contour(ContourStrategy::new(ContourConfig::default())))
    }

    fn two_squares() -> Frame {
        let mut image = square(200, 100, 20, 20, 30);
        fill(&mut image, 120, 40, 30, Rgb([255, 255, 255]));
        Frame::new(image)
    }

    #[test]
    fn absent_frame_is_empty() {
        let mut detector = contour_detector();
        assert!(detector.process(None).is_empty());
        assert!(detector.tracked().is_empty());
    }

    #[test]
    fn ids_are_positive_unique_and_increasing() {
        let mut detector = contour_detector();
        let mut seen = HashSet::new();
        let mut last = 0;
        for _ in 0..3 {
            let detections = detector.process(Some(&two_squares()));
            assert_eq!(detections.len(), 2);
            for d in &detections {
                assert!(d.id > 0);
                assert!(d.id > last);
                assert!(seen.insert(d.id));
                last = d.id;
            }
        }
    }

    #[test]
    fn table_matches_latest_batch() {
        let mut detector = contour_detector();
        let detections = detector.process(Some(&two_squares()));
        let ids: HashSet<u64> = detections.iter().map(|d| d.id).collect();
        assert_eq!(detector.tracked().len(), ids.len());
        for id in ids {
            assert!(detector.tracked().contains_key(&id));
        }

        detector.process(Some(&Frame::new(RgbImage::new(200, 100))));
        assert!(detector.tracked().is_empty());
    }

    #[test]
    fn observers_see_every_batch_and_can_detach() {
        let mut detector = contour_detector();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let id = detector.attach(Arc::new(move |event: &str, detections: &[Detection]| -> Result<()> {
            sink.lock().unwrap().push((event.to_string(), detections.len()));
            Ok(())
        }));

        detector.process(Some(&two_squares()));
        assert_eq!(calls.lock().unwrap().as_slice(), &[(DETECTION_EVENT.to_string(), 2)]);

        assert!(detector.detach(id));
        assert!(!detector.detach(id));
        detector.process(Some(&two_squares()));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn failing_observer_does_not_stop_others() {
        let mut detector = contour_detector();
        let (tx, rx) = crossbeam_channel::bounded(4);
        detector.attach(Arc::new(|_: &str, _: &[Detection]| -> Result<()> {
            anyhow::bail!("boom")
        }));
        detector.attach(Arc::new(ChannelObserver(tx)));
        let detections = detector.process(Some(&two_squares()));
        assert_eq!(rx.try_recv().unwrap(), detections);
    }

    #[test]
    fn full_channel_observer_never_blocks() {
        let mut detector = contour_detector();
        let (tx, rx) = crossbeam_channel::bounded(1);
        detector.attach(Arc::new(ChannelObserver(tx)));
        for _ in 0..5 {
            detector.process(Some(&two_squares()));
        }
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn zero_sized_frame_is_skipped() {
        let mut detector =
            Detector::new(Strategy::Motion(MotionStrategy::new(MotionConfig::default())));
        assert!(detector.process(Some(&Frame::new(RgbImage::new(0, 0)))).is_empty());
    }
}
