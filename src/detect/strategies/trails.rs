use anyhow::Result;
use image::Rgb;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use crate::config::{MotionConfig, TrailsConfig};
use crate::detect::result::{BoundingBox, Detection};
use crate::detect::strategy::DetectionStrategy;
use crate::frame::Frame;

use super::MotionStrategy;

/// Trails not extended for this long are dropped.
pub const TRAIL_TIMEOUT: Duration = Duration::from_secs(10);

pub const TRAIL_PALETTE: [Rgb<u8>; 9] = [
    Rgb([255, 0, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 0, 255]),
    Rgb([255, 255, 0]),
    Rgb([255, 0, 255]),
    Rgb([0, 255, 255]),
    Rgb([255, 128, 0]),
    Rgb([128, 255, 0]),
    Rgb([0, 128, 255]),
];

#[derive(Clone, Debug)]
pub struct TrailPoint {
    pub center: (i32, i32),
    pub bbox: BoundingBox,
    pub timestamp: Instant,
}

#[derive(Clone, Debug)]
pub struct Trail {
    pub points: VecDeque<TrailPoint>,
    pub color: Rgb<u8>,
}

impl Trail {
    pub fn last_seen(&self) -> Option<Instant> {
        self.points.back().map(|p| p.timestamp)
    }
}

/// Motion detection that also remembers where each moving object has been.
pub struct TrailsStrategy {
    config: TrailsConfig,
    motion: MotionStrategy,
    trails: BTreeMap<u64, Trail>,
    next_key: u64,
    next_color: usize,
}

impl TrailsStrategy {
    pub fn new(config: TrailsConfig, motion: MotionConfig) -> Self {
        let motion = MotionStrategy::new(MotionConfig {
            sensitivity: config.sensitivity,
            ..motion
        });
        Self {
            config,
            motion,
            trails: BTreeMap::new(),
            next_key: 0,
            next_color: 0,
        }
    }

    pub fn trails(&self) -> &BTreeMap<u64, Trail> {
        &self.trails
    }

    /// Nearest live trail not yet extended this frame, within the
    /// detection's larger side.
    fn associate(&self, detection: &Detection, taken: &[u64]) -> Option<u64> {
        let reach = f64::from(detection.bbox.width.max(detection.bbox.height));
        self.trails
            .iter()
            .filter(|(key, _)| !taken.contains(key))
            .filter_map(|(key, trail)| {
                let last = trail.points.back()?;
                let dx = f64::from(last.center.0 - detection.center.0);
                let dy = f64::from(last.center.1 - detection.center.1);
                let dist = dx.hypot(dy);
                (dist <= reach).then_some((*key, dist))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(key, _)| key)
    }

    fn open_trail(&mut self) -> u64 {
        self.next_key += 1;
        let color = if self.config.color_cycling {
            let color = TRAIL_PALETTE[self.next_color % TRAIL_PALETTE.len()];
            self.next_color += 1;
            color
        } else {
            TRAIL_PALETTE[0]
        };
        self.trails.insert(
            self.next_key,
            Trail {
                points: VecDeque::with_capacity(self.config.trail_length),
                color,
            },
        );
        self.next_key
    }

    fn extend(&mut self, detections: &[Detection], now: Instant) {
        let mut taken = Vec::with_capacity(detections.len());
        for detection in detections {
            let key = match self.associate(detection, &taken) {
                Some(key) => key,
                None => self.open_trail(),
            };
            taken.push(key);
            if let Some(trail) = self.trails.get_mut(&key) {
                if trail.points.len() >= self.config.trail_length {
                    trail.points.pop_front();
                }
                trail.points.push_back(TrailPoint {
                    center: detection.center,
                    bbox: detection.bbox,
                    timestamp: now,
                });
            }
        }
    }

    fn purge(&mut self, now: Instant) {
        self.trails.retain(|_, trail| {
            trail
                .last_seen()
                .is_some_and(|last| now.saturating_duration_since(last) < TRAIL_TIMEOUT)
        });
    }
}

impl DetectionStrategy for TrailsStrategy {
    fn name(&self) -> &'static str {
        "trails"
    }

    fn required_config(&self) -> &'static str {
        "trails"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let detections = self.motion.detect(frame)?;
        let now = frame.timestamp();
        self.extend(&detections, now);
        self.purge(now);
        Ok(detections)
    }

    fn reset(&mut self) {
        self.motion.reset();
        self.trails.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Category;
    use crate::imaging::test_support::square;

    fn config(trail_length: usize) -> TrailsConfig {
        TrailsConfig {
            trail_length,
            ..TrailsConfig::default()
        }
    }

    #[test]
    fn stale_trails_are_purged() {
        let mut strategy = TrailsStrategy::new(config(50), MotionConfig::default());
        let start = Instant::now();
        let at = |secs: f64| start + Duration::from_secs_f64(secs);

        // moving square for five seconds at 2 fps
        for step in 0..=10u32 {
            let image = square(200, 120, 10 + step * 12, 40, 20);
            let frame = Frame::with_timestamp(image, at(f64::from(step) * 0.5));
            strategy.detect(&frame).unwrap();
        }
        let last = square(200, 120, 10 + 10 * 12, 40, 20);
        assert!(!strategy.trails().is_empty());

        // then nothing moves; the last extension was at t = 5.0
        let mut t = 5.5;
        while t <= 14.5 {
            let frame = Frame::with_timestamp(last.clone(), at(t));
            assert!(strategy.detect(&frame).unwrap().is_empty());
            t += 0.5;
        }
        assert!(!strategy.trails().is_empty(), "trail dropped too early");

        // ten idle seconds have passed at t = 15.0
        let frame = Frame::with_timestamp(last.clone(), at(15.0));
        strategy.detect(&frame).unwrap();
        assert!(strategy.trails().is_empty());
    }

    #[test]
    fn trail_length_is_bounded() {
        let mut strategy = TrailsStrategy::new(config(3), MotionConfig::default());
        for step in 0..10u32 {
            let frame = Frame::new(square(300, 100, 10 + step * 8, 30, 16));
            strategy.detect(&frame).unwrap();
        }
        assert!(strategy.trails().values().all(|t| t.points.len() <= 3));
    }

    #[test]
    fn new_trails_cycle_through_palette() {
        let mut strategy = TrailsStrategy::new(config(10), MotionConfig::default());
        let a = strategy.open_trail();
        let b = strategy.open_trail();
        assert_eq!(strategy.trails()[&a].color, TRAIL_PALETTE[0]);
        assert_eq!(strategy.trails()[&b].color, TRAIL_PALETTE[1]);
    }

    #[test]
    fn nearby_detection_extends_existing_trail() {
        let mut strategy = TrailsStrategy::new(config(10), MotionConfig::default());
        let now = Instant::now();
        let first = Detection::new(BoundingBox::new(10, 10, 20, 20), 400.0, Category::Medium, 0.3);
        let second = Detection::new(BoundingBox::new(18, 10, 20, 20), 400.0, Category::Medium, 0.3);
        strategy.extend(&[first], now);
        strategy.extend(&[second], now);
        assert_eq!(strategy.trails().len(), 1);
        assert_eq!(strategy.trails().values().next().unwrap().points.len(), 2);
    }
}
