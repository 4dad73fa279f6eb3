//! Running tracking statistics.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use crate::detect::{Category, Detection};

const RATE_INTERVAL: Duration = Duration::from_secs(1);
pub const FPS_WINDOW: usize = 30;

/// Point-in-time view published to the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_detections: u64,
    pub fps: f64,
    pub detections_per_second: f64,
    pub categories: BTreeMap<Category, u64>,
    pub current_objects: usize,
    pub uptime_secs: f64,
}

/// Folds detection batches into totals, per-category counts and a
/// detections-per-second figure recomputed at most once a second.
pub struct TrackingStatistics {
    total: u64,
    categories: BTreeMap<Category, u64>,
    started: Instant,
    last_rate_update: Instant,
    detections_per_second: f64,
}

impl TrackingStatistics {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(now: Instant) -> Self {
        Self {
            total: 0,
            categories: Category::ALL.iter().map(|c| (*c, 0)).collect(),
            started: now,
            last_rate_update: now,
            detections_per_second: 0.0,
        }
    }

    pub fn update(&mut self, detections: &[Detection], fps: f64) -> StatsSnapshot {
        self.update_at(detections, fps, Instant::now())
    }

    pub fn update_at(&mut self, detections: &[Detection], fps: f64, now: Instant) -> StatsSnapshot {
        self.total += detections.len() as u64;
        for detection in detections {
            *self.categories.entry(detection.category).or_insert(0) += 1;
        }

        let elapsed = now.saturating_duration_since(self.last_rate_update);
        if elapsed >= RATE_INTERVAL {
            self.detections_per_second = detections.len() as f64 / elapsed.as_secs_f64();
            self.last_rate_update = now;
        }

        StatsSnapshot {
            total_detections: self.total,
            fps,
            detections_per_second: self.detections_per_second,
            categories: self.categories.clone(),
            current_objects: detections.len(),
            uptime_secs: now.saturating_duration_since(self.started).as_secs_f64(),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn category_count(&self, category: Category) -> u64 {
        self.categories.get(&category).copied().unwrap_or(0)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn reset_at(&mut self, now: Instant) {
        *self = Self::started_at(now);
    }
}

impl Default for TrackingStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Sliding-window frames-per-second estimate.
pub struct FpsCounter {
    ticks: VecDeque<Instant>,
    window: usize,
}

impl FpsCounter {
    pub fn new(window: usize) -> Self {
        Self {
            ticks: VecDeque::with_capacity(window.max(2)),
            window: window.max(2),
        }
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        if self.ticks.len() >= self.window {
            self.ticks.pop_front();
        }
        self.ticks.push_back(now);
    }

    pub fn fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.ticks.front(), self.ticks.back()) else {
            return 0.0;
        };
        if self.ticks.len() < 2 {
            return 0.0;
        }
        let span = last.saturating_duration_since(*first).as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }
        self.ticks.len() as f64 / span
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(FPS_WINDOW)
    }
}
