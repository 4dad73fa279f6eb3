use anyhow::Result;
use image::{GrayImage, ImageBuffer, Luma};
use std::collections::VecDeque;

use crate::config::SensitiveConfig;
use crate::detect::result::{Category, Detection};
use crate::detect::strategy::{apply_sensitivity, DetectionStrategy};
use crate::frame::Frame;
use crate::imaging;

const MIN_AREA: f64 = 10.0;
/// A candidate must contain at least one accumulator cell this strong.
const MIN_PEAK: f32 = 100.0;
const CLAHE_GRID: u32 = 8;

/// Small-object detector: contrast enhancement, three-frame differencing and
/// an exponentially smoothed change accumulator.
///
/// Needs three frames before it can report anything, and the accumulator
/// only crosses its threshold after a few consecutive frames of change.
pub struct SensitiveStrategy {
    config: SensitiveConfig,
    history: VecDeque<GrayImage>,
    accumulator: Vec<f32>,
}

impl SensitiveStrategy {
    pub fn new(config: SensitiveConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
            accumulator: Vec::new(),
        }
    }

    fn remember(&mut self, gray: GrayImage) {
        if self
            .history
            .back()
            .is_some_and(|prev| prev.dimensions() != gray.dimensions())
        {
            self.history.clear();
            self.accumulator.clear();
        }
        if self.history.len() >= self.config.frame_buffer_size.max(3) {
            self.history.pop_front();
        }
        self.history.push_back(gray);
    }

    fn accumulate(&mut self, changed: &GrayImage) {
        let keep = self.config.noise_reduction as f32;
        let len = changed.as_raw().len();
        if self.accumulator.len() != len {
            self.accumulator = vec![0.0; len];
        }
        for (acc, &px) in self.accumulator.iter_mut().zip(changed.as_raw()) {
            *acc = *acc * keep + f32::from(px) * (1.0 - keep);
        }
    }

    fn accumulator_image(&self, width: u32, height: u32) -> GrayImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let v = self.accumulator[(y * width + x) as usize];
            Luma([v.clamp(0.0, 255.0) as u8])
        })
    }

    fn peak_within(&self, width: u32, bbox: &crate::detect::BoundingBox) -> f32 {
        let mut peak = 0.0f32;
        for y in bbox.y.max(0)..bbox.bottom() {
            for x in bbox.x.max(0)..bbox.right().min(width as i32) {
                let idx = (y as u32 * width + x as u32) as usize;
                if let Some(v) = self.accumulator.get(idx) {
                    peak = peak.max(*v);
                }
            }
        }
        peak
    }
}

impl DetectionStrategy for SensitiveStrategy {
    fn name(&self) -> &'static str {
        "sensitive"
    }

    fn required_config(&self) -> &'static str {
        "sensitive"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let mut gray = imaging::to_gray(frame.image());
        if self.config.enhancement_factor > 1.0 {
            gray = imaging::equalize_adaptive(&gray, self.config.enhancement_factor, CLAHE_GRID);
        }
        self.remember(gray);

        let n = self.history.len();
        if n < 3 {
            return Ok(Vec::new());
        }

        let recent = imaging::abs_diff(&self.history[n - 1], &self.history[n - 2]);
        let combined = if self.config.temporal_filter {
            let earlier = imaging::abs_diff(&self.history[n - 2], &self.history[n - 3]);
            imaging::bitwise_and(&recent, &earlier)
        } else {
            recent
        };

        let level = apply_sensitivity(self.config.sensitivity, self.config.min_pixel_change, 1.0, 20.0) as u8;
        let changed = imaging::threshold(&combined, level);
        self.accumulate(&changed);

        let (width, height) = changed.dimensions();
        let cutoff = (self.config.accumulation_threshold.saturating_mul(50)).min(255) as u8;
        let mut mask = imaging::threshold(&self.accumulator_image(width, height), cutoff);
        if self.config.spatial_filter {
            mask = imaging::close(&mask, 1);
        }

        let mut detections = Vec::new();
        for blob in imaging::external_blobs(&mask) {
            if blob.area < MIN_AREA {
                continue;
            }
            if self.peak_within(width, &blob.bbox) < MIN_PEAK {
                continue;
            }
            let category = if blob.area < 50.0 {
                Category::Small
            } else {
                Category::Medium
            };
            detections.push(Detection::new(blob.bbox, blob.area, category, 0.5).with_contour(blob.points));
        }
        Ok(detections)
    }

    fn reset(&mut self) {
        self.history.clear();
        self.accumulator.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::test_support::square;
    use image::RgbImage;

    fn moving(step: u32) -> Frame {
        Frame::new(square(160, 120, 10 + step * 6, 50, 14))
    }

    #[test]
    fn first_three_frames_are_empty() {
        let mut strategy = SensitiveStrategy::new(SensitiveConfig::default());
        for step in 0..3 {
            assert!(strategy.detect(&moving(step)).unwrap().is_empty());
        }
    }

    #[test]
    fn blank_frames_have_no_detections() {
        let mut strategy = SensitiveStrategy::new(SensitiveConfig::default());
        for _ in 0..6 {
            let frame = Frame::new(RgbImage::new(64, 48));
            assert!(strategy.detect(&frame).unwrap().is_empty());
        }
    }

    #[test]
    fn oscillating_object_builds_up_a_detection() {
        let config = SensitiveConfig {
            enhancement_factor: 1.0,
            ..SensitiveConfig::default()
        };
        let mut strategy = SensitiveStrategy::new(config);
        let a = square(100, 100, 40, 40, 12);
        let b = RgbImage::new(100, 100);
        let mut found = Vec::new();
        for i in 0..12 {
            let image = if i % 2 == 0 { a.clone() } else { b.clone() };
            found = strategy.detect(&Frame::new(image)).unwrap();
        }
        assert!(!found.is_empty());
        for d in &found {
            assert_eq!(d.confidence, 0.5);
            assert!(matches!(d.category, Category::Small | Category::Medium));
        }
    }
}
