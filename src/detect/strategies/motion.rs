use anyhow::Result;
use image::GrayImage;
use std::collections::VecDeque;

use crate::config::MotionConfig;
use crate::detect::result::Detection;
use crate::detect::strategy::{apply_sensitivity, classify_object, DetectionStrategy};
use crate::frame::Frame;
use crate::imaging;

const MIN_MOTION_AREA: f64 = 50.0;

/// Frame-differencing detector over a short ring of blurred grayscale frames.
pub struct MotionStrategy {
    config: MotionConfig,
    history: VecDeque<GrayImage>,
}

impl MotionStrategy {
    pub fn new(config: MotionConfig) -> Self {
        let capacity = config.temporal_buffer_size.max(2);
        Self {
            config,
            history: VecDeque::with_capacity(capacity),
        }
    }

    fn remember(&mut self, gray: GrayImage) {
        if self
            .history
            .back()
            .is_some_and(|prev| prev.dimensions() != gray.dimensions())
        {
            self.history.clear();
        }
        if self.history.len() >= self.config.temporal_buffer_size.max(2) {
            self.history.pop_front();
        }
        self.history.push_back(gray);
    }

    /// Per-object speed and heading. Objects are not associated across
    /// frames here, so both are always zero.
    fn estimate_motion(&self) -> (f64, f64) {
        (0.0, 0.0)
    }
}

impl DetectionStrategy for MotionStrategy {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn required_config(&self) -> &'static str {
        "motion"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let gray = imaging::gaussian_blur(&imaging::to_gray(frame.image()), 5);
        self.remember(gray);

        let n = self.history.len();
        if n < 2 {
            return Ok(Vec::new());
        }

        let diff = imaging::abs_diff(&self.history[n - 2], &self.history[n - 1]);
        let level = apply_sensitivity(self.config.sensitivity, self.config.min_pixel_change, 1.0, 50.0) as u8;
        let mask = imaging::close(&imaging::threshold(&diff, level), 2);

        let mut detections = Vec::new();
        for blob in imaging::external_blobs(&mask) {
            if blob.area < MIN_MOTION_AREA {
                continue;
            }
            let (velocity, direction) = self.estimate_motion();
            let confidence = if velocity > self.config.velocity_threshold {
                0.7
            } else {
                0.3
            };
            let mut detection = Detection::new(
                blob.bbox,
                blob.area,
                classify_object(blob.area, velocity),
                confidence,
            )
            .with_contour(blob.points);
            detection.velocity = velocity;
            detection.direction = direction;
            detections.push(detection);
        }
        Ok(detections)
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::test_support::square;
    use image::RgbImage;

    #[test]
    fn needs_two_frames() {
        let mut strategy = MotionStrategy::new(MotionConfig::default());
        let frame = Frame::new(square(100, 100, 10, 10, 20));
        assert!(strategy.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn blank_frames_have_no_motion() {
        let mut strategy = MotionStrategy::new(MotionConfig::default());
        for _ in 0..4 {
            let frame = Frame::new(RgbImage::new(64, 64));
            assert!(strategy.detect(&frame).unwrap().is_empty());
        }
    }

    #[test]
    fn moving_square_is_detected_with_zero_velocity() {
        let mut strategy = MotionStrategy::new(MotionConfig::default());
        strategy.detect(&Frame::new(square(160, 120, 20, 40, 24))).unwrap();
        let detections = strategy.detect(&Frame::new(square(160, 120, 70, 40, 24))).unwrap();
        assert!(!detections.is_empty());
        for d in &detections {
            assert_eq!(d.velocity, 0.0);
            assert_eq!(d.direction, 0.0);
            assert_eq!(d.confidence, 0.3);
            assert!(d.area >= MIN_MOTION_AREA);
        }
    }

    #[test]
    fn size_change_restarts_history() {
        let mut strategy = MotionStrategy::new(MotionConfig::default());
        strategy.detect(&Frame::new(square(100, 100, 10, 10, 20))).unwrap();
        let after = strategy.detect(&Frame::new(RgbImage::new(50, 50))).unwrap();
        assert!(after.is_empty());
        assert_eq!(strategy.history.len(), 1);
    }
}
