use anyhow::Result;

use crate::detect::result::{Category, Detection};
use crate::frame::Frame;

/// Detection strategy trait.
///
/// A strategy turns one frame into zero or more detections. Strategies may
/// keep temporal state (frame rings, background models, accumulators) between
/// calls; that state is owned exclusively by the strategy and touched only by
/// the thread running the detector.
///
/// Strategies leave `Detection::id` at 0. Identity is assigned by the
/// detector shell.
pub trait DetectionStrategy: Send {
    /// Strategy identifier.
    fn name(&self) -> &'static str;

    /// Name of the configuration section this strategy reads.
    fn required_config(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Drop all temporal state.
    fn reset(&mut self) {}
}

/// Scale a tunable by the sensitivity coefficient and clamp it.
///
/// The coefficient is `0.5 + (sensitivity - 0.1) * 0.6`, so sensitivity 1.0
/// maps to 1.04 and 0.1 maps to 0.5.
pub fn apply_sensitivity(sensitivity: f64, value: f64, min: f64, max: f64) -> f64 {
    let coefficient = 0.5 + (sensitivity - 0.1) * 0.6;
    (value * coefficient).clamp(min, max)
}

/// Size/velocity classification shared by the motion based strategies.
pub fn classify_object(area: f64, velocity: f64) -> Category {
    if area < 100.0 {
        Category::Small
    } else if area < 500.0 {
        if velocity > 10.0 {
            Category::Bird
        } else {
            Category::Medium
        }
    } else if area < 2000.0 {
        Category::Medium
    } else {
        Category::Large
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitivity_coefficient() {
        assert!((apply_sensitivity(1.0, 100.0, 0.0, 1000.0) - 104.0).abs() < 1e-9);
        assert!((apply_sensitivity(0.1, 100.0, 0.0, 1000.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn sensitivity_clamps() {
        assert_eq!(apply_sensitivity(3.0, 500.0, 1.0, 255.0), 255.0);
        assert_eq!(apply_sensitivity(0.1, 1.0, 1.0, 50.0), 1.0);
    }

    #[test]
    fn classification_cutoffs() {
        assert_eq!(classify_object(99.0, 0.0), Category::Small);
        assert_eq!(classify_object(300.0, 0.0), Category::Medium);
        assert_eq!(classify_object(300.0, 11.0), Category::Bird);
        assert_eq!(classify_object(1521.0, 0.0), Category::Medium);
        assert_eq!(classify_object(2000.0, 0.0), Category::Large);
    }
}
