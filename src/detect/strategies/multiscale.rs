use anyhow::Result;

use crate::config::{AdaptiveConfig, MultiScaleConfig};
use crate::detect::merge::merge_detections;
use crate::detect::result::Detection;
use crate::detect::strategy::DetectionStrategy;
use crate::frame::Frame;
use crate::imaging;

use super::AdaptiveStrategy;

/// Runs background subtraction on a pyramid of resampled frames and merges
/// the results back at full resolution.
///
/// Each scale keeps its own background model across frames.
pub struct MultiScaleStrategy {
    config: MultiScaleConfig,
    levels: Vec<ScaleLevel>,
}

struct ScaleLevel {
    scale: f64,
    weight: f64,
    detector: AdaptiveStrategy,
}

impl MultiScaleStrategy {
    pub fn new(config: MultiScaleConfig, adaptive: AdaptiveConfig) -> Self {
        let adaptive = AdaptiveConfig {
            sensitivity: config.sensitivity,
            ..adaptive
        };
        let levels = config
            .scales
            .iter()
            .zip(&config.scale_weights)
            .map(|(&scale, &weight)| ScaleLevel {
                scale,
                weight,
                detector: AdaptiveStrategy::new(adaptive.clone()),
            })
            .collect();
        Self { config, levels }
    }

    pub fn scales(&self) -> Vec<f64> {
        self.levels.iter().map(|l| l.scale).collect()
    }
}

/// Map a detection found on a frame resampled by `scale` back to the
/// original resolution.
pub(crate) fn rescale(mut detection: Detection, scale: f64) -> Detection {
    if scale == 1.0 {
        return detection;
    }
    detection.set_bbox(detection.bbox.unscale(scale));
    detection.area /= scale * scale;
    if let Some(contour) = detection.contour.as_mut() {
        for p in contour.iter_mut() {
            p.x = (f64::from(p.x) / scale).round() as i32;
            p.y = (f64::from(p.y) / scale).round() as i32;
        }
    }
    detection
}

impl DetectionStrategy for MultiScaleStrategy {
    fn name(&self) -> &'static str {
        "multi_scale"
    }

    fn required_config(&self) -> &'static str {
        "multi_scale"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let mut all = Vec::new();
        for level in &mut self.levels {
            let detections = if level.scale == 1.0 {
                level.detector.detect(frame)?
            } else {
                let width = ((f64::from(frame.width()) * level.scale) as u32).max(1);
                let height = ((f64::from(frame.height()) * level.scale) as u32).max(1);
                let resized = imaging::resize_nearest(frame.image(), width, height);
                level
                    .detector
                    .detect(&Frame::with_timestamp(resized, frame.timestamp()))?
            };

            all.extend(detections.into_iter().map(|d| {
                let mut d = rescale(d, level.scale);
                d.confidence *= level.weight;
                d
            }));
        }
        Ok(merge_detections(all, self.config.merge_threshold))
    }

    fn reset(&mut self) {
        for level in &mut self.levels {
            level.detector.reset();
        }
    }
}
