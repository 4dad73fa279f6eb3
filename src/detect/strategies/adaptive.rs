use anyhow::Result;
use image::GrayImage;

use crate::config::AdaptiveConfig;
use crate::detect::result::{BoundingBox, Detection};
use crate::detect::strategy::{classify_object, DetectionStrategy};
use crate::frame::Frame;
use crate::imaging::{self, BackgroundModel, SHADOW_VALUE};

const MIN_AREA: f64 = 100.0;
const MAX_AREA: f64 = 10_000.0;
const MAX_ELONGATION: f64 = 4.0;

/// Background-subtraction detector with texture-based confidence.
pub struct AdaptiveStrategy {
    config: AdaptiveConfig,
    model: BackgroundModel,
}

impl AdaptiveStrategy {
    pub fn new(config: AdaptiveConfig) -> Self {
        let model = BackgroundModel::new(
            config.history_length,
            config.var_threshold,
            config.detect_shadows,
            config.shadow_threshold,
        );
        Self { config, model }
    }
}

/// Share of Canny edge pixels inside the box, scaled by 3 and capped at 1.
fn texture_score(gray: &GrayImage, bbox: &BoundingBox) -> f64 {
    let Some(region) = imaging::crop_gray(gray, bbox) else {
        return 0.0;
    };
    let edges = imageproc::edges::canny(&region, 50.0, 150.0);
    let total = f64::from(edges.width() * edges.height());
    if total == 0.0 {
        return 0.0;
    }
    let edge_pixels = edges.pixels().filter(|p| p[0] > 0).count() as f64;
    (edge_pixels / total * 3.0).min(1.0)
}

impl DetectionStrategy for AdaptiveStrategy {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn required_config(&self) -> &'static str {
        "adaptive"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let foreground = self
            .model
            .apply(frame.image(), Some(self.config.learning_rate));

        // Binary morphology would promote shadow pixels to foreground, so
        // they are dropped first.
        let foreground = if self.config.detect_shadows {
            imaging::map_pixels(&foreground, |v| if v == SHADOW_VALUE { 0 } else { v })
        } else {
            foreground
        };
        let mask = imaging::close(&imaging::open(&foreground, 1), 1);

        let blobs = imaging::external_blobs(&mask);
        if blobs.is_empty() {
            return Ok(Vec::new());
        }

        let gray = imaging::to_gray(frame.image());
        let mut detections = Vec::new();
        for blob in blobs {
            if blob.area < MIN_AREA || blob.area > MAX_AREA {
                continue;
            }
            let (w, h) = (blob.bbox.width, blob.bbox.height);
            if w.min(h) == 0 {
                continue;
            }
            if f64::from(w.max(h)) / f64::from(w.min(h)) > MAX_ELONGATION {
                continue;
            }
            if !blob.bbox.fits_within(frame.width(), frame.height()) {
                continue;
            }

            let texture = texture_score(&gray, &blob.bbox);
            let confidence = if texture > 0.0 { texture } else { 0.5 };
            detections.push(
                Detection::new(blob.bbox, blob.area, classify_object(blob.area, 0.0), confidence)
                    .with_contour(blob.points),
            );
        }
        Ok(detections)
    }

    fn reset(&mut self) {
        self.model.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::test_support::{fill, square};
    use image::{Rgb, RgbImage};

    #[test]
    fn blank_frames_have_no_detections() {
        let mut strategy = AdaptiveStrategy::new(AdaptiveConfig::default());
        for _ in 0..3 {
            let frame = Frame::new(RgbImage::new(80, 60));
            assert!(strategy.detect(&frame).unwrap().is_empty());
        }
    }

    #[test]
    fn new_object_against_learned_background() {
        let mut strategy = AdaptiveStrategy::new(AdaptiveConfig::default());
        let background = RgbImage::from_pixel(160, 120, Rgb([30, 60, 30]));
        strategy.detect(&Frame::new(background.clone())).unwrap();

        let mut scene = background;
        fill(&mut scene, 50, 40, 30, Rgb([240, 240, 240]));
        let detections = strategy.detect(&Frame::new(scene)).unwrap();

        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert!((d.bbox.x - 50).abs() <= 1);
        assert!((d.bbox.y - 40).abs() <= 1);
        assert!(d.confidence > 0.0 && d.confidence <= 1.0);
    }

    #[test]
    fn smallest_accepted_area_is_detected() {
        let mut strategy = AdaptiveStrategy::new(AdaptiveConfig::default());
        let background = RgbImage::from_pixel(120, 100, Rgb([30, 60, 30]));
        strategy.detect(&Frame::new(background.clone())).unwrap();

        // an 11x11 square traces a 10x10 polygon
        let mut scene = background;
        fill(&mut scene, 40, 40, 11, Rgb([240, 240, 240]));
        let detections = strategy.detect(&Frame::new(scene)).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].area, 100.0);
    }

    #[test]
    fn elongated_regions_are_rejected() {
        let mut strategy = AdaptiveStrategy::new(AdaptiveConfig::default());
        strategy.detect(&Frame::new(RgbImage::new(200, 100))).unwrap();
        let mut scene = RgbImage::new(200, 100);
        for y in 40..50 {
            for x in 20..120 {
                scene.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        assert!(strategy.detect(&Frame::new(scene)).unwrap().is_empty());
    }

    #[test]
    fn reset_relearns_background() {
        let mut strategy = AdaptiveStrategy::new(AdaptiveConfig::default());
        strategy.detect(&Frame::new(RgbImage::new(100, 100))).unwrap();
        strategy.reset();
        let scene = square(100, 100, 30, 30, 20);
        assert!(strategy.detect(&Frame::new(scene)).unwrap().is_empty());
    }
}
