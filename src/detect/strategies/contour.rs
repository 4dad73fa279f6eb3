use anyhow::Result;

use crate::config::ContourConfig;
use crate::detect::result::Detection;
use crate::detect::strategy::{apply_sensitivity, classify_object, DetectionStrategy};
use crate::frame::Frame;
use crate::imaging;

/// Single-frame shape detector: threshold, clean up, keep blobs whose size,
/// aspect ratio and solidity look like a compact object.
pub struct ContourStrategy {
    config: ContourConfig,
}

impl ContourStrategy {
    pub fn new(config: ContourConfig) -> Self {
        Self { config }
    }
}

impl DetectionStrategy for ContourStrategy {
    fn name(&self) -> &'static str {
        "contour"
    }

    fn required_config(&self) -> &'static str {
        "contour"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let cfg = &self.config;
        let mut gray = imaging::to_gray(frame.image());
        if cfg.blur_size > 0 {
            gray = imaging::gaussian_blur(&gray, cfg.blur_size);
        }

        let level = apply_sensitivity(cfg.sensitivity, cfg.threshold, 1.0, 255.0) as u8;
        let mask = imaging::threshold(&gray, level);
        let mask = imaging::open(&imaging::close(&mask, 1), 1);

        let min_area = apply_sensitivity(cfg.sensitivity, cfg.min_area, 1.0, 1000.0);

        let mut detections = Vec::new();
        for blob in imaging::external_blobs(&mask) {
            if blob.area <= min_area || blob.area >= cfg.max_area {
                continue;
            }
            if blob.bbox.height == 0 {
                continue;
            }
            let aspect = f64::from(blob.bbox.width) / f64::from(blob.bbox.height);
            if aspect <= cfg.aspect_ratio_min || aspect >= cfg.aspect_ratio_max {
                continue;
            }
            let hull = imaging::hull_area(&blob.points);
            if hull == 0.0 {
                continue;
            }
            if blob.area / hull < cfg.solidity_threshold {
                continue;
            }

            let category = classify_object(blob.area, 0.0);
            let confidence = (blob.area / 1000.0).min(1.0);
            detections.push(
                Detection::new(blob.bbox, blob.area, category, confidence).with_contour(blob.points),
            );
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::Category;
    use crate::imaging::test_support::square;
    use image::RgbImage;

    #[test]
    fn blank_frame_has_no_detections() {
        let mut strategy = ContourStrategy::new(ContourConfig::default());
        let frame = Frame::new(RgbImage::new(120, 90));
        assert!(strategy.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn finds_single_square_at_low_sensitivity() {
        let config = ContourConfig {
            sensitivity: 0.1,
            ..ContourConfig::default()
        };
        let mut strategy = ContourStrategy::new(config);
        let frame = Frame::new(square(200, 200, 80, 60, 40));

        let detections = strategy.detect(&frame).unwrap();
        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert!((d.bbox.x - 80).abs() <= 2, "x = {}", d.bbox.x);
        assert!((d.bbox.y - 60).abs() <= 2, "y = {}", d.bbox.y);
        assert!((d.bbox.width - 40).abs() <= 2, "w = {}", d.bbox.width);
        assert!((d.bbox.height - 40).abs() <= 2, "h = {}", d.bbox.height);
        assert_eq!(d.category, Category::Medium);
        assert_eq!(d.id, 0);
        assert_eq!(d.velocity, 0.0);
        assert!(d.contour.is_some());
    }

    #[test]
    fn finds_square_on_the_left_edge() {
        let config = ContourConfig {
            sensitivity: 0.1,
            ..ContourConfig::default()
        };
        let mut strategy = ContourStrategy::new(config);
        let frame = Frame::new(square(200, 200, 0, 60, 40));

        let detections = strategy.detect(&frame).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox.x, 0);
        assert!((detections[0].bbox.width - 40).abs() <= 2);
    }

    #[test]
    fn rejects_thin_strips_by_aspect_ratio() {
        let mut image = RgbImage::new(200, 100);
        for y in 40..46 {
            for x in 10..190 {
                image.put_pixel(x, y, image::Rgb([255, 255, 255]));
            }
        }
        let mut strategy = ContourStrategy::new(ContourConfig::default());
        assert!(strategy.detect(&Frame::new(image)).unwrap().is_empty());
    }

    #[test]
    fn confidence_grows_with_area() {
        let mut strategy = ContourStrategy::new(ContourConfig::default());
        let small = strategy.detect(&Frame::new(square(100, 100, 10, 10, 12))).unwrap();
        let large = strategy.detect(&Frame::new(square(100, 100, 10, 10, 50))).unwrap();
        assert_eq!(small.len(), 1);
        assert_eq!(large.len(), 1);
        assert!(small[0].confidence < large[0].confidence);
        assert!(large[0].confidence <= 1.0);
    }
}
