use anyhow::Result;
use image::GrayImage;

use crate::config::ThermalConfig;
use crate::detect::result::{Category, Detection};
use crate::detect::strategy::{apply_sensitivity, DetectionStrategy};
use crate::frame::Frame;
use crate::imaging;

const HOT_LEVEL: u8 = 150;
const COLD_LEVEL: u8 = 50;
const MIN_AREA: f64 = 100.0;

/// Pseudo-thermal detector: normalise brightness, push it through a colour
/// map and report the regions that come out bright.
pub struct ThermalStrategy {
    config: ThermalConfig,
    cold_mask: Option<GrayImage>,
}

impl ThermalStrategy {
    pub fn new(config: ThermalConfig) -> Self {
        Self {
            config,
            cold_mask: None,
        }
    }

    /// Dark regions of the last frame, excluding hot pixels. Only kept when
    /// `highlight_cold` is enabled.
    pub fn cold_mask(&self) -> Option<&GrayImage> {
        self.cold_mask.as_ref()
    }
}

fn category_for_heat(mean: f64) -> Category {
    if mean < 100.0 {
        Category::Small
    } else if mean < 180.0 {
        Category::Medium
    } else {
        Category::Large
    }
}

impl DetectionStrategy for ThermalStrategy {
    fn name(&self) -> &'static str {
        "thermal"
    }

    fn required_config(&self) -> &'static str {
        "thermal"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let normalized = imaging::normalize_min_max(&imaging::to_gray(frame.image()));
        let mut thermal = self.config.color_map.apply(&normalized);

        let saturation = apply_sensitivity(self.config.sensitivity, 1.0, 0.5, 2.0);
        if saturation != 1.0 {
            thermal = imaging::scale_saturation(&thermal, saturation);
        }

        let heat = imaging::to_gray(&thermal);
        let hot = imaging::threshold(&heat, HOT_LEVEL);

        self.cold_mask = if self.config.highlight_cold {
            let cold = imaging::threshold_inverted(&heat, COLD_LEVEL);
            let not_hot = imaging::map_pixels(&hot, |v| !v);
            Some(imaging::bitwise_and(&cold, &not_hot))
        } else {
            None
        };

        let mut detections = Vec::new();
        for blob in imaging::external_blobs(&hot) {
            if blob.area < MIN_AREA {
                continue;
            }
            let category = category_for_heat(imaging::region_mean(&heat, &blob.bbox));
            let confidence = (blob.area / 1000.0).min(1.0);
            detections.push(Detection::new(blob.bbox, blob.area, category, confidence).with_contour(blob.points));
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::test_support::fill;
    use crate::imaging::ColorMap;
    use image::{Rgb, RgbImage};

    #[test]
    fn blank_frame_has_no_detections() {
        let mut strategy = ThermalStrategy::new(ThermalConfig::default());
        assert!(strategy
            .detect(&Frame::new(RgbImage::new(64, 64)))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn bright_patch_is_hot() {
        let config = ThermalConfig {
            color_map: ColorMap::Hot,
            ..ThermalConfig::default()
        };
        let mut strategy = ThermalStrategy::new(config);
        let mut image = RgbImage::from_pixel(120, 120, Rgb([10, 10, 10]));
        fill(&mut image, 30, 30, 40, Rgb([250, 250, 250]));

        let detections = strategy.detect(&Frame::new(image)).unwrap();
        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.bbox.x, 30);
        assert_eq!(d.bbox.width, 40);
        assert_eq!(d.category, Category::Large);
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn cold_mask_excludes_hot_pixels() {
        let config = ThermalConfig {
            color_map: ColorMap::Hot,
            highlight_cold: true,
            ..ThermalConfig::default()
        };
        let mut strategy = ThermalStrategy::new(config);
        let mut image = RgbImage::from_pixel(50, 50, Rgb([0, 0, 0]));
        fill(&mut image, 10, 10, 20, Rgb([255, 255, 255]));
        strategy.detect(&Frame::new(image)).unwrap();

        let cold = strategy.cold_mask().unwrap();
        assert_eq!(cold.get_pixel(15, 15)[0], 0);
        assert_eq!(cold.get_pixel(45, 45)[0], 255);
    }

    #[test]
    fn heat_bands() {
        assert_eq!(category_for_heat(20.0), Category::Small);
        assert_eq!(category_for_heat(150.0), Category::Medium);
        assert_eq!(category_for_heat(200.0), Category::Large);
    }
}
