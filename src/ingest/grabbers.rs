use anyhow::Result;
use image::{imageops, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Region;

use super::Grabber;

// ----------------------------------------------------------------------------
// Closure adapter
// ----------------------------------------------------------------------------

/// Adapts any image-producing closure (an OS screenshot call, a window
/// capture API) into a `Grabber`, cropping to `region` when one is set.
pub struct FnGrabber<F> {
    grab: F,
    region: Option<Region>,
}

impl<F> FnGrabber<F>
where
    F: FnMut() -> Result<Option<RgbImage>> + Send + 'static,
{
    pub fn new(grab: F, region: Option<Region>) -> Self {
        Self { grab, region }
    }
}

impl<F> Grabber for FnGrabber<F>
where
    F: FnMut() -> Result<Option<RgbImage>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        "external"
    }

    fn grab(&mut self) -> Result<Option<RgbImage>> {
        let Some(image) = (self.grab)()? else {
            return Ok(None);
        };
        match &self.region {
            Some(region) => Ok(crop_to_region(&image, region)),
            None => Ok(Some(image)),
        }
    }
}

/// Crop to the part of `region` that lies inside the image.
fn crop_to_region(image: &RgbImage, region: &Region) -> Option<RgbImage> {
    let x = region.x.min(image.width());
    let y = region.y.min(image.height());
    let width = region.width.min(image.width() - x);
    let height = region.height.min(image.height() - y);
    if width == 0 || height == 0 {
        return None;
    }
    Some(imageops::crop_imm(image, x, y, width, height).to_image())
}

// ----------------------------------------------------------------------------
// Synthetic scene
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    /// Number of moving squares.
    pub objects: u32,
    pub object_size: u32,
    /// Pixels moved per frame.
    pub speed: u32,
    /// Peak amplitude of per-pixel sensor noise; 0 disables noise.
    pub noise: u8,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            objects: 2,
            object_size: 24,
            speed: 4,
            noise: 0,
            seed: 7,
        }
    }
}

/// Deterministic test scene: bright squares gliding across a dark backdrop.
pub struct SyntheticGrabber {
    config: SyntheticConfig,
    frame_count: u64,
    rng: StdRng,
}

impl SyntheticGrabber {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            frame_count: 0,
            rng,
        }
    }

    pub fn frames_generated(&self) -> u64 {
        self.frame_count
    }

    fn render(&mut self) -> RgbImage {
        let cfg = &self.config;
        let mut image = RgbImage::from_pixel(cfg.width, cfg.height, Rgb([10, 14, 10]));

        let size = cfg.object_size.min(cfg.width).min(cfg.height);
        let span_x = u64::from(cfg.width.saturating_sub(size).max(1));
        let lanes = cfg.objects.max(1);
        let lane_height = cfg.height / lanes;

        for obj in 0..cfg.objects {
            let travel = self.frame_count * u64::from(cfg.speed) + u64::from(obj) * span_x / u64::from(lanes);
            // bounce between the edges
            let phase = travel % (2 * span_x);
            let x = (if phase < span_x { phase } else { 2 * span_x - phase }) as u32;
            let y = obj * lane_height + lane_height.saturating_sub(size) / 2;
            let shade = 200 + (obj * 20).min(55) as u8;
            for py in y..(y + size).min(cfg.height) {
                for px in x..(x + size).min(cfg.width) {
                    image.put_pixel(px, py, Rgb([shade, shade, shade]));
                }
            }
        }

        if cfg.noise > 0 {
            let amplitude = i16::from(cfg.noise);
            for pixel in image.pixels_mut() {
                let delta: i16 = self.rng.gen_range(-amplitude..=amplitude);
                for c in pixel.0.iter_mut() {
                    *c = (i16::from(*c) + delta).clamp(0, 255) as u8;
                }
            }
        }
        image
    }
}

impl Grabber for SyntheticGrabber {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn grab(&mut self) -> Result<Option<RgbImage>> {
        let image = self.render();
        self.frame_count += 1;
        Ok(Some(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_scene_moves() {
        let mut grabber = SyntheticGrabber::new(SyntheticConfig::default());
        let a = grabber.grab().unwrap().unwrap();
        let b = grabber.grab().unwrap().unwrap();
        assert_eq!(a.dimensions(), (320, 240));
        assert_ne!(a, b);
        assert_eq!(grabber.frames_generated(), 2);
    }

    #[test]
    fn synthetic_scene_is_deterministic() {
        let config = SyntheticConfig {
            noise: 6,
            ..SyntheticConfig::default()
        };
        let mut a = SyntheticGrabber::new(config.clone());
        let mut b = SyntheticGrabber::new(config);
        assert_eq!(a.grab().unwrap(), b.grab().unwrap());
    }

    #[test]
    fn fn_grabber_crops_to_region() {
        let region = Region {
            x: 10,
            y: 5,
            width: 20,
            height: 100,
        };
        let mut grabber = FnGrabber::new(|| Ok(Some(RgbImage::new(64, 48))), Some(region));
        let image = grabber.grab().unwrap().unwrap();
        assert_eq!(image.dimensions(), (20, 43));
    }

    #[test]
    fn region_outside_image_yields_nothing() {
        let region = Region {
            x: 100,
            y: 100,
            width: 10,
            height: 10,
        };
        let mut grabber = FnGrabber::new(|| Ok(Some(RgbImage::new(64, 48))), Some(region));
        assert!(grabber.grab().unwrap().is_none());
    }
}
