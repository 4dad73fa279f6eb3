//! Per-pixel adaptive Gaussian-mixture background model.
//!
//! Each pixel keeps up to `MAX_MODES` weighted Gaussians over RGB with an
//! isotropic variance. Modes are kept sorted by weight; the heaviest modes
//! whose weights sum to `BACKGROUND_RATIO` describe the background. A pixel
//! that matches none of them is foreground, unless shadow detection is on and
//! the pixel looks like a darkened copy of a background mode, in which case
//! it is tagged `SHADOW_VALUE`.

use image::{GrayImage, Luma, RgbImage};

const MAX_MODES: usize = 3;
const BACKGROUND_RATIO: f32 = 0.9;
/// Squared Mahalanobis distance under which a sample updates an existing mode.
const VAR_THRESHOLD_GEN: f32 = 9.0;
const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 75.0;
const COMPLEXITY_REDUCTION: f32 = 0.05;

pub const FOREGROUND_VALUE: u8 = 255;
pub const SHADOW_VALUE: u8 = 127;

#[derive(Clone, Copy, Debug, Default)]
struct Mode {
    weight: f32,
    variance: f32,
    mean: [f32; 3],
}

pub struct BackgroundModel {
    width: u32,
    height: u32,
    modes: Vec<Mode>,
    used: Vec<u8>,
    frames_seen: u64,
    history: u32,
    var_threshold: f32,
    detect_shadows: bool,
    shadow_threshold: f32,
}

impl BackgroundModel {
    pub fn new(history: u32, var_threshold: f64, detect_shadows: bool, shadow_threshold: f64) -> Self {
        Self {
            width: 0,
            height: 0,
            modes: Vec::new(),
            used: Vec::new(),
            frames_seen: 0,
            history: history.max(1),
            var_threshold: var_threshold as f32,
            detect_shadows,
            shadow_threshold: shadow_threshold as f32,
        }
    }

    pub fn reset(&mut self) {
        self.width = 0;
        self.height = 0;
        self.modes.clear();
        self.used.clear();
        self.frames_seen = 0;
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Classify every pixel of `image` and fold it into the model.
    ///
    /// `learning_rate` of `None` derives the rate from the history length.
    /// The first frame (and the first after a size change) seeds the model
    /// and is reported as all background.
    pub fn apply(&mut self, image: &RgbImage, learning_rate: Option<f64>) -> GrayImage {
        let (width, height) = image.dimensions();
        if self.frames_seen == 0 || width != self.width || height != self.height {
            self.seed(image);
            return GrayImage::new(width, height);
        }
        self.frames_seen += 1;

        let alpha = match learning_rate {
            Some(rate) => rate.clamp(0.0, 1.0) as f32,
            None => 1.0 / (2 * self.frames_seen).min(u64::from(self.history)) as f32,
        };

        let mut mask = GrayImage::new(width, height);
        for (idx, (pixel, out)) in image.pixels().zip(mask.pixels_mut()).enumerate() {
            let sample = [
                f32::from(pixel[0]),
                f32::from(pixel[1]),
                f32::from(pixel[2]),
            ];
            *out = Luma([self.update_pixel(idx, sample, alpha)]);
        }
        mask
    }

    fn seed(&mut self, image: &RgbImage) {
        let (width, height) = image.dimensions();
        self.width = width;
        self.height = height;
        let count = (width as usize) * (height as usize);
        self.modes = vec![Mode::default(); count * MAX_MODES];
        self.used = vec![1; count];
        for (idx, pixel) in image.pixels().enumerate() {
            self.modes[idx * MAX_MODES] = Mode {
                weight: 1.0,
                variance: VAR_INIT,
                mean: [
                    f32::from(pixel[0]),
                    f32::from(pixel[1]),
                    f32::from(pixel[2]),
                ],
            };
        }
        self.frames_seen = 1;
    }

    fn update_pixel(&mut self, idx: usize, sample: [f32; 3], alpha: f32) -> u8 {
        let modes = &mut self.modes[idx * MAX_MODES..(idx + 1) * MAX_MODES];
        let mut n_modes = self.used[idx] as usize;

        let alpha_rest = 1.0 - alpha;
        let prune = -alpha * COMPLEXITY_REDUCTION;
        let mut fits = false;
        let mut background = false;
        let mut total_weight = 0.0f32;

        let mut mode = 0;
        while mode < n_modes {
            let mut weight = alpha_rest * modes[mode].weight + prune;
            let mut slot = mode;

            if !fits {
                let variance = modes[mode].variance;
                let diff = [
                    modes[mode].mean[0] - sample[0],
                    modes[mode].mean[1] - sample[1],
                    modes[mode].mean[2] - sample[2],
                ];
                let dist2 = diff.iter().map(|d| d * d).sum::<f32>();

                if total_weight < BACKGROUND_RATIO && dist2 < self.var_threshold * variance {
                    background = true;
                }

                if dist2 < VAR_THRESHOLD_GEN * variance {
                    fits = true;
                    weight += alpha;
                    let k = alpha / weight;
                    for c in 0..3 {
                        modes[mode].mean[c] -= k * diff[c];
                    }
                    modes[mode].variance =
                        (variance + k * (dist2 - variance)).clamp(VAR_MIN, VAR_MAX);

                    // bubble the updated mode towards the front
                    while slot > 0 && weight >= modes[slot - 1].weight {
                        modes.swap(slot, slot - 1);
                        slot -= 1;
                    }
                }
            }

            if weight < -prune {
                weight = 0.0;
                n_modes -= 1;
            }
            modes[slot].weight = weight;
            total_weight += weight;
            mode += 1;
        }

        if total_weight > 0.0 {
            for m in modes.iter_mut().take(n_modes) {
                m.weight /= total_weight;
            }
        }

        if !fits && alpha > 0.0 {
            let slot = if n_modes == MAX_MODES {
                MAX_MODES - 1
            } else {
                n_modes += 1;
                n_modes - 1
            };
            if n_modes == 1 {
                modes[slot].weight = 1.0;
            } else {
                modes[slot].weight = alpha;
                for m in modes.iter_mut().take(n_modes - 1) {
                    m.weight *= alpha_rest;
                }
            }
            modes[slot].mean = sample;
            modes[slot].variance = VAR_INIT;

            let mut i = slot;
            while i > 0 && alpha >= modes[i - 1].weight {
                modes.swap(i, i - 1);
                i -= 1;
            }
        }

        self.used[idx] = n_modes as u8;

        if background {
            0
        } else if self.detect_shadows && self.is_shadow(idx, sample, n_modes) {
            SHADOW_VALUE
        } else {
            FOREGROUND_VALUE
        }
    }

    /// A shadow is a sample that is a uniformly darkened copy of a background
    /// mode, with the darkening factor in `[shadow_threshold, 1]`.
    fn is_shadow(&self, idx: usize, sample: [f32; 3], n_modes: usize) -> bool {
        let modes = &self.modes[idx * MAX_MODES..idx * MAX_MODES + n_modes];
        let mut weight_sum = 0.0f32;
        for mode in modes {
            let numerator: f32 = (0..3).map(|c| sample[c] * mode.mean[c]).sum();
            let denominator: f32 = mode.mean.iter().map(|m| m * m).sum();
            if denominator == 0.0 {
                return false;
            }
            if numerator <= denominator && numerator >= self.shadow_threshold * denominator {
                let a = numerator / denominator;
                let dist2a: f32 = (0..3)
                    .map(|c| {
                        let d = a * mode.mean[c] - sample[c];
                        d * d
                    })
                    .sum();
                if dist2a < self.var_threshold * mode.variance * a * a {
                    return true;
                }
            }
            weight_sum += mode.weight;
            if weight_sum > BACKGROUND_RATIO {
                return false;
            }
        }
        false
    }
}
