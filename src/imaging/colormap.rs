use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pseudo-colour maps for the thermal view and the heatmap overlay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMap {
    #[default]
    Jet,
    Hot,
    Cool,
    Autumn,
}

impl ColorMap {
    pub fn name(self) -> &'static str {
        match self {
            ColorMap::Jet => "jet",
            ColorMap::Hot => "hot",
            ColorMap::Cool => "cool",
            ColorMap::Autumn => "autumn",
        }
    }

    pub fn color(self, value: u8) -> Rgb<u8> {
        let x = f32::from(value) / 255.0;
        let (r, g, b) = match self {
            ColorMap::Jet => (
                1.5 - (4.0 * x - 3.0).abs(),
                1.5 - (4.0 * x - 2.0).abs(),
                1.5 - (4.0 * x - 1.0).abs(),
            ),
            ColorMap::Hot => (3.0 * x, 3.0 * x - 1.0, 3.0 * x - 2.0),
            ColorMap::Cool => (x, 1.0 - x, 1.0),
            ColorMap::Autumn => (1.0, x, 0.0),
        };
        Rgb([unit_to_byte(r), unit_to_byte(g), unit_to_byte(b)])
    }

    pub fn apply(self, image: &GrayImage) -> RgbImage {
        let lut: Vec<Rgb<u8>> = (0..=255u8).map(|v| self.color(v)).collect();
        ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
            lut[image.get_pixel(x, y)[0] as usize]
        })
    }
}

impl fmt::Display for ColorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColorMap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jet" => Ok(ColorMap::Jet),
            "hot" => Ok(ColorMap::Hot),
            "cool" => Ok(ColorMap::Cool),
            "autumn" => Ok(ColorMap::Autumn),
            other => Err(format!("unknown color map '{}'", other)),
        }
    }
}

fn unit_to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Stretch intensities linearly onto 0..=255. A constant image maps to 0.
pub fn normalize_min_max(image: &GrayImage) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if max <= min {
        return GrayImage::new(image.width(), image.height());
    }
    let scale = 255.0 / f32::from(max - min);
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        let v = f32::from(image.get_pixel(x, y)[0] - min) * scale;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Multiply HSV saturation by `factor`, clipping to the valid range.
pub fn scale_saturation(image: &RgbImage, factor: f64) -> RgbImage {
    let factor = factor as f32;
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        let (h, s, v) = rgb_to_hsv(*image.get_pixel(x, y));
        hsv_to_rgb(h, (s * factor).clamp(0.0, 1.0), v)
    })
}

/// Hue in degrees, saturation and value in `0..=1`.
fn rgb_to_hsv(pixel: Rgb<u8>) -> (f32, f32, f32) {
    let [r, g, b] = pixel.0.map(|c| f32::from(c) / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };
    (hue, saturation, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let c = v * s;
    let hp = (h / 60.0).rem_euclid(6.0);
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    Rgb([unit_to_byte(r + m), unit_to_byte(g + m), unit_to_byte(b + m)])
}
